//! HTTP client for the OpenWeather One Call 3.0 endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use weather_common::{Payload, Position, RemoteError, WeatherService};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const ONECALL_PATH: &str = "/data/3.0/onecall";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("vessel-weather/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`OpenWeatherClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// One Call client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Arc<Client>,
    config: ClientConfig,
}

impl OpenWeatherClient {
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), ONECALL_PATH)
    }

    async fn request(&self, position: Position) -> Result<Value, RemoteError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("lat", position.latitude.to_string()),
                ("lon", position.longitude.to_string()),
                ("appid", self.config.api_key.clone()),
                ("units", "metric".to_string()),
                ("exclude", "minutely".to_string()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        let value = interpret_response(status.as_u16(), &body)?;
        debug!(status = %status, bytes = body.len(), "One Call response received");
        Ok(value)
    }
}

#[async_trait]
impl WeatherService for OpenWeatherClient {
    #[instrument(skip(self), fields(position = %position))]
    async fn fetch(&self, position: Position) -> Result<Payload, RemoteError> {
        counter!("weather_remote_fetch_total").increment(1);

        let result = self.request(position).await;
        if let Err(e) = &result {
            counter!("weather_remote_fetch_failures_total").increment(1);
            warn!(error = %e, "One Call request failed");
        }
        result.map(Arc::new)
    }
}

// The request URL carries `appid`, so it never reaches the message.
fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.without_url().to_string())
    }
}

/// Turn a status code and body into a payload or a provider error.
///
/// The provider reports some failures as a JSON body with a `cod` field, and
/// does so with a 200 status as well as with 4xx/5xx.
pub fn interpret_response(status: u16, body: &str) -> Result<Value, RemoteError> {
    let parsed: Result<Value, _> = serde_json::from_str(body);

    if let Ok(value) = &parsed {
        if let Some(err) = application_error(value) {
            return Err(err);
        }
    }

    if !(200..300).contains(&status) {
        return Err(RemoteError::Status(status));
    }

    let value = parsed.map_err(|e| RemoteError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(RemoteError::Malformed("expected a JSON object".into()));
    }
    Ok(value)
}

fn application_error(value: &Value) -> Option<RemoteError> {
    let cod = value.get("cod")?;
    let code = match cod {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if code == 200 {
        return None;
    }
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();
    Some(RemoteError::Application { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures::{onecall, positions};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::new(ClientConfig::new("test-key").with_base_url(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/3.0/onecall"))
            .and(query_param("lat", "10"))
            .and(query_param("lon", "20"))
            .and(query_param("appid", "test-key"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(onecall::full_response()))
            .expect(1)
            .mount(&server)
            .await;

        let payload = client_for(&server).fetch(positions::OFFSHORE).await.unwrap();
        assert_eq!(payload["current"]["dt"], onecall::CURRENT_DT);
    }

    #[tokio::test]
    async fn test_application_error_in_ok_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/3.0/onecall"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(onecall::invalid_key_response()),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch(positions::OFFSHORE)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Application { code: 401, .. }));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch(positions::OFFSHORE)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status(503)));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(onecall::full_response())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OpenWeatherClient::new(
            ClientConfig::new("test-key")
                .with_base_url(server.uri())
                .with_timeout(Duration::from_millis(50)),
        )
        .unwrap();

        let err = client.fetch(positions::OFFSHORE).await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = OpenWeatherClient::new(
            ClientConfig::new("k").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();

        let err = client.fetch(positions::OFFSHORE).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_) | RemoteError::Timeout));
    }

    #[tokio::test]
    async fn test_transport_error_omits_api_key() {
        let client = OpenWeatherClient::new(
            ClientConfig::new("SECRET-KEY-123").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();

        let err = client.fetch(positions::OFFSHORE).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);

        let surfaced = weather_common::WeatherError::from(err).to_string();
        assert!(!surfaced.contains("SECRET-KEY-123"), "{}", surfaced);
        assert!(!surfaced.contains("appid"), "{}", surfaced);
    }

    #[test]
    fn test_every_failure_counted_once() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .respond_with(ResponseTemplate::new(500))
                    .mount(&server)
                    .await;
                assert!(client_for(&server).fetch(positions::OFFSHORE).await.is_err());

                let unreachable = OpenWeatherClient::new(
                    ClientConfig::new("k").with_base_url("http://127.0.0.1:9"),
                )
                .unwrap();
                assert!(unreachable.fetch(positions::OFFSHORE).await.is_err());
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains("weather_remote_fetch_total 2"), "{}", rendered);
        assert!(
            rendered.contains("weather_remote_fetch_failures_total 2"),
            "{}",
            rendered
        );
    }

    #[test]
    fn test_interpret_response_cases() {
        assert!(interpret_response(200, r#"{"current":{}}"#).is_ok());
        assert!(interpret_response(200, r#"{"cod":"200","current":{}}"#).is_ok());
        assert!(matches!(
            interpret_response(200, r#"{"cod":"429","message":"slow down"}"#),
            Err(RemoteError::Application { code: 429, .. })
        ));
        assert!(matches!(
            interpret_response(200, "<html>"),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            interpret_response(200, "[1,2]"),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            interpret_response(404, "not json"),
            Err(RemoteError::Status(404))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", ClientConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
