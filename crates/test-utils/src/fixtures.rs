//! Common test fixtures for vessel weather tests.

/// Well-known positions.
pub mod positions {
    use weather_common::Position;

    /// Open water off West Africa, used by the ageing scenarios.
    pub const OFFSHORE: Position = Position {
        latitude: 10.0,
        longitude: 20.0,
    };

    /// Sydney Harbour.
    pub const SYDNEY: Position = Position {
        latitude: -33.8688,
        longitude: 151.2093,
    };

    /// Solent, UK.
    pub const SOLENT: Position = Position {
        latitude: 50.7755,
        longitude: -1.2960,
    };
}

/// OpenWeather One Call responses (`units=metric`).
pub mod onecall {
    use serde_json::{json, Value};

    /// Unix time of `current.dt` in [`full_response`].
    pub const CURRENT_DT: i64 = 1_700_000_000;

    /// A complete response with current conditions, three hourly entries,
    /// two daily entries and one alert. The current block reports both rain
    /// and snow volumes.
    pub fn full_response() -> Value {
        json!({
            "lat": 10.0,
            "lon": 20.0,
            "timezone": "Africa/Ndjamena",
            "timezone_offset": 3600,
            "current": {
                "dt": CURRENT_DT,
                "sunrise": 1_699_990_000,
                "sunset": 1_700_030_000,
                "temp": 15.0,
                "feels_like": 14.2,
                "pressure": 1013,
                "humidity": 82,
                "dew_point": 12.0,
                "uvi": 0.5,
                "clouds": 75,
                "visibility": 10000,
                "wind_speed": 5.1,
                "wind_deg": 180,
                "wind_gust": 7.2,
                "weather": [
                    { "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }
                ],
                "rain": { "1h": 0.4 },
                "snow": { "1h": 0.2 }
            },
            "hourly": [
                {
                    "dt": CURRENT_DT,
                    "temp": 15.0,
                    "feels_like": 14.2,
                    "pressure": 1013,
                    "humidity": 82,
                    "dew_point": 12.0,
                    "uvi": 0.5,
                    "clouds": 75,
                    "visibility": 10000,
                    "wind_speed": 5.1,
                    "wind_deg": 180,
                    "wind_gust": 7.2,
                    "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
                    "pop": 0.6,
                    "rain": { "1h": 0.4 }
                },
                {
                    "dt": CURRENT_DT + 3600,
                    "temp": 14.0,
                    "feels_like": 13.1,
                    "pressure": 1012,
                    "humidity": 85,
                    "dew_point": 11.5,
                    "uvi": 0.2,
                    "clouds": 90,
                    "visibility": 8000,
                    "wind_speed": 6.0,
                    "wind_deg": 190,
                    "weather": [{ "id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04d" }],
                    "pop": 0.3
                },
                {
                    "dt": CURRENT_DT + 7200,
                    "temp": -1.0,
                    "feels_like": -4.0,
                    "pressure": 1010,
                    "humidity": 90,
                    "dew_point": -2.0,
                    "uvi": 0.0,
                    "clouds": 100,
                    "visibility": 2000,
                    "wind_speed": 7.5,
                    "wind_deg": 200,
                    "weather": [{ "id": 600, "main": "Snow", "description": "light snow", "icon": "13d" }],
                    "pop": 0.9,
                    "snow": { "1h": 1.1 }
                }
            ],
            "daily": [
                {
                    "dt": 1_700_038_800,
                    "sunrise": 1_699_990_000,
                    "sunset": 1_700_030_000,
                    "summary": "Expect a day of rain",
                    "temp": { "day": 16.0, "min": 11.0, "max": 18.5, "night": 12.0, "eve": 14.0, "morn": 11.5 },
                    "feels_like": { "day": 15.5, "night": 11.0, "eve": 13.0, "morn": 10.5 },
                    "pressure": 1011,
                    "humidity": 80,
                    "dew_point": 11.0,
                    "wind_speed": 6.2,
                    "wind_deg": 90,
                    "wind_gust": 9.0,
                    "weather": [{ "id": 501, "main": "Rain", "description": "moderate rain", "icon": "10d" }],
                    "clouds": 88,
                    "pop": 0.8,
                    "rain": 4.2,
                    "uvi": 3.1
                },
                {
                    "dt": 1_700_125_200,
                    "sunrise": 1_700_076_400,
                    "sunset": 1_700_116_400,
                    "temp": { "day": 17.0, "min": 12.0, "max": 19.0, "night": 13.0, "eve": 15.0, "morn": 12.5 },
                    "feels_like": { "day": 16.5, "night": 12.0, "eve": 14.0, "morn": 11.5 },
                    "pressure": 1015,
                    "humidity": 70,
                    "dew_point": 10.0,
                    "wind_speed": 4.0,
                    "wind_deg": 45,
                    "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
                    "clouds": 5,
                    "pop": 0.0,
                    "uvi": 5.0
                }
            ],
            "alerts": [
                {
                    "sender_name": "Met Service",
                    "event": "Gale Warning",
                    "start": 1_700_000_000,
                    "end": 1_700_043_200,
                    "description": "Southerly gales expected, gusting 45 knots.",
                    "tags": ["Wind"]
                }
            ]
        })
    }

    /// A response carrying only current conditions.
    pub fn minimal_response() -> Value {
        json!({
            "lat": 10.0,
            "lon": 20.0,
            "current": {
                "dt": CURRENT_DT,
                "temp": 20.0,
                "pressure": 1000,
                "humidity": 50,
                "wind_speed": 3.0,
                "wind_deg": 90,
                "weather": []
            }
        })
    }

    /// The body OpenWeather returns for a bad API key.
    pub fn invalid_key_response() -> Value {
        json!({
            "cod": 401,
            "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."
        })
    }
}
