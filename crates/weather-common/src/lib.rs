//! Common types and utilities shared across the vessel weather crates.

pub mod clock;
pub mod delta;
pub mod error;
pub mod host;
pub mod model;
pub mod position;
pub mod remote;

pub use clock::{Clock, SystemClock};
pub use delta::Delta;
pub use error::{WeatherError, WeatherResult};
pub use host::{DeltaSink, PositionSource, StatusSink};
pub use model::{
    ForecastKind, OutsideConditions, PrecipitationType, QueryOptions, RecordKind, SunTimes,
    WeatherRecord, WeatherWarning, WindConditions,
};
pub use position::Position;
pub use remote::{Payload, RemoteError, WeatherService};
