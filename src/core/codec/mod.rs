//! Wire encodings for each capability
//! Every routine here is pure and synchronous; validation failures are
//! reported before anything reaches the transport.

pub mod app_message;
pub mod media;
pub mod notification;
pub mod time;
pub mod weather;

use thiserror::Error;

pub use app_message::ExternalAppMessage;
pub use media::MediaCommand;
pub use notification::{Notification, Vibration};
pub use weather::{ForecastEntry, ForecastPayload, WeatherCondition};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Forecast has {len} entries, the watch accepts at most {max}")]
    TooManyForecastEntries { len: usize, max: usize },
}
