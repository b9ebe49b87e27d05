//! Watchlink library
//! Session protocol core for talking to an AsteroidOS-style smartwatch over
//! Bluetooth LE: connection lifecycle, capability negotiation, payload
//! codecs and screenshot reassembly.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

pub use config::{AppConfig, LoggingConfig, SessionConfig};
pub use core::bluetooth::{
    CapabilityId, ConnectionState, SessionError, SessionSnapshot, SimulatedWatch, Transport,
    TransportError, WatchSession,
};
pub use core::codec::{
    ExternalAppMessage, ForecastEntry, MediaCommand, Notification, Vibration, WeatherCondition,
};
