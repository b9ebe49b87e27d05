//! Bluetooth functionality for the watch session
//! This module handles the link side of a session: the transport contract,
//! capability negotiation, the session state machine and the observable
//! state it publishes.

pub mod broadcast;
pub mod constants;
pub mod negotiator;
pub mod session;
pub mod simulated;
pub mod transport;
pub mod types;

#[cfg(feature = "bluest-transport")]
pub mod bluest_transport;
#[cfg(feature = "bluest-transport")]
pub mod scanner;

use thiserror::Error;

use crate::core::codec::CodecError;
use crate::core::screenshot::ReassemblyError;

// Re-export types that should be publicly accessible
pub use broadcast::{EventBus, StateCell};
pub use constants::*;
pub use negotiator::CapabilityNegotiator;
pub use session::WatchSession;
pub use simulated::SimulatedWatch;
pub use transport::{
    CharacteristicHandle, GattCharacteristic, GattService, NotificationStream, RetryPolicy,
    Transport, TransportError, WriteMode,
};
pub use types::{
    CapabilityId, CapabilityStatus, CharacteristicBinding, ConnectionState, DiscoveredWatch,
    SessionSnapshot,
};

#[cfg(feature = "bluest-transport")]
pub use bluest_transport::BluestTransport;
#[cfg(feature = "bluest-transport")]
pub use scanner::WatchScanner;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot {operation} while {state:?}")]
    State {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Connection setup failed: {0}")]
    ConnectionSetup(String),

    #[error("Bluetooth is unavailable")]
    BluetoothUnavailable,

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid payload: {0}")]
    Validation(#[from] CodecError),

    #[error("{0} is not available on this device")]
    CapabilityUnavailable(CapabilityId),

    #[error("A screenshot transfer is already in progress")]
    TransferInProgress,

    #[error("Connection attempt cancelled")]
    Cancelled,
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Unavailable => SessionError::BluetoothUnavailable,
            TransportError::Disconnected => SessionError::DeviceDisconnected,
            other => SessionError::Io(other.to_string()),
        }
    }
}

impl From<ReassemblyError> for SessionError {
    fn from(error: ReassemblyError) -> Self {
        match error {
            ReassemblyError::InProgress => SessionError::TransferInProgress,
            other => SessionError::ProtocolViolation(other.to_string()),
        }
    }
}
