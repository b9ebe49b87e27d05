//! Defines shared data structures for the Bluetooth module.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::transport::CharacteristicHandle;

/// Lifecycle of one watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Connection setup failed; only `disconnect()` leaves this state.
    Error,
}

impl ConnectionState {
    /// Returns true if the state machine has an edge from `self` to `next`.
    ///
    /// `Connecting -> Disconnected` exists only for cancellation rollback.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Error, Disconnecting)
        )
    }

    pub const ALL: [ConnectionState; 5] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Disconnecting,
        ConnectionState::Error,
    ];
}

/// The capabilities a watch may expose. Declaration order is the
/// negotiation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CapabilityId {
    Battery,
    Time,
    Screenshot,
    Media,
    Weather,
    Notification,
    ExternalAppMessage,
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A watch found by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredWatch {
    /// The advertised friendly name, "Unknown" if the device has none
    pub name: String,
    /// The address used to connect (MAC address where the platform exposes one)
    pub address: String,
}

impl DiscoveredWatch {
    pub fn new(name: String, address: String) -> Self {
        Self { name, address }
    }
}

/// A characteristic the capability declared, with its handle once negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicBinding {
    pub uuid: Uuid,
    pub handle: Option<CharacteristicHandle>,
}

impl CharacteristicBinding {
    pub fn unresolved(uuid: Uuid) -> Self {
        Self { uuid, handle: None }
    }
}

/// Negotiation result for one capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub ready: bool,
    pub bindings: Vec<CharacteristicBinding>,
}

impl CapabilityStatus {
    /// Handle resolved for `uuid`, if any.
    pub fn handle(&self, uuid: Uuid) -> Option<CharacteristicHandle> {
        self.bindings
            .iter()
            .find(|binding| binding.uuid == uuid)
            .and_then(|binding| binding.handle)
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub address: String,
    pub name: String,
    pub state: ConnectionState,
    pub capabilities: BTreeMap<CapabilityId, CapabilityStatus>,
}
