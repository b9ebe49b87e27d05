//! BLE transport trait definitions and core types
//!
//! The session never touches the radio. Everything it needs from the link
//! goes through [`Transport`], which the bluest adapter and the in-process
//! simulator both implement.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::constants::{CONNECT_RETRY_DELAY_MS, MAX_CONNECT_RETRIES};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bluetooth adapter unavailable")]
    Unavailable,

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Operation timed out")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Opaque handle to a characteristic, valid for one connection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CharacteristicHandle(pub u64);

/// Whether a write waits for the peer's acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// How often and how patiently the transport retries a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_CONNECT_RETRIES,
            retry_delay_ms: CONNECT_RETRY_DELAY_MS,
        }
    }
}

/// A characteristic as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub handle: CharacteristicHandle,
    /// The characteristic advertises notify support
    pub notify: bool,
}

/// A primary service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Values pushed by the peer on a subscribed characteristic. Ends when the
/// subscription is dropped or the link goes away.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// Raw BLE primitives the session is built on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the link to `address`. Retrying is the transport's job.
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<(), TransportError>;

    /// Pair with the device if it is not already bonded.
    async fn bond(&self, address: &str) -> Result<(), TransportError>;

    /// Enumerate the primary services of the connected device.
    async fn discover_services(&self) -> Result<Vec<GattService>, TransportError>;

    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, TransportError>;

    async fn write(
        &self,
        handle: CharacteristicHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Start notifications on `handle`.
    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError>;

    /// Drop any existing subscription on `handle`. Succeeds if there is none.
    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), TransportError>;

    async fn disconnect(&self, address: &str) -> Result<(), TransportError>;
}
