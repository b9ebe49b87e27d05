//! In-process watch simulator
//!
//! A scripted [`Transport`] that exposes a configurable GATT table, records
//! every call the session makes, and lets tests push notifications or have
//! the "watch" answer a write with a sequence of notifications. Used for
//! testing the session without real BLE hardware.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::constants::*;
use super::transport::{
    CharacteristicHandle, GattCharacteristic, GattService, NotificationStream, RetryPolicy,
    Transport, TransportError, WriteMode,
};

/// Depth of each simulated notification queue
const NOTIFICATION_QUEUE: usize = 16;

/// One call the session made on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String),
    Bond(String),
    DiscoverServices,
    Read(Uuid),
    Write(Uuid, Vec<u8>, WriteMode),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Disconnect(String),
}

#[derive(Default)]
struct SimState {
    services: Vec<GattService>,
    next_handle: u64,
    values: HashMap<Uuid, Vec<u8>>,
    subscribers: HashMap<CharacteristicHandle, mpsc::Sender<Vec<u8>>>,
    /// Write to key -> notifications pushed on (characteristic, values)
    responses: HashMap<Uuid, (Uuid, Vec<Vec<u8>>)>,
    calls: Vec<TransportCall>,
    connected: bool,
    connect_error: Option<TransportError>,
    disconnect_error: Option<TransportError>,
    write_error: Option<TransportError>,
    connect_delay: Duration,
    read_delay: Duration,
}

impl SimState {
    fn uuid_of(&self, handle: CharacteristicHandle) -> Result<Uuid, TransportError> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle == handle)
            .map(|c| c.uuid)
            .ok_or_else(|| TransportError::NotFound(format!("handle {}", handle.0)))
    }

    fn handle_of(&self, uuid: Uuid) -> Option<CharacteristicHandle> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .map(|c| c.handle)
    }

    fn require_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

/// A fake watch reachable through the [`Transport`] trait
pub struct SimulatedWatch {
    state: Mutex<SimState>,
}

impl SimulatedWatch {
    /// A watch exposing no services at all.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    /// A watch exposing every capability's service with all characteristics.
    pub fn asteroid() -> Self {
        Self::new()
            .with_service(UUID_BATTERY_SERVICE, &[(UUID_BATTERY_LEVEL, true)])
            .with_service(UUID_TIME_SERVICE, &[(UUID_TIME_SET, false)])
            .with_service(
                UUID_SCREENSHOT_SERVICE,
                &[(UUID_SCREENSHOT_REQUEST, false), (UUID_SCREENSHOT_CONTENT, true)],
            )
            .with_service(
                UUID_MEDIA_SERVICE,
                &[
                    (UUID_MEDIA_TITLE, false),
                    (UUID_MEDIA_ALBUM, false),
                    (UUID_MEDIA_ARTIST, false),
                    (UUID_MEDIA_PLAYING, false),
                    (UUID_MEDIA_COMMANDS, true),
                    (UUID_MEDIA_VOLUME, false),
                ],
            )
            .with_service(
                UUID_WEATHER_SERVICE,
                &[
                    (UUID_WEATHER_CITY, false),
                    (UUID_WEATHER_IDS, false),
                    (UUID_WEATHER_MIN_TEMPS, false),
                    (UUID_WEATHER_MAX_TEMPS, false),
                ],
            )
            .with_service(UUID_NOTIFICATION_SERVICE, &[(UUID_NOTIFICATION_UPDATE, false)])
            .with_service(UUID_APP_MESSAGE_SERVICE, &[(UUID_APP_MESSAGE, false)])
    }

    /// Adds a service; each characteristic is `(uuid, supports notify)`.
    pub fn with_service(self, uuid: Uuid, characteristics: &[(Uuid, bool)]) -> Self {
        {
            let mut state = self.lock();
            let mut service = GattService {
                uuid,
                characteristics: Vec::new(),
            };
            for (characteristic, notify) in characteristics {
                state.next_handle += 1;
                service.characteristics.push(GattCharacteristic {
                    uuid: *characteristic,
                    handle: CharacteristicHandle(state.next_handle),
                    notify: *notify,
                });
            }
            state.services.push(service);
        }
        self
    }

    pub fn without_service(self, uuid: Uuid) -> Self {
        self.lock().services.retain(|s| s.uuid != uuid);
        self
    }

    pub fn without_characteristic(self, uuid: Uuid) -> Self {
        for service in self.lock().services.iter_mut() {
            service.characteristics.retain(|c| c.uuid != uuid);
        }
        self
    }

    /// Value returned by reads of `uuid`; empty if never set.
    pub fn set_value(&self, uuid: Uuid, value: Vec<u8>) {
        self.lock().values.insert(uuid, value);
    }

    /// Makes every write to `trigger` answer with `values` on `characteristic`.
    pub fn respond_to_write(&self, trigger: Uuid, characteristic: Uuid, values: Vec<Vec<u8>>) {
        self.lock().responses.insert(trigger, (characteristic, values));
    }

    pub fn fail_connect(&self, error: Option<TransportError>) {
        self.lock().connect_error = error;
    }

    pub fn fail_disconnect(&self, error: Option<TransportError>) {
        self.lock().disconnect_error = error;
    }

    pub fn fail_writes(&self, error: Option<TransportError>) {
        self.lock().write_error = error;
    }

    /// Virtual time each connect attempt takes before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Virtual time each characteristic read takes.
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = delay;
    }

    /// Pushes a notification on `uuid`. Returns false if nobody is subscribed.
    /// Waits while the subscriber's queue is full.
    pub async fn notify(&self, uuid: Uuid, value: Vec<u8>) -> bool {
        let sender = {
            let state = self.lock();
            state
                .handle_of(uuid)
                .and_then(|handle| state.subscribers.get(&handle).cloned())
        };
        match sender {
            Some(sender) => sender.send(value).await.is_ok(),
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Every write made so far, as `(characteristic, bytes, mode)`.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, WriteMode)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(uuid, data, mode) => Some((*uuid, data.clone(), *mode)),
                _ => None,
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Characteristics with a live subscriber.
    pub fn subscription_count(&self) -> usize {
        self.lock()
            .subscribers
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for SimulatedWatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedWatch {
    async fn connect(
        &self,
        address: &str,
        _timeout: Duration,
        _retry: &RetryPolicy,
    ) -> Result<(), TransportError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(TransportCall::Connect(address.to_string()));
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(error) = state.connect_error.clone() {
            return Err(error);
        }
        state.connected = true;
        Ok(())
    }

    async fn bond(&self, address: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Bond(address.to_string()));
        state.require_connected()
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::DiscoverServices);
        state.require_connected()?;
        Ok(state.services.clone())
    }

    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, TransportError> {
        let (uuid, delay) = {
            let mut state = self.lock();
            let uuid = state.uuid_of(handle)?;
            state.calls.push(TransportCall::Read(uuid));
            (uuid, state.read_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        state.require_connected()?;
        Ok(state.values.get(&uuid).cloned().unwrap_or_default())
    }

    async fn write(
        &self,
        handle: CharacteristicHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let (response, sender) = {
            let mut state = self.lock();
            let uuid = state.uuid_of(handle)?;
            state.calls.push(TransportCall::Write(uuid, data.to_vec(), mode));
            state.require_connected()?;
            if let Some(error) = state.write_error.clone() {
                return Err(error);
            }
            match state.responses.get(&uuid).cloned() {
                Some((characteristic, values)) => {
                    let sender = state
                        .handle_of(characteristic)
                        .and_then(|h| state.subscribers.get(&h).cloned());
                    (values, sender)
                }
                None => (Vec::new(), None),
            }
        };

        if let Some(sender) = sender {
            tokio::spawn(async move {
                for value in response {
                    if sender.send(value).await.is_err() {
                        break;
                    }
                }
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError> {
        let mut state = self.lock();
        let uuid = state.uuid_of(handle)?;
        state.calls.push(TransportCall::Subscribe(uuid));
        state.require_connected()?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        state.subscribers.insert(handle, tx);
        debug!("Simulated watch: subscribed to {}", uuid);
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        })
        .boxed())
    }

    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), TransportError> {
        let mut state = self.lock();
        let uuid = state.uuid_of(handle)?;
        state.calls.push(TransportCall::Unsubscribe(uuid));
        state.subscribers.remove(&handle);
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Disconnect(address.to_string()));
        state.connected = false;
        state.subscribers.clear();
        match state.disconnect_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
