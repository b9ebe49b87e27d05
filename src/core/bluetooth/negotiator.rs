//! Capability negotiation
//! Matches the registry against the services a connected watch exposes,
//! resolves characteristic handles, wires notifications to each capability
//! and takes an initial snapshot of every inbound value.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::SessionError;
use crate::core::bluetooth::transport::{
    CharacteristicHandle, GattService, NotificationStream, Transport, TransportError,
};
use crate::core::bluetooth::types::{CapabilityId, CapabilityStatus, CharacteristicBinding};
use crate::core::capability::{Capability, CapabilityRegistry};

/// Why a capability did not become ready
#[derive(Error, Debug)]
enum Unavailable {
    #[error("service {0} not found")]
    MissingService(Uuid),

    #[error("characteristic {0} not found")]
    MissingCharacteristic(Uuid),

    #[error("device does not support it")]
    Unsupported,

    #[error("could not subscribe to {0}: {1}")]
    Subscribe(Uuid, TransportError),
}

#[derive(Default)]
struct CapabilityRecord {
    ready: bool,
    bindings: Vec<CharacteristicBinding>,
    subscriptions: Vec<JoinHandle<()>>,
}

impl CapabilityRecord {
    fn stop(&mut self) {
        for task in self.subscriptions.drain(..) {
            task.abort();
        }
    }
}

/// Runtime negotiation state for one session
pub struct CapabilityNegotiator {
    transport: Arc<dyn Transport>,
    registry: Arc<CapabilityRegistry>,
    records: Mutex<BTreeMap<CapabilityId, CapabilityRecord>>,
    cancel: Mutex<CancellationToken>,
}

impl CapabilityNegotiator {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            transport,
            registry,
            records: Mutex::new(BTreeMap::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Negotiates every capability against `services`.
    ///
    /// Fails, leaving nothing ready, if an essential capability is missing or
    /// unsupported. Optional capabilities that fail are left unready.
    pub async fn negotiate(&self, services: &[GattService]) -> Result<(), SessionError> {
        self.teardown();
        let cancel = {
            let mut guard = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
            *guard = CancellationToken::new();
            guard.clone()
        };

        for capability in self.registry.all() {
            let id = capability.id();
            match self.negotiate_one(&capability, services, &cancel).await {
                Ok(record) => {
                    info!("{} ready", id);
                    self.records().insert(id, record);
                }
                Err(reason) if capability.essential() => {
                    warn!("Essential capability {} unavailable: {}", id, reason);
                    self.teardown();
                    return Err(SessionError::ConnectionSetup(format!(
                        "{} unavailable: {}",
                        id, reason
                    )));
                }
                Err(reason) => {
                    debug!("Optional capability {} unavailable: {}", id, reason);
                    self.records().insert(id, CapabilityRecord::default());
                }
            }
        }

        self.read_snapshot().await;
        Ok(())
    }

    async fn negotiate_one(
        &self,
        capability: &Arc<dyn Capability>,
        services: &[GattService],
        cancel: &CancellationToken,
    ) -> Result<CapabilityRecord, Unavailable> {
        let service = services
            .iter()
            .find(|s| s.uuid == capability.service())
            .ok_or_else(|| Unavailable::MissingService(capability.service()))?;

        let mut record = CapabilityRecord::default();
        for uuid in capability.outbound() {
            let handle = service.characteristic(*uuid).map(|c| c.handle);
            if handle.is_none() {
                debug!("{}: characteristic {} not found", capability.id(), uuid);
            }
            record.bindings.push(CharacteristicBinding { uuid: *uuid, handle });
        }

        for uuid in capability.inbound() {
            let Some(characteristic) = service.characteristic(*uuid) else {
                record.stop();
                return Err(Unavailable::MissingCharacteristic(*uuid));
            };
            match self.subscribe(characteristic.handle).await {
                Ok(stream) => {
                    let task = spawn_forwarder(capability.clone(), *uuid, stream, cancel.clone());
                    record.subscriptions.push(task);
                    record.bindings.push(CharacteristicBinding {
                        uuid: *uuid,
                        handle: Some(characteristic.handle),
                    });
                }
                Err(e) => {
                    record.stop();
                    return Err(Unavailable::Subscribe(*uuid, e));
                }
            }
        }

        if !capability.is_supported(service) {
            record.stop();
            return Err(Unavailable::Unsupported);
        }

        record.ready = true;
        Ok(record)
    }

    /// Replaces any subscription left over from an earlier connection.
    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError> {
        if let Err(e) = self.transport.unsubscribe(handle).await {
            debug!("Clearing stale subscription on {:?} failed: {}", handle, e);
        }
        self.transport.subscribe(handle).await
    }

    /// Reads every inbound characteristic once so subscribers start with
    /// the device's current values.
    async fn read_snapshot(&self) {
        let reads: Vec<(Arc<dyn Capability>, Uuid, CharacteristicHandle)> = {
            let records = self.records();
            self.registry
                .all()
                .into_iter()
                .filter_map(|capability| {
                    let record = records.get(&capability.id()).filter(|r| r.ready)?;
                    let bindings: Vec<_> = capability
                        .inbound()
                        .iter()
                        .filter_map(|uuid| {
                            let handle = record
                                .bindings
                                .iter()
                                .find(|b| b.uuid == *uuid)
                                .and_then(|b| b.handle)?;
                            Some((*uuid, handle))
                        })
                        .collect();
                    Some((capability, bindings))
                })
                .flat_map(|(capability, bindings)| {
                    bindings
                        .into_iter()
                        .map(move |(uuid, handle)| (capability.clone(), uuid, handle))
                })
                .collect()
        };

        for (capability, uuid, handle) in reads {
            match self.transport.read(handle).await {
                Ok(value) => capability.on_notification(uuid, value).await,
                Err(e) => warn!("{}: initial read of {} failed: {}", capability.id(), uuid, e),
            }
        }
    }

    /// Stops every subscription, runs teardown hooks of ready capabilities
    /// and forgets all handles.
    pub fn teardown(&self) {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner()).cancel();
        let records = std::mem::take(&mut *self.records());
        if records.is_empty() {
            return;
        }

        for (id, mut record) in records {
            record.stop();
            if record.ready {
                if let Some(capability) = self.registry.all().into_iter().find(|c| c.id() == id) {
                    debug!("Tearing down {}", id);
                    capability.teardown();
                }
            }
        }
    }

    pub fn is_ready(&self, id: CapabilityId) -> bool {
        self.records().get(&id).map(|r| r.ready).unwrap_or(false)
    }

    /// Handle for `characteristic` of a ready capability.
    pub fn handle(
        &self,
        id: CapabilityId,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, SessionError> {
        self.records()
            .get(&id)
            .filter(|record| record.ready)
            .and_then(|record| {
                record
                    .bindings
                    .iter()
                    .find(|binding| binding.uuid == characteristic)
                    .and_then(|binding| binding.handle)
            })
            .ok_or(SessionError::CapabilityUnavailable(id))
    }

    /// Status of every capability; unnegotiated ones show unresolved bindings.
    pub fn statuses(&self) -> BTreeMap<CapabilityId, CapabilityStatus> {
        let records = self.records();
        self.registry
            .all()
            .iter()
            .map(|capability| {
                let status = match records.get(&capability.id()) {
                    Some(record) if record.ready => CapabilityStatus {
                        ready: true,
                        bindings: record.bindings.clone(),
                    },
                    _ => CapabilityStatus {
                        ready: false,
                        bindings: capability
                            .outbound()
                            .iter()
                            .chain(capability.inbound())
                            .map(|uuid| CharacteristicBinding::unresolved(*uuid))
                            .collect(),
                    },
                };
                (capability.id(), status)
            })
            .collect()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<CapabilityId, CapabilityRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for CapabilityNegotiator {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Feeds every value from `stream` to the capability until the stream ends
/// or the session cancels it.
fn spawn_forwarder(
    capability: Arc<dyn Capability>,
    characteristic: Uuid,
    mut stream: NotificationStream,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(value) => capability.on_notification(characteristic, value).await,
                    None => break,
                },
            }
        }
        debug!("Notification stream for {} ended", characteristic);
    })
}
