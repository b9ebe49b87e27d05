//! Battery level, from the standard battery service

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::bluetooth::broadcast::StateCell;
use crate::core::bluetooth::constants::{UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE};
use crate::core::bluetooth::transport::GattService;
use crate::core::bluetooth::types::CapabilityId;
use crate::core::capability::Capability;

/// Tracks the watch's battery percentage; `None` while unknown.
pub struct BatteryCapability {
    level: StateCell<Option<u8>>,
}

impl BatteryCapability {
    pub fn new() -> Self {
        Self {
            level: StateCell::new(None),
        }
    }

    pub fn level(&self) -> Option<u8> {
        self.level.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u8>> {
        self.level.subscribe()
    }
}

impl Default for BatteryCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for BatteryCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Battery
    }

    fn service(&self) -> Uuid {
        UUID_BATTERY_SERVICE
    }

    fn essential(&self) -> bool {
        true
    }

    fn inbound(&self) -> &'static [Uuid] {
        &[UUID_BATTERY_LEVEL]
    }

    /// Level updates are only pushed if the characteristic can notify.
    fn is_supported(&self, service: &GattService) -> bool {
        service
            .characteristic(UUID_BATTERY_LEVEL)
            .map(|characteristic| characteristic.notify)
            .unwrap_or(false)
    }

    async fn on_notification(&self, _characteristic: Uuid, data: Vec<u8>) {
        match data.first() {
            Some(level) => {
                debug!("Battery level: {}%", level);
                self.level.set(Some(*level));
            }
            None => warn!("Empty battery level value"),
        }
    }

    fn teardown(&self) {
        self.level.set(None);
    }
}
