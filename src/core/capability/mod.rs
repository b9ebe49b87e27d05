//! Watch capabilities
//! Each capability the watch may expose is one [`Capability`]
//! implementation: which service it lives in, which characteristics it
//! writes and listens to, and how it reacts to inbound values. The session
//! only ever talks to them through the fixed [`CapabilityRegistry`].

mod battery;
mod media;
mod outbound;
mod screenshot;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::transport::GattService;
use crate::core::bluetooth::types::CapabilityId;

pub use battery::BatteryCapability;
pub use media::MediaCapability;
pub use outbound::{AppMessageCapability, NotificationCapability, TimeCapability, WeatherCapability};
pub use screenshot::ScreenshotCapability;

/// One device feature, as negotiated against a GATT service
#[async_trait]
pub trait Capability: Send + Sync {
    fn id(&self) -> CapabilityId;

    fn service(&self) -> Uuid;

    /// A device without this capability is unusable
    fn essential(&self) -> bool {
        false
    }

    /// Characteristics the session writes to
    fn outbound(&self) -> &'static [Uuid] {
        &[]
    }

    /// Characteristics whose values are fed to [`Capability::on_notification`]
    fn inbound(&self) -> &'static [Uuid] {
        &[]
    }

    /// Checked once the service is found and handles are resolved
    fn is_supported(&self, _service: &GattService) -> bool {
        true
    }

    /// Decodes one value read from, or pushed by, an inbound characteristic.
    async fn on_notification(&self, _characteristic: Uuid, _data: Vec<u8>) {}

    /// Resets any state derived from the connection.
    fn teardown(&self) {}
}

/// The fixed set of capabilities a session negotiates
pub struct CapabilityRegistry {
    pub battery: Arc<BatteryCapability>,
    pub time: Arc<TimeCapability>,
    pub screenshot: Arc<ScreenshotCapability>,
    pub media: Arc<MediaCapability>,
    pub weather: Arc<WeatherCapability>,
    pub notification: Arc<NotificationCapability>,
    pub app_message: Arc<AppMessageCapability>,
}

impl CapabilityRegistry {
    /// `event_buffer` bounds each media command subscriber's queue.
    pub fn new(event_buffer: usize) -> Self {
        Self {
            battery: Arc::new(BatteryCapability::new()),
            time: Arc::new(TimeCapability),
            screenshot: Arc::new(ScreenshotCapability::new()),
            media: Arc::new(MediaCapability::new(event_buffer)),
            weather: Arc::new(WeatherCapability),
            notification: Arc::new(NotificationCapability),
            app_message: Arc::new(AppMessageCapability),
        }
    }

    /// Every capability, in negotiation order.
    pub fn all(&self) -> [Arc<dyn Capability>; 7] {
        [
            self.battery.clone(),
            self.time.clone(),
            self.screenshot.clone(),
            self.media.clone(),
            self.weather.clone(),
            self.notification.clone(),
            self.app_message.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::*;

    #[test]
    fn test_registry_order_and_ids() {
        let registry = CapabilityRegistry::new(4);
        let ids: Vec<_> = registry.all().iter().map(|c| c.id()).collect();
        assert_eq!(
            ids,
            vec![
                CapabilityId::Battery,
                CapabilityId::Time,
                CapabilityId::Screenshot,
                CapabilityId::Media,
                CapabilityId::Weather,
                CapabilityId::Notification,
                CapabilityId::ExternalAppMessage,
            ]
        );
    }

    #[test]
    fn test_essential_set() {
        let registry = CapabilityRegistry::new(4);
        let essential: Vec<_> = registry
            .all()
            .iter()
            .filter(|c| c.essential())
            .map(|c| c.id())
            .collect();
        assert_eq!(essential, vec![CapabilityId::Battery, CapabilityId::Time]);
    }

    #[test]
    fn test_services_are_distinct() {
        let registry = CapabilityRegistry::new(4);
        let mut services: Vec<_> = registry.all().iter().map(|c| c.service()).collect();
        services.sort();
        services.dedup();
        assert_eq!(services.len(), 7);
        assert!(services.contains(&UUID_BATTERY_SERVICE));
        assert!(services.contains(&UUID_APP_MESSAGE_SERVICE));
    }
}
