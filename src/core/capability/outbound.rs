//! Write-only capabilities
//! Nothing comes back from these services, so the capability is just its
//! service and characteristic layout; the session does the encoding.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_APP_MESSAGE, UUID_APP_MESSAGE_SERVICE, UUID_NOTIFICATION_SERVICE,
    UUID_NOTIFICATION_UPDATE, UUID_TIME_SERVICE, UUID_TIME_SET, UUID_WEATHER_CITY,
    UUID_WEATHER_IDS, UUID_WEATHER_MAX_TEMPS, UUID_WEATHER_MIN_TEMPS, UUID_WEATHER_SERVICE,
};
use crate::core::bluetooth::types::CapabilityId;
use crate::core::capability::Capability;

/// Clock synchronisation. A watch that cannot take the time is not usable.
pub struct TimeCapability;

#[async_trait]
impl Capability for TimeCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Time
    }

    fn service(&self) -> Uuid {
        UUID_TIME_SERVICE
    }

    fn essential(&self) -> bool {
        true
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[UUID_TIME_SET]
    }
}

pub struct WeatherCapability;

#[async_trait]
impl Capability for WeatherCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Weather
    }

    fn service(&self) -> Uuid {
        UUID_WEATHER_SERVICE
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[
            UUID_WEATHER_CITY,
            UUID_WEATHER_IDS,
            UUID_WEATHER_MIN_TEMPS,
            UUID_WEATHER_MAX_TEMPS,
        ]
    }
}

pub struct NotificationCapability;

#[async_trait]
impl Capability for NotificationCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Notification
    }

    fn service(&self) -> Uuid {
        UUID_NOTIFICATION_SERVICE
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[UUID_NOTIFICATION_UPDATE]
    }
}

pub struct AppMessageCapability;

#[async_trait]
impl Capability for AppMessageCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::ExternalAppMessage
    }

    fn service(&self) -> Uuid {
        UUID_APP_MESSAGE_SERVICE
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[UUID_APP_MESSAGE]
    }
}
