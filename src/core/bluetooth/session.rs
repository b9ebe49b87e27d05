//! Watch session
//! Owns the connection lifecycle of one watch and exposes every capability
//! command and observable on top of it.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::core::bluetooth::SessionError;
use crate::core::bluetooth::broadcast::StateCell;
use crate::core::bluetooth::constants::*;
use crate::core::bluetooth::negotiator::CapabilityNegotiator;
use crate::core::bluetooth::transport::{Transport, WriteMode};
use crate::core::bluetooth::types::{CapabilityId, ConnectionState, SessionSnapshot};
use crate::core::capability::{CapabilityRegistry, ScreenshotCapability};
use crate::core::codec::{self, ExternalAppMessage, ForecastEntry, MediaCommand, Notification};

/// One watch, reached through a [`Transport`]
///
/// Callers serialize commands on a session; separate sessions share nothing.
pub struct WatchSession {
    address: String,
    name: String,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    state: StateCell<ConnectionState>,
    registry: Arc<CapabilityRegistry>,
    negotiator: CapabilityNegotiator,
}

impl WatchSession {
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let registry = Arc::new(CapabilityRegistry::new(config.event_buffer));
        let negotiator = CapabilityNegotiator::new(transport.clone(), registry.clone());
        Self {
            address: address.into(),
            name: name.into(),
            config,
            transport,
            state: StateCell::new(ConnectionState::Disconnected),
            registry,
            negotiator,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self, capability: CapabilityId) -> bool {
        self.negotiator.is_ready(capability)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            address: self.address.clone(),
            name: self.name.clone(),
            state: self.state.get(),
            capabilities: self.negotiator.statuses(),
        }
    }

    /// Connects, bonds and negotiates capabilities.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.connect_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`WatchSession::connect`], abortable through `cancel`.
    ///
    /// Cancelling the token, or dropping the returned future, rolls the
    /// session back to `Disconnected`.
    pub async fn connect_with_cancel(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.transition("connect", ConnectionState::Connecting)?;
        info!("Connecting to {} ({})", self.name, self.address);

        let mut rollback = ConnectRollback::new(self);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.establish() => Some(result),
        };

        let result = match outcome {
            None => {
                info!("Connection to {} cancelled", self.address);
                self.negotiator.teardown();
                if let Err(e) = self.transport.disconnect(&self.address).await {
                    debug!("Disconnect after cancellation failed: {}", e);
                }
                self.state.set(ConnectionState::Disconnected);
                Err(SessionError::Cancelled)
            }
            Some(Ok(())) => {
                self.transition("connect", ConnectionState::Connected)?;
                info!("Connected to {}", self.address);
                Ok(())
            }
            Some(Err(e)) => {
                error!("Failed to connect to {}: {}", self.address, e);
                self.negotiator.teardown();
                if let Err(e) = self.transport.disconnect(&self.address).await {
                    warn!("Disconnect after failed connect: {}", e);
                }
                self.transition("connect", ConnectionState::Error)?;
                Err(match e {
                    SessionError::ConnectionSetup(_) => e,
                    other => SessionError::ConnectionSetup(other.to_string()),
                })
            }
        };
        rollback.disarm();
        result
    }

    async fn establish(&self) -> Result<(), SessionError> {
        self.transport
            .connect(
                &self.address,
                self.config.connect_timeout(),
                &self.config.retry,
            )
            .await?;
        self.transport.bond(&self.address).await?;
        let services = self.transport.discover_services().await?;
        debug!("{} exposes {} services", self.address, services.len());
        self.negotiator.negotiate(&services).await
    }

    /// Disconnects from the watch; a no-op if already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let previous = self.state.get();
        if matches!(
            previous,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            debug!("{} already {:?}", self.address, previous);
            return Ok(());
        }
        self.transition("disconnect", ConnectionState::Disconnecting)?;

        // A failed connect has already released the link
        if previous == ConnectionState::Connected {
            self.negotiator.teardown();
            if let Err(e) = self.transport.disconnect(&self.address).await {
                warn!("Error disconnecting from {}: {}", self.address, e);
            }
        }

        self.transition("disconnect", ConnectionState::Disconnected)?;
        info!("Disconnected from {}", self.address);
        Ok(())
    }

    fn transition(
        &self,
        operation: &'static str,
        next: ConnectionState,
    ) -> Result<ConnectionState, SessionError> {
        self.state.update(|current| {
            if current.can_transition_to(next) {
                debug!("{}: {:?} -> {:?}", self.address, current, next);
                Ok(next)
            } else {
                Err(SessionError::State {
                    operation,
                    state: *current,
                })
            }
        })
    }

    fn require_connected(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.state.get() {
            ConnectionState::Connected => Ok(()),
            state => Err(SessionError::State { operation, state }),
        }
    }

    async fn write(
        &self,
        capability: CapabilityId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), SessionError> {
        let handle = self.negotiator.handle(capability, characteristic)?;
        self.transport
            .write(handle, data, WriteMode::WithResponse)
            .await?;
        Ok(())
    }

    // Time

    pub async fn set_time(&self, time: &NaiveDateTime) -> Result<(), SessionError> {
        self.require_connected("set time")?;
        debug!("Setting watch time to {}", time);
        self.write(CapabilityId::Time, UUID_TIME_SET, &codec::time::encode_time(time))
            .await
    }

    /// Sets the watch clock to the host's local time.
    pub async fn sync_time(&self) -> Result<(), SessionError> {
        self.set_time(&Local::now().naive_local()).await
    }

    // Weather

    pub async fn set_city(&self, city: &str) -> Result<(), SessionError> {
        self.require_connected("set weather city")?;
        self.write(
            CapabilityId::Weather,
            UUID_WEATHER_CITY,
            &codec::weather::encode_city(city),
        )
        .await
    }

    /// Writes up to five forecast days. Nothing is written if validation fails.
    pub async fn set_forecast(&self, entries: &[ForecastEntry]) -> Result<(), SessionError> {
        self.require_connected("set forecast")?;
        let payload = codec::weather::encode_forecast(entries)?;

        let ids = self.negotiator.handle(CapabilityId::Weather, UUID_WEATHER_IDS)?;
        let mins = self.negotiator.handle(CapabilityId::Weather, UUID_WEATHER_MIN_TEMPS)?;
        let maxs = self.negotiator.handle(CapabilityId::Weather, UUID_WEATHER_MAX_TEMPS)?;

        for (handle, data) in [
            (ids, &payload.ids),
            (mins, &payload.min_temps),
            (maxs, &payload.max_temps),
        ] {
            self.transport
                .write(handle, data, WriteMode::WithResponse)
                .await?;
        }
        debug!("Forecast of {} days sent", entries.len());
        Ok(())
    }

    // Notifications

    pub async fn post_notification(&self, notification: &Notification) -> Result<(), SessionError> {
        self.require_connected("post notification")?;
        self.write(
            CapabilityId::Notification,
            UUID_NOTIFICATION_UPDATE,
            &notification.encode(),
        )
        .await
    }

    pub async fn dismiss_notification(&self, id: i32) -> Result<(), SessionError> {
        self.require_connected("dismiss notification")?;
        self.write(
            CapabilityId::Notification,
            UUID_NOTIFICATION_UPDATE,
            &codec::notification::encode_dismissal(id),
        )
        .await
    }

    // Media

    pub async fn set_title(&self, title: &str) -> Result<(), SessionError> {
        self.require_connected("set media title")?;
        self.write(CapabilityId::Media, UUID_MEDIA_TITLE, &codec::media::encode_text(title))
            .await
    }

    pub async fn set_album(&self, album: &str) -> Result<(), SessionError> {
        self.require_connected("set media album")?;
        self.write(CapabilityId::Media, UUID_MEDIA_ALBUM, &codec::media::encode_text(album))
            .await
    }

    pub async fn set_artist(&self, artist: &str) -> Result<(), SessionError> {
        self.require_connected("set media artist")?;
        self.write(
            CapabilityId::Media,
            UUID_MEDIA_ARTIST,
            &codec::media::encode_text(artist),
        )
        .await
    }

    pub async fn set_playing(&self, playing: bool) -> Result<(), SessionError> {
        self.require_connected("set playing state")?;
        self.write(
            CapabilityId::Media,
            UUID_MEDIA_PLAYING,
            &codec::media::encode_playing(playing),
        )
        .await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), SessionError> {
        self.require_connected("set volume")?;
        self.write(
            CapabilityId::Media,
            UUID_MEDIA_VOLUME,
            &codec::media::encode_volume(volume),
        )
        .await
    }

    /// Commands pressed on the watch's media controls, from now on.
    pub fn subscribe_media_commands(&self) -> mpsc::Receiver<MediaCommand> {
        self.registry.media.subscribe()
    }

    // External app messages

    pub async fn send_app_message(&self, message: &ExternalAppMessage) -> Result<(), SessionError> {
        self.require_connected("send app message")?;
        self.write(
            CapabilityId::ExternalAppMessage,
            UUID_APP_MESSAGE,
            &message.encode(),
        )
        .await
    }

    // Battery

    pub fn battery_level(&self) -> Option<u8> {
        self.registry.battery.level()
    }

    pub fn subscribe_battery(&self) -> watch::Receiver<Option<u8>> {
        self.registry.battery.subscribe()
    }

    // Screenshot

    /// Asks the watch for a screenshot and waits for the full image.
    ///
    /// Only one transfer runs at a time. Dropping the future forgets the
    /// transfer locally; the watch is not told.
    pub async fn request_screenshot(&self) -> Result<Vec<u8>, SessionError> {
        self.require_connected("request screenshot")?;
        let trigger = self
            .negotiator
            .handle(CapabilityId::Screenshot, UUID_SCREENSHOT_REQUEST)?;

        let screenshot = &self.registry.screenshot;
        let pending = screenshot.begin()?;
        let _abandon = AbandonOnDrop(screenshot);

        info!("Requesting screenshot from {}", self.address);
        if let Err(e) = self
            .transport
            .write(trigger, &SCREENSHOT_TRIGGER, WriteMode::WithoutResponse)
            .await
        {
            let e = SessionError::from(e);
            screenshot.fail(e.clone());
            return Err(e);
        }

        pending.await.unwrap_or(Err(SessionError::DeviceDisconnected))
    }

    pub fn subscribe_screenshot_progress(&self) -> watch::Receiver<u8> {
        self.registry.screenshot.subscribe_progress()
    }
}

/// Rolls a session back to `Disconnected` if a connect attempt is dropped
/// before it settles.
struct ConnectRollback<'a> {
    session: &'a WatchSession,
    armed: bool,
}

impl<'a> ConnectRollback<'a> {
    fn new(session: &'a WatchSession) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectRollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session = self.session;
        warn!("Connect to {} dropped, rolling back", session.address);
        session.negotiator.teardown();
        session.state.set(ConnectionState::Disconnected);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let transport = session.transport.clone();
                let address = session.address.clone();
                runtime.spawn(async move {
                    if let Err(e) = transport.disconnect(&address).await {
                        debug!("Disconnect after dropped connect failed: {}", e);
                    }
                });
            }
            Err(_) => debug!("No runtime to release {} on", session.address),
        }
    }
}

/// Forgets an in-flight screenshot if the requester goes away.
struct AbandonOnDrop<'a>(&'a ScreenshotCapability);

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}
