//! Media controls: metadata goes to the watch, commands come back

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::broadcast::EventBus;
use crate::core::bluetooth::constants::{
    UUID_MEDIA_ALBUM, UUID_MEDIA_ARTIST, UUID_MEDIA_COMMANDS, UUID_MEDIA_PLAYING,
    UUID_MEDIA_SERVICE, UUID_MEDIA_TITLE, UUID_MEDIA_VOLUME,
};
use crate::core::bluetooth::types::CapabilityId;
use crate::core::capability::Capability;
use crate::core::codec::MediaCommand;

pub struct MediaCapability {
    commands: EventBus<MediaCommand>,
}

impl MediaCapability {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            commands: EventBus::new(event_buffer),
        }
    }

    /// Commands pressed on the watch from now on. A subscriber that stops
    /// reading stalls delivery rather than losing commands.
    pub fn subscribe(&self) -> mpsc::Receiver<MediaCommand> {
        self.commands.subscribe()
    }
}

#[async_trait]
impl Capability for MediaCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Media
    }

    fn service(&self) -> Uuid {
        UUID_MEDIA_SERVICE
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[
            UUID_MEDIA_TITLE,
            UUID_MEDIA_ALBUM,
            UUID_MEDIA_ARTIST,
            UUID_MEDIA_PLAYING,
            UUID_MEDIA_VOLUME,
        ]
    }

    fn inbound(&self) -> &'static [Uuid] {
        &[UUID_MEDIA_COMMANDS]
    }

    async fn on_notification(&self, _characteristic: Uuid, data: Vec<u8>) {
        match MediaCommand::decode(&data) {
            Some(command) => {
                debug!("Media command from watch: {:?}", command);
                self.commands.publish(command).await;
            }
            None => debug!("Dropping undecodable media command {:02X?}", data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_are_published_in_order() {
        let media = MediaCapability::new(8);
        let mut rx = media.subscribe();

        media.on_notification(UUID_MEDIA_COMMANDS, vec![0x02]).await;
        media.on_notification(UUID_MEDIA_COMMANDS, vec![0x04]).await;
        media.on_notification(UUID_MEDIA_COMMANDS, vec![0x04, 0x32]).await;
        media.on_notification(UUID_MEDIA_COMMANDS, vec![0x09]).await;
        media.on_notification(UUID_MEDIA_COMMANDS, vec![0x01]).await;

        assert_eq!(rx.recv().await, Some(MediaCommand::Play));
        assert_eq!(rx.recv().await, Some(MediaCommand::Volume(50)));
        assert_eq!(rx.recv().await, Some(MediaCommand::Next));
        assert!(rx.try_recv().is_err());
    }
}
