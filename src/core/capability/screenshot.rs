//! Screenshots: a one-byte trigger out, a chunked image back

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::core::bluetooth::SessionError;
use crate::core::bluetooth::broadcast::StateCell;
use crate::core::bluetooth::constants::{
    UUID_SCREENSHOT_CONTENT, UUID_SCREENSHOT_REQUEST, UUID_SCREENSHOT_SERVICE,
};
use crate::core::bluetooth::types::CapabilityId;
use crate::core::capability::Capability;
use crate::core::screenshot::{ChunkOutcome, ScreenshotReassembler, TransferState};

pub type ScreenshotResult = Result<Vec<u8>, SessionError>;

struct Transfer {
    reassembler: ScreenshotReassembler,
    pending: Option<oneshot::Sender<ScreenshotResult>>,
}

pub struct ScreenshotCapability {
    transfer: Mutex<Transfer>,
    progress: StateCell<u8>,
}

impl ScreenshotCapability {
    pub fn new() -> Self {
        Self {
            transfer: Mutex::new(Transfer {
                reassembler: ScreenshotReassembler::new(),
                pending: None,
            }),
            progress: StateCell::new(0),
        }
    }

    /// Percentage of the current (or last) screenshot received.
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub fn transfer_state(&self) -> TransferState {
        self.lock().reassembler.state()
    }

    /// Arms the reassembler for a new transfer. The receiver resolves when
    /// the last chunk arrives or the transfer fails.
    pub fn begin(&self) -> Result<oneshot::Receiver<ScreenshotResult>, SessionError> {
        let mut transfer = self.lock();
        transfer.reassembler.begin()?;
        let (tx, rx) = oneshot::channel();
        transfer.pending = Some(tx);
        self.progress.set(0);
        Ok(rx)
    }

    /// Fails the in-flight transfer, if any, with `error`.
    pub fn fail(&self, error: SessionError) {
        let mut transfer = self.lock();
        if !transfer.reassembler.is_in_flight() {
            return;
        }
        transfer.reassembler.abort();
        if let Some(pending) = transfer.pending.take() {
            let _ = pending.send(Err(error));
        }
    }

    /// Forgets the in-flight transfer after the requester went away.
    ///
    /// There is no abort message on the wire, so the watch may keep sending;
    /// those chunks are ignored while idle.
    pub fn abandon(&self) {
        let mut transfer = self.lock();
        if transfer.reassembler.is_in_flight() {
            warn!("Screenshot request dropped mid-transfer; the watch may still be sending");
            transfer.reassembler.abort();
            transfer.pending = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Transfer> {
        self.transfer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScreenshotCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for ScreenshotCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Screenshot
    }

    fn service(&self) -> Uuid {
        UUID_SCREENSHOT_SERVICE
    }

    fn outbound(&self) -> &'static [Uuid] {
        &[UUID_SCREENSHOT_REQUEST]
    }

    fn inbound(&self) -> &'static [Uuid] {
        &[UUID_SCREENSHOT_CONTENT]
    }

    async fn on_notification(&self, _characteristic: Uuid, data: Vec<u8>) {
        let mut transfer = self.lock();
        match transfer.reassembler.feed(&data) {
            Ok(ChunkOutcome::Ignored) => {
                debug!("Ignoring {} screenshot bytes outside a transfer", data.len());
            }
            Ok(ChunkOutcome::Progress(percent)) => {
                debug!("Screenshot chunk of {} bytes, {}%", data.len(), percent);
                self.progress.set(percent);
            }
            Ok(ChunkOutcome::Complete(image)) => {
                info!("Screenshot received: {} bytes", image.len());
                self.progress.set(100);
                if let Some(pending) = transfer.pending.take() {
                    let _ = pending.send(Ok(image));
                }
            }
            Err(e) => {
                error!("Screenshot transfer aborted: {}", e);
                if let Some(pending) = transfer.pending.take() {
                    let _ = pending.send(Err(e.into()));
                }
            }
        }
    }

    fn teardown(&self) {
        self.fail(SessionError::DeviceDisconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_resolves_pending_request() {
        let screenshot = ScreenshotCapability::new();
        let progress = screenshot.subscribe_progress();
        let rx = screenshot.begin().unwrap();

        screenshot.on_notification(UUID_SCREENSHOT_CONTENT, 4u32.to_le_bytes().to_vec()).await;
        screenshot.on_notification(UUID_SCREENSHOT_CONTENT, vec![9, 8]).await;
        assert_eq!(*progress.borrow(), 50);
        screenshot.on_notification(UUID_SCREENSHOT_CONTENT, vec![7, 6]).await;

        assert_eq!(rx.await.unwrap(), Ok(vec![9, 8, 7, 6]));
        assert_eq!(*progress.borrow(), 100);
        assert_eq!(screenshot.transfer_state(), TransferState::Complete);
    }

    #[tokio::test]
    async fn test_bad_header_fails_request() {
        let screenshot = ScreenshotCapability::new();
        let rx = screenshot.begin().unwrap();

        screenshot.on_notification(UUID_SCREENSHOT_CONTENT, vec![1, 2]).await;

        assert!(matches!(rx.await.unwrap(), Err(SessionError::ProtocolViolation(_))));
        assert_eq!(screenshot.transfer_state(), TransferState::Idle);
        assert!(screenshot.begin().is_ok());
    }

    #[tokio::test]
    async fn test_second_request_fails_fast() {
        let screenshot = ScreenshotCapability::new();
        let _rx = screenshot.begin().unwrap();
        assert_eq!(screenshot.begin().err(), Some(SessionError::TransferInProgress));
    }

    #[tokio::test]
    async fn test_teardown_fails_in_flight_transfer() {
        let screenshot = ScreenshotCapability::new();
        let rx = screenshot.begin().unwrap();
        screenshot.teardown();
        assert_eq!(rx.await.unwrap(), Err(SessionError::DeviceDisconnected));
        assert_eq!(screenshot.transfer_state(), TransferState::Idle);
    }

    #[tokio::test]
    async fn test_abandon_clears_in_flight_flag() {
        let screenshot = ScreenshotCapability::new();
        let rx = screenshot.begin().unwrap();
        screenshot.abandon();
        assert!(rx.await.is_err());
        assert!(screenshot.begin().is_ok());
    }
}
