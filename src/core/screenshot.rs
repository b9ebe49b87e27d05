//! Screenshot reassembly
//! The watch answers a screenshot request with a 4-byte little-endian
//! length header followed by the image bytes, split over as many
//! notifications as the link needs. This module turns that sequence back
//! into one buffer.

use serde::Serialize;
use thiserror::Error;

use crate::core::bluetooth::constants::SCREENSHOT_HEADER_SIZE;

/// Largest up-front allocation made from an announced size
const MAX_PREALLOCATION: usize = 1 << 20;

/// Where the reassembler is in a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Idle,
    AwaitingHeader,
    Receiving,
    Complete,
    Error,
}

/// What a chunk did to the transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// No transfer in flight; the chunk was dropped
    Ignored,
    /// Header or body chunk accepted; percentage received so far
    Progress(u8),
    /// The last chunk arrived; the assembled payload
    Complete(Vec<u8>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("A screenshot transfer is already in progress")]
    InProgress,

    #[error("Expected a {expected}-byte size header, got {len} bytes")]
    BadHeader { len: usize, expected: usize },

    #[error("Received {received} bytes, more than the announced {total}")]
    Overflow { received: usize, total: usize },
}

/// Chunked-transfer state machine for one screenshot at a time
#[derive(Debug)]
pub struct ScreenshotReassembler {
    state: TransferState,
    total: usize,
    received: usize,
    buffer: Vec<u8>,
}

impl ScreenshotReassembler {
    pub fn new() -> Self {
        Self {
            state: TransferState::Idle,
            total: 0,
            received: 0,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            TransferState::AwaitingHeader | TransferState::Receiving
        )
    }

    /// Percentage of the announced size received, 0 before the header.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return if self.state == TransferState::Complete { 100 } else { 0 };
        }
        (self.received as u64 * 100 / self.total as u64) as u8
    }

    /// Starts a new transfer. Only one may be in flight.
    pub fn begin(&mut self) -> Result<(), ReassemblyError> {
        if self.is_in_flight() {
            return Err(ReassemblyError::InProgress);
        }
        self.reset(TransferState::AwaitingHeader);
        Ok(())
    }

    /// Drops the current transfer without completing it.
    pub fn abort(&mut self) {
        self.reset(TransferState::Idle);
    }

    /// Feeds one notification into the transfer.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, ReassemblyError> {
        match self.state {
            TransferState::AwaitingHeader => self.accept_header(chunk),
            TransferState::Receiving => self.accept_body(chunk),
            TransferState::Idle | TransferState::Complete | TransferState::Error => {
                Ok(ChunkOutcome::Ignored)
            }
        }
    }

    fn accept_header(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, ReassemblyError> {
        let header: [u8; SCREENSHOT_HEADER_SIZE] = match chunk.try_into() {
            Ok(header) => header,
            Err(_) => {
                self.reset(TransferState::Idle);
                return Err(ReassemblyError::BadHeader {
                    len: chunk.len(),
                    expected: SCREENSHOT_HEADER_SIZE,
                });
            }
        };

        self.total = u32::from_le_bytes(header) as usize;
        self.buffer = Vec::with_capacity(self.total.min(MAX_PREALLOCATION));
        if self.total == 0 {
            self.state = TransferState::Complete;
            return Ok(ChunkOutcome::Complete(Vec::new()));
        }
        self.state = TransferState::Receiving;
        Ok(ChunkOutcome::Progress(0))
    }

    fn accept_body(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, ReassemblyError> {
        let received = self.received + chunk.len();
        if received > self.total {
            let total = self.total;
            self.reset(TransferState::Error);
            return Err(ReassemblyError::Overflow { received, total });
        }

        self.buffer.extend_from_slice(chunk);
        self.received = received;
        if self.received == self.total {
            self.state = TransferState::Complete;
            return Ok(ChunkOutcome::Complete(std::mem::take(&mut self.buffer)));
        }
        Ok(ChunkOutcome::Progress(self.progress()))
    }

    fn reset(&mut self, state: TransferState) {
        self.state = state;
        self.total = 0;
        self.received = 0;
        self.buffer = Vec::new();
    }
}

impl Default for ScreenshotReassembler {
    fn default() -> Self {
        Self::new()
    }
}
