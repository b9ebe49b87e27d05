//! Core functionality for the watch session
//! This module contains the link, the capabilities negotiated over it and
//! the payload formats they speak.

pub mod bluetooth;
pub mod capability;
pub mod codec;
pub mod screenshot;

// Re-export commonly used types
pub use bluetooth::{SessionError, WatchSession};
pub use capability::{Capability, CapabilityRegistry};
pub use screenshot::{ScreenshotReassembler, TransferState};
