//! External application message payload

use serde::{Deserialize, Serialize};

/// A message routed to an application running on the watch.
///
/// Callers keep `sender` to alphanumerics and '.', `destination` to
/// alphanumerics, and `body` printable. The encoder does not check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAppMessage {
    pub sender: String,
    pub destination: String,
    pub message_id: String,
    pub body: String,
}

impl ExternalAppMessage {
    pub fn new(
        sender: impl Into<String>,
        destination: impl Into<String>,
        message_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            destination: destination.into(),
            message_id: message_id.into(),
            body: body.into(),
        }
    }

    /// Newline-joined UTF-8 payload.
    pub fn encode(&self) -> Vec<u8> {
        [
            self.sender.as_str(),
            self.destination.as_str(),
            self.message_id.as_str(),
            self.body.as_str(),
        ]
        .join("\n")
        .into_bytes()
    }
}
