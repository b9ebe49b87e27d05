use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{BLUETOOTH_OPERATION_TIMEOUT_SECS, DEFAULT_EVENT_BUFFER};
use crate::core::bluetooth::transport::RetryPolicy;

/// Connection and delivery settings for a watch session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on one connect attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// How often, and how far apart, connect attempts are retried.
    pub retry: RetryPolicy,
    /// Queue depth of each media command subscriber. A full queue holds
    /// back delivery until the subscriber catches up.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout_secs: BLUETOOTH_OPERATION_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
