use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Target address. Radio links expect an EUI-64; serial links ignore it.
    pub addr: String,
    /// Fixed segment size; overrides any MTU reported by the link.
    pub segment_size: Option<usize>,
    /// How long `transmit_once` waits for a response. Default: 10 seconds.
    pub timeout: Duration,
    /// Extra attempts `transmit` makes after a timeout. Default: 0.
    pub retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            segment_size: None,
            timeout: Duration::from_secs(10),
            retries: 0,
        }
    }
}

impl SessionConfig {
    /// Default configuration for a target address.
    pub fn for_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }
}
