//! Responder configuration.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The placeholder secret shipped in [`Config::default`]. Leaving it in
/// place is detectable and insecure, not an error.
pub const DEFAULT_SECRET: &str = "CHANGEME";

/// Default multicast group all responders join.
pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 1, 1, 1);

/// Default group port.
pub const DEFAULT_PORT: u16 = 6811;

/// Default freshness window in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 5000;

/// Immutable configuration held for the lifetime of a responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IPv4 multicast group to join.
    pub multicast_addr: Ipv4Addr,
    /// UDP port shared by the group.
    pub port: u16,
    /// Maximum age, in milliseconds, for which a received frame counts as fresh.
    pub ttl_ms: u64,
    /// Shared secret keying the HMAC over every frame.
    pub secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multicast_addr: DEFAULT_MULTICAST_ADDR,
            port: DEFAULT_PORT,
            ttl_ms: DEFAULT_TTL_MS,
            secret: DEFAULT_SECRET.to_string(),
        }
    }
}

/// Configuration that can never work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is not an IPv4 multicast address")]
    NotMulticast(Ipv4Addr),
    #[error("port must be between 1 and 65535")]
    PortZero,
    #[error("the shared secret must not be empty")]
    EmptySecret,
}

/// Advisory produced by [`Config::validate`]; the responder stays fully
/// functional, how to surface the warning is up to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The secret is still the [`DEFAULT_SECRET`] placeholder.
    DefaultSecret,
}

impl Config {
    /// Checks the configuration, returning any advisories for a usable one.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if !self.multicast_addr.is_multicast() {
            return Err(ConfigError::NotMulticast(self.multicast_addr));
        }
        if self.port == 0 {
            return Err(ConfigError::PortZero);
        }
        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        let mut warnings = Vec::new();
        if self.secret == DEFAULT_SECRET {
            warnings.push(ConfigWarning::DefaultSecret);
        }
        Ok(warnings)
    }
}
