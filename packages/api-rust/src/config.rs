//! Conductor client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings read once when the conductor API is constructed.
///
/// Controls which adapter is used, where remote calls go, and how long they
/// may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorConfig {
    /// Run the manager in-process instead of calling a conductor over RPC.
    pub use_local: bool,
    /// Topic remote calls are sent to.
    pub topic: String,
    /// Identifier of this conductor node, used in error stack frames.
    pub node_id: String,
    /// Timeout for each remote call in milliseconds.
    pub call_timeout_ms: u64,
    /// Maximum number of calls an endpoint runs at once before shedding load.
    pub max_concurrent_calls: u32,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            use_local: false,
            topic: "conductor".to_string(),
            node_id: "conductor-0".to_string(),
            call_timeout_ms: 60_000,
            max_concurrent_calls: 1000,
        }
    }
}

impl ConductorConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Check that the settings can drive an adapter.
    ///
    /// # Errors
    ///
    /// Returns the first setting that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Invalid conductor settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("conductor topic must not be empty")]
    EmptyTopic,
    #[error("call timeout must be greater than zero")]
    ZeroTimeout,
    #[error("max concurrent calls must be greater than zero")]
    ZeroConcurrency,
}

/// Command-line and environment form of [`ConductorConfig`].
#[derive(Debug, Clone, clap::Args)]
pub struct ConductorArgs {
    /// Run the manager in-process instead of calling a conductor over RPC.
    #[arg(long, env = "CONDUCTOR_USE_LOCAL")]
    pub use_local: bool,

    /// Topic remote calls are sent to.
    #[arg(long, env = "CONDUCTOR_TOPIC", default_value = "conductor")]
    pub topic: String,

    /// Identifier of this conductor node.
    #[arg(long, env = "CONDUCTOR_NODE_ID", default_value = "conductor-0")]
    pub node_id: String,

    /// Timeout for each remote call in milliseconds.
    #[arg(long, env = "CONDUCTOR_CALL_TIMEOUT_MS", default_value_t = 60_000)]
    pub call_timeout_ms: u64,

    /// Maximum number of calls an endpoint runs at once.
    #[arg(long, env = "CONDUCTOR_MAX_CONCURRENT_CALLS", default_value_t = 1000)]
    pub max_concurrent_calls: u32,
}

impl From<ConductorArgs> for ConductorConfig {
    fn from(args: ConductorArgs) -> Self {
        Self {
            use_local: args.use_local,
            topic: args.topic,
            node_id: args.node_id,
            call_timeout_ms: args.call_timeout_ms,
            max_concurrent_calls: args.max_concurrent_calls,
        }
    }
}
