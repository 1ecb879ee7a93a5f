//! Request/response messaging used by the remote adapter.
//!
//! - [`RpcTransport`]: send encoded bytes to a topic and wait for the reply
//! - [`bus`]: in-process transport routing topics to tower services

pub mod bus;

use std::time::Duration;

use async_trait::async_trait;
use conductor_core::TransportError;

pub use bus::InMemoryBus;

/// A request/response channel to named topics.
///
/// Implementations deliver `request` to one consumer of `topic` and return
/// that consumer's reply, failing with `TransportError::Timeout` when no reply
/// arrives within `timeout`. Calls are never retried.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        topic: &str,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Whole milliseconds covering `timeout`, rounded up so that a sub-millisecond
/// remainder never shrinks the budget a consumer is told about.
#[must_use]
pub fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_micros().div_ceil(1_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_milliseconds_round_up() {
        assert_eq!(timeout_millis(Duration::ZERO), 0);
        assert_eq!(timeout_millis(Duration::from_micros(500)), 1);
        assert_eq!(timeout_millis(Duration::from_micros(1_001)), 2);
        assert_eq!(timeout_millis(Duration::from_millis(250)), 250);
        assert_eq!(timeout_millis(Duration::MAX), u64::MAX);
    }
}
