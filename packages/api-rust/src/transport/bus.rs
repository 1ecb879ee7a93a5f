//! In-process message bus: dispatches encoded requests to a topic's service.

use std::time::Duration;

use async_trait::async_trait;
use conductor_core::TransportError;
use dashmap::DashMap;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};
use tracing::info;

use super::{timeout_millis, RpcTransport};

/// A type-erased, cloneable consumer of one topic.
pub type TopicService = BoxCloneSyncService<Vec<u8>, Vec<u8>, TransportError>;

/// Routes calls to the service registered for their topic.
///
/// Each call clones the topic's service and drives the clone, so concurrent
/// callers never contend on a lock. A topic with no registered service
/// fails with `TransportError::NoConsumers`.
#[derive(Default)]
pub struct InMemoryBus {
    topics: DashMap<String, TopicService>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the consumer for `topic`, replacing any previous one.
    pub fn register<S>(&self, topic: impl Into<String>, service: S)
    where
        S: Service<Vec<u8>, Response = Vec<u8>, Error = TransportError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let topic = topic.into();
        info!(topic = %topic, "registered topic consumer");
        self.topics.insert(topic, BoxCloneSyncService::new(service));
    }

    /// Remove the consumer for `topic`. Returns whether one was registered.
    pub fn unregister(&self, topic: &str) -> bool {
        let removed = self.topics.remove(topic).is_some();
        if removed {
            info!(topic, "unregistered topic consumer");
        }
        removed
    }

    #[must_use]
    pub fn has_consumer(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl RpcTransport for InMemoryBus {
    async fn call(
        &self,
        topic: &str,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let service = self
            .topics
            .get(topic)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::NoConsumers {
                topic: topic.to_string(),
            })?;

        match tokio::time::timeout(timeout, service.oneshot(request)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Timeout {
                topic: topic.to_string(),
                timeout_ms: timeout_millis(timeout),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
