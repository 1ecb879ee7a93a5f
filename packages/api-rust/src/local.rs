//! In-process conductor API: calls the manager directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{
    ConductorManager, ConductorResult, DomainError, RequestContext, Value,
};

use crate::adapter::{AdapterMode, ConductorAdapter};
use crate::translate::ExceptionTranslator;

/// Behavior of the in-process adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Local;

/// Conductor API over an in-process manager.
pub type LocalApi<M> = ConductorAdapter<M, Local>;

impl<M: ConductorManager + ?Sized> ConductorAdapter<M, Local> {
    #[must_use]
    pub fn new(manager: Arc<M>) -> Self {
        Self::with_mode(manager, Local)
    }
}

#[async_trait]
impl<M> AdapterMode<M> for Local
where
    M: ConductorManager + ?Sized,
{
    fn name(&self) -> &'static str {
        "local"
    }

    /// No round trip to bound, so `timeout` is ignored.
    async fn ping(
        &self,
        manager: &ExceptionTranslator<M>,
        ctx: &RequestContext,
        arg: Value,
        _timeout: Option<Duration>,
    ) -> ConductorResult<Value> {
        manager.ping(ctx, arg).await
    }

    /// There is no separate conductor node to ask, so the request is invalid.
    async fn get_backdoor_port(
        &self,
        _manager: &ExceptionTranslator<M>,
        _ctx: &RequestContext,
        _host: &str,
    ) -> ConductorResult<Option<u16>> {
        Err(DomainError::invalid_request().into())
    }
}
