//! Exception translator: a `ConductorManager` decorator that unwraps domain
//! errors carried in their transport envelope.
//!
//! Every manager method is forwarded unchanged. When the inner manager returns
//! `ConductorError::Wrapped`, the original domain error (type, message and
//! stack) is rebuilt and returned instead. Any other outcome passes through.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{
    BandwidthCounters, BdmDestroyTarget, ConductorError, ConductorManager, ConductorResult,
    Record, RequestContext, SortOrder, Value, VolumeCounters,
};

/// Replace a wrapped domain error with the domain error it carries.
///
/// # Errors
///
/// Returns the input error, unwrapped if it was `ConductorError::Wrapped`.
pub fn translate<T>(result: ConductorResult<T>) -> ConductorResult<T> {
    result.map_err(|err| match err {
        ConductorError::Wrapped(wrapped) => ConductorError::Domain(wrapped.into_domain()),
        other => other,
    })
}

/// Decorates any [`ConductorManager`] with [`translate`].
pub struct ExceptionTranslator<M: ?Sized> {
    inner: Arc<M>,
}

impl<M: ?Sized> ExceptionTranslator<M> {
    #[must_use]
    pub fn new(inner: Arc<M>) -> Self {
        Self { inner }
    }

    /// The decorated manager.
    #[must_use]
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: ?Sized> Clone for ExceptionTranslator<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Generate the forwarding `ConductorManager` impl for `ExceptionTranslator`.
macro_rules! translated_manager {
    (
        $( fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty; )*
    ) => {
        #[async_trait]
        impl<M> ConductorManager for ExceptionTranslator<M>
        where
            M: ConductorManager + ?Sized,
        {
            $(
                async fn $name(&self, ctx: &RequestContext $(, $arg: $ty)*) -> ConductorResult<$ret> {
                    translate(self.inner.$name(ctx $(, $arg)*).await)
                }
            )*
        }
    };
}

translated_manager! {
    fn ping(arg: Value) -> Value;
    fn instance_update(instance_uuid: &str, updates: Record) -> Record;
    fn instance_get(instance_id: i64) -> Record;
    fn instance_get_by_uuid(instance_uuid: &str) -> Record;
    fn instance_destroy(instance: Record) -> ();
    fn instance_get_all() -> Vec<Record>;
    fn instance_get_all_by_host(host: &str) -> Vec<Record>;
    fn instance_get_all_by_filters(filters: Record, sort: SortOrder) -> Vec<Record>;
    fn instance_get_all_hung_in_rebooting(timeout_secs: u64) -> Vec<Record>;
    fn instance_get_active_by_window(
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>
    ) -> Vec<Record>;
    fn instance_info_cache_delete(instance: Record) -> ();
    fn instance_type_get(instance_type_id: i64) -> Record;
    fn migration_get(migration_id: i64) -> Record;
    fn migration_get_unconfirmed_by_dest_compute(
        confirm_window_secs: u64,
        dest_compute: &str
    ) -> Vec<Record>;
    fn migration_update(migration: Record, status: &str) -> Record;
    fn aggregate_host_add(aggregate: Record, host: &str) -> Record;
    fn aggregate_host_delete(aggregate: Record, host: &str) -> ();
    fn aggregate_get(aggregate_id: i64) -> Record;
    fn aggregate_get_by_host(host: &str, key: Option<String>) -> Vec<Record>;
    fn aggregate_metadata_add(aggregate: Record, metadata: Record, set_delete: bool) -> Record;
    fn aggregate_metadata_delete(aggregate: Record, key: &str) -> ();
    fn bw_usage_update(
        uuid: &str,
        mac: &str,
        start_period: i64,
        counters: Option<BandwidthCounters>,
        last_refreshed: Option<i64>
    ) -> Option<Record>;
    fn get_backdoor_port() -> Option<u16>;
    fn security_group_get_by_instance(instance: Record) -> Vec<Record>;
    fn security_group_rule_get_by_security_group(secgroup: Record) -> Vec<Record>;
    fn provider_fw_rule_get_all() -> Vec<Record>;
    fn agent_build_get_by_triple(hypervisor: &str, os: &str, architecture: &str) -> Option<Record>;
    fn block_device_mapping_update_or_create(values: Record, create: Option<bool>) -> Record;
    fn block_device_mapping_get_all_by_instance(instance: Record) -> Vec<Record>;
    fn block_device_mapping_destroy(target: BdmDestroyTarget) -> ();
    fn vol_get_usage_by_time(start_time: i64) -> Vec<Record>;
    fn vol_usage_update(
        vol_id: &str,
        counters: VolumeCounters,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool
    ) -> ();
    fn service_get_all_by(topic: Option<String>, host: Option<String>) -> Vec<Record>;
    fn action_event_start(values: Record) -> Record;
    fn action_event_finish(values: Record) -> Record;
}

#[cfg(test)]
mod tests {
    use conductor_core::{DomainError, ErrorKind, TransportError, WrappedError};

    use super::*;
    use crate::testing::{Failure, RecordingManager};

    #[test]
    fn translate_unwraps_wrapped_errors() {
        let wrapped = DomainError::migration_not_found(7)
            .with_frame("conductor-0:migration_get")
            .into_wrapped();
        let err = translate::<()>(Err(ConductorError::Wrapped(wrapped))).unwrap_err();
        let ConductorError::Domain(domain) = err else {
            panic!("expected a domain error, got {err:?}");
        };
        assert_eq!(domain.kind(), ErrorKind::MigrationNotFound);
        assert_eq!(domain.message(), "Migration 7 could not be found.");
        assert_eq!(domain.stack(), ["conductor-0:migration_get"]);
    }

    #[test]
    fn translate_leaves_other_outcomes_alone() {
        assert_eq!(translate(Ok::<_, ConductorError>(5)).unwrap(), 5);

        let domain = DomainError::invalid_request();
        let err = translate::<()>(Err(domain.clone().into())).unwrap_err();
        assert!(matches!(err, ConductorError::Domain(e) if e == domain));

        let timeout = TransportError::Timeout {
            topic: "conductor".to_string(),
            timeout_ms: 10,
        };
        let err = translate::<()>(Err(timeout.clone().into())).unwrap_err();
        assert!(matches!(err, ConductorError::Transport(e) if e == timeout));
    }

    #[test]
    fn unknown_wrapped_type_becomes_unknown_kind() {
        let wrapped = WrappedError {
            original_type: "QuotaExceeded".to_string(),
            original_message: "Quota exceeded.".to_string(),
            original_stack: Vec::new(),
        };
        let err = translate::<()>(Err(ConductorError::Wrapped(wrapped))).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unknown));
        assert_eq!(err.to_string(), "Quota exceeded.");
    }

    #[tokio::test]
    async fn decorator_translates_every_call() {
        let manager = Arc::new(RecordingManager::failing(Failure::Wrapped(
            DomainError::aggregate_not_found(3).into_wrapped(),
        )));
        let translator = ExceptionTranslator::new(Arc::clone(&manager));
        let ctx = RequestContext::admin();

        let err = translator.aggregate_get(&ctx, 3).await.unwrap_err();
        assert!(matches!(err, ConductorError::Domain(ref e) if e.kind() == ErrorKind::AggregateNotFound));

        let err = translator.instance_get_all(&ctx).await.unwrap_err();
        assert!(matches!(err, ConductorError::Domain(_)));
        assert_eq!(manager.calls().len(), 2);
    }

    #[tokio::test]
    async fn decorator_passes_results_through() {
        let manager = Arc::new(RecordingManager::new());
        let translator = ExceptionTranslator::new(Arc::clone(&manager));
        let ctx = RequestContext::admin();

        let pong = translator.ping(&ctx, Value::from("hello")).await.unwrap();
        assert_eq!(pong, Value::from("hello"));
        assert_eq!(manager.calls()[0].method(), "ping");
    }
}
