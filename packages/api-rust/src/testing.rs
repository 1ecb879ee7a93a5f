//! Test doubles shared by the adapter, endpoint and factory tests.

use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{
    BandwidthCounters, BdmDestroyTarget, ConductorError, ConductorManager, ConductorResult,
    DomainError, ManagerCall, Record, RequestContext, SortOrder, TransportError, Value,
    VolumeCounters, WrappedError,
};
use parking_lot::Mutex;

/// Error a [`RecordingManager`] answers every call with.
#[derive(Debug, Clone)]
pub enum Failure {
    Domain(DomainError),
    Wrapped(WrappedError),
    Transport(TransportError),
}

impl Failure {
    fn to_error(&self) -> ConductorError {
        match self {
            Failure::Domain(e) => ConductorError::Domain(e.clone()),
            Failure::Wrapped(w) => ConductorError::Wrapped(w.clone()),
            Failure::Transport(e) => ConductorError::Transport(e.clone()),
        }
    }
}

/// Manager that records each call as a [`ManagerCall`] and answers with empty
/// results (`ping` echoes its argument), or with a fixed failure.
#[derive(Default)]
pub struct RecordingManager {
    calls: Mutex<Vec<ManagerCall>>,
    failure: Option<Failure>,
    delay: Option<Duration>,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failure: Failure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Sleep this long before answering each call.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().clone()
    }

    async fn answer<T: Default>(&self, call: ManagerCall) -> ConductorResult<T> {
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl ConductorManager for RecordingManager {
    async fn ping(&self, _ctx: &RequestContext, arg: Value) -> ConductorResult<Value> {
        self.answer::<()>(ManagerCall::Ping { arg: arg.clone() })
            .await?;
        Ok(arg)
    }

    async fn instance_update(
        &self,
        _ctx: &RequestContext,
        instance_uuid: &str,
        updates: Record,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::InstanceUpdate {
            instance_uuid: instance_uuid.to_string(),
            updates,
        })
        .await
    }

    async fn instance_get(&self, _ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record> {
        self.answer(ManagerCall::InstanceGet { instance_id }).await
    }

    async fn instance_get_by_uuid(
        &self,
        _ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::InstanceGetByUuid {
            instance_uuid: instance_uuid.to_string(),
        })
        .await
    }

    async fn instance_destroy(&self, _ctx: &RequestContext, instance: Record) -> ConductorResult<()> {
        self.answer(ManagerCall::InstanceDestroy { instance }).await
    }

    async fn instance_get_all(&self, _ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::InstanceGetAll).await
    }

    async fn instance_get_all_by_host(
        &self,
        _ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::InstanceGetAllByHost {
            host: host.to_string(),
        })
        .await
    }

    async fn instance_get_all_by_filters(
        &self,
        _ctx: &RequestContext,
        filters: Record,
        sort: SortOrder,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::InstanceGetAllByFilters { filters, sort })
            .await
    }

    async fn instance_get_all_hung_in_rebooting(
        &self,
        _ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::InstanceGetAllHungInRebooting { timeout_secs })
            .await
    }

    async fn instance_get_active_by_window(
        &self,
        _ctx: &RequestContext,
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::InstanceGetActiveByWindow {
            begin_ms,
            end_ms,
            project_id,
            host,
        })
        .await
    }

    async fn instance_info_cache_delete(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()> {
        self.answer(ManagerCall::InstanceInfoCacheDelete { instance })
            .await
    }

    async fn instance_type_get(
        &self,
        _ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::InstanceTypeGet { instance_type_id })
            .await
    }

    async fn migration_get(&self, _ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record> {
        self.answer(ManagerCall::MigrationGet { migration_id }).await
    }

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        _ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::MigrationGetUnconfirmedByDestCompute {
            confirm_window_secs,
            dest_compute: dest_compute.to_string(),
        })
        .await
    }

    async fn migration_update(
        &self,
        _ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::MigrationUpdate {
            migration,
            status: status.to_string(),
        })
        .await
    }

    async fn aggregate_host_add(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::AggregateHostAdd {
            aggregate,
            host: host.to_string(),
        })
        .await
    }

    async fn aggregate_host_delete(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()> {
        self.answer(ManagerCall::AggregateHostDelete {
            aggregate,
            host: host.to_string(),
        })
        .await
    }

    async fn aggregate_get(&self, _ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record> {
        self.answer(ManagerCall::AggregateGet { aggregate_id }).await
    }

    async fn aggregate_get_by_host(
        &self,
        _ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::AggregateGetByHost {
            host: host.to_string(),
            key,
        })
        .await
    }

    async fn aggregate_metadata_add(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::AggregateMetadataAdd {
            aggregate,
            metadata,
            set_delete,
        })
        .await
    }

    async fn aggregate_metadata_delete(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()> {
        self.answer(ManagerCall::AggregateMetadataDelete {
            aggregate,
            key: key.to_string(),
        })
        .await
    }

    async fn bw_usage_update(
        &self,
        _ctx: &RequestContext,
        uuid: &str,
        mac: &str,
        start_period: i64,
        counters: Option<BandwidthCounters>,
        last_refreshed: Option<i64>,
    ) -> ConductorResult<Option<Record>> {
        self.answer(ManagerCall::BwUsageUpdate {
            uuid: uuid.to_string(),
            mac: mac.to_string(),
            start_period,
            counters,
            last_refreshed,
        })
        .await
    }

    async fn get_backdoor_port(&self, _ctx: &RequestContext) -> ConductorResult<Option<u16>> {
        self.answer(ManagerCall::GetBackdoorPort).await
    }

    async fn security_group_get_by_instance(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::SecurityGroupGetByInstance { instance })
            .await
    }

    async fn security_group_rule_get_by_security_group(
        &self,
        _ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::SecurityGroupRuleGetBySecurityGroup { secgroup })
            .await
    }

    async fn provider_fw_rule_get_all(&self, _ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::ProviderFwRuleGetAll).await
    }

    async fn agent_build_get_by_triple(
        &self,
        _ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>> {
        self.answer(ManagerCall::AgentBuildGetByTriple {
            hypervisor: hypervisor.to_string(),
            os: os.to_string(),
            architecture: architecture.to_string(),
        })
        .await
    }

    async fn block_device_mapping_update_or_create(
        &self,
        _ctx: &RequestContext,
        values: Record,
        create: Option<bool>,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::BlockDeviceMappingUpdateOrCreate { values, create })
            .await
    }

    async fn block_device_mapping_get_all_by_instance(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::BlockDeviceMappingGetAllByInstance { instance })
            .await
    }

    async fn block_device_mapping_destroy(
        &self,
        _ctx: &RequestContext,
        target: BdmDestroyTarget,
    ) -> ConductorResult<()> {
        self.answer(ManagerCall::BlockDeviceMappingDestroy { target })
            .await
    }

    async fn vol_get_usage_by_time(
        &self,
        _ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::VolGetUsageByTime { start_time }).await
    }

    async fn vol_usage_update(
        &self,
        _ctx: &RequestContext,
        vol_id: &str,
        counters: VolumeCounters,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool,
    ) -> ConductorResult<()> {
        self.answer(ManagerCall::VolUsageUpdate {
            vol_id: vol_id.to_string(),
            counters,
            instance,
            last_refreshed,
            update_totals,
        })
        .await
    }

    async fn service_get_all_by(
        &self,
        _ctx: &RequestContext,
        topic: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        self.answer(ManagerCall::ServiceGetAllBy { topic, host }).await
    }

    async fn action_event_start(
        &self,
        _ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::ActionEventStart { values }).await
    }

    async fn action_event_finish(
        &self,
        _ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.answer(ManagerCall::ActionEventFinish { values }).await
    }
}
