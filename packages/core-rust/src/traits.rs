use std::time::Duration;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::ConductorError;
use crate::types::{BandwidthCounters, BdmDestroyTarget, Record, SortOrder, Value, VolumeCounters};

/// Result alias for conductor operations.
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Manager-native operation set.
///
/// Implemented by the in-process manager, by the RPC client stub that forwards
/// each call over the message bus, and by `ExceptionTranslator`, which wraps
/// either of them. Argument shapes are the manager's, not the caller's: see
/// [`ConductorApi`] for the public shape.
#[async_trait]
#[allow(clippy::too_many_arguments)]
pub trait ConductorManager: Send + Sync {
    async fn ping(&self, ctx: &RequestContext, arg: Value) -> ConductorResult<Value>;

    async fn instance_update(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
        updates: Record,
    ) -> ConductorResult<Record>;

    async fn instance_get(&self, ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record>;

    async fn instance_get_by_uuid(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record>;

    async fn instance_destroy(&self, ctx: &RequestContext, instance: Record) -> ConductorResult<()>;

    async fn instance_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>>;

    async fn instance_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn instance_get_all_by_filters(
        &self,
        ctx: &RequestContext,
        filters: Record,
        sort: SortOrder,
    ) -> ConductorResult<Vec<Record>>;

    /// Instances stuck in `rebooting` for longer than `timeout_secs`.
    async fn instance_get_all_hung_in_rebooting(
        &self,
        ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>>;

    /// Instances active at any point in `[begin_ms, end_ms)`.
    async fn instance_get_active_by_window(
        &self,
        ctx: &RequestContext,
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>>;

    async fn instance_info_cache_delete(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()>;

    async fn instance_type_get(
        &self,
        ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record>;

    async fn migration_get(&self, ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record>;

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn migration_update(
        &self,
        ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record>;

    async fn aggregate_host_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record>;

    async fn aggregate_host_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()>;

    async fn aggregate_get(&self, ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record>;

    async fn aggregate_get_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>>;

    async fn aggregate_metadata_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record>;

    async fn aggregate_metadata_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()>;

    /// Upsert bandwidth counters when given, then return the current row.
    async fn bw_usage_update(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        mac: &str,
        start_period: i64,
        counters: Option<BandwidthCounters>,
        last_refreshed: Option<i64>,
    ) -> ConductorResult<Option<Record>>;

    async fn get_backdoor_port(&self, ctx: &RequestContext) -> ConductorResult<Option<u16>>;

    async fn security_group_get_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn security_group_rule_get_by_security_group(
        &self,
        ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn provider_fw_rule_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>>;

    async fn agent_build_get_by_triple(
        &self,
        ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>>;

    /// `create`: `Some(true)` inserts, `Some(false)` updates by `id`, `None`
    /// updates the mapping for the same instance and device or inserts one.
    async fn block_device_mapping_update_or_create(
        &self,
        ctx: &RequestContext,
        values: Record,
        create: Option<bool>,
    ) -> ConductorResult<Record>;

    async fn block_device_mapping_get_all_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn block_device_mapping_destroy(
        &self,
        ctx: &RequestContext,
        target: BdmDestroyTarget,
    ) -> ConductorResult<()>;

    async fn vol_get_usage_by_time(
        &self,
        ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>>;

    async fn vol_usage_update(
        &self,
        ctx: &RequestContext,
        vol_id: &str,
        counters: VolumeCounters,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool,
    ) -> ConductorResult<()>;

    /// Services filtered by topic and/or host; both `None` lists every service.
    async fn service_get_all_by(
        &self,
        ctx: &RequestContext,
        topic: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>>;

    async fn action_event_start(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;

    async fn action_event_finish(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;
}

/// Public conductor operation set.
///
/// Implemented by `LocalApi` and `RemoteApi`; callers bind to this trait and
/// cannot tell which one is behind it. Domain errors surface with the same
/// kind and message from either implementation.
#[async_trait]
#[allow(clippy::too_many_arguments)]
pub trait ConductorApi: Send + Sync {
    /// Round-trip check. `timeout` bounds the remote call; local calls ignore it.
    async fn ping(
        &self,
        ctx: &RequestContext,
        arg: Value,
        timeout: Option<Duration>,
    ) -> ConductorResult<Value>;

    /// Perform an instance update. `updates` are loose `(field, value)` pairs.
    async fn instance_update(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
        updates: Vec<(String, Value)>,
    ) -> ConductorResult<Record>;

    async fn instance_get(&self, ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record>;

    async fn instance_get_by_uuid(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record>;

    async fn instance_destroy(&self, ctx: &RequestContext, instance: Record) -> ConductorResult<()>;

    async fn instance_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>>;

    async fn instance_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>>;

    /// `sort` of `None` means `created_at`, descending.
    async fn instance_get_all_by_filters(
        &self,
        ctx: &RequestContext,
        filters: Record,
        sort: Option<SortOrder>,
    ) -> ConductorResult<Vec<Record>>;

    async fn instance_get_all_hung_in_rebooting(
        &self,
        ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>>;

    async fn instance_get_active_by_window(
        &self,
        ctx: &RequestContext,
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>>;

    async fn instance_info_cache_delete(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()>;

    async fn instance_type_get(
        &self,
        ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record>;

    async fn migration_get(&self, ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record>;

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn migration_update(
        &self,
        ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record>;

    async fn aggregate_host_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record>;

    async fn aggregate_host_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()>;

    async fn aggregate_get(&self, ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record>;

    async fn aggregate_get_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>>;

    async fn aggregate_metadata_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record>;

    async fn aggregate_metadata_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()>;

    async fn bw_usage_get(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        start_period: i64,
        mac: &str,
    ) -> ConductorResult<Option<Record>>;

    async fn bw_usage_update(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        mac: &str,
        start_period: i64,
        bw_in: i64,
        bw_out: i64,
        last_ctr_in: i64,
        last_ctr_out: i64,
        last_refreshed: Option<i64>,
    ) -> ConductorResult<Option<Record>>;

    /// Backdoor port of a conductor node.
    async fn get_backdoor_port(&self, ctx: &RequestContext, host: &str)
        -> ConductorResult<Option<u16>>;

    async fn security_group_get_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn security_group_rule_get_by_security_group(
        &self,
        ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn provider_fw_rule_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>>;

    async fn agent_build_get_by_triple(
        &self,
        ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>>;

    async fn block_device_mapping_create(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;

    async fn block_device_mapping_update(
        &self,
        ctx: &RequestContext,
        bdm_id: i64,
        values: Record,
    ) -> ConductorResult<Record>;

    async fn block_device_mapping_update_or_create(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;

    async fn block_device_mapping_get_all_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>>;

    async fn block_device_mapping_destroy(
        &self,
        ctx: &RequestContext,
        bdms: Vec<Record>,
    ) -> ConductorResult<()>;

    async fn block_device_mapping_destroy_by_instance_and_device(
        &self,
        ctx: &RequestContext,
        instance: Record,
        device_name: &str,
    ) -> ConductorResult<()>;

    async fn block_device_mapping_destroy_by_instance_and_volume(
        &self,
        ctx: &RequestContext,
        instance: Record,
        volume_id: &str,
    ) -> ConductorResult<()>;

    async fn vol_get_usage_by_time(
        &self,
        ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>>;

    async fn vol_usage_update(
        &self,
        ctx: &RequestContext,
        vol_id: &str,
        rd_req: i64,
        rd_bytes: i64,
        wr_req: i64,
        wr_bytes: i64,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool,
    ) -> ConductorResult<()>;

    async fn service_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>>;

    async fn service_get_all_by_topic(
        &self,
        ctx: &RequestContext,
        topic: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn service_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn service_get_by_host_and_topic(
        &self,
        ctx: &RequestContext,
        host: &str,
        topic: &str,
    ) -> ConductorResult<Option<Record>>;

    async fn service_get_all_compute_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>>;

    async fn action_event_start(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;

    async fn action_event_finish(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record>;
}
