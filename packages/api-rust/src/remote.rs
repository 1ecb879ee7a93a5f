//! Remote conductor API: every manager call becomes one request/response
//! round trip on the conductor topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::messages::{decode, encode};
use conductor_core::{
    BandwidthCounters, BdmDestroyTarget, ConductorError, ConductorManager, ConductorResult,
    ManagerCall, Record, RequestContext, RpcOutcome, RpcRejection, RpcReply, RpcRequest,
    SortOrder, TransportError, Value, VolumeCounters,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::adapter::{AdapterMode, ConductorAdapter};
use crate::transport::{timeout_millis, RpcTransport};
use crate::translate::{translate, ExceptionTranslator};

// ---------------------------------------------------------------------------
// ConductorRpcClient
// ---------------------------------------------------------------------------

/// `ConductorManager` stub that forwards each call over an [`RpcTransport`].
///
/// Domain errors come back as `ConductorError::Wrapped`; wrap the client in an
/// [`ExceptionTranslator`] to get them back as domain errors.
pub struct ConductorRpcClient<T: ?Sized> {
    transport: Arc<T>,
    topic: String,
    timeout: Duration,
}

impl<T: RpcTransport + ?Sized> ConductorRpcClient<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            topic: topic.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `ping` with its own timeout instead of the configured one.
    ///
    /// # Errors
    ///
    /// Same as any other call: wrapped domain errors or transport errors.
    pub async fn ping_with_timeout(
        &self,
        ctx: &RequestContext,
        arg: Value,
        timeout: Option<Duration>,
    ) -> ConductorResult<Value> {
        self.call_within(ctx, ManagerCall::Ping { arg }, timeout.unwrap_or(self.timeout))
            .await
    }

    async fn call<R: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        call: ManagerCall,
    ) -> ConductorResult<R> {
        self.call_within(ctx, call, self.timeout).await
    }

    async fn call_within<R: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        call: ManagerCall,
        timeout: Duration,
    ) -> ConductorResult<R> {
        let method = call.method();
        let timeout_ms = timeout_millis(timeout);
        let request = RpcRequest::new(ctx.clone(), call, timeout_ms);
        let msg_id = request.msg_id.clone();
        debug!(topic = %self.topic, method, msg_id = %msg_id, version = %request.version, "sending conductor call");

        let bytes = encode(&request)?;
        let reply_bytes = self.transport.call(&self.topic, bytes, timeout).await?;
        let reply: RpcReply = decode(&reply_bytes)?;

        if !reply.msg_id.is_empty() && reply.msg_id != msg_id {
            return Err(TransportError::Decode(format!(
                "reply {} does not answer request {msg_id}",
                reply.msg_id
            ))
            .into());
        }

        match reply.outcome {
            RpcOutcome::Success(result) => Ok(decode(&result)?),
            RpcOutcome::Failure(wrapped) => Err(ConductorError::Wrapped(wrapped)),
            RpcOutcome::Rejected(RpcRejection::DeadlineExceeded { .. }) => {
                warn!(
                    topic = %self.topic,
                    method,
                    msg_id = %msg_id,
                    timeout_ms,
                    "conductor gave up before replying"
                );
                Err(TransportError::Timeout {
                    topic: self.topic.clone(),
                    timeout_ms,
                }
                .into())
            }
            RpcOutcome::Rejected(rejection) => {
                warn!(topic = %self.topic, method, msg_id = %msg_id, reason = %rejection, "conductor call rejected");
                Err(TransportError::Rejected(rejection).into())
            }
        }
    }
}

#[async_trait]
impl<T> ConductorManager for ConductorRpcClient<T>
where
    T: RpcTransport + ?Sized,
{
    async fn ping(&self, ctx: &RequestContext, arg: Value) -> ConductorResult<Value> {
        self.call(ctx, ManagerCall::Ping { arg }).await
    }

    async fn instance_update(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
        updates: Record,
    ) -> ConductorResult<Record> {
        let call = ManagerCall::InstanceUpdate {
            instance_uuid: instance_uuid.to_string(),
            updates,
        };
        self.call(ctx, call).await
    }

    async fn instance_get(&self, ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::InstanceGet { instance_id }).await
    }

    async fn instance_get_by_uuid(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record> {
        let call = ManagerCall::InstanceGetByUuid {
            instance_uuid: instance_uuid.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn instance_destroy(&self, ctx: &RequestContext, instance: Record) -> ConductorResult<()> {
        self.call(ctx, ManagerCall::InstanceDestroy { instance }).await
    }

    async fn instance_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::InstanceGetAll).await
    }

    async fn instance_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        let call = ManagerCall::InstanceGetAllByHost {
            host: host.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn instance_get_all_by_filters(
        &self,
        ctx: &RequestContext,
        filters: Record,
        sort: SortOrder,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::InstanceGetAllByFilters { filters, sort })
            .await
    }

    async fn instance_get_all_hung_in_rebooting(
        &self,
        ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::InstanceGetAllHungInRebooting { timeout_secs })
            .await
    }

    async fn instance_get_active_by_window(
        &self,
        ctx: &RequestContext,
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        let call = ManagerCall::InstanceGetActiveByWindow {
            begin_ms,
            end_ms,
            project_id,
            host,
        };
        self.call(ctx, call).await
    }

    async fn instance_info_cache_delete(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()> {
        self.call(ctx, ManagerCall::InstanceInfoCacheDelete { instance })
            .await
    }

    async fn instance_type_get(
        &self,
        ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::InstanceTypeGet { instance_type_id })
            .await
    }

    async fn migration_get(&self, ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::MigrationGet { migration_id }).await
    }

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>> {
        let call = ManagerCall::MigrationGetUnconfirmedByDestCompute {
            confirm_window_secs,
            dest_compute: dest_compute.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn migration_update(
        &self,
        ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record> {
        let call = ManagerCall::MigrationUpdate {
            migration,
            status: status.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn aggregate_host_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record> {
        let call = ManagerCall::AggregateHostAdd {
            aggregate,
            host: host.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn aggregate_host_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()> {
        let call = ManagerCall::AggregateHostDelete {
            aggregate,
            host: host.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn aggregate_get(&self, ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::AggregateGet { aggregate_id }).await
    }

    async fn aggregate_get_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        let call = ManagerCall::AggregateGetByHost {
            host: host.to_string(),
            key,
        };
        self.call(ctx, call).await
    }

    async fn aggregate_metadata_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record> {
        let call = ManagerCall::AggregateMetadataAdd {
            aggregate,
            metadata,
            set_delete,
        };
        self.call(ctx, call).await
    }

    async fn aggregate_metadata_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()> {
        let call = ManagerCall::AggregateMetadataDelete {
            aggregate,
            key: key.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn bw_usage_update(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        mac: &str,
        start_period: i64,
        counters: Option<BandwidthCounters>,
        last_refreshed: Option<i64>,
    ) -> ConductorResult<Option<Record>> {
        let call = ManagerCall::BwUsageUpdate {
            uuid: uuid.to_string(),
            mac: mac.to_string(),
            start_period,
            counters,
            last_refreshed,
        };
        self.call(ctx, call).await
    }

    async fn get_backdoor_port(&self, ctx: &RequestContext) -> ConductorResult<Option<u16>> {
        self.call(ctx, ManagerCall::GetBackdoorPort).await
    }

    async fn security_group_get_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::SecurityGroupGetByInstance { instance })
            .await
    }

    async fn security_group_rule_get_by_security_group(
        &self,
        ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::SecurityGroupRuleGetBySecurityGroup { secgroup })
            .await
    }

    async fn provider_fw_rule_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::ProviderFwRuleGetAll).await
    }

    async fn agent_build_get_by_triple(
        &self,
        ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>> {
        let call = ManagerCall::AgentBuildGetByTriple {
            hypervisor: hypervisor.to_string(),
            os: os.to_string(),
            architecture: architecture.to_string(),
        };
        self.call(ctx, call).await
    }

    async fn block_device_mapping_update_or_create(
        &self,
        ctx: &RequestContext,
        values: Record,
        create: Option<bool>,
    ) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::BlockDeviceMappingUpdateOrCreate { values, create })
            .await
    }

    async fn block_device_mapping_get_all_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::BlockDeviceMappingGetAllByInstance { instance })
            .await
    }

    async fn block_device_mapping_destroy(
        &self,
        ctx: &RequestContext,
        target: BdmDestroyTarget,
    ) -> ConductorResult<()> {
        self.call(ctx, ManagerCall::BlockDeviceMappingDestroy { target })
            .await
    }

    async fn vol_get_usage_by_time(
        &self,
        ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::VolGetUsageByTime { start_time }).await
    }

    async fn vol_usage_update(
        &self,
        ctx: &RequestContext,
        vol_id: &str,
        counters: VolumeCounters,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool,
    ) -> ConductorResult<()> {
        let call = ManagerCall::VolUsageUpdate {
            vol_id: vol_id.to_string(),
            counters,
            instance,
            last_refreshed,
            update_totals,
        };
        self.call(ctx, call).await
    }

    async fn service_get_all_by(
        &self,
        ctx: &RequestContext,
        topic: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        self.call(ctx, ManagerCall::ServiceGetAllBy { topic, host }).await
    }

    async fn action_event_start(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::ActionEventStart { values }).await
    }

    async fn action_event_finish(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.call(ctx, ManagerCall::ActionEventFinish { values }).await
    }
}

// ---------------------------------------------------------------------------
// RemoteApi
// ---------------------------------------------------------------------------

/// Behavior of the remote adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Remote;

/// Conductor API over a conductor reached through `T`.
pub type RemoteApi<T> = ConductorAdapter<ConductorRpcClient<T>, Remote>;

impl<T: RpcTransport + ?Sized> ConductorAdapter<ConductorRpcClient<T>, Remote> {
    #[must_use]
    pub fn new(transport: Arc<T>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self::with_mode(Arc::new(ConductorRpcClient::new(transport, topic, timeout)), Remote)
    }
}

#[async_trait]
impl<T> AdapterMode<ConductorRpcClient<T>> for Remote
where
    T: RpcTransport + ?Sized,
{
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn ping(
        &self,
        manager: &ExceptionTranslator<ConductorRpcClient<T>>,
        ctx: &RequestContext,
        arg: Value,
        timeout: Option<Duration>,
    ) -> ConductorResult<Value> {
        translate(manager.inner().ping_with_timeout(ctx, arg, timeout).await)
    }

    async fn get_backdoor_port(
        &self,
        manager: &ExceptionTranslator<ConductorRpcClient<T>>,
        ctx: &RequestContext,
        _host: &str,
    ) -> ConductorResult<Option<u16>> {
        // NOTE: the request goes to the configured topic, not to `host`, so the
        // port returned is that of whichever conductor consumes the call.
        manager.get_backdoor_port(ctx).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
