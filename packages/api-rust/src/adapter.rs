//! The public conductor API over a manager.
//!
//! [`ConductorAdapter`] reshapes each public call into the manager-native call
//! and sends it through an [`ExceptionTranslator`]. The only operations whose
//! behavior depends on where the manager lives (`ping` and
//! `get_backdoor_port`) are delegated to an [`AdapterMode`]; see
//! [`LocalApi`](crate::LocalApi) and [`RemoteApi`](crate::RemoteApi).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{
    BandwidthCounters, BdmDestroyTarget, ConductorApi, ConductorManager, ConductorResult, Record,
    RequestContext, SortOrder, Value, VolumeCounters,
};

use crate::translate::ExceptionTranslator;

/// Topic compute services register under.
pub const COMPUTE_TOPIC: &str = "compute";

/// Operations whose behavior differs between in-process and remote managers.
#[async_trait]
pub trait AdapterMode<M: ?Sized>: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn ping(
        &self,
        manager: &ExceptionTranslator<M>,
        ctx: &RequestContext,
        arg: Value,
        timeout: Option<Duration>,
    ) -> ConductorResult<Value>;

    async fn get_backdoor_port(
        &self,
        manager: &ExceptionTranslator<M>,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Option<u16>>;
}

/// A [`ConductorApi`] implementation over a translated manager.
pub struct ConductorAdapter<M: ?Sized, P> {
    manager: ExceptionTranslator<M>,
    mode: P,
}

impl<M: ?Sized, P> ConductorAdapter<M, P> {
    pub(crate) fn with_mode(manager: Arc<M>, mode: P) -> Self {
        Self {
            manager: ExceptionTranslator::new(manager),
            mode,
        }
    }

    /// The translated manager every call goes through.
    #[must_use]
    pub fn manager(&self) -> &ExceptionTranslator<M> {
        &self.manager
    }

    /// `"local"` or `"remote"`.
    #[must_use]
    pub fn mode_name(&self) -> &'static str
    where
        P: AdapterMode<M>,
    {
        self.mode.name()
    }
}

/// Fold loose `(field, value)` pairs into a record. Later duplicates win.
fn pack_updates(updates: Vec<(String, Value)>) -> Record {
    updates.into_iter().collect()
}

#[async_trait]
impl<M, P> ConductorApi for ConductorAdapter<M, P>
where
    M: ConductorManager + ?Sized,
    P: AdapterMode<M>,
{
    async fn ping(
        &self,
        ctx: &RequestContext,
        arg: Value,
        timeout: Option<Duration>,
    ) -> ConductorResult<Value> {
        self.mode.ping(&self.manager, ctx, arg, timeout).await
    }

    async fn instance_update(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
        updates: Vec<(String, Value)>,
    ) -> ConductorResult<Record> {
        self.manager
            .instance_update(ctx, instance_uuid, pack_updates(updates))
            .await
    }

    async fn instance_get(&self, ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record> {
        self.manager.instance_get(ctx, instance_id).await
    }

    async fn instance_get_by_uuid(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record> {
        self.manager.instance_get_by_uuid(ctx, instance_uuid).await
    }

    async fn instance_destroy(&self, ctx: &RequestContext, instance: Record) -> ConductorResult<()> {
        self.manager.instance_destroy(ctx, instance).await
    }

    async fn instance_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.manager.instance_get_all(ctx).await
    }

    async fn instance_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.manager.instance_get_all_by_host(ctx, host).await
    }

    async fn instance_get_all_by_filters(
        &self,
        ctx: &RequestContext,
        filters: Record,
        sort: Option<SortOrder>,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .instance_get_all_by_filters(ctx, filters, sort.unwrap_or_default())
            .await
    }

    async fn instance_get_all_hung_in_rebooting(
        &self,
        ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .instance_get_all_hung_in_rebooting(ctx, timeout_secs)
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
        self.manager
            .instance_get_active_by_window(ctx, begin_ms, end_ms, project_id, host)
            .await
    }

    async fn instance_info_cache_delete(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()> {
        self.manager.instance_info_cache_delete(ctx, instance).await
    }

    async fn instance_type_get(
        &self,
        ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record> {
        self.manager.instance_type_get(ctx, instance_type_id).await
    }

    async fn migration_get(&self, ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record> {
        self.manager.migration_get(ctx, migration_id).await
    }

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .migration_get_unconfirmed_by_dest_compute(ctx, confirm_window_secs, dest_compute)
            .await
    }

    async fn migration_update(
        &self,
        ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record> {
        self.manager.migration_update(ctx, migration, status).await
    }

    async fn aggregate_host_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record> {
        self.manager.aggregate_host_add(ctx, aggregate, host).await
    }

    async fn aggregate_host_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()> {
        self.manager.aggregate_host_delete(ctx, aggregate, host).await
    }

    async fn aggregate_get(&self, ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record> {
        self.manager.aggregate_get(ctx, aggregate_id).await
    }

    async fn aggregate_get_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        self.manager.aggregate_get_by_host(ctx, host, key).await
    }

    async fn aggregate_metadata_add(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record> {
        self.manager
            .aggregate_metadata_add(ctx, aggregate, metadata, set_delete)
            .await
    }

    async fn aggregate_metadata_delete(
        &self,
        ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()> {
        self.manager.aggregate_metadata_delete(ctx, aggregate, key).await
    }

    async fn bw_usage_get(
        &self,
        ctx: &RequestContext,
        uuid: &str,
        start_period: i64,
        mac: &str,
    ) -> ConductorResult<Option<Record>> {
        self.manager
            .bw_usage_update(ctx, uuid, mac, start_period, None, None)
            .await
    }

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
    ) -> ConductorResult<Option<Record>> {
        let counters = BandwidthCounters {
            bw_in,
            bw_out,
            last_ctr_in,
            last_ctr_out,
        };
        self.manager
            .bw_usage_update(ctx, uuid, mac, start_period, Some(counters), last_refreshed)
            .await
    }

    async fn get_backdoor_port(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Option<u16>> {
        self.mode.get_backdoor_port(&self.manager, ctx, host).await
    }

    async fn security_group_get_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.manager.security_group_get_by_instance(ctx, instance).await
    }

    async fn security_group_rule_get_by_security_group(
        &self,
        ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .security_group_rule_get_by_security_group(ctx, secgroup)
            .await
    }

    async fn provider_fw_rule_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.manager.provider_fw_rule_get_all(ctx).await
    }

    async fn agent_build_get_by_triple(
        &self,
        ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>> {
        self.manager
            .agent_build_get_by_triple(ctx, hypervisor, os, architecture)
            .await
    }

    async fn block_device_mapping_create(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.manager
            .block_device_mapping_update_or_create(ctx, values, Some(true))
            .await
    }

    async fn block_device_mapping_update(
        &self,
        ctx: &RequestContext,
        bdm_id: i64,
        values: Record,
    ) -> ConductorResult<Record> {
        let mut values = values;
        values.insert("id".to_string(), Value::Int(bdm_id));
        self.manager
            .block_device_mapping_update_or_create(ctx, values, Some(false))
            .await
    }

    async fn block_device_mapping_update_or_create(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.manager
            .block_device_mapping_update_or_create(ctx, values, None)
            .await
    }

    async fn block_device_mapping_get_all_by_instance(
        &self,
        ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .block_device_mapping_get_all_by_instance(ctx, instance)
            .await
    }

    async fn block_device_mapping_destroy(
        &self,
        ctx: &RequestContext,
        bdms: Vec<Record>,
    ) -> ConductorResult<()> {
        self.manager
            .block_device_mapping_destroy(ctx, BdmDestroyTarget::Mappings { bdms })
            .await
    }

    async fn block_device_mapping_destroy_by_instance_and_device(
        &self,
        ctx: &RequestContext,
        instance: Record,
        device_name: &str,
    ) -> ConductorResult<()> {
        let target = BdmDestroyTarget::InstanceDevice {
            instance,
            device_name: device_name.to_string(),
        };
        self.manager.block_device_mapping_destroy(ctx, target).await
    }

    async fn block_device_mapping_destroy_by_instance_and_volume(
        &self,
        ctx: &RequestContext,
        instance: Record,
        volume_id: &str,
    ) -> ConductorResult<()> {
        let target = BdmDestroyTarget::InstanceVolume {
            instance,
            volume_id: volume_id.to_string(),
        };
        self.manager.block_device_mapping_destroy(ctx, target).await
    }

    async fn vol_get_usage_by_time(
        &self,
        ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>> {
        self.manager.vol_get_usage_by_time(ctx, start_time).await
    }

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
    ) -> ConductorResult<()> {
        let counters = VolumeCounters {
            rd_req,
            rd_bytes,
            wr_req,
            wr_bytes,
        };
        self.manager
            .vol_usage_update(ctx, vol_id, counters, instance, last_refreshed, update_totals)
            .await
    }

    async fn service_get_all(&self, ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        self.manager.service_get_all_by(ctx, None, None).await
    }

    async fn service_get_all_by_topic(
        &self,
        ctx: &RequestContext,
        topic: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .service_get_all_by(ctx, Some(topic.to_string()), None)
            .await
    }

    async fn service_get_all_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .service_get_all_by(ctx, None, Some(host.to_string()))
            .await
    }

    async fn service_get_by_host_and_topic(
        &self,
        ctx: &RequestContext,
        host: &str,
        topic: &str,
    ) -> ConductorResult<Option<Record>> {
        let rows = self
            .manager
            .service_get_all_by(ctx, Some(topic.to_string()), Some(host.to_string()))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn service_get_all_compute_by_host(
        &self,
        ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        self.manager
            .service_get_all_by(ctx, Some(COMPUTE_TOPIC.to_string()), Some(host.to_string()))
            .await
    }

    async fn action_event_start(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.manager.action_event_start(ctx, values).await
    }

    async fn action_event_finish(
        &self,
        ctx: &RequestContext,
        values: Record,
    ) -> ConductorResult<Record> {
        self.manager.action_event_finish(ctx, values).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conductor_core::{
        record, ConductorError, DomainError, ErrorKind, ManagerCall, WrappedError, OPERATIONS,
    };

    use super::*;
    use crate::config::ConductorConfig;
    use crate::rpc::serve_on_bus;
    use crate::testing::{Failure, RecordingManager};
    use crate::transport::InMemoryBus;
    use crate::{LocalApi, RemoteApi};

    /// A local and a remote adapter, each over its own recording manager.
    struct Pair {
        local_manager: Arc<RecordingManager>,
        local: LocalApi<RecordingManager>,
        remote_manager: Arc<RecordingManager>,
        remote: RemoteApi<InMemoryBus>,
    }

    fn pair_with(make: impl Fn() -> RecordingManager) -> Pair {
        let local_manager = Arc::new(make());
        let remote_manager = Arc::new(make());
        let config = ConductorConfig::default();
        let bus = Arc::new(InMemoryBus::new());
        serve_on_bus(&bus, Arc::clone(&remote_manager), &config);
        Pair {
            local: LocalApi::new(Arc::clone(&local_manager)),
            local_manager,
            remote: RemoteApi::new(bus, &config.topic, config.call_timeout()),
            remote_manager,
        }
    }

    fn pair() -> Pair {
        pair_with(RecordingManager::new)
    }

    fn instance() -> Record {
        record([("uuid", Value::from("uuid-1")), ("host", Value::from("node1"))])
    }

    fn aggregate() -> Record {
        record([("id", Value::Int(3)), ("name", Value::from("ssd"))])
    }

    /// Call the named public operation with fixed sample arguments.
    #[allow(clippy::too_many_lines)]
    async fn invoke(api: &dyn ConductorApi, name: &str) -> ConductorResult<()> {
        let ctx = RequestContext::new("u1", "p1");
        let ctx = &ctx;
        match name {
            "ping" => api.ping(ctx, Value::from("hello"), None).await.map(drop),
            "instance_update" => api
                .instance_update(
                    ctx,
                    "uuid-1",
                    vec![
                        ("status".to_string(), Value::from("BUILD")),
                        ("status".to_string(), Value::from("ACTIVE")),
                    ],
                )
                .await
                .map(drop),
            "instance_get" => api.instance_get(ctx, 1).await.map(drop),
            "instance_get_by_uuid" => api.instance_get_by_uuid(ctx, "uuid-1").await.map(drop),
            "instance_destroy" => api.instance_destroy(ctx, instance()).await,
            "instance_get_all" => api.instance_get_all(ctx).await.map(drop),
            "instance_get_all_by_host" => api.instance_get_all_by_host(ctx, "node1").await.map(drop),
            "instance_get_all_by_filters" => api
                .instance_get_all_by_filters(ctx, record([("host", "node1")]), None)
                .await
                .map(drop),
            "instance_get_all_hung_in_rebooting" => api
                .instance_get_all_hung_in_rebooting(ctx, 300)
                .await
                .map(drop),
            "instance_get_active_by_window" => api
                .instance_get_active_by_window(ctx, 1_000, Some(2_000), Some("p1".to_string()), None)
                .await
                .map(drop),
            "instance_info_cache_delete" => api.instance_info_cache_delete(ctx, instance()).await,
            "instance_type_get" => api.instance_type_get(ctx, 2).await.map(drop),
            "migration_get" => api.migration_get(ctx, 7).await.map(drop),
            "migration_get_unconfirmed_by_dest_compute" => api
                .migration_get_unconfirmed_by_dest_compute(ctx, 60, "node2")
                .await
                .map(drop),
            "migration_update" => api
                .migration_update(ctx, record([("id", 7_i64)]), "finished")
                .await
                .map(drop),
            "aggregate_host_add" => api.aggregate_host_add(ctx, aggregate(), "node1").await.map(drop),
            "aggregate_host_delete" => api.aggregate_host_delete(ctx, aggregate(), "node1").await,
            "aggregate_get" => api.aggregate_get(ctx, 3).await.map(drop),
            "aggregate_get_by_host" => api
                .aggregate_get_by_host(ctx, "node1", Some("ssd".to_string()))
                .await
                .map(drop),
            "aggregate_metadata_add" => api
                .aggregate_metadata_add(ctx, aggregate(), record([("ssd", "true")]), true)
                .await
                .map(drop),
            "aggregate_metadata_delete" => api.aggregate_metadata_delete(ctx, aggregate(), "ssd").await,
            "bw_usage_get" => api
                .bw_usage_get(ctx, "uuid-1", 1_000, "aa:bb:cc:dd:ee:ff")
                .await
                .map(drop),
            "bw_usage_update" => api
                .bw_usage_update(ctx, "uuid-1", "aa:bb:cc:dd:ee:ff", 1_000, 10, 20, 30, 40, Some(5))
                .await
                .map(drop),
            "get_backdoor_port" => api.get_backdoor_port(ctx, "node1").await.map(drop),
            "security_group_get_by_instance" => api
                .security_group_get_by_instance(ctx, instance())
                .await
                .map(drop),
            "security_group_rule_get_by_security_group" => api
                .security_group_rule_get_by_security_group(ctx, record([("id", 4_i64)]))
                .await
                .map(drop),
            "provider_fw_rule_get_all" => api.provider_fw_rule_get_all(ctx).await.map(drop),
            "agent_build_get_by_triple" => api
                .agent_build_get_by_triple(ctx, "kvm", "linux", "x86_64")
                .await
                .map(drop),
            "block_device_mapping_create" => api
                .block_device_mapping_create(ctx, record([("device_name", "/dev/vdb")]))
                .await
                .map(drop),
            "block_device_mapping_update" => api
                .block_device_mapping_update(ctx, 5, record([("volume_size", 10_i64)]))
                .await
                .map(drop),
            "block_device_mapping_update_or_create" => api
                .block_device_mapping_update_or_create(ctx, record([("device_name", "/dev/vdb")]))
                .await
                .map(drop),
            "block_device_mapping_get_all_by_instance" => api
                .block_device_mapping_get_all_by_instance(ctx, instance())
                .await
                .map(drop),
            "block_device_mapping_destroy" => api
                .block_device_mapping_destroy(ctx, vec![record([("id", 5_i64)])])
                .await,
            "block_device_mapping_destroy_by_instance_and_device" => api
                .block_device_mapping_destroy_by_instance_and_device(ctx, instance(), "/dev/vdb")
                .await,
            "block_device_mapping_destroy_by_instance_and_volume" => api
                .block_device_mapping_destroy_by_instance_and_volume(ctx, instance(), "vol-1")
                .await,
            "vol_get_usage_by_time" => api.vol_get_usage_by_time(ctx, 1_000).await.map(drop),
            "vol_usage_update" => {
                api.vol_usage_update(ctx, "vol-1", 1, 2, 3, 4, instance(), None, true)
                    .await
            }
            "service_get_all" => api.service_get_all(ctx).await.map(drop),
            "service_get_all_by_topic" => api.service_get_all_by_topic(ctx, "compute").await.map(drop),
            "service_get_all_by_host" => api.service_get_all_by_host(ctx, "node1").await.map(drop),
            "service_get_by_host_and_topic" => api
                .service_get_by_host_and_topic(ctx, "node1", "compute")
                .await
                .map(drop),
            "service_get_all_compute_by_host" => api
                .service_get_all_compute_by_host(ctx, "node1")
                .await
                .map(drop),
            "action_event_start" => api
                .action_event_start(ctx, record([("event", "compute_reboot")]))
                .await
                .map(drop),
            "action_event_finish" => api
                .action_event_finish(ctx, record([("event", "compute_reboot")]))
                .await
                .map(drop),
            other => panic!("no sample call for operation {other}"),
        }
    }

    #[tokio::test]
    async fn both_adapters_drive_the_manager_identically() {
        for spec in OPERATIONS {
            let pair = pair();
            invoke(&pair.remote, spec.name).await.unwrap();
            let remote_calls = pair.remote_manager.calls();
            assert_eq!(remote_calls.len(), 1, "{}", spec.name);
            assert_eq!(remote_calls[0].method(), spec.manager_method, "{}", spec.name);

            if spec.name == "get_backdoor_port" {
                continue;
            }
            invoke(&pair.local, spec.name).await.unwrap();
            assert_eq!(pair.local_manager.calls(), remote_calls, "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn local_backdoor_port_is_always_invalid() {
        let pair = pair();
        let ctx = RequestContext::admin();
        for host in ["node1", "", "conductor-0"] {
            let err = pair.local.get_backdoor_port(&ctx, host).await.unwrap_err();
            let ConductorError::Domain(err) = err else {
                panic!("expected a domain error, got {err:?}");
            };
            assert_eq!(err, DomainError::invalid_request());
            assert_eq!(err.message(), "The request is invalid.");
        }
        assert!(pair.local_manager.calls().is_empty());
    }

    #[tokio::test]
    async fn remote_backdoor_port_ignores_host() {
        let pair = pair();
        let ctx = RequestContext::admin();
        let port = pair.remote.get_backdoor_port(&ctx, "node9").await.unwrap();
        assert_eq!(port, None);
        assert_eq!(pair.remote_manager.calls(), vec![ManagerCall::GetBackdoorPort]);
    }

    #[tokio::test]
    async fn instance_update_packs_pairs_into_one_record() {
        let pair = pair();
        let ctx = RequestContext::admin();
        let updates = vec![("status".to_string(), Value::from("ACTIVE"))];
        pair.local.instance_update(&ctx, "uuid-1", updates.clone()).await.unwrap();
        pair.remote.instance_update(&ctx, "uuid-1", updates).await.unwrap();

        let expected = vec![ManagerCall::InstanceUpdate {
            instance_uuid: "uuid-1".to_string(),
            updates: record([("status", "ACTIVE")]),
        }];
        assert_eq!(pair.local_manager.calls(), expected);
        assert_eq!(pair.remote_manager.calls(), expected);
    }

    #[tokio::test]
    async fn block_device_mapping_shapes() {
        let pair = pair();
        let ctx = RequestContext::admin();
        let api: &dyn ConductorApi = &pair.local;
        api.block_device_mapping_update(&ctx, 5, record([("id", 99_i64), ("volume_size", 10_i64)]))
            .await
            .unwrap();
        api.block_device_mapping_destroy_by_instance_and_volume(&ctx, instance(), "vol-1")
            .await
            .unwrap();

        assert_eq!(
            pair.local_manager.calls(),
            vec![
                ManagerCall::BlockDeviceMappingUpdateOrCreate {
                    values: record([("id", 5_i64), ("volume_size", 10_i64)]),
                    create: Some(false),
                },
                ManagerCall::BlockDeviceMappingDestroy {
                    target: BdmDestroyTarget::InstanceVolume {
                        instance: instance(),
                        volume_id: "vol-1".to_string(),
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn service_lookups_map_to_topic_host_filters() {
        let pair = pair();
        let ctx = RequestContext::admin();
        let api: &dyn ConductorApi = &pair.remote;
        api.service_get_all(&ctx).await.unwrap();
        api.service_get_all_by_topic(&ctx, "scheduler").await.unwrap();
        api.service_get_all_by_host(&ctx, "node1").await.unwrap();
        assert_eq!(api.service_get_by_host_and_topic(&ctx, "node1", "compute").await.unwrap(), None);
        api.service_get_all_compute_by_host(&ctx, "node2").await.unwrap();

        let filters: Vec<_> = pair
            .remote_manager
            .calls()
            .into_iter()
            .map(|call| match call {
                ManagerCall::ServiceGetAllBy { topic, host } => (topic, host),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        let some = |s: &str| Some(s.to_string());
        assert_eq!(
            filters,
            vec![
                (None, None),
                (some("scheduler"), None),
                (None, some("node1")),
                (some("compute"), some("node1")),
                (some("compute"), some("node2")),
            ]
        );
    }

    #[tokio::test]
    async fn domain_errors_match_across_adapters() {
        let failures = [
            DomainError::instance_not_found("uuid-1"),
            DomainError::aggregate_host_exists(3, "node1"),
            DomainError::invalid_request_because("bad filter"),
        ];
        for failure in failures {
            let pair = pair_with(|| RecordingManager::failing(Failure::Domain(failure.clone())));
            for spec in OPERATIONS.iter().filter(|spec| spec.name != "get_backdoor_port") {
                let local = invoke(&pair.local, spec.name).await.unwrap_err();
                let remote = invoke(&pair.remote, spec.name).await.unwrap_err();
                let (ConductorError::Domain(local), ConductorError::Domain(remote)) = (local, remote)
                else {
                    panic!("{}: both adapters must surface domain errors", spec.name);
                };
                assert_eq!(local, remote, "{}", spec.name);
                assert_eq!(local.kind(), failure.kind());
                assert_eq!(remote.message(), failure.message());
            }
        }
    }

    #[tokio::test]
    async fn wrapped_errors_from_a_local_manager_are_translated() {
        let wrapped = WrappedError {
            original_type: "MigrationNotFound".to_string(),
            original_message: "Migration 7 could not be found.".to_string(),
            original_stack: vec!["cell1:migration_get".to_string()],
        };
        let pair = pair_with(|| RecordingManager::failing(Failure::Wrapped(wrapped.clone())));
        let ctx = RequestContext::admin();

        let err = pair.local.migration_get(&ctx, 7).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MigrationNotFound));
        assert!(matches!(err, ConductorError::Domain(_)));

        let err = pair.remote.migration_get(&ctx, 7).await.unwrap_err();
        let ConductorError::Domain(err) = err else {
            panic!("expected a domain error");
        };
        assert_eq!(
            err.stack(),
            ["cell1:migration_get".to_string(), "conductor-0:migration_get".to_string()]
        );
    }

    #[tokio::test]
    async fn ping_echoes_through_both_adapters() {
        let pair = pair();
        let ctx = RequestContext::admin();
        let arg = Value::Map(record([("seq", Value::Int(1)), ("load", Value::Float(0.5))]));
        let local = pair.local.ping(&ctx, arg.clone(), Some(Duration::from_millis(1))).await.unwrap();
        let remote = pair.remote.ping(&ctx, arg.clone(), Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(local, arg);
        assert_eq!(remote, arg);
    }

    #[test]
    fn modes_name_themselves() {
        let pair = pair();
        assert_eq!(pair.local.mode_name(), "local");
        assert_eq!(pair.remote.mode_name(), "remote");
    }

    proptest::proptest! {
        #[test]
        fn packed_updates_keep_the_last_value_per_field(
            pairs in proptest::collection::vec(("[a-c]{1}", proptest::num::i64::ANY), 0..12)
        ) {
            let updates: Vec<(String, Value)> =
                pairs.iter().map(|(k, v)| (k.clone(), Value::Int(*v))).collect();
            let packed = pack_updates(updates);
            for (key, value) in &packed {
                let last = pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| *v);
                proptest::prop_assert_eq!(Some(value.clone()), last.map(Value::Int));
            }
            let distinct: std::collections::BTreeSet<_> = pairs.iter().map(|(k, _)| k).collect();
            proptest::prop_assert_eq!(packed.len(), distinct.len());
        }
    }
}
