//! One variant per manager operation, as it travels inside an `RpcRequest`.
//!
//! Adjacently tagged: `{"method": "<operation>", "args": {<named arguments>}}`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::base::RpcVersion;
use super::encode;
use crate::context::RequestContext;
use crate::traits::{ConductorManager, ConductorResult};
use crate::types::{BandwidthCounters, BdmDestroyTarget, Record, SortOrder, Value, VolumeCounters};

/// A manager operation with its named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum ManagerCall {
    Ping {
        arg: Value,
    },
    InstanceUpdate {
        instance_uuid: String,
        updates: Record,
    },
    InstanceGet {
        instance_id: i64,
    },
    InstanceGetByUuid {
        instance_uuid: String,
    },
    InstanceDestroy {
        instance: Record,
    },
    InstanceGetAll,
    InstanceGetAllByHost {
        host: String,
    },
    InstanceGetAllByFilters {
        filters: Record,
        sort: SortOrder,
    },
    InstanceGetAllHungInRebooting {
        timeout_secs: u64,
    },
    InstanceGetActiveByWindow {
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    },
    InstanceInfoCacheDelete {
        instance: Record,
    },
    InstanceTypeGet {
        instance_type_id: i64,
    },
    MigrationGet {
        migration_id: i64,
    },
    MigrationGetUnconfirmedByDestCompute {
        confirm_window_secs: u64,
        dest_compute: String,
    },
    MigrationUpdate {
        migration: Record,
        status: String,
    },
    AggregateHostAdd {
        aggregate: Record,
        host: String,
    },
    AggregateHostDelete {
        aggregate: Record,
        host: String,
    },
    AggregateGet {
        aggregate_id: i64,
    },
    AggregateGetByHost {
        host: String,
        key: Option<String>,
    },
    AggregateMetadataAdd {
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    },
    AggregateMetadataDelete {
        aggregate: Record,
        key: String,
    },
    BwUsageUpdate {
        uuid: String,
        mac: String,
        start_period: i64,
        counters: Option<BandwidthCounters>,
        last_refreshed: Option<i64>,
    },
    GetBackdoorPort,
    SecurityGroupGetByInstance {
        instance: Record,
    },
    SecurityGroupRuleGetBySecurityGroup {
        secgroup: Record,
    },
    ProviderFwRuleGetAll,
    AgentBuildGetByTriple {
        hypervisor: String,
        os: String,
        architecture: String,
    },
    BlockDeviceMappingUpdateOrCreate {
        values: Record,
        create: Option<bool>,
    },
    BlockDeviceMappingGetAllByInstance {
        instance: Record,
    },
    BlockDeviceMappingDestroy {
        target: BdmDestroyTarget,
    },
    VolGetUsageByTime {
        start_time: i64,
    },
    VolUsageUpdate {
        vol_id: String,
        counters: VolumeCounters,
        instance: Record,
        last_refreshed: Option<i64>,
        update_totals: bool,
    },
    ServiceGetAllBy {
        topic: Option<String>,
        host: Option<String>,
    },
    ActionEventStart {
        values: Record,
    },
    ActionEventFinish {
        values: Record,
    },
}

impl ManagerCall {
    /// Wire name of the manager method.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            ManagerCall::Ping { .. } => "ping",
            ManagerCall::InstanceUpdate { .. } => "instance_update",
            ManagerCall::InstanceGet { .. } => "instance_get",
            ManagerCall::InstanceGetByUuid { .. } => "instance_get_by_uuid",
            ManagerCall::InstanceDestroy { .. } => "instance_destroy",
            ManagerCall::InstanceGetAll => "instance_get_all",
            ManagerCall::InstanceGetAllByHost { .. } => "instance_get_all_by_host",
            ManagerCall::InstanceGetAllByFilters { .. } => "instance_get_all_by_filters",
            ManagerCall::InstanceGetAllHungInRebooting { .. } => {
                "instance_get_all_hung_in_rebooting"
            }
            ManagerCall::InstanceGetActiveByWindow { .. } => "instance_get_active_by_window",
            ManagerCall::InstanceInfoCacheDelete { .. } => "instance_info_cache_delete",
            ManagerCall::InstanceTypeGet { .. } => "instance_type_get",
            ManagerCall::MigrationGet { .. } => "migration_get",
            ManagerCall::MigrationGetUnconfirmedByDestCompute { .. } => {
                "migration_get_unconfirmed_by_dest_compute"
            }
            ManagerCall::MigrationUpdate { .. } => "migration_update",
            ManagerCall::AggregateHostAdd { .. } => "aggregate_host_add",
            ManagerCall::AggregateHostDelete { .. } => "aggregate_host_delete",
            ManagerCall::AggregateGet { .. } => "aggregate_get",
            ManagerCall::AggregateGetByHost { .. } => "aggregate_get_by_host",
            ManagerCall::AggregateMetadataAdd { .. } => "aggregate_metadata_add",
            ManagerCall::AggregateMetadataDelete { .. } => "aggregate_metadata_delete",
            ManagerCall::BwUsageUpdate { .. } => "bw_usage_update",
            ManagerCall::GetBackdoorPort => "get_backdoor_port",
            ManagerCall::SecurityGroupGetByInstance { .. } => "security_group_get_by_instance",
            ManagerCall::SecurityGroupRuleGetBySecurityGroup { .. } => {
                "security_group_rule_get_by_security_group"
            }
            ManagerCall::ProviderFwRuleGetAll => "provider_fw_rule_get_all",
            ManagerCall::AgentBuildGetByTriple { .. } => "agent_build_get_by_triple",
            ManagerCall::BlockDeviceMappingUpdateOrCreate { .. } => {
                "block_device_mapping_update_or_create"
            }
            ManagerCall::BlockDeviceMappingGetAllByInstance { .. } => {
                "block_device_mapping_get_all_by_instance"
            }
            ManagerCall::BlockDeviceMappingDestroy { .. } => "block_device_mapping_destroy",
            ManagerCall::VolGetUsageByTime { .. } => "vol_get_usage_by_time",
            ManagerCall::VolUsageUpdate { .. } => "vol_usage_update",
            ManagerCall::ServiceGetAllBy { .. } => "service_get_all_by",
            ManagerCall::ActionEventStart { .. } => "action_event_start",
            ManagerCall::ActionEventFinish { .. } => "action_event_finish",
        }
    }

    /// First RPC API version that carries this call in its current shape.
    #[must_use]
    pub fn min_version(&self) -> RpcVersion {
        let minor = match self {
            ManagerCall::InstanceUpdate { .. } => 0,
            ManagerCall::MigrationGet { .. } | ManagerCall::MigrationUpdate { .. } => 1,
            ManagerCall::InstanceGetByUuid { .. } | ManagerCall::InstanceGetAllByHost { .. } => 2,
            ManagerCall::AggregateHostAdd { .. } | ManagerCall::AggregateHostDelete { .. } => 3,
            ManagerCall::BwUsageUpdate { .. } => 5,
            ManagerCall::GetBackdoorPort => 6,
            ManagerCall::AggregateGet { .. } | ManagerCall::AggregateGetByHost { .. } => 11,
            ManagerCall::AggregateMetadataAdd { .. }
            | ManagerCall::AggregateMetadataDelete { .. } => 7,
            ManagerCall::SecurityGroupGetByInstance { .. }
            | ManagerCall::SecurityGroupRuleGetBySecurityGroup { .. } => 10,
            ManagerCall::BlockDeviceMappingUpdateOrCreate { .. }
            | ManagerCall::BlockDeviceMappingGetAllByInstance { .. }
            | ManagerCall::BlockDeviceMappingDestroy { .. } => 13,
            ManagerCall::InstanceGetAllByFilters { .. } => 14,
            ManagerCall::InstanceGetAllHungInRebooting { .. }
            | ManagerCall::InstanceGetActiveByWindow { .. } => 15,
            ManagerCall::InstanceDestroy { .. } => 16,
            ManagerCall::InstanceInfoCacheDelete { .. } => 17,
            ManagerCall::InstanceTypeGet { .. } => 18,
            ManagerCall::VolGetUsageByTime { .. } | ManagerCall::VolUsageUpdate { .. } => 19,
            ManagerCall::MigrationGetUnconfirmedByDestCompute { .. } => 20,
            ManagerCall::ServiceGetAllBy { .. } => 21,
            ManagerCall::Ping { .. } => 22,
            ManagerCall::InstanceGetAll => 23,
            ManagerCall::InstanceGet { .. } => 24,
            ManagerCall::ActionEventStart { .. } | ManagerCall::ActionEventFinish { .. } => 25,
            ManagerCall::ProviderFwRuleGetAll => 29,
            ManagerCall::AgentBuildGetByTriple { .. } => 30,
        };
        RpcVersion::new(1, minor)
    }

    /// Invoke the matching manager method and encode its result.
    ///
    /// # Errors
    ///
    /// Returns whatever the manager returns, or `TransportError::Encode` if the
    /// result cannot be encoded.
    #[allow(clippy::too_many_lines)]
    pub async fn dispatch<M>(self, manager: &M, ctx: &RequestContext) -> ConductorResult<Vec<u8>>
    where
        M: ConductorManager + ?Sized,
    {
        trace!(method = self.method(), request_id = %ctx.request_id, "dispatching manager call");
        let bytes = match self {
            ManagerCall::Ping { arg } => encode(&manager.ping(ctx, arg).await?),
            ManagerCall::InstanceUpdate {
                instance_uuid,
                updates,
            } => encode(&manager.instance_update(ctx, &instance_uuid, updates).await?),
            ManagerCall::InstanceGet { instance_id } => {
                encode(&manager.instance_get(ctx, instance_id).await?)
            }
            ManagerCall::InstanceGetByUuid { instance_uuid } => {
                encode(&manager.instance_get_by_uuid(ctx, &instance_uuid).await?)
            }
            ManagerCall::InstanceDestroy { instance } => {
                encode(&manager.instance_destroy(ctx, instance).await?)
            }
            ManagerCall::InstanceGetAll => encode(&manager.instance_get_all(ctx).await?),
            ManagerCall::InstanceGetAllByHost { host } => {
                encode(&manager.instance_get_all_by_host(ctx, &host).await?)
            }
            ManagerCall::InstanceGetAllByFilters { filters, sort } => {
                encode(&manager.instance_get_all_by_filters(ctx, filters, sort).await?)
            }
            ManagerCall::InstanceGetAllHungInRebooting { timeout_secs } => encode(
                &manager
                    .instance_get_all_hung_in_rebooting(ctx, timeout_secs)
                    .await?,
            ),
            ManagerCall::InstanceGetActiveByWindow {
                begin_ms,
                end_ms,
                project_id,
                host,
            } => encode(
                &manager
                    .instance_get_active_by_window(ctx, begin_ms, end_ms, project_id, host)
                    .await?,
            ),
            ManagerCall::InstanceInfoCacheDelete { instance } => {
                encode(&manager.instance_info_cache_delete(ctx, instance).await?)
            }
            ManagerCall::InstanceTypeGet { instance_type_id } => {
                encode(&manager.instance_type_get(ctx, instance_type_id).await?)
            }
            ManagerCall::MigrationGet { migration_id } => {
                encode(&manager.migration_get(ctx, migration_id).await?)
            }
            ManagerCall::MigrationGetUnconfirmedByDestCompute {
                confirm_window_secs,
                dest_compute,
            } => encode(
                &manager
                    .migration_get_unconfirmed_by_dest_compute(
                        ctx,
                        confirm_window_secs,
                        &dest_compute,
                    )
                    .await?,
            ),
            ManagerCall::MigrationUpdate { migration, status } => {
                encode(&manager.migration_update(ctx, migration, &status).await?)
            }
            ManagerCall::AggregateHostAdd { aggregate, host } => {
                encode(&manager.aggregate_host_add(ctx, aggregate, &host).await?)
            }
            ManagerCall::AggregateHostDelete { aggregate, host } => {
                encode(&manager.aggregate_host_delete(ctx, aggregate, &host).await?)
            }
            ManagerCall::AggregateGet { aggregate_id } => {
                encode(&manager.aggregate_get(ctx, aggregate_id).await?)
            }
            ManagerCall::AggregateGetByHost { host, key } => {
                encode(&manager.aggregate_get_by_host(ctx, &host, key).await?)
            }
            ManagerCall::AggregateMetadataAdd {
                aggregate,
                metadata,
                set_delete,
            } => encode(
                &manager
                    .aggregate_metadata_add(ctx, aggregate, metadata, set_delete)
                    .await?,
            ),
            ManagerCall::AggregateMetadataDelete { aggregate, key } => {
                encode(&manager.aggregate_metadata_delete(ctx, aggregate, &key).await?)
            }
            ManagerCall::BwUsageUpdate {
                uuid,
                mac,
                start_period,
                counters,
                last_refreshed,
            } => encode(
                &manager
                    .bw_usage_update(ctx, &uuid, &mac, start_period, counters, last_refreshed)
                    .await?,
            ),
            ManagerCall::GetBackdoorPort => encode(&manager.get_backdoor_port(ctx).await?),
            ManagerCall::SecurityGroupGetByInstance { instance } => {
                encode(&manager.security_group_get_by_instance(ctx, instance).await?)
            }
            ManagerCall::SecurityGroupRuleGetBySecurityGroup { secgroup } => encode(
                &manager
                    .security_group_rule_get_by_security_group(ctx, secgroup)
                    .await?,
            ),
            ManagerCall::ProviderFwRuleGetAll => {
                encode(&manager.provider_fw_rule_get_all(ctx).await?)
            }
            ManagerCall::AgentBuildGetByTriple {
                hypervisor,
                os,
                architecture,
            } => encode(
                &manager
                    .agent_build_get_by_triple(ctx, &hypervisor, &os, &architecture)
                    .await?,
            ),
            ManagerCall::BlockDeviceMappingUpdateOrCreate { values, create } => encode(
                &manager
                    .block_device_mapping_update_or_create(ctx, values, create)
                    .await?,
            ),
            ManagerCall::BlockDeviceMappingGetAllByInstance { instance } => encode(
                &manager
                    .block_device_mapping_get_all_by_instance(ctx, instance)
                    .await?,
            ),
            ManagerCall::BlockDeviceMappingDestroy { target } => {
                encode(&manager.block_device_mapping_destroy(ctx, target).await?)
            }
            ManagerCall::VolGetUsageByTime { start_time } => {
                encode(&manager.vol_get_usage_by_time(ctx, start_time).await?)
            }
            ManagerCall::VolUsageUpdate {
                vol_id,
                counters,
                instance,
                last_refreshed,
                update_totals,
            } => encode(
                &manager
                    .vol_usage_update(ctx, &vol_id, counters, instance, last_refreshed, update_totals)
                    .await?,
            ),
            ManagerCall::ServiceGetAllBy { topic, host } => {
                encode(&manager.service_get_all_by(ctx, topic, host).await?)
            }
            ManagerCall::ActionEventStart { values } => {
                encode(&manager.action_event_start(ctx, values).await?)
            }
            ManagerCall::ActionEventFinish { values } => {
                encode(&manager.action_event_finish(ctx, values).await?)
            }
        };
        Ok(bytes?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{decode, RPC_API_VERSION};
    use crate::types::record;

    #[test]
    fn serialized_call_has_method_and_args_keys() {
        let call = ManagerCall::AggregateGetByHost {
            host: "node1".into(),
            key: Some("ssd".into()),
        };
        let bytes = encode(&call).expect("encode");
        let value: rmpv::Value = rmpv::decode::read_value(&mut &bytes[..]).expect("decode as Value");
        let map = value.as_map().expect("top-level should be a MsgPack map");

        let method = map
            .iter()
            .find(|(k, _)| k.as_str() == Some("method"))
            .map(|(_, v)| v.as_str());
        assert_eq!(method, Some(Some("aggregate_get_by_host")));

        let args = map
            .iter()
            .find(|(k, _)| k.as_str() == Some("args"))
            .and_then(|(_, v)| v.as_map())
            .expect("args should be a map");
        let arg_names: Vec<_> = args.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert_eq!(arg_names, vec!["host", "key"]);
    }

    #[test]
    fn serde_tag_matches_method_name() {
        let calls = vec![
            ManagerCall::InstanceGetAll,
            ManagerCall::GetBackdoorPort,
            ManagerCall::ProviderFwRuleGetAll,
            ManagerCall::InstanceGetAllHungInRebooting { timeout_secs: 60 },
            ManagerCall::BlockDeviceMappingDestroy {
                target: BdmDestroyTarget::InstanceVolume {
                    instance: record([("uuid", "uuid-1")]),
                    volume_id: "vol-1".into(),
                },
            },
            ManagerCall::ServiceGetAllBy {
                topic: Some("compute".into()),
                host: None,
            },
        ];
        for call in calls {
            let bytes = encode(&call).expect("encode");
            let value: rmpv::Value = rmpv::decode::read_value(&mut &bytes[..]).expect("raw");
            let tag = value
                .as_map()
                .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("method")))
                .and_then(|(_, v)| v.as_str().map(str::to_string));
            assert_eq!(tag.as_deref(), Some(call.method()));

            let decoded: ManagerCall = decode(&bytes).expect("decode");
            assert_eq!(decoded, call);
        }
    }

    #[test]
    fn every_call_is_servable_by_current_version() {
        let calls = vec![
            ManagerCall::Ping { arg: Value::Null },
            ManagerCall::InstanceGetAll,
            ManagerCall::GetBackdoorPort,
            ManagerCall::AgentBuildGetByTriple {
                hypervisor: "kvm".into(),
                os: "linux".into(),
                architecture: "x86_64".into(),
            },
        ];
        for call in calls {
            assert!(RPC_API_VERSION.can_serve(call.min_version()), "{}", call.method());
        }
    }
}
