//! Static description of the public conductor operations.
//!
//! One entry per [`ConductorApi`](crate::ConductorApi) method, in trait order,
//! with its parameters after the request context and the manager method it
//! forwards to. Used for introspection (CLI listings, logging) and by tests
//! that check both adapters drive the manager identically.

/// A single operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// Rust type as it appears in the `ConductorApi` signature.
    pub ty: &'static str,
    /// Value used when the caller passes `None`, if the parameter is defaulted.
    pub default: Option<&'static str>,
}

/// A public operation and its manager counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub returns: &'static str,
    pub manager_method: &'static str,
}

impl OperationSpec {
    /// Whether the operation forwards to a manager method with a different name.
    #[must_use]
    pub fn is_reshaped(&self) -> bool {
        self.name != self.manager_method
    }
}

const fn p(name: &'static str, ty: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        ty,
        default: None,
    }
}

const fn d(name: &'static str, ty: &'static str, default: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        ty,
        default: Some(default),
    }
}

const fn op(
    name: &'static str,
    params: &'static [ParamSpec],
    returns: &'static str,
    manager_method: &'static str,
) -> OperationSpec {
    OperationSpec {
        name,
        params,
        returns,
        manager_method,
    }
}

const BDM_UPSERT: &str = "block_device_mapping_update_or_create";
const BDM_DESTROY: &str = "block_device_mapping_destroy";
const SERVICE_GET_ALL_BY: &str = "service_get_all_by";

/// Every public operation, in `ConductorApi` order.
pub const OPERATIONS: &[OperationSpec] = &[
    op(
        "ping",
        &[p("arg", "Value"), d("timeout", "Option<Duration>", "None")],
        "Value",
        "ping",
    ),
    op(
        "instance_update",
        &[p("instance_uuid", "&str"), p("updates", "Vec<(String, Value)>")],
        "Record",
        "instance_update",
    ),
    op("instance_get", &[p("instance_id", "i64")], "Record", "instance_get"),
    op(
        "instance_get_by_uuid",
        &[p("instance_uuid", "&str")],
        "Record",
        "instance_get_by_uuid",
    ),
    op("instance_destroy", &[p("instance", "Record")], "()", "instance_destroy"),
    op("instance_get_all", &[], "Vec<Record>", "instance_get_all"),
    op(
        "instance_get_all_by_host",
        &[p("host", "&str")],
        "Vec<Record>",
        "instance_get_all_by_host",
    ),
    op(
        "instance_get_all_by_filters",
        &[
            p("filters", "Record"),
            d("sort", "Option<SortOrder>", "created_at desc"),
        ],
        "Vec<Record>",
        "instance_get_all_by_filters",
    ),
    op(
        "instance_get_all_hung_in_rebooting",
        &[p("timeout_secs", "u64")],
        "Vec<Record>",
        "instance_get_all_hung_in_rebooting",
    ),
    op(
        "instance_get_active_by_window",
        &[
            p("begin_ms", "i64"),
            d("end_ms", "Option<i64>", "None"),
            d("project_id", "Option<String>", "None"),
            d("host", "Option<String>", "None"),
        ],
        "Vec<Record>",
        "instance_get_active_by_window",
    ),
    op(
        "instance_info_cache_delete",
        &[p("instance", "Record")],
        "()",
        "instance_info_cache_delete",
    ),
    op(
        "instance_type_get",
        &[p("instance_type_id", "i64")],
        "Record",
        "instance_type_get",
    ),
    op("migration_get", &[p("migration_id", "i64")], "Record", "migration_get"),
    op(
        "migration_get_unconfirmed_by_dest_compute",
        &[p("confirm_window_secs", "u64"), p("dest_compute", "&str")],
        "Vec<Record>",
        "migration_get_unconfirmed_by_dest_compute",
    ),
    op(
        "migration_update",
        &[p("migration", "Record"), p("status", "&str")],
        "Record",
        "migration_update",
    ),
    op(
        "aggregate_host_add",
        &[p("aggregate", "Record"), p("host", "&str")],
        "Record",
        "aggregate_host_add",
    ),
    op(
        "aggregate_host_delete",
        &[p("aggregate", "Record"), p("host", "&str")],
        "()",
        "aggregate_host_delete",
    ),
    op("aggregate_get", &[p("aggregate_id", "i64")], "Record", "aggregate_get"),
    op(
        "aggregate_get_by_host",
        &[p("host", "&str"), d("key", "Option<String>", "None")],
        "Vec<Record>",
        "aggregate_get_by_host",
    ),
    op(
        "aggregate_metadata_add",
        &[
            p("aggregate", "Record"),
            p("metadata", "Record"),
            d("set_delete", "bool", "false"),
        ],
        "Record",
        "aggregate_metadata_add",
    ),
    op(
        "aggregate_metadata_delete",
        &[p("aggregate", "Record"), p("key", "&str")],
        "()",
        "aggregate_metadata_delete",
    ),
    op(
        "bw_usage_get",
        &[p("uuid", "&str"), p("start_period", "i64"), p("mac", "&str")],
        "Option<Record>",
        "bw_usage_update",
    ),
    op(
        "bw_usage_update",
        &[
            p("uuid", "&str"),
            p("mac", "&str"),
            p("start_period", "i64"),
            p("bw_in", "i64"),
            p("bw_out", "i64"),
            p("last_ctr_in", "i64"),
            p("last_ctr_out", "i64"),
            d("last_refreshed", "Option<i64>", "None"),
        ],
        "Option<Record>",
        "bw_usage_update",
    ),
    op(
        "get_backdoor_port",
        &[p("host", "&str")],
        "Option<u16>",
        "get_backdoor_port",
    ),
    op(
        "security_group_get_by_instance",
        &[p("instance", "Record")],
        "Vec<Record>",
        "security_group_get_by_instance",
    ),
    op(
        "security_group_rule_get_by_security_group",
        &[p("secgroup", "Record")],
        "Vec<Record>",
        "security_group_rule_get_by_security_group",
    ),
    op(
        "provider_fw_rule_get_all",
        &[],
        "Vec<Record>",
        "provider_fw_rule_get_all",
    ),
    op(
        "agent_build_get_by_triple",
        &[p("hypervisor", "&str"), p("os", "&str"), p("architecture", "&str")],
        "Option<Record>",
        "agent_build_get_by_triple",
    ),
    op("block_device_mapping_create", &[p("values", "Record")], "Record", BDM_UPSERT),
    op(
        "block_device_mapping_update",
        &[p("bdm_id", "i64"), p("values", "Record")],
        "Record",
        BDM_UPSERT,
    ),
    op(
        "block_device_mapping_update_or_create",
        &[p("values", "Record")],
        "Record",
        BDM_UPSERT,
    ),
    op(
        "block_device_mapping_get_all_by_instance",
        &[p("instance", "Record")],
        "Vec<Record>",
        "block_device_mapping_get_all_by_instance",
    ),
    op("block_device_mapping_destroy", &[p("bdms", "Vec<Record>")], "()", BDM_DESTROY),
    op(
        "block_device_mapping_destroy_by_instance_and_device",
        &[p("instance", "Record"), p("device_name", "&str")],
        "()",
        BDM_DESTROY,
    ),
    op(
        "block_device_mapping_destroy_by_instance_and_volume",
        &[p("instance", "Record"), p("volume_id", "&str")],
        "()",
        BDM_DESTROY,
    ),
    op(
        "vol_get_usage_by_time",
        &[p("start_time", "i64")],
        "Vec<Record>",
        "vol_get_usage_by_time",
    ),
    op(
        "vol_usage_update",
        &[
            p("vol_id", "&str"),
            p("rd_req", "i64"),
            p("rd_bytes", "i64"),
            p("wr_req", "i64"),
            p("wr_bytes", "i64"),
            p("instance", "Record"),
            d("last_refreshed", "Option<i64>", "None"),
            d("update_totals", "bool", "false"),
        ],
        "()",
        "vol_usage_update",
    ),
    op("service_get_all", &[], "Vec<Record>", SERVICE_GET_ALL_BY),
    op(
        "service_get_all_by_topic",
        &[p("topic", "&str")],
        "Vec<Record>",
        SERVICE_GET_ALL_BY,
    ),
    op(
        "service_get_all_by_host",
        &[p("host", "&str")],
        "Vec<Record>",
        SERVICE_GET_ALL_BY,
    ),
    op(
        "service_get_by_host_and_topic",
        &[p("host", "&str"), p("topic", "&str")],
        "Option<Record>",
        SERVICE_GET_ALL_BY,
    ),
    op(
        "service_get_all_compute_by_host",
        &[p("host", "&str")],
        "Vec<Record>",
        SERVICE_GET_ALL_BY,
    ),
    op(
        "action_event_start",
        &[p("values", "Record")],
        "Record",
        "action_event_start",
    ),
    op(
        "action_event_finish",
        &[p("values", "Record")],
        "Record",
        "action_event_finish",
    ),
];

/// Look up an operation by its public name.
#[must_use]
pub fn find_operation(name: &str) -> Option<&'static OperationSpec> {
    OPERATIONS.iter().find(|spec| spec.name == name)
}
