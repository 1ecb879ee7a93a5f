//! `ConductorManager` over in-memory tables.
//!
//! Every operation takes the table lock once and releases it before
//! returning, so no lock is ever held across an `.await`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{
    record, BandwidthCounters, BdmDestroyTarget, ConductorManager, ConductorResult, DomainError,
    Record, RequestContext, SortDirection, SortOrder, Value, VolumeCounters,
};
use parking_lot::RwLock;
use tracing::debug;

use super::clock::{ClockSource, SystemClock};
use crate::adapter::COMPUTE_TOPIC;

static NULL: Value = Value::Null;

fn field<'a>(row: &'a Record, key: &str) -> &'a Value {
    row.get(key).unwrap_or(&NULL)
}

fn str_field<'a>(row: &'a Record, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

fn int_field(row: &Record, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_int)
}

fn id_of(row: &Record) -> ConductorResult<i64> {
    int_field(row, "id").ok_or_else(|| DomainError::invalid_request_because("record has no id").into())
}

fn required_str(row: &Record, key: &str) -> ConductorResult<String> {
    str_field(row, key)
        .map(str::to_string)
        .ok_or_else(|| DomainError::invalid_request_because(&format!("missing {key}")).into())
}

/// Whether `at` lies at least `age_ms` before `now`.
fn older_than(at: Option<i64>, now: i64, age_ms: i64) -> bool {
    at.is_some_and(|at| at <= now.saturating_sub(age_ms))
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

fn add_counter(row: &mut Record, key: &str, delta: i64) {
    let total = int_field(row, key).unwrap_or(0).saturating_add(delta);
    row.insert(key.to_string(), Value::Int(total));
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Aggregate row with its host list and metadata kept apart from the
/// plain columns.
struct Aggregate {
    row: Record,
    hosts: Vec<String>,
    metadata: Record,
}

impl Aggregate {
    fn from_record(mut row: Record) -> Self {
        let hosts = match row.remove("hosts") {
            Some(Value::Array(hosts)) => hosts
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let metadata = match row.remove("metadata") {
            Some(Value::Map(metadata)) => metadata,
            _ => Record::new(),
        };
        Self {
            row,
            hosts,
            metadata,
        }
    }

    fn id(&self) -> i64 {
        int_field(&self.row, "id").unwrap_or_default()
    }

    fn to_record(&self) -> Record {
        let mut row = self.row.clone();
        let hosts = self.hosts.iter().map(|h| Value::from(h.as_str())).collect();
        row.insert("hosts".to_string(), Value::Array(hosts));
        row.insert("metadata".to_string(), Value::Map(self.metadata.clone()));
        row
    }
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    instances: BTreeMap<i64, Record>,
    instance_types: BTreeMap<i64, Record>,
    migrations: BTreeMap<i64, Record>,
    aggregates: BTreeMap<i64, Aggregate>,
    bw_usage: BTreeMap<(String, String, i64), Record>,
    security_groups: BTreeMap<i64, Record>,
    /// `(instance_uuid, security_group_id)` pairs.
    security_group_members: Vec<(String, i64)>,
    security_group_rules: Vec<Record>,
    provider_fw_rules: Vec<Record>,
    agent_builds: Vec<Record>,
    block_device_mappings: BTreeMap<i64, Record>,
    vol_usage: BTreeMap<String, Record>,
    services: Vec<Record>,
    action_events: Vec<Record>,
}

impl Tables {
    /// Give `row` an id, keeping one it already has.
    fn assign_id(&mut self, row: &mut Record) -> ConductorResult<i64> {
        if let Some(id) = int_field(row, "id") {
            self.next_id = self.next_id.max(id);
            return Ok(id);
        }
        let id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| DomainError::invalid_request_because("record ids are exhausted"))?;
        self.next_id = id;
        row.insert("id".to_string(), Value::Int(id));
        Ok(id)
    }

    fn instance_by_uuid(&self, uuid: &str) -> Option<&Record> {
        self.instances
            .values()
            .find(|row| str_field(row, "uuid") == Some(uuid))
    }

    fn instance_by_uuid_mut(&mut self, uuid: &str) -> Option<&mut Record> {
        self.instances
            .values_mut()
            .find(|row| str_field(row, "uuid") == Some(uuid))
    }

    fn aggregate_mut(&mut self, aggregate: &Record) -> ConductorResult<&mut Aggregate> {
        let id = id_of(aggregate)?;
        self.aggregates
            .get_mut(&id)
            .ok_or_else(|| DomainError::aggregate_not_found(id).into())
    }
}

// ---------------------------------------------------------------------------
// MemoryManager
// ---------------------------------------------------------------------------

/// Conductor manager keeping every table in process memory.
///
/// Records are plain [`Record`] maps; `id` is an integer key assigned on
/// insert and instances are also addressed by `uuid`. Timestamps are
/// milliseconds since the epoch taken from the configured [`ClockSource`].
pub struct MemoryManager {
    tables: RwLock<Tables>,
    clock: Arc<dyn ClockSource>,
    backdoor_port: Option<u16>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock: Arc::new(SystemClock),
            backdoor_port: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Port reported by `get_backdoor_port`.
    #[must_use]
    pub fn with_backdoor_port(mut self, port: u16) -> Self {
        self.backdoor_port = Some(port);
        self
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    fn stamp(&self, row: &mut Record) {
        let now = Value::Int(self.now());
        row.entry("created_at".to_string()).or_insert_with(|| now.clone());
        row.entry("updated_at".to_string()).or_insert(now);
    }

    /// Insert an instance, filling in `id`, `uuid` and timestamps if absent.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_instance(&self, mut instance: Record) -> ConductorResult<Record> {
        self.stamp(&mut instance);
        instance
            .entry("uuid".to_string())
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        let mut tables = self.tables.write();
        let id = tables.assign_id(&mut instance)?;
        tables.instances.insert(id, instance.clone());
        Ok(instance)
    }

    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_instance_type(&self, mut instance_type: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        let id = tables.assign_id(&mut instance_type)?;
        tables.instance_types.insert(id, instance_type.clone());
        Ok(instance_type)
    }

    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_migration(&self, mut migration: Record) -> ConductorResult<Record> {
        self.stamp(&mut migration);
        let mut tables = self.tables.write();
        let id = tables.assign_id(&mut migration)?;
        tables.migrations.insert(id, migration.clone());
        Ok(migration)
    }

    /// Insert an aggregate with empty `hosts` and `metadata` unless given.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_aggregate(&self, mut aggregate: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        let id = tables.assign_id(&mut aggregate)?;
        let aggregate = Aggregate::from_record(aggregate);
        let row = aggregate.to_record();
        tables.aggregates.insert(id, aggregate);
        Ok(row)
    }

    /// Insert a security group and attach it to the given instances.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_security_group(
        &self,
        mut group: Record,
        instance_uuids: &[&str],
    ) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        let id = tables.assign_id(&mut group)?;
        tables.security_groups.insert(id, group.clone());
        tables
            .security_group_members
            .extend(instance_uuids.iter().map(|uuid| ((*uuid).to_string(), id)));
        Ok(group)
    }

    /// Insert a rule; `parent_group_id` names the group it belongs to.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_security_group_rule(&self, mut rule: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        tables.assign_id(&mut rule)?;
        tables.security_group_rules.push(rule.clone());
        Ok(rule)
    }

    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_provider_fw_rule(&self, mut rule: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        tables.assign_id(&mut rule)?;
        tables.provider_fw_rules.push(rule.clone());
        Ok(rule)
    }

    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_agent_build(&self, mut build: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        tables.assign_id(&mut build)?;
        tables.agent_builds.push(build.clone());
        Ok(build)
    }

    /// # Errors
    ///
    /// `InvalidRequest` once record ids are exhausted.
    pub fn seed_service(&self, mut service: Record) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        tables.assign_id(&mut service)?;
        tables.services.push(service.clone());
        Ok(service)
    }

    /// Snapshot of the volume usage row for `vol_id`.
    #[must_use]
    pub fn vol_usage(&self, vol_id: &str) -> Option<Record> {
        self.tables.read().vol_usage.get(vol_id).cloned()
    }
}

#[async_trait]
impl ConductorManager for MemoryManager {
    async fn ping(&self, _ctx: &RequestContext, arg: Value) -> ConductorResult<Value> {
        Ok(Value::Map(record([
            ("service", Value::from("conductor")),
            ("arg", arg),
        ])))
    }

    async fn instance_update(
        &self,
        _ctx: &RequestContext,
        instance_uuid: &str,
        updates: Record,
    ) -> ConductorResult<Record> {
        if let Some(key) = ["id", "uuid"].into_iter().find(|key| updates.contains_key(*key)) {
            return Err(DomainError::invalid_request_because(&format!(
                "instance {key} cannot be updated"
            ))
            .into());
        }
        let now = self.now();
        let mut tables = self.tables.write();
        let instance = tables
            .instance_by_uuid_mut(instance_uuid)
            .ok_or_else(|| DomainError::instance_not_found(instance_uuid))?;
        instance.extend(updates);
        instance.insert("updated_at".to_string(), Value::Int(now));
        debug!(instance_uuid, "instance updated");
        Ok(instance.clone())
    }

    async fn instance_get(&self, _ctx: &RequestContext, instance_id: i64) -> ConductorResult<Record> {
        self.tables
            .read()
            .instances
            .get(&instance_id)
            .cloned()
            .ok_or_else(|| DomainError::instance_not_found(instance_id).into())
    }

    async fn instance_get_by_uuid(
        &self,
        _ctx: &RequestContext,
        instance_uuid: &str,
    ) -> ConductorResult<Record> {
        self.tables
            .read()
            .instance_by_uuid(instance_uuid)
            .cloned()
            .ok_or_else(|| DomainError::instance_not_found(instance_uuid).into())
    }

    async fn instance_destroy(&self, _ctx: &RequestContext, instance: Record) -> ConductorResult<()> {
        let uuid = required_str(&instance, "uuid")?;
        let mut tables = self.tables.write();
        let id = tables
            .instances
            .iter()
            .find(|(_, row)| str_field(row, "uuid") == Some(uuid.as_str()))
            .map(|(id, _)| *id)
            .ok_or_else(|| DomainError::instance_not_found(&uuid))?;
        tables.instances.remove(&id);
        tables.security_group_members.retain(|(member, _)| *member != uuid);
        debug!(instance_uuid = %uuid, "instance destroyed");
        Ok(())
    }

    async fn instance_get_all(&self, _ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        Ok(self.tables.read().instances.values().cloned().collect())
    }

    async fn instance_get_all_by_host(
        &self,
        _ctx: &RequestContext,
        host: &str,
    ) -> ConductorResult<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .instances
            .values()
            .filter(|row| str_field(row, "host") == Some(host))
            .cloned()
            .collect())
    }

    async fn instance_get_all_by_filters(
        &self,
        _ctx: &RequestContext,
        filters: Record,
        sort: SortOrder,
    ) -> ConductorResult<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .tables
            .read()
            .instances
            .values()
            .filter(|row| filters.iter().all(|(key, want)| field(row, key) == want))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let order = field(a, &sort.key).sort_cmp(field(b, &sort.key));
            match sort.dir {
                SortDirection::Asc => order,
                SortDirection::Desc => order.reverse(),
            }
        });
        Ok(rows)
    }

    async fn instance_get_all_hung_in_rebooting(
        &self,
        _ctx: &RequestContext,
        timeout_secs: u64,
    ) -> ConductorResult<Vec<Record>> {
        let now = self.now();
        let age = secs_to_ms(timeout_secs);
        Ok(self
            .tables
            .read()
            .instances
            .values()
            .filter(|row| str_field(row, "task_state") == Some("rebooting"))
            .filter(|row| older_than(int_field(row, "updated_at"), now, age))
            .cloned()
            .collect())
    }

    async fn instance_get_active_by_window(
        &self,
        _ctx: &RequestContext,
        begin_ms: i64,
        end_ms: Option<i64>,
        project_id: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        let active = |row: &Record| {
            let launched = int_field(row, "launched_at")
                .is_some_and(|at| end_ms.is_none_or(|end| at <= end));
            let not_gone = int_field(row, "terminated_at").is_none_or(|at| at >= begin_ms);
            launched && not_gone
        };
        Ok(self
            .tables
            .read()
            .instances
            .values()
            .filter(|row| active(row))
            .filter(|row| {
                project_id
                    .as_deref()
                    .is_none_or(|p| str_field(row, "project_id") == Some(p))
            })
            .filter(|row| host.as_deref().is_none_or(|h| str_field(row, "host") == Some(h)))
            .cloned()
            .collect())
    }

    async fn instance_info_cache_delete(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<()> {
        let uuid = required_str(&instance, "uuid")?;
        if let Some(row) = self.tables.write().instance_by_uuid_mut(&uuid) {
            row.remove("info_cache");
        }
        Ok(())
    }

    async fn instance_type_get(
        &self,
        _ctx: &RequestContext,
        instance_type_id: i64,
    ) -> ConductorResult<Record> {
        self.tables
            .read()
            .instance_types
            .get(&instance_type_id)
            .cloned()
            .ok_or_else(|| DomainError::instance_type_not_found(instance_type_id).into())
    }

    async fn migration_get(&self, _ctx: &RequestContext, migration_id: i64) -> ConductorResult<Record> {
        self.tables
            .read()
            .migrations
            .get(&migration_id)
            .cloned()
            .ok_or_else(|| DomainError::migration_not_found(migration_id).into())
    }

    async fn migration_get_unconfirmed_by_dest_compute(
        &self,
        _ctx: &RequestContext,
        confirm_window_secs: u64,
        dest_compute: &str,
    ) -> ConductorResult<Vec<Record>> {
        let now = self.now();
        let age = secs_to_ms(confirm_window_secs);
        Ok(self
            .tables
            .read()
            .migrations
            .values()
            .filter(|row| str_field(row, "status") == Some("finished"))
            .filter(|row| str_field(row, "dest_compute") == Some(dest_compute))
            .filter(|row| older_than(int_field(row, "updated_at"), now, age))
            .cloned()
            .collect())
    }

    async fn migration_update(
        &self,
        _ctx: &RequestContext,
        migration: Record,
        status: &str,
    ) -> ConductorResult<Record> {
        let id = id_of(&migration)?;
        let now = self.now();
        let mut tables = self.tables.write();
        let row = tables
            .migrations
            .get_mut(&id)
            .ok_or_else(|| DomainError::migration_not_found(id))?;
        row.insert("status".to_string(), Value::from(status));
        row.insert("updated_at".to_string(), Value::Int(now));
        Ok(row.clone())
    }

    async fn aggregate_host_add(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        let row = tables.aggregate_mut(&aggregate)?;
        if row.hosts.iter().any(|h| h == host) {
            return Err(DomainError::aggregate_host_exists(row.id(), host).into());
        }
        row.hosts.push(host.to_string());
        Ok(row.to_record())
    }

    async fn aggregate_host_delete(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        host: &str,
    ) -> ConductorResult<()> {
        let mut tables = self.tables.write();
        let row = tables.aggregate_mut(&aggregate)?;
        let before = row.hosts.len();
        row.hosts.retain(|h| h != host);
        if row.hosts.len() == before {
            return Err(DomainError::aggregate_host_not_found(row.id(), host).into());
        }
        Ok(())
    }

    async fn aggregate_get(&self, _ctx: &RequestContext, aggregate_id: i64) -> ConductorResult<Record> {
        self.tables
            .read()
            .aggregates
            .get(&aggregate_id)
            .map(Aggregate::to_record)
            .ok_or_else(|| DomainError::aggregate_not_found(aggregate_id).into())
    }

    async fn aggregate_get_by_host(
        &self,
        _ctx: &RequestContext,
        host: &str,
        key: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .aggregates
            .values()
            .filter(|row| row.hosts.iter().any(|h| h == host))
            .filter(|row| key.as_deref().is_none_or(|k| row.metadata.contains_key(k)))
            .map(Aggregate::to_record)
            .collect())
    }

    async fn aggregate_metadata_add(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        metadata: Record,
        set_delete: bool,
    ) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        let row = tables.aggregate_mut(&aggregate)?;
        if set_delete {
            row.metadata = metadata;
        } else {
            row.metadata.extend(metadata);
        }
        Ok(row.metadata.clone())
    }

    async fn aggregate_metadata_delete(
        &self,
        _ctx: &RequestContext,
        aggregate: Record,
        key: &str,
    ) -> ConductorResult<()> {
        let mut tables = self.tables.write();
        let row = tables.aggregate_mut(&aggregate)?;
        match row.metadata.remove(key) {
            Some(_) => Ok(()),
            None => Err(DomainError::aggregate_metadata_not_found(row.id(), key).into()),
        }
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
        let key = (uuid.to_string(), mac.to_string(), start_period);
        let mut tables = self.tables.write();
        if let Some(counters) = counters {
            let refreshed = last_refreshed.unwrap_or_else(|| self.now());
            let row = tables.bw_usage.entry(key.clone()).or_insert_with(|| {
                record([
                    ("uuid", Value::from(uuid)),
                    ("mac", Value::from(mac)),
                    ("start_period", Value::Int(start_period)),
                ])
            });
            row.extend(record([
                ("bw_in", counters.bw_in),
                ("bw_out", counters.bw_out),
                ("last_ctr_in", counters.last_ctr_in),
                ("last_ctr_out", counters.last_ctr_out),
                ("last_refreshed", refreshed),
            ]));
        }
        Ok(tables.bw_usage.get(&key).cloned())
    }

    async fn get_backdoor_port(&self, _ctx: &RequestContext) -> ConductorResult<Option<u16>> {
        Ok(self.backdoor_port)
    }

    async fn security_group_get_by_instance(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        let uuid = required_str(&instance, "uuid")?;
        let tables = self.tables.read();
        Ok(tables
            .security_group_members
            .iter()
            .filter(|(member, _)| *member == uuid)
            .filter_map(|(_, id)| tables.security_groups.get(id).cloned())
            .collect())
    }

    async fn security_group_rule_get_by_security_group(
        &self,
        _ctx: &RequestContext,
        secgroup: Record,
    ) -> ConductorResult<Vec<Record>> {
        let id = id_of(&secgroup)?;
        Ok(self
            .tables
            .read()
            .security_group_rules
            .iter()
            .filter(|rule| int_field(rule, "parent_group_id") == Some(id))
            .cloned()
            .collect())
    }

    async fn provider_fw_rule_get_all(&self, _ctx: &RequestContext) -> ConductorResult<Vec<Record>> {
        Ok(self.tables.read().provider_fw_rules.clone())
    }

    async fn agent_build_get_by_triple(
        &self,
        _ctx: &RequestContext,
        hypervisor: &str,
        os: &str,
        architecture: &str,
    ) -> ConductorResult<Option<Record>> {
        Ok(self
            .tables
            .read()
            .agent_builds
            .iter()
            .find(|row| {
                str_field(row, "hypervisor") == Some(hypervisor)
                    && str_field(row, "os") == Some(os)
                    && str_field(row, "architecture") == Some(architecture)
            })
            .cloned())
    }

    async fn block_device_mapping_update_or_create(
        &self,
        _ctx: &RequestContext,
        mut values: Record,
        create: Option<bool>,
    ) -> ConductorResult<Record> {
        let mut tables = self.tables.write();
        match create {
            Some(true) => {
                values.remove("id");
                let id = tables.assign_id(&mut values)?;
                tables.block_device_mappings.insert(id, values.clone());
                debug!(bdm_id = id, "block device mapping created");
                Ok(values)
            }
            Some(false) => {
                let id = id_of(&values)?;
                let row = tables
                    .block_device_mappings
                    .get_mut(&id)
                    .ok_or_else(|| DomainError::block_device_mapping_not_found(id))?;
                row.extend(values);
                Ok(row.clone())
            }
            None => {
                let instance_uuid = required_str(&values, "instance_uuid")?;
                let device_name = required_str(&values, "device_name")?;
                let existing = tables.block_device_mappings.values_mut().find(|row| {
                    str_field(row, "instance_uuid") == Some(instance_uuid.as_str())
                        && str_field(row, "device_name") == Some(device_name.as_str())
                });
                if let Some(row) = existing {
                    values.remove("id");
                    row.extend(values);
                    return Ok(row.clone());
                }
                values.remove("id");
                let id = tables.assign_id(&mut values)?;
                tables.block_device_mappings.insert(id, values.clone());
                Ok(values)
            }
        }
    }

    async fn block_device_mapping_get_all_by_instance(
        &self,
        _ctx: &RequestContext,
        instance: Record,
    ) -> ConductorResult<Vec<Record>> {
        let uuid = required_str(&instance, "uuid")?;
        Ok(self
            .tables
            .read()
            .block_device_mappings
            .values()
            .filter(|row| str_field(row, "instance_uuid") == Some(uuid.as_str()))
            .cloned()
            .collect())
    }

    async fn block_device_mapping_destroy(
        &self,
        _ctx: &RequestContext,
        target: BdmDestroyTarget,
    ) -> ConductorResult<()> {
        let mut tables = self.tables.write();
        match target {
            BdmDestroyTarget::Mappings { bdms } => {
                for bdm in &bdms {
                    tables.block_device_mappings.remove(&id_of(bdm)?);
                }
            }
            BdmDestroyTarget::InstanceDevice {
                instance,
                device_name,
            } => {
                let uuid = required_str(&instance, "uuid")?;
                tables.block_device_mappings.retain(|_, row| {
                    !(str_field(row, "instance_uuid") == Some(uuid.as_str())
                        && str_field(row, "device_name") == Some(device_name.as_str()))
                });
            }
            BdmDestroyTarget::InstanceVolume {
                instance,
                volume_id,
            } => {
                let uuid = required_str(&instance, "uuid")?;
                tables.block_device_mappings.retain(|_, row| {
                    !(str_field(row, "instance_uuid") == Some(uuid.as_str())
                        && str_field(row, "volume_id") == Some(volume_id.as_str()))
                });
            }
        }
        Ok(())
    }

    async fn vol_get_usage_by_time(
        &self,
        _ctx: &RequestContext,
        start_time: i64,
    ) -> ConductorResult<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .vol_usage
            .values()
            .filter(|row| int_field(row, "last_refreshed").is_some_and(|at| at >= start_time))
            .cloned()
            .collect())
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
        let instance_uuid = required_str(&instance, "uuid")?;
        let refreshed = last_refreshed.unwrap_or_else(|| self.now());
        let mut tables = self.tables.write();
        let row = tables
            .vol_usage
            .entry(vol_id.to_string())
            .or_insert_with(|| record([("volume_id", vol_id)]));
        row.extend(record([
            ("instance_uuid", Value::from(instance_uuid)),
            ("curr_reads", Value::Int(counters.rd_req)),
            ("curr_read_bytes", Value::Int(counters.rd_bytes)),
            ("curr_writes", Value::Int(counters.wr_req)),
            ("curr_write_bytes", Value::Int(counters.wr_bytes)),
            ("last_refreshed", Value::Int(refreshed)),
        ]));
        if update_totals {
            add_counter(row, "tot_reads", counters.rd_req);
            add_counter(row, "tot_read_bytes", counters.rd_bytes);
            add_counter(row, "tot_writes", counters.wr_req);
            add_counter(row, "tot_write_bytes", counters.wr_bytes);
        }
        Ok(())
    }

    async fn service_get_all_by(
        &self,
        _ctx: &RequestContext,
        topic: Option<String>,
        host: Option<String>,
    ) -> ConductorResult<Vec<Record>> {
        let rows: Vec<Record> = self
            .tables
            .read()
            .services
            .iter()
            .filter(|row| topic.as_deref().is_none_or(|t| str_field(row, "topic") == Some(t)))
            .filter(|row| host.as_deref().is_none_or(|h| str_field(row, "host") == Some(h)))
            .cloned()
            .collect();
        match (topic.as_deref(), host.as_deref()) {
            (Some(COMPUTE_TOPIC), Some(host)) if rows.is_empty() => {
                Err(DomainError::compute_host_not_found(host).into())
            }
            _ => Ok(rows),
        }
    }

    async fn action_event_start(
        &self,
        _ctx: &RequestContext,
        mut values: Record,
    ) -> ConductorResult<Record> {
        let instance_uuid = required_str(&values, "instance_uuid")?;
        required_str(&values, "request_id")?;
        required_str(&values, "event")?;
        let now = self.now();
        values.entry("start_time".to_string()).or_insert(Value::Int(now));
        values.insert("finish_time".to_string(), Value::Null);
        let mut tables = self.tables.write();
        values.remove("id");
        tables.assign_id(&mut values)?;
        tables.action_events.push(values.clone());
        debug!(%instance_uuid, event = ?values.get("event"), "action event started");
        Ok(values)
    }

    async fn action_event_finish(
        &self,
        _ctx: &RequestContext,
        mut values: Record,
    ) -> ConductorResult<Record> {
        let instance_uuid = required_str(&values, "instance_uuid")?;
        let request_id = required_str(&values, "request_id")?;
        let event = required_str(&values, "event")?;
        let now = self.now();
        let mut tables = self.tables.write();
        let row = tables
            .action_events
            .iter_mut()
            .rev()
            .find(|row| {
                str_field(row, "instance_uuid") == Some(instance_uuid.as_str())
                    && str_field(row, "request_id") == Some(request_id.as_str())
                    && str_field(row, "event") == Some(event.as_str())
                    && field(row, "finish_time").is_null()
            })
            .ok_or_else(|| DomainError::instance_action_not_found(&request_id, &instance_uuid))?;
        values.remove("id");
        values.entry("finish_time".to_string()).or_insert(Value::Int(now));
        row.extend(values);
        Ok(row.clone())
    }
}
