//! The Alias Registry: the slot table and its nine operations (spec.md
//! §4.D). This is the one subsystem in the crate with real state,
//! concurrency, and failure semantics — everything else is a thin adapter
//! around it.

pub mod kv;
pub mod model;

use crate::cloud::CloudClient;
use crate::config::ScalingGroupConfig;
use crate::error::{Error, Result};
use crate::registry::kv::Store;
use crate::registry::model::{InstanceData, MetricConfig};
use std::path::Path;
use tracing::{info, instrument, warn};

/// One alias and its current slot record, as returned by `list_groups` and
/// (indirectly) by the HTTP listing endpoint.
#[derive(Debug, Clone)]
pub struct SlotEntry {
    pub alias: String,
    pub data: InstanceData,
}

/// A configured group together with its current slot table, in slot order.
#[derive(Debug, Clone)]
pub struct GroupListing {
    pub group: String,
    pub slots: Vec<SlotEntry>,
}

#[derive(Clone)]
pub struct AliasRegistry {
    store: Store,
}

impl AliasRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { store: Store::open(path)? })
    }

    #[cfg(test)]
    pub fn open_temp() -> (Self, tempfile::TempDir) {
        let (store, dir) = Store::open_temp();
        (Self { store }, dir)
    }

    /// `4.D.1 Refresh(group, hostPrefix, slotCount)`: reconcile the stored
    /// slot table against the cloud's current instance list.
    #[instrument(skip(self, cloud), fields(group = %group_cfg.autoscaling_group_name))]
    pub async fn refresh(
        &self,
        cloud: &dyn CloudClient,
        group_cfg: &ScalingGroupConfig,
    ) -> Result<()> {
        let live = cloud.list_instances(&group_cfg.autoscaling_group_name).await?;
        let group = group_cfg.autoscaling_group_name.as_str();
        let host_prefix = group_cfg.host_prefix.as_str();
        let slot_count = group_cfg.autoscaling_count;

        // If a previous refresh ran with a larger `slotCount`, stray records
        // above the current count would otherwise survive forever and
        // violate invariant 1 (the alias key set must equal exactly
        // `1..=slotCount`). Find them ahead of the transaction so they can
        // be removed atomically alongside the rewrite below.
        let stray_keys: Vec<String> = self
            .store
            .scan_group(group, host_prefix)?
            .into_iter()
            .filter(|(key, _)| !matches!(kv::slot_number(key, group, host_prefix), Some(n) if n <= slot_count))
            .map(|(key, _)| key)
            .collect();

        let db = self.store.db();
        let result: std::result::Result<(), sled::transaction::TransactionError<Error>> = db
            .transaction(|tx| {
                for key in &stray_keys {
                    tx.remove(key.as_bytes())?;
                }

                let mut slots = Vec::with_capacity(slot_count as usize);
                for n in 1..=slot_count {
                    let key = kv::slot_key(group, host_prefix, n);
                    let data = match tx.get(key.as_bytes())? {
                        Some(bytes) => InstanceData::decode(&bytes)
                            .map_err(sled::transaction::ConflictableTransactionError::Abort)?,
                        None => InstanceData::empty(),
                    };
                    slots.push(data);
                }

                let existing_ids: std::collections::HashSet<&str> = slots
                    .iter()
                    .filter(|s| !s.is_empty_slot())
                    .map(|s| s.instance_id.as_str())
                    .collect();

                let mut used = vec![false; slots.len()];
                for (i, s) in slots.iter().enumerate() {
                    if !s.is_empty_slot() && live.iter().any(|l| l.instance_id == s.instance_id) {
                        used[i] = true;
                    }
                }

                let mut fresh: Vec<_> =
                    live.iter().filter(|l| !existing_ids.contains(l.instance_id.as_str())).collect();
                fresh.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));

                // A slot is available to a fresh instance as soon as it isn't
                // claimed by a retained instance this round — even if it still
                // holds a departed instance's stale record, since that
                // instance left in this very refresh pass. The newcomer
                // overwrites only `instance_id`/`ip` below, so the slot's
                // `metric_config` (whether from an empty slot or a just-
                // vacated one) is inherited either way.
                let mut dropped = Vec::new();
                for instance in fresh {
                    if let Some(idx) = (0..slots.len()).find(|&i| !used[i]) {
                        slots[idx].instance_id = instance.instance_id.clone();
                        slots[idx].ip = instance.ip.clone();
                        used[idx] = true;
                    } else {
                        dropped.push(instance.instance_id.clone());
                    }
                }

                for (i, slot) in slots.iter_mut().enumerate() {
                    if !used[i] {
                        slot.instance_id.clear();
                        slot.ip.clear();
                    }
                }

                for n in 1..=slot_count {
                    let key = kv::slot_key(group, host_prefix, n);
                    tx.insert(key.as_bytes(), slots[(n - 1) as usize].encode())?;
                }

                if !dropped.is_empty() {
                    warn!(group, dropped = ?dropped, "refresh: more live instances than slots, dropping excess");
                }

                Ok(())
            });

        result?;
        self.store.flush()?;
        info!(group, live = live.len(), slot_count, "refresh complete");
        Ok(())
    }

    /// `4.D.2 Register(group, hostPrefix, instanceId, ip)`.
    #[instrument(skip(self), fields(group = %group_cfg.autoscaling_group_name))]
    pub fn register(
        &self,
        group_cfg: &ScalingGroupConfig,
        instance_id: &str,
        ip: &str,
    ) -> Result<(String, InstanceData)> {
        let group = group_cfg.autoscaling_group_name.as_str();
        let host_prefix = group_cfg.host_prefix.as_str();
        let slot_count = group_cfg.autoscaling_count;

        let db = self.store.db();
        let outcome: std::result::Result<(u32, InstanceData), sled::transaction::TransactionError<Error>> =
            db.transaction(|tx| {
                let mut chosen: Option<u32> = None;
                let mut slots = Vec::with_capacity(slot_count as usize);
                for n in 1..=slot_count {
                    let key = kv::slot_key(group, host_prefix, n);
                    let data = match tx.get(key.as_bytes())? {
                        Some(bytes) => InstanceData::decode(&bytes)
                            .map_err(sled::transaction::ConflictableTransactionError::Abort)?,
                        None => InstanceData::empty(),
                    };
                    if data.instance_id == instance_id {
                        return Err(sled::transaction::ConflictableTransactionError::Abort(
                            Error::AlreadyRegistered,
                        ));
                    }
                    if chosen.is_none() && data.is_empty_slot() {
                        chosen = Some(n);
                    }
                    slots.push(data);
                }

                let Some(slot_n) = chosen else {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(Error::NoEmptySlot));
                };

                let mut data = slots[(slot_n - 1) as usize].clone();
                data.instance_id = instance_id.to_string();
                data.ip = ip.to_string();

                let key = kv::slot_key(group, host_prefix, slot_n);
                tx.insert(key.as_bytes(), data.encode())?;

                Ok((slot_n, data))
            });

        let (slot_n, data) = outcome?;
        self.store.flush()?;
        let alias = kv::alias(group, host_prefix, slot_n);
        info!(group, alias = %alias, instance_id, "registered");
        Ok((alias, data))
    }

    /// `4.D.3 Deregister(instanceId)`: locate the unique slot holding this
    /// instance id across every group and clear it.
    #[instrument(skip(self))]
    pub fn deregister(&self, instance_id: &str) -> Result<()> {
        let candidate = self
            .store
            .scan_all()?
            .into_iter()
            .find(|(_, data)| data.instance_id == instance_id)
            .map(|(key, _)| key);

        let Some(key) = candidate else {
            return Err(Error::NotRegistered);
        };

        let db = self.store.db();
        let result: std::result::Result<(), sled::transaction::TransactionError<Error>> =
            db.transaction(|tx| {
                let Some(bytes) = tx.get(key.as_bytes())? else {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(Error::NotRegistered));
                };
                let mut data = InstanceData::decode(&bytes)
                    .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                if data.instance_id != instance_id {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(Error::NotRegistered));
                }
                data.instance_id.clear();
                data.ip.clear();
                tx.insert(key.as_bytes(), data.encode())?;
                Ok(())
            });

        result?;
        self.store.flush()?;
        info!(instance_id, "deregistered");
        Ok(())
    }

    /// `4.D.4 DeleteGroup(group)`: remove every slot record whose key starts
    /// with `"ag-{group}-"`, as a single atomic batch. A group with no
    /// records is a no-op success.
    #[instrument(skip(self))]
    pub fn delete_group(&self, group: &str) -> Result<()> {
        let prefix = kv::group_only_prefix(group);
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for item in self.store.db().scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            batch.remove(key);
            removed += 1;
        }
        self.store.db().apply_batch(batch)?;
        self.store.flush()?;
        info!(group, removed, "deleted group");
        Ok(())
    }

    /// `4.D.5 SetMetricConfig(group, metricConfig)`: stamp a copy of
    /// `metric_config` onto every slot of `group`, with each entry's
    /// `hostname` overwritten to that slot's own alias.
    #[instrument(skip(self, metric_config), fields(group = %group_cfg.autoscaling_group_name))]
    pub fn set_metric_config(
        &self,
        group_cfg: &ScalingGroupConfig,
        metric_config: &MetricConfig,
    ) -> Result<()> {
        let group = group_cfg.autoscaling_group_name.as_str();
        let host_prefix = group_cfg.host_prefix.as_str();
        let slot_count = group_cfg.autoscaling_count;

        let db = self.store.db();
        let result: std::result::Result<(), sled::transaction::TransactionError<Error>> =
            db.transaction(|tx| {
                for n in 1..=slot_count {
                    let key = kv::slot_key(group, host_prefix, n);
                    let mut data = match tx.get(key.as_bytes())? {
                        Some(bytes) => InstanceData::decode(&bytes)
                            .map_err(sled::transaction::ConflictableTransactionError::Abort)?,
                        None => InstanceData::empty(),
                    };
                    let alias = kv::alias(group, host_prefix, n);
                    let mut copy = metric_config.clone();
                    for entry in copy.metrics.iter_mut() {
                        entry.hostname = alias.clone();
                    }
                    data.metric_config = copy;
                    tx.insert(key.as_bytes(), data.encode())?;
                }
                Ok(())
            });

        result?;
        self.store.flush()?;
        info!(group, "metric config updated");
        Ok(())
    }

    /// `4.D.6 CompareInstances(group, hostPrefix)`: live instance ids not
    /// present in any slot record of the group.
    pub async fn compare_instances(
        &self,
        cloud: &dyn CloudClient,
        group_cfg: &ScalingGroupConfig,
    ) -> Result<Vec<String>> {
        if group_cfg.autoscaling_group_name.is_empty() {
            return Err(Error::MissingGroupName);
        }
        let live = cloud.list_instances(&group_cfg.autoscaling_group_name).await?;
        let known = self.store.scan_group(&group_cfg.autoscaling_group_name, &group_cfg.host_prefix)?;
        let known_ids: std::collections::HashSet<&str> =
            known.iter().map(|(_, data)| data.instance_id.as_str()).collect();
        Ok(live
            .into_iter()
            .filter(|l| !known_ids.contains(l.instance_id.as_str()))
            .map(|l| l.instance_id)
            .collect())
    }

    /// `4.D.7 ResolveAlias(alias)`.
    pub fn resolve_alias(&self, alias: &str) -> Result<String> {
        let key = kv::key_for_alias(alias);
        match self.store.get(&key)? {
            Some(data) => Ok(data.ip),
            None => Err(Error::AliasNotFound(alias.to_string())),
        }
    }

    /// `4.D.8 ListGroups()`: for each configured group, its slot table in
    /// slot order.
    pub fn list_group(&self, group_cfg: &ScalingGroupConfig) -> Result<GroupListing> {
        let rows = self.store.scan_group(&group_cfg.autoscaling_group_name, &group_cfg.host_prefix)?;
        let slots = rows
            .into_iter()
            .map(|(key, data)| SlotEntry {
                alias: key.trim_start_matches(kv::KEY_PREFIX).to_string(),
                data,
            })
            .collect();
        Ok(GroupListing { group: group_cfg.autoscaling_group_name.clone(), slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{FakeCloudClient, LiveInstance};

    fn group_cfg(name: &str, count: u32, prefix: &str) -> ScalingGroupConfig {
        ScalingGroupConfig {
            autoscaling_group_name: name.to_string(),
            autoscaling_count: count,
            host_prefix: prefix.to_string(),
        }
    }

    fn instances(ids_ips: &[(&str, &str)]) -> Vec<LiveInstance> {
        ids_ips
            .iter()
            .map(|(id, ip)| LiveInstance { instance_id: id.to_string(), ip: ip.to_string() })
            .collect()
    }

    #[tokio::test]
    async fn s1_full_refresh_binds_every_slot() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("dummy-prod-ag", 10, "dummy-prod-app");
        let cloud = FakeCloudClient::new();

        let ids = ["aaaaaa", "bbbbbb", "cccccc", "dddddd", "eeeeee", "ffffff", "gggggg", "hhhhhh", "iiiiii", "jjjjjj"];
        let pairs: Vec<(String, String)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("i-{id}"), format!("192.0.2.{}", 11 + i)))
            .collect();
        let live = pairs.iter().map(|(id, ip)| LiveInstance { instance_id: id.clone(), ip: ip.clone() }).collect();
        cloud.set_group("dummy-prod-ag", live);

        registry.refresh(&cloud, &cfg).await.unwrap();

        let listing = registry.list_group(&cfg).unwrap();
        assert_eq!(listing.slots.len(), 10);
        assert!(listing.slots.iter().all(|s| !s.data.is_empty_slot()));

        let diff = registry.compare_instances(&cloud, &cfg).await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn s2_partial_refresh_leaves_empty_slots() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("dummy-prod-ag", 10, "dummy-prod-app");
        let cloud = FakeCloudClient::new();
        let present = ["aaaaaa", "cccccc", "eeeeee", "ffffff", "gggggg", "hhhhhh", "jjjjjj"];
        let live = present
            .iter()
            .enumerate()
            .map(|(i, id)| LiveInstance { instance_id: format!("i-{id}"), ip: format!("192.0.2.{}", 11 + i) })
            .collect();
        cloud.set_group("dummy-prod-ag", live);

        registry.refresh(&cloud, &cfg).await.unwrap();

        let listing = registry.list_group(&cfg).unwrap();
        let occupied = listing.slots.iter().filter(|s| !s.data.is_empty_slot()).count();
        assert_eq!(occupied, 7);
        assert_eq!(listing.slots.len() - occupied, 3);
    }

    #[tokio::test]
    async fn s3_ad_hoc_register_then_duplicate_fails() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("dummy-prod-ag", 20, "dummy-prod-app");
        let cloud = FakeCloudClient::new();
        let ids = ["aaaaaa", "bbbbbb", "cccccc", "dddddd", "eeeeee", "ffffff", "gggggg", "hhhhhh", "iiiiii", "jjjjjj"];
        let live = ids
            .iter()
            .enumerate()
            .map(|(i, id)| LiveInstance { instance_id: format!("i-{id}"), ip: format!("192.0.2.{}", 11 + i) })
            .collect();
        cloud.set_group("dummy-prod-ag", live);
        registry.refresh(&cloud, &cfg).await.unwrap();

        let (alias, data) = registry.register(&cfg, "i-zzzzzz", "192.0.2.99").unwrap();
        assert_eq!(alias, "dummy-prod-ag-dummy-prod-app-11");
        assert_eq!(data.instance_id, "i-zzzzzz");

        let err = registry.register(&cfg, "i-aaaaaa", "192.0.2.100").unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered));
    }

    #[tokio::test]
    async fn s4_register_into_full_group_fails() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("dummy-stg-ag", 4, "dummy-stg-app");
        let cloud = FakeCloudClient::new();
        let ids = ["aaaaaa", "bbbbbb", "cccccc", "dddddd"];
        let live = ids
            .iter()
            .enumerate()
            .map(|(i, id)| LiveInstance { instance_id: format!("i-{id}"), ip: format!("192.0.2.{}", 11 + i) })
            .collect();
        cloud.set_group("dummy-stg-ag", live);
        registry.refresh(&cloud, &cfg).await.unwrap();

        let err = registry.register(&cfg, "i-zzzzzz", "192.0.2.99").unwrap_err();
        assert!(matches!(err, Error::NoEmptySlot));
    }

    #[test]
    fn s5_deregister_unknown_fails() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let err = registry.deregister("i-zzzzzz").unwrap_err();
        assert!(matches!(err, Error::NotRegistered));
    }

    #[tokio::test]
    async fn s6_delete_group_then_scan_is_empty() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("dummy-prod-ag", 10, "dummy-prod-app");
        let cloud = FakeCloudClient::new();
        cloud.set_group("dummy-prod-ag", instances(&[("i-aaaaaa", "192.0.2.11")]));
        registry.refresh(&cloud, &cfg).await.unwrap();

        registry.delete_group("dummy-prod-ag").unwrap();

        let rows = registry.store.scan_group("dummy-prod-ag", "dummy-prod-app").unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn register_then_deregister_preserves_metric_config() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("g", 4, "app");
        registry.register(&cfg, "i-aaaaaa", "192.0.2.1").unwrap();

        let metric_config = MetricConfig {
            metrics: vec![model::MetricEntry { name: "cpu".into(), hostname: String::new() }],
        };
        registry.set_metric_config(&cfg, &metric_config).unwrap();

        registry.deregister("i-aaaaaa").unwrap();

        let listing = registry.list_group(&cfg).unwrap();
        let slot = &listing.slots[0];
        assert!(slot.data.is_empty_slot());
        assert_eq!(slot.data.metric_config.metrics[0].name, "cpu");
    }

    #[tokio::test]
    async fn set_metric_config_stamps_alias_as_hostname() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("g", 2, "app");
        let cloud = FakeCloudClient::new();
        cloud.set_group("g", instances(&[("i-aaaaaa", "192.0.2.1"), ("i-bbbbbb", "192.0.2.2")]));
        registry.refresh(&cloud, &cfg).await.unwrap();

        let metric_config = MetricConfig {
            metrics: vec![model::MetricEntry { name: "cpu".into(), hostname: "irrelevant".into() }],
        };
        registry.set_metric_config(&cfg, &metric_config).unwrap();

        let listing = registry.list_group(&cfg).unwrap();
        for slot in &listing.slots {
            assert_eq!(slot.data.metric_config.metrics[0].hostname, slot.alias);
        }
    }

    #[tokio::test]
    async fn refresh_reassigns_a_slot_vacated_in_the_same_pass() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("g", 2, "app");
        let cloud = FakeCloudClient::new();

        cloud.set_group("g", instances(&[("i-x", "192.0.2.1"), ("i-z", "192.0.2.2")]));
        registry.refresh(&cloud, &cfg).await.unwrap();

        let metric_config = MetricConfig {
            metrics: vec![model::MetricEntry { name: "cpu".into(), hostname: String::new() }],
        };
        registry.set_metric_config(&cfg, &metric_config).unwrap();

        // X leaves, Y joins, Z stays. Y must claim X's now-vacant slot
        // instead of being dropped as excess.
        cloud.set_group("g", instances(&[("i-z", "192.0.2.2"), ("i-y", "192.0.2.3")]));
        registry.refresh(&cloud, &cfg).await.unwrap();

        let listing = registry.list_group(&cfg).unwrap();
        assert!(listing.slots.iter().all(|s| !s.data.is_empty_slot()));
        let bound_ids: Vec<_> = listing.slots.iter().map(|s| s.data.instance_id.as_str()).collect();
        assert!(bound_ids.contains(&"i-y"));
        assert!(bound_ids.contains(&"i-z"));
        assert!(!bound_ids.contains(&"i-x"));

        let diff = registry.compare_instances(&cloud, &cfg).await.unwrap();
        assert!(diff.is_empty(), "Y must not be reported as dropped excess: {diff:?}");

        // Y inherits X's slot's metric_config (stamped above) rather than
        // getting an empty one.
        let ys_slot = listing.slots.iter().find(|s| s.data.instance_id == "i-y").unwrap();
        assert_eq!(ys_slot.data.metric_config.metrics[0].name, "cpu");
    }

    #[tokio::test]
    async fn refresh_is_idempotent_when_cloud_output_is_stable() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("g", 5, "app");
        let cloud = FakeCloudClient::new();
        cloud.set_group("g", instances(&[("i-aaaaaa", "192.0.2.1"), ("i-bbbbbb", "192.0.2.2")]));

        registry.refresh(&cloud, &cfg).await.unwrap();
        let first = registry.list_group(&cfg).unwrap();
        registry.refresh(&cloud, &cfg).await.unwrap();
        let second = registry.list_group(&cfg).unwrap();

        for (a, b) in first.slots.iter().zip(second.slots.iter()) {
            assert_eq!(a.data, b.data);
        }
    }

    #[tokio::test]
    async fn refresh_with_shrunk_slot_count_drops_stray_keys() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cloud = FakeCloudClient::new();
        cloud.set_group("g", instances(&[("i-aaaaaa", "192.0.2.1"), ("i-bbbbbb", "192.0.2.2")]));
        registry.refresh(&cloud, &group_cfg("g", 5, "app")).await.unwrap();
        assert_eq!(registry.store.scan_group("g", "app").unwrap().len(), 5);

        registry.refresh(&cloud, &group_cfg("g", 2, "app")).await.unwrap();
        let rows = registry.store.scan_group("g", "app").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|(_, data)| !data.is_empty_slot()));
    }

    #[tokio::test]
    async fn resolve_alias_returns_current_ip() {
        let (registry, _dir) = AliasRegistry::open_temp();
        let cfg = group_cfg("g", 3, "app");
        let (alias, data) = registry.register(&cfg, "i-aaaaaa", "192.0.2.5").unwrap();
        assert_eq!(registry.resolve_alias(&alias).unwrap(), data.ip);
        assert!(registry.resolve_alias("g-app-99").is_err());
    }
}
