//! In-process log service
//!
//! `MemorySls` keeps dashboards, machine groups, applied logtail configs and
//! collection policies in memory. Reads can lag behind writes by a
//! configurable number of requests, and errors can be queued per operation,
//! which makes it the test double for every handler. The CLI persists it to a
//! JSON file between runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::SlsApi;
use crate::error::{SlsError, SlsResult};
use crate::model::{CollectionPolicy, Dashboard, MachineGroup};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Store {
    /// Keyed by "project:dashboard_name"
    #[serde(default)]
    dashboards: BTreeMap<String, Dashboard>,
    /// Keyed by "project:group_name"
    #[serde(default)]
    machine_groups: BTreeMap<String, MachineGroup>,
    /// Config names applied to a group, keyed by "project:group_name"
    #[serde(default)]
    applied_configs: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    policies: BTreeMap<String, CollectionPolicy>,
}

#[derive(Debug, Default)]
struct Inner {
    latest: Store,
    visible: Store,
    lag: u32,
    stale_reads_left: u32,
    failures: HashMap<String, VecDeque<SlsError>>,
    calls: HashMap<String, u32>,
}

impl Inner {
    /// Count the call and pop an injected failure, if any
    fn enter(&mut self, op: &str) -> SlsResult<()> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Snapshot a read is served from
    fn read(&mut self) -> &Store {
        if self.stale_reads_left > 0 {
            self.stale_reads_left -= 1;
        } else {
            self.visible = self.latest.clone();
        }
        &self.visible
    }

    /// Apply a mutation to the latest snapshot
    fn write<T>(&mut self, mutate: impl FnOnce(&mut Store) -> SlsResult<T>) -> SlsResult<T> {
        let value = mutate(&mut self.latest)?;
        if self.lag == 0 {
            self.visible = self.latest.clone();
        } else {
            self.stale_reads_left = self.lag;
        }
        Ok(value)
    }
}

/// In-memory [`SlsApi`] implementation
#[derive(Debug, Default)]
pub struct MemorySls {
    inner: Mutex<Inner>,
}

impl MemorySls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `reads` stale reads after every mutation before it becomes visible
    pub fn with_lag(self, reads: u32) -> Self {
        self.lock().lag = reads;
        self
    }

    /// Make the next call of `op` (an [`SlsApi`] method name) fail with `err`
    ///
    /// Injected errors queue up; each call consumes one.
    pub fn fail_next(&self, op: &str, err: SlsError) {
        self.lock()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of calls made to `op` so far
    pub fn calls(&self, op: &str) -> u32 {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations
    pub fn total_calls(&self) -> u32 {
        self.lock().calls.values().sum()
    }

    /// Load a store saved by [`MemorySls::save`]; a missing file yields an empty store
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let store: Store = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Store::default(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                visible: store.clone(),
                latest: store,
                ..Inner::default()
            }),
        })
    }

    /// Persist the latest snapshot as JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.lock().latest)?;
        fs::write(path, content)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(project: &str, name: &str) -> String {
    format!("{}:{}", project, name)
}

fn not_exist(code: &str, what: &str, name: &str) -> SlsError {
    SlsError::new(code, format!("{} {} does not exist", what, name)).with_status(404)
}

fn already_exist(code: &str, what: &str, name: &str) -> SlsError {
    SlsError::new(code, format!("{} {} already exists", what, name)).with_status(400)
}

#[async_trait]
impl SlsApi for MemorySls {
    async fn get_dashboard(&self, project: &str, name: &str) -> SlsResult<Dashboard> {
        let mut inner = self.lock();
        inner.enter("get_dashboard")?;
        inner
            .read()
            .dashboards
            .get(&key(project, name))
            .cloned()
            .ok_or_else(|| not_exist("DashboardNotExist", "dashboard", name))
    }

    async fn create_dashboard(&self, project: &str, dashboard: &Dashboard) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("create_dashboard")?;
        inner.write(|store| {
            let k = key(project, &dashboard.dashboard_name);
            if store.dashboards.contains_key(&k) {
                return Err(already_exist(
                    "DashboardAlreadyExist",
                    "dashboard",
                    &dashboard.dashboard_name,
                ));
            }
            store.dashboards.insert(k, dashboard.clone());
            Ok(())
        })
    }

    async fn update_dashboard(&self, project: &str, dashboard: &Dashboard) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("update_dashboard")?;
        inner.write(|store| {
            match store.dashboards.get_mut(&key(project, &dashboard.dashboard_name)) {
                Some(existing) => {
                    *existing = dashboard.clone();
                    Ok(())
                }
                None => Err(not_exist(
                    "DashboardNotExist",
                    "dashboard",
                    &dashboard.dashboard_name,
                )),
            }
        })
    }

    async fn delete_dashboard(&self, project: &str, name: &str) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("delete_dashboard")?;
        inner.write(|store| {
            store
                .dashboards
                .remove(&key(project, name))
                .map(|_| ())
                .ok_or_else(|| not_exist("DashboardNotExist", "dashboard", name))
        })
    }

    async fn get_machine_group(&self, project: &str, name: &str) -> SlsResult<MachineGroup> {
        let mut inner = self.lock();
        inner.enter("get_machine_group")?;
        inner
            .read()
            .machine_groups
            .get(&key(project, name))
            .cloned()
            .ok_or_else(|| not_exist("MachineGroupNotExist", "machine group", name))
    }

    async fn create_machine_group(&self, project: &str, group: &MachineGroup) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("create_machine_group")?;
        inner.write(|store| {
            let k = key(project, &group.name);
            if store.machine_groups.contains_key(&k) {
                return Err(already_exist(
                    "MachineGroupAlreadyExist",
                    "machine group",
                    &group.name,
                ));
            }
            store.machine_groups.insert(k, group.clone());
            Ok(())
        })
    }

    async fn update_machine_group(&self, project: &str, group: &MachineGroup) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("update_machine_group")?;
        inner.write(|store| match store.machine_groups.get_mut(&key(project, &group.name)) {
            Some(existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => Err(not_exist("MachineGroupNotExist", "machine group", &group.name)),
        })
    }

    async fn delete_machine_group(&self, project: &str, name: &str) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("delete_machine_group")?;
        inner.write(|store| {
            let k = key(project, name);
            store.applied_configs.remove(&k);
            store
                .machine_groups
                .remove(&k)
                .map(|_| ())
                .ok_or_else(|| not_exist("MachineGroupNotExist", "machine group", name))
        })
    }

    async fn get_applied_configs(&self, project: &str, group: &str) -> SlsResult<Vec<String>> {
        let mut inner = self.lock();
        inner.enter("get_applied_configs")?;
        let store = inner.read();
        let k = key(project, group);
        if !store.machine_groups.contains_key(&k) {
            return Err(not_exist("MachineGroupNotExist", "machine group", group));
        }
        Ok(store
            .applied_configs
            .get(&k)
            .map(|configs| configs.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_config_to_machine_group(
        &self,
        project: &str,
        config: &str,
        group: &str,
    ) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("apply_config_to_machine_group")?;
        inner.write(|store| {
            let k = key(project, group);
            if !store.machine_groups.contains_key(&k) {
                return Err(not_exist("MachineGroupNotExist", "machine group", group));
            }
            store
                .applied_configs
                .entry(k)
                .or_default()
                .insert(config.to_string());
            Ok(())
        })
    }

    async fn remove_config_from_machine_group(
        &self,
        project: &str,
        config: &str,
        group: &str,
    ) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("remove_config_from_machine_group")?;
        inner.write(|store| {
            let k = key(project, group);
            if !store.machine_groups.contains_key(&k) {
                return Err(not_exist("MachineGroupNotExist", "machine group", group));
            }
            let removed = store
                .applied_configs
                .get_mut(&k)
                .is_some_and(|configs| configs.remove(config));
            if removed {
                Ok(())
            } else {
                Err(not_exist("ConfigNotExist", "config", config))
            }
        })
    }

    async fn get_collection_policy(&self, name: &str) -> SlsResult<CollectionPolicy> {
        let mut inner = self.lock();
        inner.enter("get_collection_policy")?;
        inner
            .read()
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| not_exist("PolicyNotExist", "collection policy", name))
    }

    async fn upsert_collection_policy(&self, policy: &CollectionPolicy) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("upsert_collection_policy")?;
        inner.write(|store| {
            let mut policy = policy.clone();
            if let Some(data_config) = policy.data_config.as_mut() {
                if data_config.data_project.is_empty() {
                    data_config.data_project =
                        format!("aliyun-product-data-{}", data_config.data_region);
                }
            }
            store.policies.insert(policy.policy_name.clone(), policy);
            Ok(())
        })
    }

    async fn delete_collection_policy(&self, name: &str) -> SlsResult<()> {
        let mut inner = self.lock();
        inner.enter("delete_collection_policy")?;
        inner.write(|store| {
            store
                .policies
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| not_exist("PolicyNotExist", "collection policy", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentifyType, MachineGroupAttribute};

    fn group(name: &str) -> MachineGroup {
        MachineGroup {
            name: name.to_string(),
            identify_type: IdentifyType::Ip,
            attribute: MachineGroupAttribute::default(),
            machine_list: vec!["10.0.0.1".to_string()],
        }
    }

    #[tokio::test]
    async fn writes_become_visible_after_lagging_reads() {
        let sls = MemorySls::new().with_lag(2);
        sls.create_machine_group("proj1", &group("grp1"))
            .await
            .unwrap();

        assert!(sls.get_machine_group("proj1", "grp1").await.is_err());
        assert!(sls.get_machine_group("proj1", "grp1").await.is_err());
        assert!(sls.get_machine_group("proj1", "grp1").await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let sls = MemorySls::new();
        sls.fail_next("get_dashboard", SlsError::new("ServerBusy", "busy"));

        let err = sls.get_dashboard("proj1", "dash1").await.unwrap_err();
        assert_eq!(err.code, "ServerBusy");

        let err = sls.get_dashboard("proj1", "dash1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(sls.calls("get_dashboard"), 2);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let sls = MemorySls::new();
        sls.create_machine_group("proj1", &group("grp1"))
            .await
            .unwrap();
        let err = sls
            .create_machine_group("proj1", &group("grp1"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn applying_config_requires_group() {
        let sls = MemorySls::new();
        let err = sls
            .apply_config_to_machine_group("proj1", "nginx", "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        sls.create_machine_group("proj1", &group("grp1"))
            .await
            .unwrap();
        sls.apply_config_to_machine_group("proj1", "nginx", "grp1")
            .await
            .unwrap();
        assert_eq!(
            sls.get_applied_configs("proj1", "grp1").await.unwrap(),
            vec!["nginx".to_string()]
        );
    }

    #[tokio::test]
    async fn store_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("service.json");

        let sls = MemorySls::new();
        sls.create_machine_group("proj1", &group("grp1"))
            .await
            .unwrap();
        sls.save(&path).unwrap();

        let loaded = MemorySls::load(&path).unwrap();
        assert_eq!(
            loaded.get_machine_group("proj1", "grp1").await.unwrap(),
            group("grp1")
        );

        let empty = MemorySls::load(&dir.path().join("missing.json")).unwrap();
        assert!(empty.get_machine_group("proj1", "grp1").await.is_err());
    }
}
