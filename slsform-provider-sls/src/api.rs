//! Log service management API
//!
//! `SlsApi` is the client handle every handler talks to. It is passed
//! explicitly into [`crate::SlsProvider`]; nothing in this crate keeps a
//! process-wide client.

use async_trait::async_trait;

use crate::error::SlsResult;
use crate::model::{CollectionPolicy, Dashboard, MachineGroup};

/// Remote operations of the log service used by the resource handlers
///
/// Every method is a single request. Implementations report failures as
/// [`crate::SlsError`]s carrying the service's error code.
#[async_trait]
pub trait SlsApi: Send + Sync {
    // Dashboards
    async fn get_dashboard(&self, project: &str, name: &str) -> SlsResult<Dashboard>;
    async fn create_dashboard(&self, project: &str, dashboard: &Dashboard) -> SlsResult<()>;
    async fn update_dashboard(&self, project: &str, dashboard: &Dashboard) -> SlsResult<()>;
    async fn delete_dashboard(&self, project: &str, name: &str) -> SlsResult<()>;

    // Machine groups
    async fn get_machine_group(&self, project: &str, name: &str) -> SlsResult<MachineGroup>;
    async fn create_machine_group(&self, project: &str, group: &MachineGroup) -> SlsResult<()>;
    async fn update_machine_group(&self, project: &str, group: &MachineGroup) -> SlsResult<()>;
    async fn delete_machine_group(&self, project: &str, name: &str) -> SlsResult<()>;

    // Logtail configs applied to machine groups
    async fn get_applied_configs(&self, project: &str, group: &str) -> SlsResult<Vec<String>>;
    async fn apply_config_to_machine_group(
        &self,
        project: &str,
        config: &str,
        group: &str,
    ) -> SlsResult<()>;
    async fn remove_config_from_machine_group(
        &self,
        project: &str,
        config: &str,
        group: &str,
    ) -> SlsResult<()>;

    // Collection policies
    async fn get_collection_policy(&self, name: &str) -> SlsResult<CollectionPolicy>;
    async fn upsert_collection_policy(&self, policy: &CollectionPolicy) -> SlsResult<()>;
    async fn delete_collection_policy(&self, name: &str) -> SlsResult<()>;
}
