//! Log service Provider
//!
//! Manages dashboards, machine groups, logtail attachments and collection
//! policies of the log service, waiting out its eventual consistency.
//!
//! ## Module Structure
//!
//! - `api` - The `SlsApi` client trait every handler talks to
//! - `memory` - In-process `SlsApi` implementation
//! - `provider` - SlsProvider and the shared retry/poll plumbing
//! - `resources` - Resource type definitions
//! - `schemas` - Attribute schemas used for validation
//! - `utils` - Helper functions for value normalization

pub mod api;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod utils;

mod collection_policy;
mod dashboard;
mod logtail_attachment;
mod machine_group;

// Re-export main types
pub use api::SlsApi;
pub use config::SlsConfig;
pub use error::{SlsError, SlsErrorKind, SlsResult};
pub use memory::MemorySls;
pub use provider::SlsProvider;

use slsform_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use slsform_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for SlsProvider {
    fn name(&self) -> &'static str {
        "sls"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
