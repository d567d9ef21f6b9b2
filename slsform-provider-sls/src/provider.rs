//! Log service Provider implementation
//!
//! This module contains the provider handle and the plumbing shared by the
//! resource handlers: schema validation, retried mutations, state polling and
//! dispatch by resource type.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use slsform_core::identifier::CompositeId;
use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::{Resource, ResourceId, State, Value};
use slsform_core::schema::validation_error;
use slsform_core::wait::{Fetched, StateConf, retry_mutate};

use crate::api::SlsApi;
use crate::config::SlsConfig;
use crate::error::{SlsError, SlsResult};
use crate::resources::{
    LOG_DASHBOARD, LOG_MACHINE_GROUP, LOGTAIL_ATTACHMENT, SLS_COLLECTION_POLICY, resource_type,
};

/// State label of an object that can be read back as requested
pub const AVAILABLE: &str = "Available";
/// State label of an object whose last change is not visible yet
pub const PENDING: &str = "Pending";

/// Log service Provider
///
/// Holds an explicit client handle; clone the `Arc` to share one client
/// between several providers.
pub struct SlsProvider {
    client: Arc<dyn SlsApi>,
    config: SlsConfig,
}

impl SlsProvider {
    pub fn new(client: Arc<dyn SlsApi>, config: SlsConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &dyn SlsApi {
        self.client.as_ref()
    }

    pub fn config(&self) -> &SlsConfig {
        &self.config
    }

    // =========================================================================
    // Shared Helpers
    // =========================================================================

    /// Validate desired attributes against the type's schema and fill defaults
    pub(crate) fn validated(&self, resource: &Resource) -> ProviderResult<HashMap<String, Value>> {
        let resource_type = resource_type(&resource.id.resource_type).ok_or_else(|| {
            ProviderError::validation(format!(
                "Unknown resource type: {}",
                resource.id.resource_type
            ))
        })?;
        let schema = resource_type.schema();
        schema
            .validate(&resource.attributes)
            .map_err(validation_error)?;
        Ok(schema.with_defaults(&resource.attributes))
    }

    /// Run a mutating request, retrying transient service errors
    pub(crate) async fn retry<T, F, Fut>(&self, timeout: Duration, operation: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SlsResult<T>>,
    {
        retry_mutate(
            operation,
            SlsError::is_retryable,
            timeout,
            self.config.backoff(),
        )
        .await
        .map_err(ProviderError::from)
    }

    /// Poll configuration waiting for `target`
    pub(crate) fn state_conf(&self, target: &[&str], timeout: Duration) -> StateConf {
        StateConf::new(target, timeout)
            .with_pending(&[PENDING])
            .with_poll_interval(self.config.poll_interval())
            .with_delay(self.config.poll_delay())
    }

    /// Poll configuration waiting for an object to disappear
    pub(crate) fn deletion_conf(&self, timeout: Duration) -> StateConf {
        StateConf::deletion(timeout)
            .with_pending(&[AVAILABLE, PENDING])
            .with_poll_interval(self.config.poll_interval())
            .with_delay(self.config.poll_delay())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Composite identifier the desired resource will have once created
    pub fn identifier_for(&self, resource: &Resource) -> ProviderResult<String> {
        let attrs = &resource.attributes;
        let id = match resource.id.resource_type.as_str() {
            LOG_DASHBOARD => CompositeId::from_parts([
                required_str(attrs, "project_name")?,
                required_str(attrs, "dashboard_name")?,
            ])?,
            LOG_MACHINE_GROUP => CompositeId::from_parts([
                required_str(attrs, "project")?,
                required_str(attrs, "name")?,
            ])?,
            LOGTAIL_ATTACHMENT => CompositeId::from_parts([
                required_str(attrs, "project")?,
                required_str(attrs, "logtail_config_name")?,
                required_str(attrs, "machine_group_name")?,
            ])?,
            SLS_COLLECTION_POLICY => {
                CompositeId::from_parts([required_str(attrs, "policy_name")?])?
            }
            other => return Err(unknown_type(other)),
        };
        Ok(id.build())
    }

    /// Bring desired attributes into the shape `read` reports them in
    ///
    /// Fills schema defaults, drops empty entries from nested blocks and
    /// re-encodes JSON documents compactly, so a desired resource can be
    /// compared attribute by attribute with its state.
    pub fn normalize(&self, resource: &Resource) -> ProviderResult<Resource> {
        let mut attributes = self
            .validated(resource)
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        for value in attributes.values_mut() {
            if let Value::Map(entries) = value {
                *entries = crate::utils::trim_block(std::mem::take(entries));
            }
        }
        if resource.id.resource_type == LOG_DASHBOARD {
            for key in ["char_list", "attribute"] {
                if let Some(Value::String(s)) = attributes.get(key) {
                    let normalized = crate::utils::normalize_json(s)?;
                    attributes.insert(key.to_string(), Value::String(normalized));
                }
            }
        }
        Ok(Resource {
            id: resource.id.clone(),
            attributes,
        })
    }

    /// Read a resource by its composite identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let identifier = match identifier {
            Some(identifier) => identifier,
            None => return Ok(State::not_found(id.clone())),
        };

        let result = match id.resource_type.as_str() {
            LOG_DASHBOARD => self.read_dashboard(id, identifier).await,
            LOG_MACHINE_GROUP => self.read_machine_group(id, identifier).await,
            LOGTAIL_ATTACHMENT => self.read_logtail_attachment(id, identifier).await,
            SLS_COLLECTION_POLICY => self.read_collection_policy(id, identifier).await,
            other => Err(unknown_type(other)),
        };

        result.map_err(|e| {
            e.for_resource(id.clone())
                .with_identifier(identifier)
                .in_operation("read")
        })
    }

    /// Create a resource and wait until it is visible
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let result = match resource.id.resource_type.as_str() {
            LOG_DASHBOARD => self.create_dashboard(resource).await,
            LOG_MACHINE_GROUP => self.create_machine_group(resource).await,
            LOGTAIL_ATTACHMENT => self.create_logtail_attachment(resource).await,
            SLS_COLLECTION_POLICY => self.create_collection_policy(resource).await,
            other => Err(unknown_type(other)),
        };

        result.map_err(|e| e.for_resource(resource.id.clone()).in_operation("create"))
    }

    /// Update a resource in place and wait until the change is visible
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let result = match id.resource_type.as_str() {
            LOG_DASHBOARD => self.update_dashboard(id, identifier, to).await,
            LOG_MACHINE_GROUP => self.update_machine_group(id, identifier, to).await,
            LOGTAIL_ATTACHMENT => Err(ProviderError::validation(
                "Logtail attachments cannot be updated in place, delete and recreate",
            )),
            SLS_COLLECTION_POLICY => self.update_collection_policy(id, identifier, to).await,
            other => Err(unknown_type(other)),
        };

        result.map_err(|e| {
            e.for_resource(id.clone())
                .with_identifier(identifier)
                .in_operation("update")
        })
    }

    /// Delete a resource and wait until it is gone
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let result = match id.resource_type.as_str() {
            LOG_DASHBOARD => self.delete_dashboard(identifier).await,
            LOG_MACHINE_GROUP => self.delete_machine_group(identifier).await,
            LOGTAIL_ATTACHMENT => self.delete_logtail_attachment(identifier).await,
            SLS_COLLECTION_POLICY => self.delete_collection_policy(identifier).await,
            other => Err(unknown_type(other)),
        };

        result.map_err(|e| {
            e.for_resource(id.clone())
                .with_identifier(identifier)
                .in_operation("delete")
        })
    }
}

/// Turn a single-object lookup into a poll observation
///
/// Objects without a state field of their own are `Available` once `ready`
/// accepts them, and `Pending` before that.
pub(crate) fn observe<T>(result: SlsResult<T>, ready: impl FnOnce(&T) -> bool) -> SlsResult<Fetched> {
    match result {
        Ok(object) if ready(&object) => Ok(Fetched::state(AVAILABLE)),
        Ok(_) => Ok(Fetched::state(PENDING)),
        Err(e) if e.is_not_found() => Ok(Fetched::NotFound),
        Err(e) => Err(e),
    }
}

/// Treat "not found" as success for a delete request
pub(crate) fn ignore_not_found(result: ProviderResult<()>) -> ProviderResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Required string attribute
pub(crate) fn required_str<'a>(
    attrs: &'a HashMap<String, Value>,
    key: &str,
) -> ProviderResult<&'a str> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::validation(format!("Required attribute '{}' is missing", key)))
}

/// Optional string attribute, empty when absent
pub(crate) fn optional_str(attrs: &HashMap<String, Value>, key: &str) -> String {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn unknown_type(resource_type: &str) -> ProviderError {
    ProviderError::validation(format!("Unknown resource type: {}", resource_type))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use slsform_core::differ::create_plan;
    use slsform_core::plan::Plan;
    use slsform_core::resource::Resource;

    use super::SlsProvider;
    use crate::schemas::all_schemas;

    /// Create `resource` as the CLI does, then plan it against the read-back
    pub(crate) async fn plan_after_create(provider: &SlsProvider, resource: &Resource) -> Plan {
        let desired = provider.normalize(resource).unwrap();
        let state = provider.create_resource(&desired).await.unwrap();
        let states = HashMap::from([(desired.id.clone(), state)]);
        let schemas: HashMap<_, _> = all_schemas()
            .into_iter()
            .map(|s| (s.resource_type.clone(), s))
            .collect();
        create_plan(std::slice::from_ref(&desired), &states, &schemas)
    }
}
