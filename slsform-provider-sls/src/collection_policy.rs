//! sls_collection_policy handlers
//!
//! Policies are written with a single upsert call. Unlike the other
//! resources they carry a real state, their `enabled` flag, which the poller
//! waits on as "enabled" or "disabled".

use std::collections::HashMap;

use slsform_core::identifier::CompositeId;
use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::{Resource, ResourceId, State, Value};
use slsform_core::wait::Fetched;

use crate::api::SlsApi;
use crate::error::SlsResult;
use crate::model::{
    CentralizeConfig, CollectionPolicy, DataConfig, PolicyConfig, ResourceDirectory,
};
use crate::provider::{PENDING, SlsProvider, ignore_not_found, required_str};
use crate::utils::{block, block_list, block_str, block_string_map};

pub const ENABLED: &str = "enabled";
pub const DISABLED: &str = "disabled";

fn state_label(enabled: bool) -> &'static str {
    if enabled { ENABLED } else { DISABLED }
}

impl SlsProvider {
    pub(crate) async fn read_collection_policy(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [name] = CompositeId::split::<1>(identifier)?;
        match self.client().get_collection_policy(&name).await {
            Ok(policy) => Ok(State::existing(id.clone(), policy_attributes(&policy))
                .with_identifier(identifier)),
            Err(e) if e.is_not_found() => {
                log::info!("collection policy {} is gone, dropping it from state", name);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn create_collection_policy(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let attrs = self.validated(resource)?;
        let policy = build_policy(&attrs)?;
        let identifier = CompositeId::from_parts([policy.policy_name.as_str()])?.build();

        self.upsert_and_wait(&policy, self.config().create_timeout())
            .await
            .map_err(|e| e.with_identifier(&identifier))?;

        self.read_collection_policy(&resource.id, &identifier).await
    }

    pub(crate) async fn update_collection_policy(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [name] = CompositeId::split::<1>(identifier)?;
        let attrs = self.validated(to)?;
        let policy = build_policy(&attrs)?;
        if policy.policy_name != name {
            return Err(ProviderError::validation(format!(
                "policy_name cannot change in place ('{}' -> '{}')",
                name, policy.policy_name
            )));
        }

        self.upsert_and_wait(&policy, self.config().update_timeout())
            .await?;

        self.read_collection_policy(id, identifier).await
    }

    pub(crate) async fn delete_collection_policy(&self, identifier: &str) -> ProviderResult<()> {
        let [name] = CompositeId::split::<1>(identifier)?;
        let client = self.client();
        let name = name.as_str();
        let timeout = self.config().delete_timeout();

        let deleted = ignore_not_found(
            self.retry(timeout, move || async move {
                client.delete_collection_policy(name).await
            })
            .await,
        )?;
        if !deleted {
            log::info!("collection policy {} already deleted", name);
            return Ok(());
        }

        self.deletion_conf(timeout)
            .with_pending(&[ENABLED, DISABLED])
            .wait(move || policy_state(client, name, None))
            .await?;
        Ok(())
    }

    async fn upsert_and_wait(
        &self,
        policy: &CollectionPolicy,
        timeout: std::time::Duration,
    ) -> ProviderResult<()> {
        let client = self.client();
        let name = policy.policy_name.as_str();

        self.retry(timeout, move || async move {
            client.upsert_collection_policy(policy).await
        })
        .await?;

        self.state_conf(&[state_label(policy.enabled)], timeout)
            .wait(move || policy_state(client, name, Some(policy)))
            .await?;
        Ok(())
    }
}

/// Label of the policy as the service reports it
///
/// With `desired` set, a policy whose content does not match yet is
/// `Pending`.
async fn policy_state(
    client: &dyn SlsApi,
    name: &str,
    desired: Option<&CollectionPolicy>,
) -> SlsResult<Fetched> {
    match client.get_collection_policy(name).await {
        Ok(current) => match desired {
            Some(desired) if !converged(&current, desired) => Ok(Fetched::state(PENDING)),
            _ => Ok(Fetched::state(state_label(current.enabled))),
        },
        Err(e) if e.is_not_found() => Ok(Fetched::NotFound),
        Err(e) => Err(e),
    }
}

/// Whether `current` matches `desired`, ignoring service-assigned fields
fn converged(current: &CollectionPolicy, desired: &CollectionPolicy) -> bool {
    let mut desired = desired.clone();
    if let (Some(want), Some(have)) = (desired.data_config.as_mut(), current.data_config.as_ref()) {
        want.data_project = have.data_project.clone();
    }
    current == &desired
}

fn build_policy(attrs: &HashMap<String, Value>) -> ProviderResult<CollectionPolicy> {
    let policy_config = attrs
        .get("policy_config")
        .and_then(Value::as_map)
        .ok_or_else(|| ProviderError::validation("Required attribute 'policy_config' is missing"))?;
    let block_of = |key: &str| attrs.get(key).and_then(Value::as_map);

    Ok(CollectionPolicy {
        policy_name: required_str(attrs, "policy_name")?.to_string(),
        data_code: required_str(attrs, "data_code")?.to_string(),
        product_code: required_str(attrs, "product_code")?.to_string(),
        enabled: attrs
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
        policy_config: PolicyConfig {
            resource_mode: block_str(policy_config, "resource_mode"),
            instance_ids: block_list(policy_config, "instance_ids"),
            regions: block_list(policy_config, "regions"),
            resource_tags: block_string_map(policy_config, "resource_tags"),
        },
        centralize_enabled: attrs
            .get("centralize_enabled")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
        centralize_config: block_of("centralize_config").map(|b| CentralizeConfig {
            dest_project: block_str(b, "dest_project"),
            dest_region: block_str(b, "dest_region"),
            dest_logstore: block_str(b, "dest_logstore"),
            dest_ttl: b.get("dest_ttl").and_then(Value::as_int).unwrap_or_default(),
        }),
        data_config: block_of("data_config").map(|b| DataConfig {
            data_region: block_str(b, "data_region"),
            data_project: String::new(),
        }),
        resource_directory: block_of("resource_directory").map(|b| ResourceDirectory {
            account_group_type: block_str(b, "account_group_type"),
            members: block_list(b, "members"),
        }),
    })
}

fn policy_attributes(policy: &CollectionPolicy) -> HashMap<String, Value> {
    let config = &policy.policy_config;
    let mut attrs = HashMap::from([
        ("policy_name".to_string(), Value::from(policy.policy_name.as_str())),
        ("data_code".to_string(), Value::from(policy.data_code.as_str())),
        ("product_code".to_string(), Value::from(policy.product_code.as_str())),
        ("enabled".to_string(), Value::Bool(policy.enabled)),
        ("centralize_enabled".to_string(), Value::Bool(policy.centralize_enabled)),
        (
            "policy_config".to_string(),
            block([
                ("resource_mode", Value::from(config.resource_mode.as_str())),
                ("instance_ids", Value::string_list(&config.instance_ids)),
                ("regions", Value::string_list(&config.regions)),
                (
                    "resource_tags",
                    Value::Map(
                        config
                            .resource_tags
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                            .collect(),
                    ),
                ),
            ]),
        ),
    ]);

    if let Some(c) = &policy.centralize_config {
        let mut entries = vec![
            ("dest_project", Value::from(c.dest_project.as_str())),
            ("dest_region", Value::from(c.dest_region.as_str())),
            ("dest_logstore", Value::from(c.dest_logstore.as_str())),
        ];
        // 0 means the service default
        if c.dest_ttl > 0 {
            entries.push(("dest_ttl", Value::Int(c.dest_ttl)));
        }
        attrs.insert("centralize_config".to_string(), block(entries));
    }
    if let Some(d) = &policy.data_config {
        attrs.insert(
            "data_config".to_string(),
            block([("data_region", Value::from(d.data_region.as_str()))]),
        );
        attrs.insert(
            "data_project".to_string(),
            Value::from(d.data_project.as_str()),
        );
    }
    if let Some(r) = &policy.resource_directory {
        attrs.insert(
            "resource_directory".to_string(),
            block([
                ("account_group_type", Value::from(r.account_group_type.as_str())),
                ("members", Value::string_list(&r.members)),
            ]),
        );
    }
    attrs
}
