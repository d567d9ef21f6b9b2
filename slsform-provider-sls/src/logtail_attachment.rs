//! logtail_attachment handlers
//!
//! An attachment is the fact that a logtail config is applied to a machine
//! group. It has no body of its own, so it can only be created and deleted.

use std::collections::HashMap;

use slsform_core::identifier::CompositeId;
use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::{Resource, ResourceId, State, Value};
use slsform_core::wait::Fetched;

use crate::api::SlsApi;
use crate::error::SlsResult;
use crate::provider::{AVAILABLE, SlsProvider, ignore_not_found, required_str};
use crate::resources::LOGTAIL_ATTACHMENT;

impl SlsProvider {
    pub(crate) async fn read_logtail_attachment(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [project, config, group] = CompositeId::split::<3>(identifier)?;
        match attachment_state(self.client(), &project, &config, &group).await? {
            Fetched::State(_) => Ok(State::existing(
                id.clone(),
                attachment_attributes(&project, &config, &group),
            )
            .with_identifier(identifier)),
            Fetched::NotFound => {
                log::info!(
                    "logtail config {} is no longer applied to {}, dropping it from state",
                    config,
                    group
                );
                Ok(State::not_found(id.clone()))
            }
        }
    }

    pub(crate) async fn create_logtail_attachment(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let attrs = self.validated(resource)?;
        let project = required_str(&attrs, "project")?;
        let config = required_str(&attrs, "logtail_config_name")?;
        let group = required_str(&attrs, "machine_group_name")?;
        let identifier = CompositeId::from_parts([project, config, group])?.build();

        let client = self.client();
        let timeout = self.config().create_timeout();

        self.retry(timeout, move || async move {
            client
                .apply_config_to_machine_group(project, config, group)
                .await
        })
        .await
        .map_err(|e| e.with_identifier(&identifier))?;

        self.state_conf(&[AVAILABLE], timeout)
            .wait(move || attachment_state(client, project, config, group))
            .await
            .map_err(|e| ProviderError::from(e).with_identifier(&identifier))?;

        self.read_logtail_attachment(&resource.id, &identifier)
            .await
    }

    pub(crate) async fn delete_logtail_attachment(&self, identifier: &str) -> ProviderResult<()> {
        let [project, config, group] = CompositeId::split::<3>(identifier)?;
        let client = self.client();
        let (project, config, group) = (project.as_str(), config.as_str(), group.as_str());
        let timeout = self.config().delete_timeout();

        let removed = ignore_not_found(
            self.retry(timeout, move || async move {
                client
                    .remove_config_from_machine_group(project, config, group)
                    .await
            })
            .await,
        )?;
        if !removed {
            log::info!("logtail attachment {} already removed", identifier);
            return Ok(());
        }

        self.deletion_conf(timeout)
            .wait(move || attachment_state(client, project, config, group))
            .await?;
        Ok(())
    }

    /// Apply one logtail config to several machine groups
    ///
    /// Every group is attempted even if an earlier one fails. Returns the
    /// composite identifiers of the new attachments, or one error naming every
    /// group that failed.
    pub async fn attach_config_to_groups(
        &self,
        project: &str,
        config: &str,
        groups: &[String],
    ) -> ProviderResult<Vec<String>> {
        let mut identifiers = Vec::with_capacity(groups.len());
        let mut failures = Vec::new();

        for group in groups {
            let resource = Resource::new(LOGTAIL_ATTACHMENT, format!("{}-{}", config, group))
                .with_attribute("project", project)
                .with_attribute("logtail_config_name", config)
                .with_attribute("machine_group_name", group.as_str());

            match self.create_resource(&resource).await {
                Ok(state) => identifiers.extend(state.identifier),
                Err(e) => {
                    log::warn!("failed to attach {} to {}: {}", config, group, e);
                    failures.push(format!("{}: {}", group, e.message));
                }
            }
        }

        if failures.is_empty() {
            Ok(identifiers)
        } else {
            Err(ProviderError::new(format!(
                "failed to attach logtail config '{}' to {} of {} machine groups: {}",
                config,
                failures.len(),
                groups.len(),
                failures.join("; ")
            ))
            .in_operation("attach"))
        }
    }
}

/// `Available` while the config is applied to the group
async fn attachment_state(
    client: &dyn SlsApi,
    project: &str,
    config: &str,
    group: &str,
) -> SlsResult<Fetched> {
    match client.get_applied_configs(project, group).await {
        Ok(configs) if configs.iter().any(|c| c == config) => Ok(Fetched::state(AVAILABLE)),
        Ok(_) => Ok(Fetched::NotFound),
        Err(e) if e.is_not_found() => Ok(Fetched::NotFound),
        Err(e) => Err(e),
    }
}

fn attachment_attributes(project: &str, config: &str, group: &str) -> HashMap<String, Value> {
    HashMap::from([
        ("project".to_string(), Value::from(project)),
        ("logtail_config_name".to_string(), Value::from(config)),
        ("machine_group_name".to_string(), Value::from(group)),
    ])
}
