//! log_machine_group handlers

use std::collections::HashMap;

use slsform_core::identifier::CompositeId;
use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::{Resource, ResourceId, State, Value};

use crate::model::{IdentifyType, MachineGroup, MachineGroupAttribute};
use crate::provider::{
    AVAILABLE, SlsProvider, ignore_not_found, observe, optional_str, required_str,
};

impl SlsProvider {
    pub(crate) async fn read_machine_group(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        match self.client().get_machine_group(&project, &name).await {
            Ok(group) => Ok(
                State::existing(id.clone(), machine_group_attributes(&project, &group))
                    .with_identifier(identifier),
            ),
            Err(e) if e.is_not_found() => {
                log::info!("machine group {} is gone, dropping it from state", identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn create_machine_group(&self, resource: &Resource) -> ProviderResult<State> {
        let attrs = self.validated(resource)?;
        let project = required_str(&attrs, "project")?;
        let group = build_machine_group(&attrs)?;
        let identifier = CompositeId::from_parts([project, group.name.as_str()])?.build();

        let client = self.client();
        let name = group.name.as_str();
        let body = &group;
        let timeout = self.config().create_timeout();

        self.retry(timeout, move || async move {
            client.create_machine_group(project, body).await
        })
        .await
        .map_err(|e| e.with_identifier(&identifier))?;

        self.state_conf(&[AVAILABLE], timeout)
            .wait(move || async move {
                observe(client.get_machine_group(project, name).await, |_| true)
            })
            .await
            .map_err(|e| ProviderError::from(e).with_identifier(&identifier))?;

        self.read_machine_group(&resource.id, &identifier).await
    }

    pub(crate) async fn update_machine_group(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        let attrs = self.validated(to)?;
        let group = build_machine_group(&attrs)?;
        if group.name != name {
            return Err(ProviderError::validation(format!(
                "name cannot change in place ('{}' -> '{}')",
                name, group.name
            )));
        }

        let client = self.client();
        let (project, name) = (project.as_str(), name.as_str());
        let body = &group;
        let timeout = self.config().update_timeout();

        self.retry(timeout, move || async move {
            client.update_machine_group(project, body).await
        })
        .await?;

        self.state_conf(&[AVAILABLE], timeout)
            .wait(move || async move {
                observe(client.get_machine_group(project, name).await, |current| {
                    current == body
                })
            })
            .await?;

        self.read_machine_group(id, identifier).await
    }

    pub(crate) async fn delete_machine_group(&self, identifier: &str) -> ProviderResult<()> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        let client = self.client();
        let (project, name) = (project.as_str(), name.as_str());
        let timeout = self.config().delete_timeout();

        let deleted = ignore_not_found(
            self.retry(timeout, move || async move {
                client.delete_machine_group(project, name).await
            })
            .await,
        )?;
        if !deleted {
            log::info!("machine group {} already deleted", identifier);
            return Ok(());
        }

        self.deletion_conf(timeout)
            .wait(move || async move {
                observe(client.get_machine_group(project, name).await, |_| true)
            })
            .await?;
        Ok(())
    }
}

fn build_machine_group(attrs: &HashMap<String, Value>) -> ProviderResult<MachineGroup> {
    let identify_type = optional_str(attrs, "identify_type");
    let identify_type = if identify_type.is_empty() {
        IdentifyType::default()
    } else {
        identify_type.parse().map_err(ProviderError::validation)?
    };

    Ok(MachineGroup {
        name: required_str(attrs, "name")?.to_string(),
        identify_type,
        attribute: MachineGroupAttribute {
            external_name: String::new(),
            topic: optional_str(attrs, "topic"),
        },
        machine_list: attrs
            .get("identify_list")
            .map(Value::string_items)
            .unwrap_or_default(),
    })
}

fn machine_group_attributes(project: &str, group: &MachineGroup) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("project".to_string(), Value::from(project));
    attrs.insert("name".to_string(), Value::from(group.name.as_str()));
    attrs.insert(
        "identify_type".to_string(),
        Value::from(group.identify_type.as_str()),
    );
    attrs.insert(
        "identify_list".to_string(),
        Value::string_list(&group.machine_list),
    );
    if !group.attribute.topic.is_empty() {
        attrs.insert(
            "topic".to_string(),
            Value::from(group.attribute.topic.as_str()),
        );
    }
    attrs
}
