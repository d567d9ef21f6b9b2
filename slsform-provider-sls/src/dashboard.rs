//! log_dashboard handlers

use std::collections::HashMap;

use slsform_core::identifier::CompositeId;
use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::{Resource, ResourceId, State, Value};

use crate::model::Dashboard;
use crate::provider::{
    AVAILABLE, SlsProvider, ignore_not_found, observe, optional_str, required_str,
};

impl SlsProvider {
    pub(crate) async fn read_dashboard(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        match self.client().get_dashboard(&project, &name).await {
            Ok(dashboard) => Ok(
                State::existing(id.clone(), dashboard_attributes(&project, &dashboard))
                    .with_identifier(identifier),
            ),
            Err(e) if e.is_not_found() => {
                log::info!("dashboard {} is gone, dropping it from state", identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn create_dashboard(&self, resource: &Resource) -> ProviderResult<State> {
        let attrs = self.validated(resource)?;
        let project = required_str(&attrs, "project_name")?;
        let dashboard = build_dashboard(&attrs)?;
        let identifier =
            CompositeId::from_parts([project, dashboard.dashboard_name.as_str()])?.build();

        let client = self.client();
        let name = dashboard.dashboard_name.as_str();
        let body = &dashboard;
        let timeout = self.config().create_timeout();

        // An existing dashboard is not adopted
        self.retry(timeout, move || async move {
            client.create_dashboard(project, body).await
        })
        .await
        .map_err(|e| e.with_identifier(&identifier))?;

        self.state_conf(&[AVAILABLE], timeout)
            .wait(move || async move {
                observe(client.get_dashboard(project, name).await, |_| true)
            })
            .await
            .map_err(|e| ProviderError::from(e).with_identifier(&identifier))?;

        self.read_dashboard(&resource.id, &identifier).await
    }

    pub(crate) async fn update_dashboard(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        let attrs = self.validated(to)?;
        let dashboard = build_dashboard(&attrs)?;
        if dashboard.dashboard_name != name {
            return Err(ProviderError::validation(format!(
                "dashboard_name cannot change in place ('{}' -> '{}')",
                name, dashboard.dashboard_name
            )));
        }

        let client = self.client();
        let (project, name) = (project.as_str(), name.as_str());
        let body = &dashboard;
        let timeout = self.config().update_timeout();

        self.retry(timeout, move || async move {
            client.update_dashboard(project, body).await
        })
        .await?;

        self.state_conf(&[AVAILABLE], timeout)
            .wait(move || async move {
                observe(client.get_dashboard(project, name).await, |current| {
                    same_content(current, body)
                })
            })
            .await?;

        self.read_dashboard(id, identifier).await
    }

    pub(crate) async fn delete_dashboard(&self, identifier: &str) -> ProviderResult<()> {
        let [project, name] = CompositeId::split::<2>(identifier)?;
        let client = self.client();
        let (project, name) = (project.as_str(), name.as_str());
        let timeout = self.config().delete_timeout();

        let deleted = ignore_not_found(
            self.retry(timeout, move || async move {
                client.delete_dashboard(project, name).await
            })
            .await,
        )?;
        if !deleted {
            log::info!("dashboard {} already deleted", identifier);
            return Ok(());
        }

        self.deletion_conf(timeout)
            .wait(move || async move {
                observe(client.get_dashboard(project, name).await, |_| true)
            })
            .await?;
        Ok(())
    }
}

/// Request body from validated attributes
fn build_dashboard(attrs: &HashMap<String, Value>) -> ProviderResult<Dashboard> {
    let dashboard_name = required_str(attrs, "dashboard_name")?.to_string();
    let charts: Vec<serde_json::Value> =
        serde_json::from_str(required_str(attrs, "char_list")?).map_err(|e| {
            ProviderError::validation(format!("Invalid char_list: {}", e)).with_cause(e)
        })?;
    let attribute = match attrs.get("attribute").and_then(Value::as_str) {
        Some(s) => serde_json::from_str(s).map_err(|e| {
            ProviderError::validation(format!("Invalid attribute: {}", e)).with_cause(e)
        })?,
        None => serde_json::Map::new(),
    };
    let display_name = match optional_str(attrs, "display_name") {
        s if s.is_empty() => dashboard_name.clone(),
        s => s,
    };

    Ok(Dashboard {
        dashboard_name,
        display_name,
        description: String::new(),
        attribute,
        charts,
    })
}

/// Attributes as reported in state, with compact JSON documents
fn dashboard_attributes(project: &str, dashboard: &Dashboard) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("project_name".to_string(), Value::from(project));
    attrs.insert(
        "dashboard_name".to_string(),
        Value::from(dashboard.dashboard_name.as_str()),
    );
    attrs.insert(
        "display_name".to_string(),
        Value::from(dashboard.display_name.as_str()),
    );
    attrs.insert(
        "char_list".to_string(),
        Value::String(serde_json::Value::Array(dashboard.charts.clone()).to_string()),
    );
    attrs.insert(
        "attribute".to_string(),
        Value::String(serde_json::Value::Object(dashboard.attribute.clone()).to_string()),
    );
    attrs
}

fn same_content(current: &Dashboard, desired: &Dashboard) -> bool {
    current.display_name == desired.display_name
        && current.charts == desired.charts
        && current.attribute == desired.attribute
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use slsform_core::provider::ErrorKind;

    use super::*;
    use crate::config::SlsConfig;
    use crate::error::SlsError;
    use crate::memory::MemorySls;
    use crate::provider::testing::plan_after_create;
    use crate::resources::LOG_DASHBOARD;

    fn provider(sls: &Arc<MemorySls>) -> SlsProvider {
        SlsProvider::new(sls.clone(), SlsConfig::default().with_timeout(60))
    }

    fn dashboard(name: &str) -> Resource {
        Resource::new(LOG_DASHBOARD, "main")
            .with_attribute("project_name", "proj1")
            .with_attribute("dashboard_name", name)
            .with_attribute("display_name", "Errors")
            .with_attribute("char_list", r#"[ {"title": "errors", "type": "linepro"} ]"#)
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_visibility_and_reads_back() {
        let sls = Arc::new(MemorySls::new().with_lag(3));
        let provider = provider(&sls);

        let state = provider.create_resource(&dashboard("dash1")).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("proj1:dash1"));
        assert_eq!(
            state.attributes.get("char_list"),
            Some(&Value::from(r#"[{"title":"errors","type":"linepro"}]"#))
        );
        assert!(sls.calls("get_dashboard") >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn created_dashboard_has_no_pending_changes() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        let resource = Resource::new(LOG_DASHBOARD, "main")
            .with_attribute("project_name", "proj1")
            .with_attribute("dashboard_name", "dash1")
            .with_attribute("char_list", r#"[ {"type": "linepro", "title": "errors"} ]"#);

        let plan = plan_after_create(&provider, &resource).await;
        assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());

        let plan = plan_after_create(&provider, &dashboard("dash2")).await;
        assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_throttling() {
        let sls = Arc::new(MemorySls::new());
        sls.fail_next("create_dashboard", SlsError::new("Throttling", "slow down"));
        sls.fail_next("create_dashboard", SlsError::new("ServerBusy", "busy"));
        let provider = provider(&sls);

        let state = provider.create_resource(&dashboard("dash1")).await.unwrap();

        assert!(state.exists);
        assert_eq!(sls.calls("create_dashboard"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn existing_dashboard_is_not_adopted() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        provider.create_resource(&dashboard("dash1")).await.unwrap();

        let err = provider
            .create_resource(&dashboard("dash1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Remote);
        assert_eq!(err.operation, Some("create"));
        assert_eq!(err.identifier.as_deref(), Some("proj1:dash1"));
        assert_eq!(sls.calls("create_dashboard"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn update_waits_for_new_content() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        let created = provider.create_resource(&dashboard("dash1")).await.unwrap();

        let to = dashboard("dash1").with_attribute("display_name", "All errors");
        let state = provider
            .update_resource(&created.id, "proj1:dash1", &to)
            .await
            .unwrap();

        assert_eq!(
            state.attributes.get("display_name"),
            Some(&Value::from("All errors"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn update_cannot_rename() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        let id = ResourceId::new(LOG_DASHBOARD, "main");

        let err = provider
            .update_resource(&id, "proj1:dash1", &dashboard("dash2"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(sls.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_identifier_makes_no_calls() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        let id = ResourceId::new(LOG_DASHBOARD, "main");

        let err = provider.read_resource(&id, Some("proj1")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(provider.delete_resource(&id, "proj1::").await.is_err());
        assert_eq!(sls.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_then_read_reports_absent() {
        let sls = Arc::new(MemorySls::new().with_lag(2));
        let provider = provider(&sls);
        let created = provider.create_resource(&dashboard("dash1")).await.unwrap();

        provider
            .delete_resource(&created.id, "proj1:dash1")
            .await
            .unwrap();

        let state = provider
            .read_resource(&created.id, Some("proj1:dash1"))
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_missing_dashboard_succeeds() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);
        let id = ResourceId::new(LOG_DASHBOARD, "main");

        provider.delete_resource(&id, "proj1:dash1").await.unwrap();
        assert_eq!(sls.calls("get_dashboard"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_chart_list_is_rejected_before_any_call() {
        let sls = Arc::new(MemorySls::new());
        let provider = provider(&sls);

        let err = provider
            .create_resource(&dashboard("dash1").with_attribute("char_list", "{}"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(sls.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_times_out_when_never_visible() {
        let sls = Arc::new(MemorySls::new().with_lag(1000));
        let provider = SlsProvider::new(sls.clone(), SlsConfig::default().with_timeout(30));

        let start = tokio::time::Instant::now();
        let err = provider
            .create_resource(&dashboard("dash1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(start.elapsed() <= Duration::from_secs(30) + Duration::from_secs(5));
    }
}
