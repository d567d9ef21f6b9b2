//! Manifest and local state files
//!
//! A manifest is a JSON document with an optional `provider` block and the
//! list of desired resources. The local state file remembers which composite
//! identifier each declared resource was created under, so a resource whose
//! identifying attributes change can still be found and replaced.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use slsform_core::resource::{Resource, ResourceId, Value};
use slsform_provider_sls::SlsConfig;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub provider: SlsConfig,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

        let mut seen = std::collections::HashSet::new();
        for entry in &manifest.resources {
            if !seen.insert((&entry.resource_type, &entry.name)) {
                return Err(format!(
                    "Duplicate resource {}.{} in {}",
                    entry.resource_type,
                    entry.name,
                    path.display()
                ));
            }
        }
        Ok(manifest)
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .map(|entry| Resource {
                id: ResourceId::new(&entry.resource_type, &entry.name),
                attributes: entry.attributes.clone(),
            })
            .collect()
    }
}

/// Composite identifiers of created resources, keyed by "type.name"
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    identifiers: BTreeMap<String, String>,
}

impl LocalState {
    /// Load the state file; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self, String> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("Failed to read {}: {}", path.display(), e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn identifier(&self, id: &ResourceId) -> Option<&str> {
        self.identifiers.get(&id.to_string()).map(String::as_str)
    }

    pub fn record(&mut self, id: &ResourceId, identifier: impl Into<String>) {
        self.identifiers.insert(id.to_string(), identifier.into());
    }

    pub fn forget(&mut self, id: &ResourceId) {
        self.identifiers.remove(&id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("main.json");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_manifest_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "resources": [
                    {
                        "type": "log_machine_group",
                        "name": "web",
                        "attributes": {
                            "project": "proj1",
                            "name": "grp1",
                            "identify_list": ["10.0.0.1"]
                        }
                    }
                ]
            }"#,
        );

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.provider, SlsConfig::default());

        let resources = manifest.resources();
        assert_eq!(resources[0].id.to_string(), "log_machine_group.web");
        assert_eq!(
            resources[0].attributes.get("identify_list"),
            Some(&Value::string_list(["10.0.0.1"]))
        );
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"resources": [
                {"type": "log_dashboard", "name": "main"},
                {"type": "log_dashboard", "name": "main"}
            ]}"#,
        );

        let err = Manifest::load(&path).unwrap_err();
        assert!(err.contains("Duplicate resource log_dashboard.main"));
    }

    #[test]
    fn local_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".slsform").join("state.json");
        let id = ResourceId::new("log_dashboard", "main");

        let mut state = LocalState::load(&path).unwrap();
        assert_eq!(state.identifier(&id), None);

        state.record(&id, "proj1:dash1");
        state.save(&path).unwrap();

        let mut loaded = LocalState::load(&path).unwrap();
        assert_eq!(loaded.identifier(&id), Some("proj1:dash1"));
        loaded.forget(&id);
        assert_eq!(loaded.identifier(&id), None);
    }
}
