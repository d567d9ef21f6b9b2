//! Request and response bodies of the log service management API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A dashboard inside a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub dashboard_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Free-form dashboard attributes (layout, type, ...)
    #[serde(default)]
    pub attribute: serde_json::Map<String, serde_json::Value>,
    /// Chart definitions, passed through as opaque JSON
    #[serde(default)]
    pub charts: Vec<serde_json::Value>,
}

/// How the machines of a machine group are identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentifyType {
    #[default]
    #[serde(rename = "ip")]
    Ip,
    #[serde(rename = "userdefined")]
    UserDefined,
}

impl IdentifyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifyType::Ip => "ip",
            IdentifyType::UserDefined => "userdefined",
        }
    }
}

impl std::str::FromStr for IdentifyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(IdentifyType::Ip),
            "userdefined" => Ok(IdentifyType::UserDefined),
            other => Err(format!(
                "Invalid identify type '{}', expected 'ip' or 'userdefined'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineGroupAttribute {
    #[serde(rename = "externalName", default)]
    pub external_name: String,
    #[serde(rename = "groupTopic", default)]
    pub topic: String,
}

/// A group of machines logtail collects from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineGroup {
    #[serde(rename = "groupName")]
    pub name: String,
    #[serde(rename = "machineIdentifyType", default)]
    pub identify_type: IdentifyType,
    #[serde(rename = "groupAttribute", default)]
    pub attribute: MachineGroupAttribute,
    #[serde(rename = "machineList", default)]
    pub machine_list: Vec<String>,
}

/// Which cloud resources a collection policy covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// "all", "attributeMode" or "instanceMode"
    pub resource_mode: String,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub resource_tags: BTreeMap<String, String>,
}

/// Where centrally collected logs are shipped
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralizeConfig {
    #[serde(default)]
    pub dest_project: String,
    #[serde(default)]
    pub dest_region: String,
    #[serde(default)]
    pub dest_logstore: String,
    #[serde(rename = "destTTL", default)]
    pub dest_ttl: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    #[serde(default)]
    pub data_region: String,
    /// Assigned by the service
    #[serde(default)]
    pub data_project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDirectory {
    /// "all" or "custom"
    pub account_group_type: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// A cloud-product log collection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPolicy {
    pub policy_name: String,
    pub data_code: String,
    pub product_code: String,
    pub enabled: bool,
    pub policy_config: PolicyConfig,
    #[serde(default)]
    pub centralize_enabled: bool,
    #[serde(default)]
    pub centralize_config: Option<CentralizeConfig>,
    #[serde(default)]
    pub data_config: Option<DataConfig>,
    #[serde(default)]
    pub resource_directory: Option<ResourceDirectory>,
}
