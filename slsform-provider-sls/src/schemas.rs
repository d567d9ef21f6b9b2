//! Attribute schemas of the log service resources

use std::sync::LazyLock;

use regex::Regex;
use slsform_core::resource::Value;
use slsform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::resources::{
    LOG_DASHBOARD, LOG_MACHINE_GROUP, LOGTAIL_ATTACHMENT, SLS_COLLECTION_POLICY,
};

static PROJECT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").ok());

fn is_project_name(s: &str) -> bool {
    PROJECT_NAME.as_ref().is_some_and(|re| re.is_match(s))
}

/// Project name: 3-63 lowercase letters, digits and hyphens
pub fn project_name() -> AttributeType {
    AttributeType::Custom {
        name: "ProjectName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if is_project_name(s) => Ok(()),
            Value::String(s) => Err(format!(
                "Invalid project name '{}': use 3-63 lowercase letters, digits and hyphens",
                s
            )),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// String holding a JSON array
pub fn json_array() -> AttributeType {
    AttributeType::Custom {
        name: "JsonArray".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(serde_json::Value::Array(_)) => Ok(()),
                Ok(_) => Err("Expected a JSON array".to_string()),
                Err(e) => Err(format!("Invalid JSON: {}", e)),
            },
            _ => Err("Expected string".to_string()),
        },
    }
}

/// String holding a JSON object
pub fn json_object() -> AttributeType {
    AttributeType::Custom {
        name: "JsonObject".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(serde_json::Value::Object(_)) => Ok(()),
                Ok(_) => Err("Expected a JSON object".to_string()),
                Err(e) => Err(format!("Invalid JSON: {}", e)),
            },
            _ => Err("Expected string".to_string()),
        },
    }
}

pub fn dashboard() -> ResourceSchema {
    ResourceSchema::new(LOG_DASHBOARD)
        .with_description("A dashboard in a log service project")
        .attribute(
            AttributeSchema::new("project_name", project_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("dashboard_name", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("display_name", AttributeType::String))
        .attribute(
            AttributeSchema::new("char_list", json_array())
                .required()
                .with_description("Chart definitions as a JSON array"),
        )
        .attribute(
            AttributeSchema::new("attribute", json_object())
                .with_description("Dashboard attributes as a JSON object"),
        )
}

pub fn machine_group() -> ResourceSchema {
    ResourceSchema::new(LOG_MACHINE_GROUP)
        .with_description("A group of machines logtail collects from")
        .attribute(
            AttributeSchema::new("project", project_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("name", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("identify_type", types::one_of(&["ip", "userdefined"]))
                .with_default(Value::from("ip")),
        )
        .attribute(AttributeSchema::new("topic", AttributeType::String))
        .attribute(AttributeSchema::new("identify_list", types::non_empty_string_list()).required())
}

pub fn logtail_attachment() -> ResourceSchema {
    ResourceSchema::new(LOGTAIL_ATTACHMENT)
        .with_description("A logtail config applied to a machine group")
        .attribute(
            AttributeSchema::new("project", project_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("logtail_config_name", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("machine_group_name", types::non_empty_string())
                .required()
                .force_new(),
        )
}

pub fn collection_policy() -> ResourceSchema {
    ResourceSchema::new(SLS_COLLECTION_POLICY)
        .with_description("A cloud-product log collection policy")
        .attribute(
            AttributeSchema::new("policy_name", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("data_code", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("product_code", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("enabled", AttributeType::Bool).required())
        .attribute(
            AttributeSchema::new(
                "policy_config",
                AttributeType::Block(vec![
                    AttributeSchema::new(
                        "resource_mode",
                        types::one_of(&["all", "attributeMode", "instanceMode"]),
                    )
                    .required(),
                    AttributeSchema::new("instance_ids", types::string_list()),
                    AttributeSchema::new("regions", types::string_list()),
                    AttributeSchema::new("resource_tags", types::string_map()),
                ]),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("centralize_enabled", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(AttributeSchema::new(
            "centralize_config",
            AttributeType::Block(vec![
                AttributeSchema::new("dest_project", AttributeType::String),
                AttributeSchema::new("dest_region", AttributeType::String),
                AttributeSchema::new("dest_logstore", AttributeType::String),
                AttributeSchema::new("dest_ttl", types::positive_int()),
            ]),
        ))
        .attribute(AttributeSchema::new(
            "data_config",
            AttributeType::Block(vec![AttributeSchema::new(
                "data_region",
                AttributeType::String,
            )]),
        ))
        .attribute(
            AttributeSchema::new("data_project", AttributeType::String)
                .computed()
                .with_description("Project the service stores collected data in"),
        )
        .attribute(AttributeSchema::new(
            "resource_directory",
            AttributeType::Block(vec![
                AttributeSchema::new("account_group_type", types::one_of(&["all", "custom"]))
                    .required(),
                AttributeSchema::new("members", types::string_list()),
            ]),
        ))
}

/// All schemas, keyed by resource type
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![
        dashboard(),
        machine_group(),
        logtail_attachment(),
        collection_policy(),
    ]
}
