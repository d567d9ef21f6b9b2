//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, so malformed desired
//! state is rejected before any API call is made.

use std::collections::HashMap;
use std::fmt;

use crate::provider::ProviderError;
use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map with arbitrary keys
    Map(Box<AttributeType>),
    /// Nested block with a fixed set of fields
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => {
                            field
                                .attr_type
                                .validate(v)
                                .map_err(|e| TypeError::BlockFieldError {
                                    field: field.name.clone(),
                                    inner: Box::new(e),
                                })?
                        }
                        None if field.required && field.default.is_none() => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                if let Some(unknown) = map.keys().find(|k| !fields.iter().any(|f| &f.name == *k))
                {
                    return Err(TypeError::UnknownAttribute {
                        name: unknown.clone(),
                    });
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Field '{field}': {inner}")]
    BlockFieldError { field: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Set by the service, never by the user
    pub computed: bool,
    /// Changing this attribute requires replacing the remote object
    pub force_new: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            default: None,
            description: None,
            computed: false,
            force_new: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            match self.attributes.get(name) {
                Some(schema) if schema.computed => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(e);
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy `attributes`, filling in defaults for attributes that are absent
    pub fn with_defaults(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        let mut filled = attributes.clone();
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                filled
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        filled
    }

    /// Attributes whose change forces a replacement
    pub fn force_new_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Turn schema validation errors into a single validation error
pub fn validation_error(errors: Vec<TypeError>) -> ProviderError {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    ProviderError::validation(messages.join("; "))
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Non-empty string type
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("Value must not be empty".to_string()),
            },
        }
    }

    /// Non-empty list of strings
    pub fn non_empty_string_list() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyList<String>".to_string(),
            base: Box::new(AttributeType::List(Box::new(AttributeType::String))),
            validate: |value| match value {
                Value::List(items) if !items.is_empty() => Ok(()),
                _ => Err("List must contain at least one item".to_string()),
            },
        }
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// Map of string to string
    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    /// Enum over the given variants
    pub fn one_of(variants: &[&str]) -> AttributeType {
        AttributeType::Enum(variants.iter().map(|v| v.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorKind;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::one_of(&["ip", "userdefined"]);
        assert!(t.validate(&Value::String("ip".to_string())).is_ok());
        assert!(t.validate(&Value::String("hostname".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::String("1".to_string())).is_err());
    }

    #[test]
    fn validate_non_empty_list() {
        let t = types::non_empty_string_list();
        assert!(t.validate(&Value::string_list(["10.0.0.1"])).is_ok());
        assert!(t.validate(&Value::List(vec![])).is_err());
        assert!(t.validate(&Value::List(vec![Value::Int(1)])).is_err());
    }

    #[test]
    fn validate_block_fields() {
        let t = AttributeType::Block(vec![
            AttributeSchema::new("resource_mode", types::one_of(&["all", "instanceMode"]))
                .required(),
            AttributeSchema::new("regions", types::string_list()),
        ]);

        let mut block = HashMap::new();
        block.insert("resource_mode".to_string(), Value::from("all"));
        assert!(t.validate(&Value::Map(block.clone())).is_ok());

        block.insert("unknown".to_string(), Value::from("x"));
        assert!(matches!(
            t.validate(&Value::Map(block)),
            Err(TypeError::UnknownAttribute { .. })
        ));

        assert!(matches!(
            t.validate(&Value::Map(HashMap::new())),
            Err(TypeError::MissingRequired { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("log_machine_group")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("topic", AttributeType::String))
            .attribute(
                AttributeSchema::new("identify_type", types::one_of(&["ip", "userdefined"]))
                    .with_default(Value::from("ip")),
            );

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("web"));
        attrs.insert("topic".to_string(), Value::from("nginx"));
        assert!(schema.validate(&attrs).is_ok());

        let filled = schema.with_defaults(&attrs);
        assert_eq!(filled.get("identify_type"), Some(&Value::from("ip")));
    }

    #[test]
    fn missing_required_and_unknown_attributes() {
        let schema = ResourceSchema::new("log_dashboard")
            .attribute(AttributeSchema::new("project_name", AttributeType::String).required());

        let mut attrs = HashMap::new();
        attrs.insert("colour".to_string(), Value::from("blue"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);

        let err = validation_error(errors);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("project_name"));
        assert!(err.message.contains("colour"));
    }

    #[test]
    fn computed_attributes_cannot_be_set() {
        let schema = ResourceSchema::new("sls_collection_policy")
            .attribute(AttributeSchema::new("data_project", AttributeType::String).computed());
        assert!(schema.validate(&HashMap::new()).is_ok());

        let mut attrs = HashMap::new();
        attrs.insert("data_project".to_string(), Value::from("my-data"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [TypeError::ComputedAttribute { name }] if name == "data_project"
        ));
        assert!(validation_error(errors).message.contains("is computed"));
    }
}
