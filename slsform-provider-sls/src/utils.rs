//! Utility functions for value normalization and nested blocks

use std::collections::{BTreeMap, HashMap};

use slsform_core::provider::{ProviderError, ProviderResult};
use slsform_core::resource::Value;

/// Re-encode a JSON document compactly so equal documents compare equal
pub fn normalize_json(s: &str) -> ProviderResult<String> {
    let value: serde_json::Value = serde_json::from_str(s)
        .map_err(|e| ProviderError::validation(format!("Invalid JSON: {}", e)).with_cause(e))?;
    Ok(value.to_string())
}

/// String entry of a nested block, or an empty string
pub fn block_str(block: &HashMap<String, Value>, key: &str) -> String {
    block
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// String-list entry of a nested block
pub fn block_list(block: &HashMap<String, Value>, key: &str) -> Vec<String> {
    block.get(key).map(Value::string_items).unwrap_or_default()
}

/// String-map entry of a nested block
pub fn block_string_map(block: &HashMap<String, Value>, key: &str) -> BTreeMap<String, String> {
    block
        .get(key)
        .and_then(Value::as_map)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Build a block value, leaving out empty entries
pub fn block<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    Value::Map(trim_block(
        entries.into_iter().map(|(k, v)| (k.to_string(), v)),
    ))
}

/// Drop empty strings, lists and maps from a block's entries
///
/// Applied to desired blocks and read-back blocks alike, so an entry spelled
/// out as empty compares equal to one the service leaves out.
pub fn trim_block<I>(entries: I) -> HashMap<String, Value>
where
    I: IntoIterator<Item = (String, Value)>,
{
    entries
        .into_iter()
        .filter(|(_, v)| match v {
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
            _ => true,
        })
        .collect()
}
