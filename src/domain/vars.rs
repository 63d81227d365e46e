//! Variable maps and JSON value helpers shared by rendering, transforms and assertions

use serde_json::{Map, Value};

/// A variable assignment, in declaration order
pub type Vars = Map<String, Value>;

/// Reserved variable holding prior conversation turns
pub const CONVERSATION_VAR: &str = "_conversation";

/// Prefix marking a variable value as a file reference
pub const FILE_PREFIX: &str = "file://";

/// Prefix marking a variable value as a package function reference
pub const PACKAGE_PREFIX: &str = "package:";

/// Get a nested field from a JSON value using dot notation
pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Convert a JSON value to a string representation
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Shallow union of two maps; entries of `overlay` win
pub fn merge_maps(base: &Vars, overlay: &Vars) -> Vars {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
