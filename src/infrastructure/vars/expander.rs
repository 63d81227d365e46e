//! Cartesian expansion of multi-valued variables into concrete assignments

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::domain::vars::{Vars, FILE_PREFIX};
use crate::domain::DomainError;

fn is_glob(reference: &str) -> bool {
    reference.contains(['*', '?', '['])
}

/// Expand a `file://` glob into one `file://` reference per match, sorted
fn expand_glob(reference: &str, base_path: &Path) -> Result<Vec<Value>, DomainError> {
    let pattern = base_path.join(reference);
    let pattern = pattern.to_string_lossy();

    let mut matches = glob::glob(&pattern)
        .map_err(|e| DomainError::validation(format!("Invalid glob '{}': {}", reference, e)))?
        .filter_map(Result::ok)
        .map(|path| path.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    matches.sort();

    if matches.is_empty() {
        warn!(pattern = %pattern, "File glob matched no files");
    }

    Ok(matches
        .into_iter()
        .map(|path| Value::String(format!("{}{}", FILE_PREFIX, path)))
        .collect())
}

/// Values a single variable contributes to the product
fn candidates(
    value: &Value,
    base_path: &Path,
    keep_sequences: bool,
) -> Result<Vec<Value>, DomainError> {
    match value {
        Value::String(s) => match s.strip_prefix(FILE_PREFIX) {
            Some(reference) if is_glob(reference) => expand_glob(reference, base_path),
            _ => Ok(vec![value.clone()]),
        },
        Value::Array(items) if keep_sequences || matches!(items.first(), Some(Value::Array(_))) => {
            Ok(vec![value.clone()])
        }
        Value::Array(items) => {
            let mut expanded = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => match s.strip_prefix(FILE_PREFIX) {
                        Some(reference) if is_glob(reference) => {
                            expanded.extend(expand_glob(reference, base_path)?)
                        }
                        _ => expanded.push(item.clone()),
                    },
                    other => expanded.push(other.clone()),
                }
            }
            Ok(expanded)
        }
        other => Ok(vec![other.clone()]),
    }
}

/// Expand `vars` into every combination of its sequence-valued entries
///
/// Scalars are copied into every combination. A sequence whose first element
/// is itself a sequence is kept whole. `file://` globs expand to their sorted
/// matches relative to `base_path`. The first declared variable varies
/// fastest and the last varies slowest. An empty map yields one empty
/// combination; an empty sequence yields none.
pub fn expand_vars(
    vars: &Vars,
    base_path: &Path,
    keep_sequences: bool,
) -> Result<Vec<Vars>, DomainError> {
    let mut combinations = vec![Vars::new()];

    for (key, value) in vars {
        let values = candidates(value, base_path, keep_sequences)?;
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for value in &values {
            for combination in &combinations {
                let mut extended = combination.clone();
                extended.insert(key.clone(), value.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    Ok(combinations)
}
