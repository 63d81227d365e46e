//! Fixed-point resolution of variables that reference other variables

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::domain::vars::{value_to_string, Vars};

/// `{{ name }}` with a bare identifier
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Substitute `{{ name }}` placeholders in string values with sibling values
///
/// Runs until a pass changes nothing or `max_iterations` passes have run.
/// Placeholders naming an undefined variable (or the variable itself) are
/// left as they are for the template engine to handle. Returns the number of
/// passes that changed something.
pub fn resolve_vars(vars: &mut Vars, max_iterations: usize) -> usize {
    let mut passes = 0;

    for _ in 0..max_iterations {
        let mut changed = false;
        let keys: Vec<String> = vars.keys().cloned().collect();

        for key in keys {
            let Some(Value::String(text)) = vars.get(&key) else {
                continue;
            };
            if !PLACEHOLDER_PATTERN.is_match(text) {
                continue;
            }

            let resolved = PLACEHOLDER_PATTERN
                .replace_all(text, |caps: &Captures| {
                    let name = &caps[1];
                    match vars.get(name) {
                        Some(value) if name != key => value_to_string(value),
                        _ => caps[0].to_string(),
                    }
                })
                .into_owned();

            if resolved != *text {
                vars.insert(key, Value::String(resolved));
                changed = true;
            }
        }

        if !changed {
            break;
        }
        passes += 1;
    }

    passes
}
