//! Deterministic assertion checks over provider output

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::vars::value_to_string;

/// Outcome of one check before negation and weighting
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub pass: bool,
    pub score: f64,
    pub reason: String,
}

impl CheckOutcome {
    pub fn new(pass: bool, reason: impl Into<String>) -> Self {
        Self {
            pass,
            score: if pass { 1.0 } else { 0.0 },
            reason: reason.into(),
        }
    }

    pub fn scored(pass: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            pass,
            score,
            reason: reason.into(),
        }
    }
}

/// Listed values for `contains-any` / `contains-all`
///
/// Accepts a sequence or a comma-separated string.
fn value_list(expected: &Value) -> Vec<String> {
    match expected {
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        other => value_to_string(other)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

pub fn equals(output: &Value, expected: &Value) -> CheckOutcome {
    let pass = match expected {
        Value::Object(_) | Value::Array(_) => match output {
            Value::String(s) => serde_json::from_str::<Value>(s).is_ok_and(|v| &v == expected),
            other => other == expected,
        },
        _ => value_to_string(output) == value_to_string(expected),
    };
    CheckOutcome::new(
        pass,
        format!(
            "Expected output \"{}\" to equal \"{}\"",
            value_to_string(output),
            value_to_string(expected)
        ),
    )
}

pub fn contains(output: &str, expected: &Value, ignore_case: bool) -> CheckOutcome {
    let needle = value_to_string(expected);
    let pass = if ignore_case {
        output.to_lowercase().contains(&needle.to_lowercase())
    } else {
        output.contains(&needle)
    };
    CheckOutcome::new(pass, format!("Expected output to contain \"{}\"", needle))
}

pub fn contains_any(output: &str, expected: &Value) -> CheckOutcome {
    let values = value_list(expected);
    let pass = values.iter().any(|v| output.contains(v.as_str()));
    CheckOutcome::new(
        pass,
        format!("Expected output to contain one of \"{}\"", values.join(", ")),
    )
}

pub fn contains_all(output: &str, expected: &Value) -> CheckOutcome {
    let missing: Vec<String> = value_list(expected)
        .into_iter()
        .filter(|v| !output.contains(v.as_str()))
        .collect();
    CheckOutcome::new(
        missing.is_empty(),
        format!("Expected output to contain all of: missing \"{}\"", missing.join(", ")),
    )
}

pub fn starts_with(output: &str, expected: &Value) -> CheckOutcome {
    let prefix = value_to_string(expected);
    CheckOutcome::new(
        output.starts_with(&prefix),
        format!("Expected output to start with \"{}\"", prefix),
    )
}

pub fn regex(output: &str, pattern: &Value) -> CheckOutcome {
    let pattern = value_to_string(pattern);
    match Regex::new(&pattern) {
        Ok(re) => CheckOutcome::new(
            re.is_match(output),
            format!("Expected output to match regex \"{}\"", pattern),
        ),
        Err(e) => CheckOutcome::new(false, format!("Invalid regex pattern: {}", e)),
    }
}

pub fn is_json(output: &Value) -> CheckOutcome {
    let pass = match output {
        Value::String(s) => serde_json::from_str::<Value>(s).is_ok(),
        Value::Object(_) | Value::Array(_) => true,
        _ => false,
    };
    CheckOutcome::new(pass, "Expected output to be valid JSON")
}

pub fn contains_json(output: &Value) -> CheckOutcome {
    let pass = match output {
        Value::Object(_) | Value::Array(_) => true,
        other => extract_json(&value_to_string(other)).is_some(),
    };
    CheckOutcome::new(pass, "Expected output to contain valid JSON")
}

pub fn levenshtein(output: &str, expected: &Value, threshold: Option<f64>) -> CheckOutcome {
    let expected = value_to_string(expected);
    let threshold = threshold.unwrap_or(5.0);
    let distance = levenshtein_distance(output, &expected);
    CheckOutcome::new(
        distance as f64 <= threshold,
        format!(
            "Levenshtein distance {} exceeds threshold {}",
            distance, threshold
        ),
    )
}

pub fn latency(latency_ms: u64, threshold: Option<f64>) -> CheckOutcome {
    match threshold {
        Some(threshold) => CheckOutcome::new(
            latency_ms as f64 <= threshold,
            format!("Latency {}ms is greater than threshold {}ms", latency_ms, threshold),
        ),
        None => CheckOutcome::new(false, "Latency assertion requires a threshold"),
    }
}

/// Interpret a `{pass, score, reason}` verdict object
///
/// A missing `pass` is derived from `score >= 0.5`; a missing `score` from `pass`.
pub fn verdict(map: &Map<String, Value>) -> CheckOutcome {
    let score = map.get("score").and_then(Value::as_f64);
    let pass = map
        .get("pass")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| score.is_some_and(|s| s >= 0.5));
    let score = score.unwrap_or(if pass { 1.0 } else { 0.0 });
    let reason = map.get("reason").map(value_to_string).unwrap_or_default();
    CheckOutcome::scored(pass, score, reason)
}

/// First JSON object or array embedded in `text`
pub fn extract_json(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(idx, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value @ (Value::Object(_) | Value::Array(_)))) => Some(value),
                _ => None,
            }
        })
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_string_and_structured() {
        assert!(equals(&json!("Paris"), &json!("Paris")).pass);
        assert!(!equals(&json!("paris"), &json!("Paris")).pass);
        assert!(equals(&json!("{\"a\": 1}"), &json!({"a": 1})).pass);
        assert!(equals(&json!({"a": 1}), &json!({"a": 1})).pass);
        assert!(equals(&json!(42), &json!("42")).pass);
    }

    #[test]
    fn test_contains_variants() {
        assert!(contains("Hello World", &json!("World"), false).pass);
        assert!(!contains("Hello World", &json!("world"), false).pass);
        assert!(contains("Hello World", &json!("world"), true).pass);
        assert!(contains_any("red fox", &json!(["blue", "fox"])).pass);
        assert!(contains_any("red fox", &json!("blue, red")).pass);
        assert!(!contains_all("red fox", &json!(["red", "dog"])).pass);
        assert!(contains_all("red fox", &json!(["red", "fox"])).pass);
        assert!(starts_with("Answer: 4", &json!("Answer:")).pass);
    }

    #[test]
    fn test_regex() {
        assert!(regex("order #123", &json!(r"#\d+")).pass);
        assert!(!regex("order", &json!(r"#\d+")).pass);
        let invalid = regex("x", &json!("("));
        assert!(!invalid.pass);
        assert!(invalid.reason.contains("Invalid regex"));
    }

    #[test]
    fn test_json_checks() {
        assert!(is_json(&json!("{\"ok\": true}")).pass);
        assert!(!is_json(&json!("not json")).pass);
        assert!(contains_json(&json!("Here you go: {\"ok\": true} thanks")).pass);
        assert!(!contains_json(&json!("no braces {here")).pass);
        assert_eq!(
            extract_json("prefix [1, 2] suffix"),
            Some(json!([1, 2]))
        );
    }

    #[test]
    fn test_verdict() {
        let full = json!({"pass": false, "score": 0.7, "reason": "meh"});
        assert_eq!(
            verdict(full.as_object().unwrap()),
            CheckOutcome::scored(false, 0.7, "meh")
        );
        let score_only = json!({"score": 0.5});
        assert!(verdict(score_only.as_object().unwrap()).pass);
        let pass_only = json!({"pass": true});
        assert_eq!(verdict(pass_only.as_object().unwrap()).score, 1.0);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert!(levenshtein("kitten", &json!("sitting"), Some(3.0)).pass);
        assert!(!levenshtein("kitten", &json!("sitting"), Some(2.0)).pass);
    }

    #[test]
    fn test_latency() {
        assert!(latency(100, Some(200.0)).pass);
        assert!(!latency(300, Some(200.0)).pass);
        assert!(!latency(1, None).pass);
    }
}
