//! Value coercions and built-in functions of the expression language

use serde_json::{Map, Number, Value};

use crate::domain::expression::{is_truthy, ExpressionError};

/// Number value, integral when the float has no fraction
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// String conversion used by concatenation and template literals
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(to_display).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => to_number(a) == to_number(b),
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`; `None` when incomparable
pub fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

pub fn add(a: &Value, b: &Value) -> Value {
    let concatenates = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if concatenates(a) || concatenates(b) {
        Value::String(format!("{}{}", to_display(a), to_display(b)))
    } else {
        number(to_number(a) + to_number(b))
    }
}

fn arg(args: &[Value], idx: usize) -> &Value {
    args.get(idx).unwrap_or(&Value::Null)
}

fn string_arg(args: &[Value], idx: usize) -> String {
    args.get(idx).map(to_display).unwrap_or_default()
}

/// Resolve a possibly negative start/end index against a length
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_null() {
        return default;
    }
    let idx = to_number(value);
    if idx.is_nan() {
        return 0;
    }
    let idx = idx.trunc() as i64;
    if idx < 0 {
        (len as i64 + idx).max(0) as usize
    } else {
        (idx as usize).min(len)
    }
}

fn char_index(haystack: &str, byte_idx: Option<usize>) -> Value {
    match byte_idx {
        Some(idx) => Value::from(haystack[..idx].chars().count() as i64),
        None => Value::from(-1),
    }
}

/// Call a method on a value
pub fn call_method(target: &Value, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    match target {
        Value::String(s) => string_method(s, method, args),
        Value::Array(items) => array_method(items, method, args),
        Value::Number(n) if method == "toFixed" => {
            let digits = to_number(arg(args, 0)).max(0.0) as usize;
            Ok(Value::String(format!(
                "{:.*}",
                digits,
                n.as_f64().unwrap_or(f64::NAN)
            )))
        }
        Value::Null => Err(ExpressionError::evaluation(format!(
            "Cannot read properties of undefined (reading '{}')",
            method
        ))),
        _ if method == "toString" => Ok(Value::String(to_display(target))),
        _ => Err(ExpressionError::UnsupportedCall(format!(
            "{}.{}",
            type_of(target),
            method
        ))),
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let chars: Vec<char> = s.chars().collect();
    let result = match method {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "toString" => Value::String(s.to_string()),
        "includes" => Value::Bool(s.contains(string_arg(args, 0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(string_arg(args, 0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(string_arg(args, 0).as_str())),
        "indexOf" => char_index(s, s.find(string_arg(args, 0).as_str())),
        "lastIndexOf" => char_index(s, s.rfind(string_arg(args, 0).as_str())),
        "split" => match args.first() {
            None | Some(Value::Null) => Value::Array(vec![Value::String(s.to_string())]),
            Some(sep) => {
                let sep = to_display(sep);
                let parts: Vec<Value> = if sep.is_empty() {
                    chars.iter().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
                };
                Value::Array(parts)
            }
        },
        "replace" => Value::String(s.replacen(
            string_arg(args, 0).as_str(),
            string_arg(args, 1).as_str(),
            1,
        )),
        "replaceAll" => Value::String(s.replace(
            string_arg(args, 0).as_str(),
            string_arg(args, 1).as_str(),
        )),
        "slice" => {
            let start = relative_index(arg(args, 0), chars.len(), 0);
            let end = relative_index(arg(args, 1), chars.len(), chars.len());
            Value::String(chars[start..end.max(start)].iter().collect())
        }
        "substring" => {
            let clamp = |v: &Value, default: usize| {
                if v.is_null() {
                    default
                } else {
                    (to_number(v).max(0.0) as usize).min(chars.len())
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), chars.len());
            Value::String(chars[a.min(b)..a.max(b)].iter().collect())
        }
        "charAt" => {
            let idx = to_number(arg(args, 0)).max(0.0) as usize;
            Value::String(chars.get(idx).map(|c| c.to_string()).unwrap_or_default())
        }
        "repeat" => Value::String(s.repeat(to_number(arg(args, 0)).max(0.0) as usize)),
        other => {
            return Err(ExpressionError::UnsupportedCall(format!("string.{}", other)));
        }
    };
    Ok(result)
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let result = match method {
        "includes" => Value::Bool(items.iter().any(|v| strict_equals(v, arg(args, 0)))),
        "indexOf" => Value::from(
            items
                .iter()
                .position(|v| strict_equals(v, arg(args, 0)))
                .map(|i| i as i64)
                .unwrap_or(-1),
        ),
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(sep) => to_display(sep),
            };
            Value::String(items.iter().map(to_display).collect::<Vec<_>>().join(&sep))
        }
        "slice" => {
            let start = relative_index(arg(args, 0), items.len(), 0);
            let end = relative_index(arg(args, 1), items.len(), items.len());
            Value::Array(items[start..end.max(start)].to_vec())
        }
        "concat" => {
            let mut joined = items.to_vec();
            for value in args {
                match value {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other.clone()),
                }
            }
            Value::Array(joined)
        }
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        "toString" => Value::String(to_display(&Value::Array(items.to_vec()))),
        other => {
            return Err(ExpressionError::UnsupportedCall(format!("array.{}", other)));
        }
    };
    Ok(result)
}

/// Call a free function such as `parseInt`
pub fn call_function(name: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let value = arg(args, 0);
    let result = match name {
        "Number" | "parseFloat" => number_or_null(to_number(value)),
        "parseInt" => {
            let text = to_display(value);
            let trimmed = text.trim();
            let digits: String = trimmed
                .char_indices()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
                .map(|(_, c)| c)
                .collect();
            number_or_null(digits.parse::<f64>().unwrap_or(f64::NAN))
        }
        "String" => Value::String(to_display(value)),
        "Boolean" => Value::Bool(is_truthy(value)),
        "isNaN" => Value::Bool(to_number(value).is_nan()),
        other => return Err(ExpressionError::UnsupportedCall(other.to_string())),
    };
    Ok(result)
}

fn number_or_null(n: f64) -> Value {
    if n.is_nan() { Value::Null } else { number(n) }
}

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().flat_map(|v| match v {
        Value::Array(items) => items.iter().map(to_number).collect::<Vec<_>>(),
        other => vec![to_number(other)],
    })
}

/// Call a method of a global namespace (`JSON`, `Math`, `Object`, `Array`)
///
/// Returns `None` when `namespace` is not a known global.
pub fn call_namespace(
    namespace: &str,
    method: &str,
    args: &[Value],
) -> Option<Result<Value, ExpressionError>> {
    let value = arg(args, 0);
    let result = match (namespace, method) {
        ("JSON", "parse") => serde_json::from_str::<Value>(&to_display(value))
            .map_err(|e| ExpressionError::evaluation(format!("JSON.parse: {}", e))),
        ("JSON", "stringify") => {
            let pretty = to_number(arg(args, 2)) > 0.0;
            let text = if pretty {
                serde_json::to_string_pretty(value)
            } else {
                serde_json::to_string(value)
            };
            text.map(Value::String)
                .map_err(|e| ExpressionError::evaluation(format!("JSON.stringify: {}", e)))
        }
        ("Math", "min") => Ok(number_or_null(numbers(args).fold(f64::INFINITY, f64::min))),
        ("Math", "max") => Ok(number_or_null(numbers(args).fold(f64::NEG_INFINITY, f64::max))),
        ("Math", "round") => Ok(number_or_null((to_number(value) + 0.5).floor())),
        ("Math", "floor") => Ok(number_or_null(to_number(value).floor())),
        ("Math", "ceil") => Ok(number_or_null(to_number(value).ceil())),
        ("Math", "abs") => Ok(number_or_null(to_number(value).abs())),
        ("Math", "sqrt") => Ok(number_or_null(to_number(value).sqrt())),
        ("Math", "pow") => Ok(number_or_null(to_number(value).powf(to_number(arg(args, 1))))),
        ("Object", "keys") => Ok(match value {
            Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
            _ => Value::Array(vec![]),
        }),
        ("Object", "values") => Ok(match value {
            Value::Object(map) => Value::Array(map.values().cloned().collect()),
            _ => Value::Array(vec![]),
        }),
        ("Object", "entries") => Ok(match value {
            Value::Object(map) => Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ),
            _ => Value::Array(vec![]),
        }),
        ("Array", "isArray") => Ok(Value::Bool(value.is_array())),
        ("JSON" | "Math" | "Object" | "Array", other) => Err(ExpressionError::UnsupportedCall(
            format!("{}.{}", namespace, other),
        )),
        _ => return None,
    };
    Some(result)
}

/// Read a property of a value
pub fn member(target: &Value, name: &str) -> Result<Value, ExpressionError> {
    match target {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len() as i64)),
        Value::String(s) if name == "length" => Ok(Value::from(s.chars().count() as i64)),
        Value::Null => Err(ExpressionError::evaluation(format!(
            "Cannot read properties of undefined (reading '{}')",
            name
        ))),
        _ => Ok(Value::Null),
    }
}

/// Index into a value with a computed key
pub fn index(target: &Value, key: &Value) -> Result<Value, ExpressionError> {
    match (target, key) {
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (_, Value::String(name)) => member(target, name),
        (Value::Object(map), other) => Ok(map.get(&to_display(other)).cloned().unwrap_or(Value::Null)),
        (Value::Null, _) => Err(ExpressionError::evaluation(
            "Cannot read properties of undefined",
        )),
        _ => Ok(Value::Null),
    }
}

pub fn object(fields: Vec<(String, Value)>) -> Value {
    Value::Object(fields.into_iter().collect::<Map<String, Value>>())
}
