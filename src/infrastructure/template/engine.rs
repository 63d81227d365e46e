//! Minimal template engine for prompt rendering
//!
//! Supports `{{ path }}` output tags (dotted and indexed paths or small
//! expressions), filter chains (`{{ name | trim | upper }}`),
//! `{% raw %}...{% endraw %}` literal blocks and `{# comments #}`.
//! Undefined values render as an empty string. Control-flow tags are not
//! supported.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::expression::{ExpressionError, ExpressionEvaluator};
use crate::domain::prompt::{TemplateEngine, TemplateError, TemplateFilters};
use crate::domain::vars::{get_nested_field, value_to_string};
use crate::infrastructure::expression::ScriptEvaluator;

/// Plain variable path: `name`, `a.b.c`, `items[0].label`
static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[\w$]+|\[\d+\])*$").unwrap()
});

static INDEX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Filter invocation: `name` or `name(args)`
static FILTER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s*(?:\((.*)\))?$").unwrap());

static ENDRAW_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*endraw\s*-?%\}").unwrap());

/// Default [`TemplateEngine`]
#[derive(Debug, Clone)]
pub struct SimpleTemplateEngine {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for SimpleTemplateEngine {
    fn default() -> Self {
        Self::new(Arc::new(ScriptEvaluator::new()))
    }
}

impl SimpleTemplateEngine {
    /// Create an engine evaluating user filters and inline expressions with `evaluator`
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }

    fn render_output(
        &self,
        inner: &str,
        bindings: &Map<String, Value>,
        filters: &TemplateFilters,
    ) -> Result<String, TemplateError> {
        let mut parts = split_pipes(inner).into_iter();
        let head = parts.next().unwrap_or_default();
        let mut value = self.lookup(head.trim(), bindings)?;

        for filter in parts {
            value = self.apply_filter(filter.trim(), value, bindings, filters)?;
        }

        Ok(value.map(|v| value_to_string(&v)).unwrap_or_default())
    }

    fn lookup(
        &self,
        head: &str,
        bindings: &Map<String, Value>,
    ) -> Result<Option<Value>, TemplateError> {
        if head.is_empty() {
            return Err(TemplateError::ParseError {
                message: "empty output tag".to_string(),
            });
        }

        if PATH_PATTERN.is_match(head) {
            let path = INDEX_PATTERN.replace_all(head, ".$1");
            let (root, rest) = match path.split_once('.') {
                Some((root, rest)) => (root, Some(rest)),
                None => (&*path, None),
            };
            let value = bindings.get(root).and_then(|v| match rest {
                Some(rest) => get_nested_field(v, rest),
                None => Some(v),
            });
            return Ok(value.cloned());
        }

        match self.evaluator.evaluate(head, bindings) {
            Ok(value) => Ok(Some(value)),
            Err(ExpressionError::UnknownIdentifier(_)) => Ok(None),
            Err(e) => Err(TemplateError::ParseError {
                message: e.to_string(),
            }),
        }
    }

    fn apply_filter(
        &self,
        spec: &str,
        value: Option<Value>,
        bindings: &Map<String, Value>,
        filters: &TemplateFilters,
    ) -> Result<Option<Value>, TemplateError> {
        let caps = FILTER_PATTERN
            .captures(spec)
            .ok_or_else(|| TemplateError::ParseError {
                message: format!("invalid filter expression: {}", spec),
            })?;
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let args = match caps.get(2).map(|m| m.as_str().trim()) {
            Some(args) if !args.is_empty() => {
                match self.evaluator.evaluate(&format!("[{}]", args), bindings) {
                    Ok(Value::Array(items)) => items,
                    Ok(other) => vec![other],
                    Err(e) => {
                        return Err(TemplateError::FilterFailed {
                            name: name.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            _ => Vec::new(),
        };

        if let Some(expression) = filters.get(name) {
            let mut filter_bindings = Map::new();
            filter_bindings.insert("value".to_string(), value.unwrap_or(Value::Null));
            filter_bindings.insert("args".to_string(), Value::Array(args));
            return self
                .evaluator
                .evaluate(expression, &filter_bindings)
                .map(Some)
                .map_err(|e| TemplateError::FilterFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                });
        }

        let text = || value.as_ref().map(value_to_string).unwrap_or_default();
        let result = match name {
            "upper" => Value::String(text().to_uppercase()),
            "lower" => Value::String(text().to_lowercase()),
            "trim" => Value::String(text().trim().to_string()),
            "capitalize" => {
                let lowered = text().to_lowercase();
                let mut chars = lowered.chars();
                Value::String(match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                })
            }
            "length" => Value::from(match &value {
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                Some(Value::String(s)) => s.chars().count(),
                _ => 0,
            }),
            "dump" => Value::String(
                serde_json::to_string(&value.clone().unwrap_or(Value::Null)).map_err(|e| {
                    TemplateError::FilterFailed {
                        name: name.to_string(),
                        message: e.to_string(),
                    }
                })?,
            ),
            "join" => {
                let sep = args.first().map(value_to_string).unwrap_or_default();
                match &value {
                    Some(Value::Array(items)) => Value::String(
                        items.iter().map(value_to_string).collect::<Vec<_>>().join(&sep),
                    ),
                    _ => Value::String(text()),
                }
            }
            "first" => match &value {
                Some(Value::Array(items)) => items.first().cloned().unwrap_or(Value::Null),
                _ => Value::String(text().chars().take(1).collect()),
            },
            "last" => match &value {
                Some(Value::Array(items)) => items.last().cloned().unwrap_or(Value::Null),
                _ => Value::String(text().chars().last().map(String::from).unwrap_or_default()),
            },
            "default" | "d" => match &value {
                None | Some(Value::Null) => args.first().cloned().unwrap_or(Value::Null),
                Some(v) => v.clone(),
            },
            "safe" => return Ok(value.clone()),
            other => {
                return Err(TemplateError::UnknownFilter {
                    name: other.to_string(),
                });
            }
        };
        Ok(Some(result))
    }
}

/// Position of the next `{{`, `{%` or `{#`
fn next_tag(text: &str) -> Option<usize> {
    text.match_indices('{')
        .map(|(i, _)| i)
        .find(|&i| matches!(text.as_bytes().get(i + 1), Some(b'{' | b'%' | b'#')))
}

/// Split a tag body on `|` outside quotes, leaving `||` intact
fn split_pipes(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = inner.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(_), _) => {}
            (None, '"' | '\'' | '`') => quote = Some(c),
            (None, '|') => {
                if matches!(chars.peek(), Some((_, '|'))) {
                    chars.next();
                } else {
                    parts.push(&inner[start..i]);
                    start = i + 1;
                }
            }
            (None, _) => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

impl TemplateEngine for SimpleTemplateEngine {
    fn render_string(
        &self,
        template: &str,
        context: &Value,
        filters: &TemplateFilters,
    ) -> Result<String, TemplateError> {
        let empty = Map::new();
        let bindings = context.as_object().unwrap_or(&empty);

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = next_tag(rest) {
            out.push_str(&rest[..start]);
            let tag = &rest[start..];
            let close = match &tag[..2] {
                "{{" => "}}",
                "{%" => "%}",
                _ => "#}",
            };
            let end = tag[2..]
                .find(close)
                .ok_or(TemplateError::UnterminatedTag {
                    offset: offset + start,
                })?;
            let inner = tag[2..2 + end].trim_matches('-').trim();
            let mut consumed = start + 2 + end + 2;

            match &tag[..2] {
                "{{" => out.push_str(&self.render_output(inner, bindings, filters)?),
                "{#" => {}
                _ if inner == "raw" => {
                    let body = &rest[consumed..];
                    let endraw = ENDRAW_PATTERN.find(body).ok_or(
                        TemplateError::UnterminatedTag {
                            offset: offset + start,
                        },
                    )?;
                    out.push_str(&body[..endraw.start()]);
                    consumed += endraw.end();
                }
                _ => {
                    return Err(TemplateError::UnsupportedTag {
                        tag: inner.to_string(),
                    });
                }
            }

            offset += consumed;
            rest = &rest[consumed..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
