//! Assertion definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TestCaseValidationError;

/// Assertion kind, without the `not-` negation prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    /// Output equals the value exactly (JSON-aware for structured values)
    Equals,
    /// Output contains the value
    Contains,
    /// Case-insensitive contains
    Icontains,
    /// Output contains at least one of the listed values
    ContainsAny,
    /// Output contains every listed value
    ContainsAll,
    /// Output starts with the value
    StartsWith,
    /// Output matches the regex pattern
    Regex,
    /// Output parses as JSON
    IsJson,
    /// Output contains a JSON object or array
    ContainsJson,
    /// Edit distance to the value is within the threshold
    Levenshtein,
    /// Call latency is within the threshold in milliseconds
    Latency,
    /// Expression over `output` and `context`, truthy or numeric
    Javascript,
    /// Rubric graded by a grading provider
    LlmRubric,
}

impl AssertionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Icontains => "icontains",
            Self::ContainsAny => "contains-any",
            Self::ContainsAll => "contains-all",
            Self::StartsWith => "starts-with",
            Self::Regex => "regex",
            Self::IsJson => "is-json",
            Self::ContainsJson => "contains-json",
            Self::Levenshtein => "levenshtein",
            Self::Latency => "latency",
            Self::Javascript => "javascript",
            Self::LlmRubric => "llm-rubric",
        }
    }

    /// Whether the assertion needs a `value`
    pub fn requires_value(&self) -> bool {
        !matches!(self, Self::IsJson | Self::ContainsJson | Self::Latency)
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssertionKind {
    type Err = TestCaseValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "contains" => Ok(Self::Contains),
            "icontains" => Ok(Self::Icontains),
            "contains-any" => Ok(Self::ContainsAny),
            "contains-all" => Ok(Self::ContainsAll),
            "starts-with" => Ok(Self::StartsWith),
            "regex" => Ok(Self::Regex),
            "is-json" => Ok(Self::IsJson),
            "contains-json" => Ok(Self::ContainsJson),
            "levenshtein" => Ok(Self::Levenshtein),
            "latency" => Ok(Self::Latency),
            "javascript" => Ok(Self::Javascript),
            "llm-rubric" => Ok(Self::LlmRubric),
            other => Err(TestCaseValidationError::UnknownAssertionType(
                other.to_string(),
            )),
        }
    }
}

/// A single check applied to a provider output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    /// Kind, optionally prefixed with `not-`
    #[serde(rename = "type")]
    pub assertion_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Relative weight in the aggregate score, default 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Named score this assertion contributes to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    /// Expression applied to the output before this assertion only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl Assertion {
    pub fn new(assertion_type: impl Into<String>) -> Self {
        Self {
            assertion_type: assertion_type.into(),
            value: None,
            threshold: None,
            weight: None,
            metric: None,
            transform: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new("contains").with_value(Value::String(value.into()))
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::new("equals").with_value(value)
    }

    pub fn llm_rubric(rubric: impl Into<String>) -> Self {
        Self::new("llm-rubric").with_value(Value::String(rubric.into()))
    }

    /// Split the type into its negation flag and kind
    pub fn kind(&self) -> Result<(bool, AssertionKind), TestCaseValidationError> {
        match self.assertion_type.strip_prefix("not-") {
            Some(rest) => Ok((true, rest.parse()?)),
            None => Ok((false, self.assertion_type.parse()?)),
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}
