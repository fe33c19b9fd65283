//! Natural language query translation
//!
//! Turns free text into typed query parameters by asking a
//! [`LanguageModel`] for a JSON object shaped by a [`ParameterSchema`], then
//! checking every value against that schema. Nothing is guessed: missing,
//! uncoercible and out-of-range values are all reported together as
//! [`ExtractionError::InvalidParameters`].

use crate::llm::LanguageModel;
use hybrix_core::{ExtractionError, ParameterIssue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Text,
    Number,
    Integer,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Text => write!(f, "text"),
            ParamKind::Number => write!(f, "number"),
            ParamKind::Integer => write!(f, "integer"),
        }
    }
}

/// One expected parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

fn default_required() -> bool {
    true
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            min: None,
            max: None,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// The parameters a query expects, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub params: Vec<ParamSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; a name already present is left as is.
    #[must_use]
    pub fn with(mut self, spec: ParamSpec) -> Self {
        self.push(spec);
        self
    }

    pub fn push(&mut self, spec: ParamSpec) {
        if self.get(&spec.name).is_none() {
            self.params.push(spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The schema minus parameters the caller already has values for.
    pub fn without<'a>(&self, supplied: impl IntoIterator<Item = &'a String>) -> Self {
        let supplied: Vec<&String> = supplied.into_iter().collect();
        Self {
            params: self
                .params
                .iter()
                .filter(|p| !supplied.contains(&&p.name))
                .cloned()
                .collect(),
        }
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            ParamValue::Number(n) => exact_i64(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaturalQueryRequest {
    pub text: String,
    pub schema: ParameterSchema,
}

/// Extracted parameters plus what the model actually said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaturalQueryResponse {
    pub params: BTreeMap<String, ParamValue>,
    pub raw_output: String,
    pub model: String,
}

pub struct NaturalQueryTranslator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl NaturalQueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(60),
        }
    }

    /// Upper bound on one translation, retries included
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub async fn translate(
        &self,
        request: &NaturalQueryRequest,
    ) -> Result<NaturalQueryResponse, ExtractionError> {
        if request.schema.is_empty() {
            return Ok(NaturalQueryResponse {
                params: BTreeMap::new(),
                raw_output: String::new(),
                model: self.model.model_id().to_string(),
            });
        }

        let system = system_prompt(&request.schema);
        debug!(
            "Translating natural query ({} parameter(s)) with {}",
            request.schema.len(),
            self.model.model_id()
        );

        let raw = tokio::time::timeout(self.timeout, self.model.complete_json(&system, &request.text))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))??;

        let params = parse_output(&raw, &request.schema)?;
        info!(
            "Extracted parameters [{}] from natural query",
            params.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(NaturalQueryResponse {
            params,
            raw_output: raw,
            model: self.model.model_id().to_string(),
        })
    }
}

/// Instructions telling the model which parameters to extract.
pub fn system_prompt(schema: &ParameterSchema) -> String {
    let mut prompt = String::from(
        "You extract search parameters from a user's request.\n\
         Reply with one JSON object whose keys are the parameter names below and nothing else.\n\
         Numbers must be JSON numbers. Use null for an optional parameter the request does not mention.\n\n\
         Parameters:\n",
    );
    for p in &schema.params {
        let mut line = format!("- {} ({}", p.name, p.kind);
        match (p.min, p.max) {
            (Some(lo), Some(hi)) => line.push_str(&format!(", between {} and {}", lo, hi)),
            (Some(lo), None) => line.push_str(&format!(", at least {}", lo)),
            (None, Some(hi)) => line.push_str(&format!(", at most {}", hi)),
            (None, None) => {}
        }
        line.push_str(if p.required { ", required)" } else { ", optional)" });
        if !p.description.is_empty() {
            line.push_str(": ");
            line.push_str(&p.description);
        }
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt
}

/// Check raw model output against `schema`, coercing where lossless.
pub fn parse_output(
    raw: &str,
    schema: &ParameterSchema,
) -> Result<BTreeMap<String, ParamValue>, ExtractionError> {
    let body = strip_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ExtractionError::MalformedOutput(format!(
            "expected an object, got {}",
            body
        )));
    };

    let mut params = BTreeMap::new();
    let mut issues = Vec::new();

    for spec in &schema.params {
        match object.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    issues.push(ParameterIssue::Missing {
                        name: spec.name.clone(),
                    });
                }
            }
            Some(raw_value) => match coerce(spec, raw_value) {
                Ok(v) => {
                    params.insert(spec.name.clone(), v);
                }
                Err(issue) => issues.push(issue),
            },
        }
    }

    for key in object.keys().filter(|k| schema.get(k).is_none()) {
        debug!("Ignoring unexpected parameter '{}' in model output", key);
    }

    if issues.is_empty() {
        Ok(params)
    } else {
        Err(ExtractionError::InvalidParameters(issues))
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Converts an integral float that fits in an `i64` without saturating.
fn exact_i64(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as an f64, so the upper bound is exclusive
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

fn coerce(spec: &ParamSpec, raw: &Value) -> Result<ParamValue, ParameterIssue> {
    let mismatch = || ParameterIssue::Coercion {
        name: spec.name.clone(),
        expected: spec.kind.to_string(),
        raw: raw.to_string(),
    };

    let value = match spec.kind {
        ParamKind::Text => match raw {
            Value::String(s) => ParamValue::Text(s.clone()),
            Value::Number(n) => ParamValue::Text(n.to_string()),
            _ => return Err(mismatch()),
        },
        ParamKind::Number => {
            let n = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if n.is_finite() => ParamValue::Number(n),
                _ => return Err(mismatch()),
            }
        }
        ParamKind::Integer => {
            let i = match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(exact_i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match i {
                Some(i) => ParamValue::Integer(i),
                None => return Err(mismatch()),
            }
        }
    };

    if let Some(n) = value.as_f64() {
        let below = spec.min.is_some_and(|lo| n < lo);
        let above = spec.max.is_some_and(|hi| n > hi);
        if below || above {
            return Err(ParameterIssue::OutOfRange {
                name: spec.name.clone(),
                value: n,
                min: spec.min,
                max: spec.max,
            });
        }
    }
    Ok(value)
}
