use crate::record::{FieldKind, RecordId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Index '{0}' has been shut down")]
    IndexClosed(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record {record} is missing field '{field}' required by space '{space}'")]
    MissingField {
        record: RecordId,
        field: String,
        space: String,
    },

    #[error("Value {value} of field '{field}' is outside the declared range [{min}, {max}]")]
    OutOfDomain {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid vector dimension for space '{space}': expected {expected}, got {actual}")]
    DimensionMismatch {
        space: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid query plan: {}", join(.0))]
    InvalidPlan(Vec<PlanViolation>),

    #[error("Batch rejected, {} record(s) failed: {}", .0.len(), join(.0))]
    Ingestion(Vec<RecordFailure>),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl Error {
    /// Whether the operation may succeed if retried unchanged.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_retryable(),
            Error::Extraction(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// A single record that could not be ingested, and why.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: RecordId,
    pub error: Error,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

/// One reason a query could not be turned into a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanViolation {
    UnknownSpace(String),
    DuplicateWeight(String),
    DuplicateTarget(String),
    InvalidWeight { space: String, weight: f32 },
    TargetKind { space: String, expected: FieldKind, actual: FieldKind },
    TargetOutOfDomain { space: String, value: f64, min: f64, max: f64 },
    UnknownField(String),
    ZeroLimit,
    NothingToScore,
    MissingParameter(String),
    ParameterKind { name: String, expected: String },
}

impl fmt::Display for PlanViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanViolation::UnknownSpace(s) => write!(f, "space '{}' does not belong to the index", s),
            PlanViolation::DuplicateWeight(s) => write!(f, "space '{}' is weighted more than once", s),
            PlanViolation::DuplicateTarget(s) => write!(f, "space '{}' has more than one target", s),
            PlanViolation::InvalidWeight { space, weight } => {
                write!(f, "weight {} for space '{}' must be finite and >= 0", weight, space)
            }
            PlanViolation::TargetKind { space, expected, actual } => {
                write!(f, "space '{}' expects a {} target, got {}", space, expected, actual)
            }
            PlanViolation::TargetOutOfDomain { space, value, min, max } => {
                write!(f, "target {} for space '{}' is outside [{}, {}]", value, space, min, max)
            }
            PlanViolation::UnknownField(s) => write!(f, "projected field '{}' is not in the schema", s),
            PlanViolation::ZeroLimit => write!(f, "limit must be greater than 0"),
            PlanViolation::NothingToScore => write!(f, "no space has both a weight and a target"),
            PlanViolation::MissingParameter(s) => write!(f, "parameter '{}' was not supplied", s),
            PlanViolation::ParameterKind { name, expected } => {
                write!(f, "parameter '{}' must be a {}", name, expected)
            }
        }
    }
}

/// Failures reported by an embedding provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to send embedding request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Request(_) | ProviderError::Timeout(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Malformed(_) | ProviderError::Unavailable(_) => false,
        }
    }
}

/// Failures while turning free text into query parameters.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("language model request failed: {0}")]
    Request(String),

    #[error("language model api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("language model timed out after {0:?}")]
    Timeout(Duration),

    #[error("language model output is not a JSON object: {0}")]
    MalformedOutput(String),

    #[error("invalid extracted parameters: {}", join(.0))]
    InvalidParameters(Vec<ParameterIssue>),

    #[error("natural language queries are not configured")]
    NotConfigured,
}

impl ExtractionError {
    /// Every extraction failure leaves the index untouched; only
    /// configuration problems cannot be fixed by retrying or falling back.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExtractionError::NotConfigured)
    }
}

/// A problem with a single extracted parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterIssue {
    Missing { name: String },
    Coercion { name: String, expected: String, raw: String },
    OutOfRange { name: String, value: f64, min: Option<f64>, max: Option<f64> },
}

impl fmt::Display for ParameterIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterIssue::Missing { name } => write!(f, "'{}' is required but missing", name),
            ParameterIssue::Coercion { name, expected, raw } => {
                write!(f, "'{}' expected {}, got {}", name, expected, raw)
            }
            ParameterIssue::OutOfRange { name, value, min, max } => {
                let lo = min.map(|v| v.to_string()).unwrap_or_else(|| "-inf".into());
                let hi = max.map(|v| v.to_string()).unwrap_or_else(|| "inf".into());
                write!(f, "'{}' = {} is outside [{}, {}]", name, value, lo, hi)
            }
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_plan_lists_every_violation() {
        let err = Error::InvalidPlan(vec![
            PlanViolation::UnknownSpace("colour".into()),
            PlanViolation::ZeroLimit,
        ]);
        let msg = err.to_string();
        assert!(msg.contains("colour"));
        assert!(msg.contains("limit must be greater than 0"));
    }

    #[test]
    fn test_recoverability() {
        let timeout = Error::Provider(ProviderError::Timeout(Duration::from_secs(1)));
        assert!(timeout.is_recoverable());

        let quota = ProviderError::Api { status: 429, body: "slow down".into() };
        assert!(quota.is_retryable());

        let auth = ProviderError::Api { status: 401, body: "bad key".into() };
        assert!(!auth.is_retryable());

        assert!(!Error::Extraction(ExtractionError::NotConfigured).is_recoverable());
        assert!(Error::Extraction(ExtractionError::MalformedOutput("x".into())).is_recoverable());
    }
}
