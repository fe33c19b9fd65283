//! Vector spaces
//!
//! A [`Space`] projects one schema field into a vector domain and defines
//! how two vectors of that domain are compared:
//!
//! - text spaces delegate to an [`EmbeddingProvider`] and compare with cosine
//!   similarity
//! - number spaces min/max normalize a value into `[0, 1]` and compare with
//!   `1 - |a - b|`
//!
//! Every similarity lies in `[-1, 1]` for text and `[0, 1]` for numbers.

use crate::embedder::EmbeddingProvider;
use crate::record::{FieldKind, FieldValue};
use crate::vector::Vector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// How a number space turns a value into a similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    /// Closeness to a query target
    #[default]
    Similar,
    /// Larger values score higher; no target needed
    Maximum,
    /// Smaller values score higher; no target needed
    Minimum,
}

/// What happens to a number outside the declared `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    #[default]
    Clamp,
    Reject,
}

pub struct TextSpace {
    provider: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for TextSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSpace")
            .field("model", &self.provider.model_id())
            .field("dimension", &self.provider.dimension())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NumberSpace {
    pub min: f64,
    pub max: f64,
    pub mode: NumberMode,
    pub out_of_range: OutOfRangePolicy,
}

impl NumberSpace {
    /// Map a raw value into `[0, 1]`, applying the out-of-range policy.
    pub fn normalize(&self, field: &str, value: f64) -> Result<f32> {
        if !value.is_finite() {
            return Err(Error::InvalidRecord(format!(
                "field '{}' must be a finite number",
                field
            )));
        }

        let mut value = value;
        if value < self.min || value > self.max {
            match self.out_of_range {
                OutOfRangePolicy::Reject => {
                    return Err(Error::OutOfDomain {
                        field: field.to_string(),
                        value,
                        min: self.min,
                        max: self.max,
                    });
                }
                OutOfRangePolicy::Clamp => {
                    let clamped = value.clamp(self.min, self.max);
                    warn!(
                        "Value {} of field '{}' outside [{}, {}], clamped to {}",
                        value, field, self.min, self.max, clamped
                    );
                    value = clamped;
                }
            }
        }

        Ok(((value - self.min) / (self.max - self.min)) as f32)
    }
}

#[derive(Debug)]
pub enum SpaceKind {
    Text(TextSpace),
    Number(NumberSpace),
}

/// A named projection of one schema field into a vector domain.
#[derive(Debug)]
pub struct Space {
    name: String,
    field: String,
    kind: SpaceKind,
}

impl Space {
    /// Text similarity space over `field`, embedded by `provider`.
    pub fn text(
        name: impl Into<String>,
        field: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind: SpaceKind::Text(TextSpace { provider }),
        }
    }

    /// Numeric proximity space over `field` with the declared range.
    pub fn number(
        name: impl Into<String>,
        field: impl Into<String>,
        min: f64,
        max: f64,
        mode: NumberMode,
    ) -> Result<Self> {
        let name = name.into();
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::Configuration(format!(
                "space '{}': range [{}, {}] must be finite with min < max",
                name, min, max
            )));
        }
        Ok(Self {
            name,
            field: field.into(),
            kind: SpaceKind::Number(NumberSpace {
                min,
                max,
                mode,
                out_of_range: OutOfRangePolicy::default(),
            }),
        })
    }

    /// Set the out-of-range policy; no effect on text spaces.
    #[must_use]
    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        if let SpaceKind::Number(number) = &mut self.kind {
            number.out_of_range = policy;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> &SpaceKind {
        &self.kind
    }

    /// Kind of field value this space reads
    pub fn field_kind(&self) -> FieldKind {
        match self.kind {
            SpaceKind::Text(_) => FieldKind::Text,
            SpaceKind::Number(_) => FieldKind::Number,
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.kind {
            SpaceKind::Text(text) => text.provider.dimension(),
            SpaceKind::Number(_) => 1,
        }
    }

    pub fn model_id(&self) -> Option<&str> {
        match &self.kind {
            SpaceKind::Text(text) => Some(text.provider.model_id()),
            SpaceKind::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<&NumberSpace> {
        match &self.kind {
            SpaceKind::Number(number) => Some(number),
            SpaceKind::Text(_) => None,
        }
    }

    /// Query vector implied by the space itself, for MAXIMUM/MINIMUM modes.
    pub fn implicit_target(&self) -> Option<Vector> {
        match &self.kind {
            SpaceKind::Number(NumberSpace {
                mode: NumberMode::Maximum,
                ..
            }) => Some(Vector::new(vec![1.0])),
            SpaceKind::Number(NumberSpace {
                mode: NumberMode::Minimum,
                ..
            }) => Some(Vector::new(vec![0.0])),
            _ => None,
        }
    }

    /// Embed texts with this space's provider, checking every dimension.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let SpaceKind::Text(text) = &self.kind else {
            return Err(Error::Configuration(format!(
                "space '{}' does not embed text",
                self.name
            )));
        };

        let vectors = text.provider.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(crate::ProviderError::Malformed(format!(
                "space '{}': expected {} embeddings, got {}",
                self.name,
                texts.len(),
                vectors.len()
            ))
            .into());
        }

        let expected = text.provider.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.dim() != expected) {
            return Err(Error::DimensionMismatch {
                space: self.name.clone(),
                expected,
                actual: bad.dim(),
            });
        }
        if let Some(i) = vectors.iter().position(|v| !v.is_finite()) {
            return Err(crate::ProviderError::Malformed(format!(
                "space '{}': embedding {} has non-finite components",
                self.name, i
            ))
            .into());
        }
        Ok(vectors)
    }

    /// One-dimensional vector for a number value.
    pub fn number_vector(&self, value: f64) -> Result<Vector> {
        match &self.kind {
            SpaceKind::Number(number) => {
                Ok(Vector::new(vec![number.normalize(&self.field, value)?]))
            }
            SpaceKind::Text(_) => Err(Error::Configuration(format!(
                "space '{}' does not embed numbers",
                self.name
            ))),
        }
    }

    /// Vector for a single field value.
    pub async fn embed(&self, value: &FieldValue) -> Result<Vector> {
        match (value, &self.kind) {
            (FieldValue::Text(text), SpaceKind::Text(_)) => {
                let mut vectors = self.embed_texts(std::slice::from_ref(text)).await?;
                vectors.pop().ok_or_else(|| {
                    crate::ProviderError::Malformed("no embedding returned".into()).into()
                })
            }
            (FieldValue::Number(n), SpaceKind::Number(_)) => self.number_vector(*n),
            _ => Err(Error::InvalidRecord(format!(
                "space '{}' expects a {} value for '{}', got {}",
                self.name,
                self.field_kind(),
                self.field,
                value.kind()
            ))),
        }
    }

    /// Similarity between a stored vector and a query vector.
    ///
    /// # Panics
    /// If the vectors differ in length. Both come from this space, so a
    /// mismatch means the index holds a vector it should have rejected.
    pub fn similarity(&self, a: &Vector, b: &Vector) -> f32 {
        assert_eq!(
            a.dim(),
            b.dim(),
            "dimension mismatch in space '{}'",
            self.name
        );
        match &self.kind {
            SpaceKind::Text(_) => a.cosine_similarity(b),
            // MAXIMUM and MINIMUM compare against the implicit 1.0 / 0.0 target
            SpaceKind::Number(_) => (1.0 - (a.as_slice()[0] - b.as_slice()[0]).abs()).clamp(0.0, 1.0),
        }
    }

    pub fn describe(&self) -> SpaceInfo {
        let (min, max, mode) = match &self.kind {
            SpaceKind::Number(n) => (Some(n.min), Some(n.max), Some(n.mode)),
            SpaceKind::Text(_) => (None, None, None),
        };
        SpaceInfo {
            name: self.name.clone(),
            field: self.field.clone(),
            kind: self.field_kind(),
            dimension: self.dimension(),
            model: self.model_id().map(str::to_string),
            min,
            max,
            mode,
        }
    }
}

/// Serializable summary of a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub name: String,
    pub field: String,
    pub kind: FieldKind,
    pub dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<NumberMode>,
}
