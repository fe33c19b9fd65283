//! Query plans
//!
//! [`QueryInputs`] is what a caller asks for: weights, targets, a limit and
//! a projection, named by space. [`QueryPlan::build`] checks those inputs
//! against an [`Index`], reporting every violation at once, and embeds the
//! targets. The resulting plan is immutable and ready to scan.

use crate::error::PlanViolation;
use crate::index::Index;
use crate::record::{FieldValue, Record};
use crate::space::{OutOfRangePolicy, Space, SpaceKind};
use crate::vector::Vector;
use crate::{Error, Result};
use ahash::AHashMap;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceWeight {
    pub space: String,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceTarget {
    pub space: String,
    pub value: FieldValue,
}

/// Which record fields a result carries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    #[default]
    All,
    Fields(BTreeSet<String>),
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Copy the projected fields out of a record.
    pub fn apply(&self, record: &Record) -> BTreeMap<String, FieldValue> {
        match self {
            Projection::All => record.fields.clone(),
            Projection::Fields(names) => record
                .fields
                .iter()
                .filter(|(name, _)| names.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Unvalidated query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryInputs {
    #[serde(default)]
    pub weights: Vec<SpaceWeight>,
    #[serde(default)]
    pub targets: Vec<SpaceTarget>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub select: Projection,
}

impl QueryInputs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn weight(mut self, space: impl Into<String>, weight: f32) -> Self {
        self.weights.push(SpaceWeight {
            space: space.into(),
            weight,
        });
        self
    }

    #[must_use]
    pub fn similar(mut self, space: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.targets.push(SpaceTarget {
            space: space.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Projection::fields(fields);
        self
    }
}

/// A space that takes part in scoring, with its weight and query vector.
#[derive(Debug, Clone)]
pub struct ScoredSpace {
    pub space: Arc<Space>,
    /// Slot position in the index
    pub position: usize,
    pub weight: f32,
    pub target: Vector,
}

/// Validated, immutable description of one search.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    index: String,
    scored: Vec<ScoredSpace>,
    limit: usize,
    projection: Projection,
}

/// Target of a space before text embedding
enum PendingTarget {
    Ready(Vector),
    Text(String),
}

impl QueryPlan {
    /// Validate `inputs` against `index` and embed the text targets.
    ///
    /// Fails with [`Error::InvalidPlan`] listing every violation before any
    /// provider is called.
    pub async fn build(index: &Index, inputs: QueryInputs) -> Result<QueryPlan> {
        index.ensure_open()?;
        let mut violations = Vec::new();

        let mut weights: AHashMap<&str, f32> = AHashMap::new();
        for w in &inputs.weights {
            if index.space(&w.space).is_none() {
                violations.push(PlanViolation::UnknownSpace(w.space.clone()));
            } else if weights.insert(w.space.as_str(), w.weight).is_some() {
                violations.push(PlanViolation::DuplicateWeight(w.space.clone()));
            }
            if !w.weight.is_finite() || w.weight < 0.0 {
                violations.push(PlanViolation::InvalidWeight {
                    space: w.space.clone(),
                    weight: w.weight,
                });
            }
        }

        let mut targets: AHashMap<&str, PendingTarget> = AHashMap::new();
        for t in &inputs.targets {
            let Some(space) = index.space(&t.space) else {
                violations.push(PlanViolation::UnknownSpace(t.space.clone()));
                continue;
            };
            if targets.contains_key(t.space.as_str()) {
                violations.push(PlanViolation::DuplicateTarget(t.space.clone()));
                continue;
            }
            match target_for(space, &t.value) {
                Ok(pending) => {
                    targets.insert(t.space.as_str(), pending);
                }
                Err(v) => violations.push(v),
            }
        }

        if inputs.limit == Some(0) {
            violations.push(PlanViolation::ZeroLimit);
        }

        if let Projection::Fields(names) = &inputs.select {
            for name in names {
                if index.schema().field(name).is_none() {
                    violations.push(PlanViolation::UnknownField(name.clone()));
                }
            }
        }

        // Scored spaces follow index order so scoring is deterministic
        let mut chosen: Vec<(usize, f32, PendingTarget)> = Vec::new();
        for (position, space) in index.spaces().iter().enumerate() {
            let explicit = targets.remove(space.name());
            let target = match (space.implicit_target(), explicit) {
                (Some(implicit), explicit) => {
                    if explicit.is_some() {
                        debug!("Target for space '{}' ignored; its mode implies one", space.name());
                    }
                    Some(PendingTarget::Ready(implicit))
                }
                (None, explicit) => explicit,
            };
            let weight = match (weights.get(space.name()), &target) {
                (Some(&w), _) => Some(w),
                // A target without a weight counts fully, except for implied
                // targets, which only apply when the space is weighted
                (None, Some(_)) if space.implicit_target().is_none() => Some(1.0),
                _ => None,
            };
            match (weight, target) {
                (Some(weight), Some(target)) => chosen.push((position, weight, target)),
                (Some(_), None) => debug!("Space '{}' weighted without a target, not scored", space.name()),
                _ => {}
            }
        }

        if chosen.is_empty() {
            violations.push(PlanViolation::NothingToScore);
        }

        if !violations.is_empty() {
            return Err(Error::InvalidPlan(violations));
        }

        let embeds = chosen.into_iter().map(|(position, weight, target)| {
            let space = index.spaces()[position].clone();
            async move {
                let target = match target {
                    PendingTarget::Ready(v) => v,
                    PendingTarget::Text(text) => space.embed(&FieldValue::Text(text)).await?,
                };
                Ok::<_, Error>(ScoredSpace {
                    space,
                    position,
                    weight,
                    target,
                })
            }
        });
        let scored = try_join_all(embeds).await?;

        let limit = inputs.limit.unwrap_or(index.config().default_limit);
        debug!(
            "Planned query on '{}': [{}], limit {}",
            index.name(),
            scored
                .iter()
                .map(|s| format!("{}={}", s.space.name(), s.weight))
                .collect::<Vec<_>>()
                .join(", "),
            limit
        );

        Ok(QueryPlan {
            index: index.name().to_string(),
            scored,
            limit,
            projection: inputs.select,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Scored spaces in index order
    pub fn scored(&self) -> &[ScoredSpace] {
        &self.scored
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Effective weight per scored space
    pub fn weights(&self) -> Vec<SpaceWeight> {
        self.scored
            .iter()
            .map(|s| SpaceWeight {
                space: s.space.name().to_string(),
                weight: s.weight,
            })
            .collect()
    }
}

fn target_for(space: &Space, value: &FieldValue) -> std::result::Result<PendingTarget, PlanViolation> {
    if value.kind() != space.field_kind() {
        return Err(PlanViolation::TargetKind {
            space: space.name().to_string(),
            expected: space.field_kind(),
            actual: value.kind(),
        });
    }

    match (space.kind(), value) {
        (SpaceKind::Text(_), FieldValue::Text(text)) => Ok(PendingTarget::Text(text.clone())),
        (SpaceKind::Number(number), FieldValue::Number(n)) => {
            let out = !n.is_finite() || *n < number.min || *n > number.max;
            if out && (number.out_of_range == OutOfRangePolicy::Reject || !n.is_finite()) {
                return Err(PlanViolation::TargetOutOfDomain {
                    space: space.name().to_string(),
                    value: *n,
                    min: number.min,
                    max: number.max,
                });
            }
            if out {
                warn!("Target {} for space '{}' clamped into [{}, {}]", n, space.name(), number.min, number.max);
            }
            let clamped = n.clamp(number.min, number.max);
            Ok(PendingTarget::Ready(Vector::new(vec![
                ((clamped - number.min) / (number.max - number.min)) as f32,
            ])))
        }
        _ => unreachable!("kinds checked above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::StaticModel;
    use crate::index::IndexConfig;
    use crate::schema::Schema;
    use crate::space::NumberMode;

    fn product_index() -> Index {
        let provider = Arc::new(
            StaticModel::new("stub", 2)
                .with("soft bristles", vec![1.0, 0.0])
                .with("cheap", vec![0.0, 1.0]),
        );
        let schema = Schema::new("product").text("description").number("rating").number("price");
        let spaces = vec![
            Space::text("description", "description", provider),
            Space::number("rating", "rating", 1.0, 5.0, NumberMode::Maximum).unwrap(),
            Space::number("price", "price", 0.0, 100.0, NumberMode::Similar)
                .unwrap()
                .with_out_of_range(OutOfRangePolicy::Reject),
        ];
        Index::new(IndexConfig::new("products"), schema, spaces).unwrap()
    }

    #[tokio::test]
    async fn test_build_lists_every_violation() {
        let index = product_index();
        let inputs = QueryInputs::new()
            .weight("colour", 1.0)
            .weight("description", -1.0)
            .weight("price", 0.5)
            .weight("price", 0.7)
            .similar("description", 4.0)
            .similar("price", 250.0)
            .limit(0)
            .select(["brand"]);

        let err = QueryPlan::build(&index, inputs).await.unwrap_err();
        let Error::InvalidPlan(violations) = err else {
            panic!("expected invalid plan");
        };

        assert!(violations.contains(&PlanViolation::UnknownSpace("colour".into())));
        assert!(violations.contains(&PlanViolation::InvalidWeight {
            space: "description".into(),
            weight: -1.0
        }));
        assert!(violations.contains(&PlanViolation::DuplicateWeight("price".into())));
        assert!(violations.iter().any(|v| matches!(v, PlanViolation::TargetKind { .. })));
        assert!(violations.iter().any(|v| matches!(v, PlanViolation::TargetOutOfDomain { .. })));
        assert!(violations.contains(&PlanViolation::ZeroLimit));
        assert!(violations.contains(&PlanViolation::UnknownField("brand".into())));
    }

    #[tokio::test]
    async fn test_weight_without_target_is_not_scored() {
        let index = product_index();
        let err = QueryPlan::build(&index, QueryInputs::new().weight("description", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(v) if v == vec![PlanViolation::NothingToScore]));
    }

    #[tokio::test]
    async fn test_defaults_and_implicit_targets() {
        let index = product_index();
        let plan = QueryPlan::build(
            &index,
            QueryInputs::new()
                .similar("description", "soft bristles")
                .weight("rating", 0.5)
                .similar("rating", 2.0),
        )
        .await
        .unwrap();

        assert_eq!(plan.limit(), 10);
        assert_eq!(plan.projection(), &Projection::All);
        assert_eq!(
            plan.weights(),
            vec![
                SpaceWeight { space: "description".into(), weight: 1.0 },
                SpaceWeight { space: "rating".into(), weight: 0.5 },
            ]
        );
        // Maximum mode ignores the supplied target
        assert_eq!(plan.scored()[1].target.as_slice(), &[1.0]);
        assert_eq!(plan.scored()[0].target.as_slice(), &[1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_unweighted_implicit_space_is_skipped() {
        let index = product_index();
        let plan = QueryPlan::build(&index, QueryInputs::new().similar("description", "cheap"))
            .await
            .unwrap();
        assert_eq!(plan.scored().len(), 1);
        assert_eq!(plan.scored()[0].space.name(), "description");
    }

    #[test]
    fn test_projection_apply() {
        let record = Record::new(1u64).with_field("description", "x").with_field("rating", 3.0);
        let only_rating = Projection::fields(["rating"]).apply(&record);
        assert_eq!(only_rating.len(), 1);
        assert!(only_rating.contains_key("rating"));
        assert_eq!(Projection::All.apply(&record).len(), 2);
    }

    #[test]
    fn test_inputs_from_json() {
        let inputs: QueryInputs = serde_json::from_value(serde_json::json!({
            "weights": [{"space": "description", "weight": 0.7}],
            "targets": [{"space": "description", "value": "soft bristles"}],
            "limit": 3,
            "select": {"fields": ["description"]}
        }))
        .unwrap();

        assert_eq!(inputs.limit, Some(3));
        assert_eq!(inputs.targets[0].value, FieldValue::from("soft bristles"));
        assert_eq!(inputs.select, Projection::fields(["description"]));
    }
}
