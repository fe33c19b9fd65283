//! Parameterized queries
//!
//! A [`QueryTemplate`] is a query defined once, with some weights, targets or
//! the limit left as named parameters. Binding parameter values yields
//! ordinary [`QueryInputs`], which go through the same validation as any
//! other query.

use crate::natural::{ParamKind, ParamSpec, ParamValue, ParameterSchema};
use hybrix_core::{Error, FieldValue, Index, PlanViolation, Projection, QueryInputs, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value fixed in the template, or a named parameter supplied per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, bound(deserialize = "T: Deserialize<'de>"))]
pub enum Param<T> {
    Fixed(T),
    Named {
        param: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<T>,
    },
}

impl<T> Param<T> {
    pub fn value(value: impl Into<T>) -> Self {
        Param::Fixed(value.into())
    }

    pub fn named(name: impl Into<String>, description: impl Into<String>) -> Self {
        Param::Named {
            param: name.into(),
            description: description.into(),
            default: None,
        }
    }

    /// Default used when the parameter is not supplied; no effect on fixed values.
    #[must_use]
    pub fn or(self, fallback: T) -> Self {
        match self {
            Param::Named {
                param, description, ..
            } => Param::Named {
                param,
                description,
                default: Some(fallback),
            },
            fixed => fixed,
        }
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Param::Fixed(value)
    }
}

/// Weight and optional target of one space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceBinding {
    pub space: String,
    pub weight: Param<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Param<FieldValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub spaces: Vec<SpaceBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Param<usize>>,
    #[serde(default)]
    pub select: Projection,
}

impl QueryTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    fn binding_mut(&mut self, space: &str) -> &mut SpaceBinding {
        let pos = match self.spaces.iter().position(|b| b.space == space) {
            Some(pos) => pos,
            None => {
                self.spaces.push(SpaceBinding {
                    space: space.to_string(),
                    weight: Param::Fixed(1.0),
                    target: None,
                });
                self.spaces.len() - 1
            }
        };
        &mut self.spaces[pos]
    }

    #[must_use]
    pub fn weight(mut self, space: &str, weight: Param<f32>) -> Self {
        self.binding_mut(space).weight = weight;
        self
    }

    /// Set the target of a space; a space without a weight gets 1.0.
    #[must_use]
    pub fn similar(mut self, space: &str, target: Param<FieldValue>) -> Self {
        self.binding_mut(space).target = Some(target);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Param<usize>) -> Self {
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

    /// Parameters this template needs, typed from the index's spaces.
    ///
    /// Parameters with a default are optional. Bindings naming a space the
    /// index lacks are skipped here and reported when the query is planned.
    pub fn parameter_schema(&self, index: &Index) -> ParameterSchema {
        let mut schema = ParameterSchema::new();

        for binding in &self.spaces {
            let Some(space) = index.space(&binding.space) else {
                continue;
            };

            if let Param::Named {
                param,
                description,
                default,
            } = &binding.weight
            {
                let description = or_describe(description, || {
                    format!("importance of '{}' from 0 upwards", space.name())
                });
                let mut spec = ParamSpec::new(param, ParamKind::Number, description).range(Some(0.0), None);
                if default.is_some() {
                    spec = spec.optional();
                }
                schema.push(spec);
            }

            if let Some(Param::Named {
                param,
                description,
                default,
            }) = &binding.target
            {
                let mut spec = match space.as_number() {
                    Some(number) => ParamSpec::new(
                        param,
                        ParamKind::Number,
                        or_describe(description, || format!("target value for '{}'", space.field())),
                    )
                    .range(Some(number.min), Some(number.max)),
                    None => ParamSpec::new(
                        param,
                        ParamKind::Text,
                        or_describe(description, || format!("text to match against '{}'", space.field())),
                    ),
                };
                if default.is_some() {
                    spec = spec.optional();
                }
                schema.push(spec);
            }
        }

        if let Some(Param::Named {
            param,
            description,
            default,
        }) = &self.limit
        {
            let mut spec = ParamSpec::new(
                param,
                ParamKind::Integer,
                or_describe(description, || "number of results to return".to_string()),
            )
            .range(Some(1.0), None);
            if default.is_some() {
                spec = spec.optional();
            }
            schema.push(spec);
        }

        schema
    }

    /// Resolve every parameter into plain query inputs.
    ///
    /// All missing or mistyped parameters are reported together as
    /// [`Error::InvalidPlan`].
    pub fn bind(&self, params: &BTreeMap<String, ParamValue>) -> Result<QueryInputs> {
        let mut violations = Vec::new();
        let mut inputs = QueryInputs {
            select: self.select.clone(),
            ..QueryInputs::new()
        };

        for binding in &self.spaces {
            if let Some(weight) = resolve(&binding.weight, params, &mut violations, number_weight) {
                inputs = inputs.weight(binding.space.clone(), weight);
            }
            if let Some(target) = &binding.target {
                if let Some(value) = resolve(target, params, &mut violations, field_value) {
                    inputs = inputs.similar(binding.space.clone(), value);
                }
            }
        }

        if let Some(limit) = &self.limit {
            if let Some(limit) = resolve(limit, params, &mut violations, positive_count) {
                inputs = inputs.limit(limit);
            }
        }

        if violations.is_empty() {
            Ok(inputs)
        } else {
            Err(Error::InvalidPlan(violations))
        }
    }
}

fn or_describe(description: &str, fallback: impl FnOnce() -> String) -> String {
    if description.is_empty() {
        fallback()
    } else {
        description.to_string()
    }
}

fn resolve<T: Clone>(
    param: &Param<T>,
    params: &BTreeMap<String, ParamValue>,
    violations: &mut Vec<PlanViolation>,
    convert: fn(&ParamValue) -> std::result::Result<T, &'static str>,
) -> Option<T> {
    match param {
        Param::Fixed(value) => Some(value.clone()),
        Param::Named { param, default, .. } => match params.get(param) {
            Some(raw) => match convert(raw) {
                Ok(value) => Some(value),
                Err(expected) => {
                    violations.push(PlanViolation::ParameterKind {
                        name: param.clone(),
                        expected: expected.to_string(),
                    });
                    None
                }
            },
            None => {
                if default.is_none() {
                    violations.push(PlanViolation::MissingParameter(param.clone()));
                }
                default.clone()
            }
        },
    }
}

fn number_weight(value: &ParamValue) -> std::result::Result<f32, &'static str> {
    value.as_f64().map(|n| n as f32).ok_or("number")
}

fn field_value(value: &ParamValue) -> std::result::Result<FieldValue, &'static str> {
    Ok(match value {
        ParamValue::Text(s) => FieldValue::Text(s.clone()),
        ParamValue::Integer(i) => FieldValue::Number(*i as f64),
        ParamValue::Number(n) => FieldValue::Number(*n),
    })
}

fn positive_count(value: &ParamValue) -> std::result::Result<usize, &'static str> {
    value
        .as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or("non-negative integer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrix_core::{IndexConfig, LocalModel, NumberMode, Schema, Space};
    use std::sync::Arc;

    fn product_index() -> Index {
        let schema = Schema::new("product").text("description").number("rating");
        let spaces = vec![
            Space::text("description", "description", Arc::new(LocalModel::new("m", 32))),
            Space::number("rating", "rating", 1.0, 5.0, NumberMode::Maximum).unwrap(),
        ];
        Index::new(IndexConfig::new("products"), schema, spaces).unwrap()
    }

    fn template() -> QueryTemplate {
        QueryTemplate::new()
            .weight("description", Param::named("description_weight", "").or(1.0))
            .similar("description", Param::named("search", "what to look for"))
            .weight("rating", Param::named("rating_weight", ""))
            .limit(Param::named("limit", "").or(10))
    }

    #[test]
    fn test_parameter_schema() {
        let schema = template().parameter_schema(&product_index());

        let names: Vec<&str> = schema.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["description_weight", "search", "rating_weight", "limit"]);

        let search = schema.get("search").unwrap();
        assert_eq!(search.kind, ParamKind::Text);
        assert!(search.required);
        assert_eq!(search.description, "what to look for");

        let weight = schema.get("description_weight").unwrap();
        assert!(!weight.required);
        assert_eq!(weight.min, Some(0.0));

        let limit = schema.get("limit").unwrap();
        assert_eq!(limit.kind, ParamKind::Integer);
        assert_eq!(limit.min, Some(1.0));
    }

    #[test]
    fn test_bind_uses_params_and_defaults() {
        let mut params = BTreeMap::new();
        params.insert("search".to_string(), ParamValue::from("soft bristles"));
        params.insert("rating_weight".to_string(), ParamValue::Number(0.5));

        let inputs = template().bind(&params).unwrap();

        assert_eq!(inputs.weights.len(), 2);
        assert_eq!(inputs.weights[0].weight, 1.0);
        assert_eq!(inputs.weights[1].weight, 0.5);
        assert_eq!(inputs.targets[0].value, FieldValue::from("soft bristles"));
        assert_eq!(inputs.limit, Some(10));
    }

    #[test]
    fn test_bind_reports_all_missing_and_mistyped() {
        let mut params = BTreeMap::new();
        params.insert("rating_weight".to_string(), ParamValue::from("high"));

        let err = template().bind(&params).unwrap_err();
        let Error::InvalidPlan(violations) = err else {
            panic!("expected invalid plan");
        };
        assert_eq!(
            violations,
            vec![
                PlanViolation::MissingParameter("search".into()),
                PlanViolation::ParameterKind {
                    name: "rating_weight".into(),
                    expected: "number".into()
                },
            ]
        );
    }

    #[test]
    fn test_template_from_json() {
        let template: QueryTemplate = serde_json::from_value(serde_json::json!({
            "spaces": [
                {"space": "description", "weight": 1.0, "target": {"param": "search"}},
                {"space": "rating", "weight": {"param": "rating_weight", "default": 0.0}}
            ],
            "limit": 3
        }))
        .unwrap();

        assert_eq!(template.spaces[0].weight, Param::Fixed(1.0));
        assert_eq!(template.spaces[0].target, Some(Param::named("search", "")));
        assert_eq!(template.limit, Some(Param::Fixed(3)));

        let schema = template.parameter_schema(&product_index());
        assert_eq!(schema.len(), 2);
        assert!(!schema.get("rating_weight").unwrap().required);
    }
}
