//! Explainable query results
//!
//! Rows carry their projected fields and a per-space breakdown of how the
//! composite score was reached; the metadata summarizes the whole search.

use crate::natural::NaturalQueryResponse;
use hybrix_core::{FieldValue, QueryPlan, RecordId, ScanResult, SearchHit, SpaceScore, SpaceWeight};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One ranked record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: RecordId,
    /// Composite weighted score
    pub score: f32,
    pub fields: BTreeMap<String, FieldValue>,
    /// Raw similarity and weight per scored space
    pub explain: Vec<SpaceScore>,
}

impl ResultRow {
    fn from_hit(hit: SearchHit, plan: &QueryPlan) -> Self {
        Self {
            fields: plan.projection().apply(&hit.record),
            id: hit.id,
            score: hit.score,
            explain: hit.space_scores,
        }
    }

    /// Space whose weighted similarity added the most to the score
    pub fn top_space(&self) -> Option<&str> {
        self.explain
            .iter()
            .max_by(|a, b| a.contribution().total_cmp(&b.contribution()))
            .map(|s| s.space.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Records scored
    pub candidates_count: usize,
    pub results_count: usize,
    pub avg_score: f32,
    pub best_score: Option<f32>,
    pub top_contributing_space: Option<String>,
}

impl SearchStats {
    pub fn from_rows(rows: &[ResultRow], candidates_count: usize) -> Self {
        let results_count = rows.len();
        let avg_score = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.score).sum::<f32>() / results_count as f32
        };

        Self {
            candidates_count,
            results_count,
            avg_score,
            best_score: rows.first().map(|r| r.score),
            top_contributing_space: rows.first().and_then(|r| r.top_space()).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub index: String,
    pub limit: usize,
    /// Effective weight of every scored space
    pub weights: Vec<SpaceWeight>,
    pub stats: SearchStats,
    /// Extraction trace, for natural language queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural: Option<NaturalQueryResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<ResultRow>,
    pub metadata: QueryMetadata,
}

impl QueryResult {
    pub fn from_scan(plan: &QueryPlan, scan: ScanResult) -> Self {
        let rows: Vec<ResultRow> = scan
            .hits
            .into_iter()
            .map(|hit| ResultRow::from_hit(hit, plan))
            .collect();
        let stats = SearchStats::from_rows(&rows, scan.candidates);

        Self {
            rows,
            metadata: QueryMetadata {
                index: plan.index_name().to_string(),
                limit: plan.limit(),
                weights: plan.weights(),
                stats,
                natural: None,
            },
        }
    }

    #[must_use]
    pub fn with_natural(mut self, response: NaturalQueryResponse) -> Self {
        self.metadata.natural = Some(response);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.rows.iter().map(|r| r.id.clone()).collect()
    }
}
