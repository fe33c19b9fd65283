//! # hybrix Core
//!
//! Core library for the hybrix multi-space search engine.
//!
//! This crate provides the data model and the ranking engine:
//!
//! - [`Record`] - An identified set of typed field values
//! - [`Schema`] - The declared shape of records
//! - [`Space`] - Projection of one field into a vector domain (text or number)
//! - [`EmbeddingProvider`] - Text to vector capability, local or remote
//! - [`Index`] - Per-space vector storage with weighted exact-scan search
//! - [`QueryPlan`] - Validated weights, targets, limit and projection
//!
//! ## Example
//!
//! ```rust
//! use hybrix_core::{Index, IndexConfig, LocalModel, NumberMode, QueryInputs, QueryPlan, Record, Schema, Space};
//! use std::sync::Arc;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let schema = Schema::new("product").text("description").number("rating");
//! let spaces = vec![
//!     Space::text("description", "description", Arc::new(LocalModel::default())),
//!     Space::number("rating", "rating", 1.0, 5.0, NumberMode::Maximum).unwrap(),
//! ];
//! let index = Index::new(IndexConfig::new("products"), schema, spaces).unwrap();
//!
//! index
//!     .put(vec![Record::new(1u64).with_field("description", "soft toothbrush").with_field("rating", 4.0)])
//!     .await
//!     .unwrap();
//!
//! let inputs = QueryInputs::new()
//!     .weight("description", 1.0)
//!     .similar("description", "gentle toothbrush")
//!     .weight("rating", 0.5);
//! let plan = QueryPlan::build(&index, inputs).await.unwrap();
//! let hits = index.search(&plan).unwrap();
//! assert_eq!(hits.len(), 1);
//! # });
//! # }
//! ```

pub mod cache;
pub mod embedder;
pub mod error;
pub mod index;
pub mod plan;
pub mod record;
pub mod remote;
pub mod retry;
pub mod schema;
pub mod space;
pub mod vector;

pub use cache::{CachedProvider, EmbeddingCache};
pub use embedder::{EmbeddingProvider, LocalModel, StaticModel, DEFAULT_LOCAL_DIM};
pub use error::{
    Error, ExtractionError, ParameterIssue, PlanViolation, ProviderError, RecordFailure, Result,
};
pub use index::{
    Index, IndexConfig, IndexedEntry, MissingFieldPolicy, ScanResult, SearchHit, Slot, SpaceScore,
};
pub use plan::{Projection, QueryInputs, QueryPlan, ScoredSpace, SpaceTarget, SpaceWeight};
pub use record::{FieldKind, FieldValue, Record, RecordId};
pub use remote::OpenAiEmbeddings;
pub use retry::RetryPolicy;
pub use schema::{FieldDef, Schema};
pub use space::{NumberMode, NumberSpace, OutOfRangePolicy, Space, SpaceInfo, SpaceKind, TextSpace};
pub use vector::Vector;
