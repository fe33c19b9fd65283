//! # hybrix
//!
//! Hybrid multi-space semantic search. Records are projected into several
//! vector spaces at once (text meaning, numeric closeness) and ranked by a
//! weighted sum of per-space similarities. Queries can be written directly,
//! through parameterized templates, or as free text that a language model
//! turns into template parameters.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! hybrix --config hybrix.json serve --http-port 8080
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use hybrix::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let schema = Schema::new("review").text("body").number("stars");
//! let spaces = vec![
//!     Space::text("body", "body", Arc::new(LocalModel::default())),
//!     Space::number("stars", "stars", 1.0, 5.0, NumberMode::Maximum)?,
//! ];
//!
//! let executor = Executor::new();
//! executor.register(Index::new(IndexConfig::new("reviews"), schema, spaces)?)?;
//! executor
//!     .put("reviews", vec![Record::new(1u64).with_field("body", "Amazing acting").with_field("stars", 5.0)])
//!     .await?;
//!
//! let result = executor
//!     .query("reviews", QueryInputs::new().weight("body", 1.0).similar("body", "excellent performance"))
//!     .await?;
//! println!("{:?}", result.ids());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`hybrix-core`](https://docs.rs/hybrix-core) - Records, spaces, embedding providers, index and query plans
//! - [`hybrix-query`](https://docs.rs/hybrix-query) - Executor, templates, natural language translation
//! - [`hybrix-api`](https://docs.rs/hybrix-api) - REST API

pub mod config;

pub use config::{EngineConfig, IndexDefinition, SpaceDefinition};

// Re-export core types
pub use hybrix_core::{
    EmbeddingProvider, Error, FieldKind, FieldValue, Index, IndexConfig, LocalModel,
    MissingFieldPolicy, NumberMode, OpenAiEmbeddings, OutOfRangePolicy, Projection, QueryInputs,
    QueryPlan, Record, RecordId, Result, Schema, Space, Vector,
};

// Re-export query layer
pub use hybrix_query::{
    Executor, LanguageModel, NaturalQueryTranslator, OpenAiChat, Param, ParamValue, QueryResult,
    QueryTemplate,
};

// Re-export API
pub use hybrix_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        EmbeddingProvider, EngineConfig, Error, Executor, FieldValue, Index, IndexConfig,
        LocalModel, NumberMode, Param, ParamValue, QueryInputs, QueryResult, QueryTemplate, Record,
        RecordId, Result, Schema, Space,
    };
}
