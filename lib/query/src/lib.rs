//! # hybrix Query
//!
//! Query execution on top of `hybrix-core`:
//!
//! - [`Executor`] - Registry of indices; ingestion and query entry points
//! - [`QueryTemplate`] - Queries with named parameters supplied per call
//! - [`NaturalQueryTranslator`] - Free text to template parameters via a [`LanguageModel`]
//! - [`QueryResult`] - Ranked rows with per-space explanations and search metadata

pub mod executor;
pub mod explain;
pub mod llm;
pub mod natural;
pub mod template;

pub use executor::Executor;
pub use explain::{QueryMetadata, QueryResult, ResultRow, SearchStats};
pub use llm::{LanguageModel, OpenAiChat, StaticLanguageModel, DEFAULT_CHAT_MODEL};
pub use natural::{
    parse_output, system_prompt, NaturalQueryRequest, NaturalQueryResponse, NaturalQueryTranslator,
    ParamKind, ParamSpec, ParamValue, ParameterSchema,
};
pub use template::{Param, QueryTemplate, SpaceBinding};
