//! Engine configuration
//!
//! Loaded from a JSON file; every section has defaults, so `{}` is a valid
//! configuration that embeds locally and has natural language queries
//! disabled.

use hybrix_core::{
    CachedProvider, EmbeddingProvider, Error, FieldDef, FieldKind, Index, IndexConfig, LocalModel,
    MissingFieldPolicy, NumberMode, OpenAiEmbeddings, OutOfRangePolicy, Result, RetryPolicy, Schema,
    Space,
};
use hybrix_query::{Executor, NaturalQueryTranslator, OpenAiChat, DEFAULT_CHAT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub dimension: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// LRU entries; 0 disables caching
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model: "local-trigram".to_string(),
            dimension: hybrix_core::DEFAULT_LOCAL_DIM,
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            cache_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub missing_field: MissingFieldPolicy,
    pub batch_size: usize,
    pub max_concurrent_embeds: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let defaults = IndexConfig::default();
        Self {
            missing_field: defaults.missing_field,
            batch_size: defaults.embed_batch_size,
            max_concurrent_embeds: defaults.max_concurrent_embeds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: IndexConfig::default().default_limit,
        }
    }
}

/// One space of an index definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceDefinition {
    /// Defaults to the field name
    #[serde(default)]
    pub name: Option<String>,
    pub field: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub mode: NumberMode,
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub spaces: Vec<SpaceDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub ingest: IngestConfig,
    pub query: QueryConfig,
    pub indices: Vec<IndexDefinition>,
}

fn resolve_key(explicit: &Option<String>, env: &str) -> Option<String> {
    explicit
        .clone()
        .or_else(|| std::env::var(env).ok())
        .filter(|k| !k.trim().is_empty())
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// The text embedding provider shared by every text space.
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let cfg = &self.embedding;
        if cfg.dimension == 0 {
            return Err(Error::Configuration("embedding dimension must be positive".into()));
        }

        let provider: Arc<dyn EmbeddingProvider> = match cfg.provider {
            ProviderKind::Local => Arc::new(LocalModel::new(cfg.model.clone(), cfg.dimension)),
            ProviderKind::OpenAi => {
                let key = resolve_key(&cfg.api_key, &cfg.api_key_env).ok_or_else(|| {
                    Error::Configuration(format!(
                        "openai embeddings need an api key (set embedding.api_key or {})",
                        cfg.api_key_env
                    ))
                })?;
                let mut remote = OpenAiEmbeddings::new(key, cfg.model.clone(), cfg.dimension)
                    .with_timeout(Duration::from_secs(cfg.timeout_secs))
                    .with_retry(RetryPolicy::default().with_max_retries(cfg.max_retries));
                if let Some(url) = &cfg.base_url {
                    remote = remote.with_base_url(url.clone());
                }
                Arc::new(remote)
            }
        };

        if cfg.cache_size > 0 {
            Ok(Arc::new(CachedProvider::new(provider, cfg.cache_size)))
        } else {
            Ok(provider)
        }
    }

    /// Translator for natural language queries, if an api key is available.
    pub fn translator(&self) -> Option<NaturalQueryTranslator> {
        let cfg = &self.llm;
        let Some(key) = resolve_key(&cfg.api_key, &cfg.api_key_env) else {
            warn!("No language model api key configured; natural language queries disabled");
            return None;
        };

        let mut chat = OpenAiChat::new(key, cfg.model.clone())
            .with_temperature(cfg.temperature)
            .with_timeout(Duration::from_secs(cfg.timeout_secs))
            .with_retry(RetryPolicy::default().with_max_retries(cfg.max_retries));
        if let Some(url) = &cfg.base_url {
            chat = chat.with_base_url(url.clone());
        }

        let overall = Duration::from_secs(cfg.timeout_secs.saturating_mul(u64::from(cfg.max_retries) + 1));
        Some(NaturalQueryTranslator::new(Arc::new(chat)).with_timeout(overall))
    }

    pub fn index_config(&self, name: &str) -> IndexConfig {
        IndexConfig {
            name: name.to_string(),
            missing_field: self.ingest.missing_field,
            embed_batch_size: self.ingest.batch_size,
            max_concurrent_embeds: self.ingest.max_concurrent_embeds,
            default_limit: self.query.default_limit,
        }
    }

    pub fn build_index(
        &self,
        def: &IndexDefinition,
        provider: &Arc<dyn EmbeddingProvider>,
    ) -> Result<Index> {
        let schema = Schema {
            name: def.name.clone(),
            fields: def.fields.clone(),
        };

        let spaces = def
            .spaces
            .iter()
            .map(|s| {
                let name = s.name.clone().unwrap_or_else(|| s.field.clone());
                match s.kind {
                    FieldKind::Text => Ok(Space::text(name, s.field.clone(), provider.clone())),
                    FieldKind::Number => {
                        let (Some(min), Some(max)) = (s.min, s.max) else {
                            return Err(Error::Configuration(format!(
                                "number space '{}' needs min and max",
                                name
                            )));
                        };
                        Ok(Space::number(name, s.field.clone(), min, max, s.mode)?
                            .with_out_of_range(s.out_of_range))
                    }
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Index::new(self.index_config(&def.name), schema, spaces)
    }

    /// Wire providers, translator and every configured index.
    pub fn build_executor(&self) -> Result<Executor> {
        let provider = self.embedding_provider()?;
        let mut executor = Executor::new();
        if let Some(translator) = self.translator() {
            executor = executor.with_translator(translator);
        }

        for def in &self.indices {
            executor.register(self.build_index(def, &provider)?)?;
        }
        info!(
            "Engine ready: {} index(es), embeddings by {}",
            self.indices.len(),
            provider.model_id()
        );
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PRODUCTS: &str = r#"{
        "embedding": {"dimension": 64, "cache_size": 0},
        "llm": {"api_key_env": "HYBRIX_TEST_UNSET_LLM_KEY"},
        "ingest": {"missing_field": "sentinel", "batch_size": 8},
        "query": {"default_limit": 3},
        "indices": [{
            "name": "products",
            "fields": [
                {"name": "description", "type": "text"},
                {"name": "rating", "type": "number"}
            ],
            "spaces": [
                {"field": "description", "kind": "text"},
                {"name": "stars", "field": "rating", "kind": "number", "min": 1, "max": 5, "mode": "maximum"}
            ]
        }]
    }"#;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::Local);
        assert_eq!(config.llm.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.query.default_limit, 10);
        assert!(config.indices.is_empty());
    }

    #[test]
    fn test_load_from_file_and_build() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PRODUCTS.as_bytes()).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        let executor = config.build_executor().unwrap();

        assert!(executor.translator().is_none());
        let index = executor.index("products").unwrap();
        assert_eq!(index.config().missing_field, MissingFieldPolicy::Sentinel);
        assert_eq!(index.config().default_limit, 3);
        assert!(index.space("description").is_some());
        assert_eq!(index.space("stars").unwrap().dimension(), 1);
    }

    #[test]
    fn test_number_space_needs_range() {
        let config = EngineConfig::from_json(
            r#"{"indices": [{
                "name": "r",
                "fields": [{"name": "rating", "type": "number"}],
                "spaces": [{"field": "rating", "kind": "number", "min": 1}]
            }]}"#,
        )
        .unwrap();
        assert!(matches!(config.build_executor(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_openai_without_key_is_configuration_error() {
        let config = EngineConfig::from_json(
            r#"{"embedding": {"provider": "openai", "api_key_env": "HYBRIX_TEST_UNSET_EMBED_KEY"}}"#,
        )
        .unwrap();
        assert!(matches!(config.embedding_provider(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_explicit_llm_key_enables_translator() {
        let config = EngineConfig::from_json(r#"{"llm": {"api_key": "sk-test", "model": "gpt-4o-mini"}}"#).unwrap();
        let translator = config.translator().unwrap();
        assert_eq!(translator.model_id(), "gpt-4o-mini");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(EngineConfig::from_json("{"), Err(Error::Configuration(_))));
    }
}
