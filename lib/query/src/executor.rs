use crate::explain::QueryResult;
use crate::natural::{NaturalQueryRequest, NaturalQueryTranslator, ParamValue};
use crate::template::QueryTemplate;
use hybrix_core::{Error, ExtractionError, Index, QueryInputs, QueryPlan, Record, RecordId, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of indices plus the ingestion and query entry points.
pub struct Executor {
    indices: Arc<RwLock<HashMap<String, Arc<Index>>>>,
    translator: Option<Arc<NaturalQueryTranslator>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(RwLock::new(HashMap::new())),
            translator: None,
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: NaturalQueryTranslator) -> Self {
        self.translator = Some(Arc::new(translator));
        self
    }

    pub fn translator(&self) -> Option<&Arc<NaturalQueryTranslator>> {
        self.translator.as_ref()
    }

    pub fn register(&self, index: Index) -> Result<Arc<Index>> {
        let name = index.name().to_string();
        let mut indices = self.indices.write();

        if indices.contains_key(&name) {
            return Err(Error::IndexExists(name));
        }

        let index = Arc::new(index);
        indices.insert(name.clone(), index.clone());
        info!("Registered index '{}'", name);
        Ok(index)
    }

    #[inline]
    pub fn index(&self, name: &str) -> Result<Arc<Index>> {
        self.indices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    #[must_use]
    pub fn list_indices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Unregister and shut down an index. Returns whether it existed.
    pub fn drop_index(&self, name: &str) -> bool {
        let removed = self.indices.write().remove(name);
        match removed {
            Some(index) => {
                index.shutdown();
                true
            }
            None => false,
        }
    }

    pub async fn put(&self, index: &str, records: Vec<Record>) -> Result<usize> {
        self.index(index)?.put(records).await
    }

    pub fn remove(&self, index: &str, id: &RecordId) -> Result<bool> {
        self.index(index)?.remove(id)
    }

    /// Validate `inputs`, then rank the index against them.
    pub async fn query(&self, index: &str, inputs: QueryInputs) -> Result<QueryResult> {
        let index = self.index(index)?;
        Self::run(&index, inputs).await
    }

    pub async fn query_template(
        &self,
        index: &str,
        template: &QueryTemplate,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<QueryResult> {
        let index = self.index(index)?;
        let inputs = template.bind(params)?;
        Self::run(&index, inputs).await
    }

    /// Fill the template from free text, then run it.
    ///
    /// Parameters in `explicit` are never sent for extraction and take
    /// precedence over anything the model returns.
    pub async fn query_natural(
        &self,
        index: &str,
        template: &QueryTemplate,
        text: &str,
        explicit: &BTreeMap<String, ParamValue>,
    ) -> Result<QueryResult> {
        let translator = self
            .translator
            .as_ref()
            .ok_or(Error::Extraction(ExtractionError::NotConfigured))?;
        let index = self.index(index)?;

        let request = NaturalQueryRequest {
            text: text.to_string(),
            schema: template.parameter_schema(&index).without(explicit.keys()),
        };
        let response = translator.translate(&request).await?;

        let mut params = response.params.clone();
        params.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        debug!(
            "Natural query on '{}': {} extracted, {} explicit parameter(s)",
            index.name(),
            response.params.len(),
            explicit.len()
        );

        let inputs = template.bind(&params)?;
        Ok(Self::run(&index, inputs).await?.with_natural(response))
    }

    async fn run(index: &Index, inputs: QueryInputs) -> Result<QueryResult> {
        let plan = QueryPlan::build(index, inputs).await?;
        let scan = index.scan(&plan)?;
        Ok(QueryResult::from_scan(&plan, scan))
    }
}
