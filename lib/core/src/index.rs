use crate::error::RecordFailure;
use crate::plan::QueryPlan;
use crate::record::{FieldValue, Record, RecordId};
use crate::schema::Schema;
use crate::space::{Space, SpaceInfo, SpaceKind};
use crate::vector::Vector;
use crate::{Error, Result};
use ahash::AHashMap;
use futures::future::try_join_all;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// What ingestion does with a record lacking a field some space reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
    /// Fail the record with [`Error::MissingField`]
    #[default]
    Reject,
    /// Store a placeholder that scores 0.0 in that space
    Sentinel,
}

/// Configuration for an index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub name: String,
    pub missing_field: MissingFieldPolicy,
    /// Texts sent to a provider per call
    pub embed_batch_size: usize,
    /// Provider calls in flight at once
    pub max_concurrent_embeds: usize,
    pub default_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            missing_field: MissingFieldPolicy::Reject,
            embed_batch_size: 64,
            max_concurrent_embeds: 4,
            default_limit: 10,
        }
    }
}

impl IndexConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A record's stored vector for one space
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Vector(Vector),
    Sentinel,
}

/// A stored record together with one slot per space, in space order.
///
/// Entries are never mutated; re-ingestion swaps in a new entry.
#[derive(Debug)]
pub struct IndexedEntry {
    pub record: Record,
    /// Insertion sequence, used to break score ties
    pub seq: u64,
    pub slots: Vec<Slot>,
}

struct EntryTable {
    records: AHashMap<RecordId, Arc<IndexedEntry>>,
    next_seq: u64,
}

/// Similarity of one record in one scored space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceScore {
    pub space: String,
    pub weight: f32,
    /// Raw similarity before weighting
    pub similarity: f32,
}

impl SpaceScore {
    pub fn contribution(&self) -> f32 {
        self.weight * self.similarity
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: RecordId,
    pub score: f32,
    pub space_scores: Vec<SpaceScore>,
    pub record: Record,
}

/// Ranked hits plus the number of records that were scored.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub hits: Vec<SearchHit>,
    pub candidates: usize,
}

/// Pending per-space value of a record while a batch is being prepared.
enum Pending {
    Ready(Slot),
    /// Position of the text in its space's embedding queue
    Text(usize),
}

/// Multi-space store of record vectors with weighted exact-scan search.
pub struct Index {
    config: IndexConfig,
    schema: Schema,
    spaces: Vec<Arc<Space>>,
    positions: AHashMap<String, usize>,
    entries: RwLock<EntryTable>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Index {
    /// Create an index; spaces are fixed for its lifetime.
    pub fn new(config: IndexConfig, schema: Schema, spaces: Vec<Space>) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::Configuration("index name cannot be empty".into()));
        }
        if config.embed_batch_size == 0 || config.max_concurrent_embeds == 0 || config.default_limit == 0 {
            return Err(Error::Configuration(format!(
                "index '{}': batch size, concurrency and default limit must be positive",
                config.name
            )));
        }
        schema.validate()?;
        if spaces.is_empty() {
            return Err(Error::Configuration(format!(
                "index '{}' needs at least one space",
                config.name
            )));
        }

        let mut positions = AHashMap::with_capacity(spaces.len());
        for (pos, space) in spaces.iter().enumerate() {
            if positions.insert(space.name().to_string(), pos).is_some() {
                return Err(Error::Configuration(format!(
                    "index '{}' declares space '{}' twice",
                    config.name,
                    space.name()
                )));
            }
            let field = schema.field(space.field()).ok_or_else(|| {
                Error::Configuration(format!(
                    "space '{}' reads field '{}', which schema '{}' does not declare",
                    space.name(),
                    space.field(),
                    schema.name
                ))
            })?;
            if field.kind != space.field_kind() {
                return Err(Error::Configuration(format!(
                    "space '{}' needs a {} field, but '{}' is {}",
                    space.name(),
                    space.field_kind(),
                    field.name,
                    field.kind
                )));
            }
        }

        info!(
            "Created index '{}' with spaces [{}]",
            config.name,
            spaces.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );

        let permits = Arc::new(Semaphore::new(config.max_concurrent_embeds));
        Ok(Self {
            config,
            schema,
            spaces: spaces.into_iter().map(Arc::new).collect(),
            positions,
            entries: RwLock::new(EntryTable {
                records: AHashMap::new(),
                next_seq: 0,
            }),
            permits,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Spaces in declaration order
    pub fn spaces(&self) -> &[Arc<Space>] {
        &self.spaces
    }

    pub fn space(&self, name: &str) -> Option<&Arc<Space>> {
        self.positions.get(name).map(|&pos| &self.spaces[pos])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn describe_spaces(&self) -> Vec<SpaceInfo> {
        self.spaces.iter().map(|s| s.describe()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.entries.read().records.get(id).map(|e| e.record.clone())
    }

    pub fn entry(&self, id: &RecordId) -> Option<Arc<IndexedEntry>> {
        self.entries.read().records.get(id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting reads and writes. Embedding calls waiting for a
    /// permit fail; stored entries are released when the last handle drops.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.permits.close();
            info!("Index '{}' shut down", self.config.name);
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::IndexClosed(self.config.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Insert one record, replacing any record with the same id.
    pub async fn insert_or_replace(&self, record: Record) -> Result<()> {
        match self.put(vec![record]).await {
            Ok(_) => Ok(()),
            Err(Error::Ingestion(mut failures)) if failures.len() == 1 => {
                Err(failures.remove(0).error)
            }
            Err(e) => Err(e),
        }
    }

    /// Ingest a batch, all or nothing.
    ///
    /// Every record is validated before any embedding call; if any record
    /// fails, [`Error::Ingestion`] lists each failure and nothing is stored.
    /// A provider failure also leaves the index unchanged. Later records in
    /// a batch win over earlier ones with the same id.
    pub async fn put(&self, records: Vec<Record>) -> Result<usize> {
        self.ensure_open()?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut texts: Vec<Vec<String>> = vec![Vec::new(); self.spaces.len()];
        let mut pending: Vec<Vec<Pending>> = Vec::with_capacity(records.len());
        let mut failures = Vec::new();

        for record in &records {
            match self.prepare(record, &mut texts) {
                Ok(slots) => pending.push(slots),
                Err(error) => failures.push(RecordFailure {
                    id: record.id.clone(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            debug!(
                "Rejected batch of {} for index '{}': {} failure(s)",
                records.len(),
                self.config.name,
                failures.len()
            );
            return Err(Error::Ingestion(failures));
        }

        let mut embedded = self.embed_all(texts).await?;

        let entries: Vec<(Record, Vec<Slot>)> = records
            .into_iter()
            .zip(pending)
            .map(|(record, slots)| {
                let slots = slots
                    .into_iter()
                    .enumerate()
                    .map(|(pos, pending)| match pending {
                        Pending::Ready(slot) => slot,
                        Pending::Text(i) => {
                            Slot::Vector(std::mem::replace(&mut embedded[pos][i], Vector::zeros(0)))
                        }
                    })
                    .collect();
                (record, slots)
            })
            .collect();

        let count = entries.len();
        let mut table = self.entries.write();
        for (record, slots) in entries {
            let seq = match table.records.get(&record.id) {
                Some(existing) => existing.seq,
                None => {
                    let seq = table.next_seq;
                    table.next_seq += 1;
                    seq
                }
            };
            table
                .records
                .insert(record.id.clone(), Arc::new(IndexedEntry { record, seq, slots }));
        }
        drop(table);

        debug!("Committed {} record(s) to index '{}'", count, self.config.name);
        Ok(count)
    }

    /// Validate one record and compute every slot that needs no provider.
    fn prepare(&self, record: &Record, texts: &mut [Vec<String>]) -> Result<Vec<Pending>> {
        self.schema.check_record(record)?;

        let mut slots = Vec::with_capacity(self.spaces.len());
        for (pos, space) in self.spaces.iter().enumerate() {
            let slot = match record.get(space.field()) {
                None => match self.config.missing_field {
                    MissingFieldPolicy::Reject => {
                        return Err(Error::MissingField {
                            record: record.id.clone(),
                            field: space.field().to_string(),
                            space: space.name().to_string(),
                        });
                    }
                    MissingFieldPolicy::Sentinel => Pending::Ready(Slot::Sentinel),
                },
                Some(FieldValue::Number(n)) => Pending::Ready(Slot::Vector(space.number_vector(*n)?)),
                Some(FieldValue::Text(text)) => {
                    texts[pos].push(text.clone());
                    Pending::Text(texts[pos].len() - 1)
                }
            };
            slots.push(slot);
        }
        Ok(slots)
    }

    /// Embed every queued text, chunked per space and bounded by the
    /// index's permits. Output mirrors the input layout.
    async fn embed_all(&self, texts: Vec<Vec<String>>) -> Result<Vec<Vec<Vector>>> {
        let batch_size = self.config.embed_batch_size;
        let mut calls = Vec::new();

        for (pos, space_texts) in texts.iter().enumerate() {
            if !matches!(self.spaces[pos].kind(), SpaceKind::Text(_)) {
                continue;
            }
            for chunk in space_texts.chunks(batch_size) {
                let space = self.spaces[pos].clone();
                let permits = self.permits.clone();
                let chunk = chunk.to_vec();
                let name = self.config.name.clone();
                calls.push(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::IndexClosed(name))?;
                    let vectors = space.embed_texts(&chunk).await?;
                    Ok::<_, Error>((pos, vectors))
                });
            }
        }

        if !calls.is_empty() {
            debug!(
                "Index '{}': {} embedding call(s) for {} text(s)",
                self.config.name,
                calls.len(),
                texts.iter().map(Vec::len).sum::<usize>()
            );
        }

        let mut out: Vec<Vec<Vector>> = texts.iter().map(|t| Vec::with_capacity(t.len())).collect();
        // try_join_all keeps input order, so chunks append in sequence
        for (pos, vectors) in try_join_all(calls).await? {
            out[pos].extend(vectors);
        }
        Ok(out)
    }

    /// Remove a record. Returns whether it was present.
    pub fn remove(&self, id: &RecordId) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.entries.write().records.remove(id).is_some();
        if removed {
            debug!("Removed record {} from index '{}'", id, self.config.name);
        }
        Ok(removed)
    }

    /// Weighted exact-scan search.
    pub fn search(&self, plan: &QueryPlan) -> Result<Vec<SearchHit>> {
        self.scan(plan).map(|result| result.hits)
    }

    /// Score every stored record against `plan`.
    ///
    /// Ranking is by composite score, descending, then insertion order.
    /// Scoring runs on a snapshot taken under the read lock, so writes that
    /// commit mid-scan are either fully visible or not at all.
    pub fn scan(&self, plan: &QueryPlan) -> Result<ScanResult> {
        self.ensure_open()?;
        if plan.index_name() != self.config.name {
            return Err(Error::Configuration(format!(
                "plan for index '{}' run against index '{}'",
                plan.index_name(),
                self.config.name
            )));
        }

        let snapshot: Vec<Arc<IndexedEntry>> = self.entries.read().records.values().cloned().collect();

        let mut scored: Vec<(f32, Vec<f32>, Arc<IndexedEntry>)> = snapshot
            .into_par_iter()
            .filter_map(|entry| {
                let mut total = 0.0f32;
                let mut sims = Vec::with_capacity(plan.scored().len());
                for s in plan.scored() {
                    let sim = match entry.slots.get(s.position)? {
                        Slot::Vector(v) => s.space.similarity(v, &s.target),
                        Slot::Sentinel => 0.0,
                    };
                    total += s.weight * sim;
                    sims.push(sim);
                }
                Some((total, sims, entry))
            })
            .collect();

        let candidates = scored.len();
        scored.sort_unstable_by(|a, b| {
            OrderedFloat(b.0)
                .cmp(&OrderedFloat(a.0))
                .then(a.2.seq.cmp(&b.2.seq))
        });
        scored.truncate(plan.limit());

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(score, sims, entry)| SearchHit {
                id: entry.record.id.clone(),
                score,
                space_scores: plan
                    .scored()
                    .iter()
                    .zip(sims)
                    .map(|(s, similarity)| SpaceScore {
                        space: s.space.name().to_string(),
                        weight: s.weight,
                        similarity,
                    })
                    .collect(),
                record: entry.record.clone(),
            })
            .collect();

        debug!(
            "Search on '{}': {} candidate(s), {} hit(s)",
            self.config.name,
            candidates,
            hits.len()
        );
        Ok(ScanResult { hits, candidates })
    }
}
