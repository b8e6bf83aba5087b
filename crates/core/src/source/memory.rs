use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

use crate::{
    error::CatalogError,
    models::{Game, GamePatch, Source},
    validate::validate_record,
};

use super::{local::to_record, page_window, record_matches, GameSource, LocalStore};

/// Thread-safe in-process store that pages and filters like the REST store.
///
/// Records are kept raw, so malformed entries can be served to exercise the
/// validator. Cloning shares the underlying records.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    kind: Source,
    page_size: u32,
    records: Vec<Value>,
    offline: bool,
    writes: usize,
    fetches: Vec<(String, u32)>,
}

impl MemoryStore {
    /// Empty store serving the given side of the catalog.
    pub fn new(kind: Source, page_size: u32) -> Self {
        Self::with_records(kind, page_size, Vec::new())
    }

    /// Store preloaded with raw records.
    pub fn with_records(kind: Source, page_size: u32, records: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                kind,
                page_size: page_size.max(1),
                records,
                offline: false,
                writes: 0,
                fetches: Vec::new(),
            })),
        }
    }

    /// Store preloaded with valid games.
    pub fn with_games(kind: Source, page_size: u32, games: &[Game]) -> Self {
        let records = games
            .iter()
            .filter_map(|game| serde_json::to_value(game).ok())
            .collect();
        Self::with_records(kind, page_size, records)
    }

    /// Simulate a transport failure on every following call.
    pub fn set_offline(&self, offline: bool) {
        self.inner.write().offline = offline;
    }

    /// Number of records written by create/update.
    pub fn writes(&self) -> usize {
        self.inner.read().writes
    }

    /// Every `(search, page)` pair fetched so far.
    pub fn fetches(&self) -> Vec<(String, u32)> {
        self.inner.read().fetches.clone()
    }

    /// Number of stored records, valid or not.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    fn ensure_online(inner: &Inner) -> Result<(), CatalogError> {
        if inner.offline {
            return Err(CatalogError::unavailable(inner.kind, "store offline"));
        }
        Ok(())
    }
}

fn record_id(record: &Value) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

#[async_trait]
impl GameSource for MemoryStore {
    fn kind(&self) -> Source {
        self.inner.read().kind
    }

    async fn fetch_page(&self, search: &str, page: u32) -> Result<Vec<Value>, CatalogError> {
        let mut inner = self.inner.write();
        inner.fetches.push((search.to_string(), page));
        Self::ensure_online(&inner)?;

        let needle = search.trim();
        let matching: Vec<Value> = inner
            .records
            .iter()
            .filter(|record| needle.is_empty() || record_matches(record, needle))
            .cloned()
            .collect();
        Ok(page_window(matching, page, inner.page_size))
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Game>, CatalogError> {
        let inner = self.inner.read();
        Self::ensure_online(&inner)?;
        inner
            .records
            .iter()
            .find(|record| record_id(record) == Some(id))
            .map(validate_record)
            .transpose()
            .map_err(CatalogError::from)
    }

    async fn create(&self, game: Game) -> Result<Game, CatalogError> {
        let record = to_record(&game)?;
        let mut inner = self.inner.write();
        Self::ensure_online(&inner)?;
        if inner.records.iter().any(|existing| record_id(existing) == Some(game.id)) {
            return Err(CatalogError::DuplicateRecord { id: game.id });
        }
        inner.records.push(record);
        inner.writes += 1;
        info!(id = game.id, "game added to in-memory collection");
        Ok(game)
    }

    async fn update(&self, id: i64, patch: GamePatch) -> Result<Game, CatalogError> {
        let mut inner = self.inner.write();
        Self::ensure_online(&inner)?;
        let slot = inner
            .records
            .iter_mut()
            .find(|record| record_id(record) == Some(id))
            .ok_or(CatalogError::NotFound { id })?;

        let mut game = validate_record(slot)?;
        game.apply_patch(patch);
        *slot = to_record(&game)?;
        inner.writes += 1;
        Ok(game)
    }

    async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let mut inner = self.inner.write();
        Self::ensure_online(&inner)?;
        let before = inner.records.len();
        inner.records.retain(|record| record_id(record) != Some(id));
        if inner.records.len() == before {
            return Err(CatalogError::NotFound { id });
        }
        Ok(())
    }
}
