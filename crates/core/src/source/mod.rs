//! Page sources: the remote catalog and the local collection store.

/// Local REST store adapter.
pub mod local;
/// In-process store with the same paging semantics.
#[cfg(any(test, feature = "testing"))]
pub mod memory;
/// Remote catalog adapter.
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::CatalogError,
    merger::{PageRequest, PageResponse},
    models::{Game, GamePatch, Source},
};

pub use local::LocalSource;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use remote::RemoteSource;

/// Anything that can serve a page of raw, unvalidated records.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Which side of the catalog this source serves.
    fn kind(&self) -> Source;

    /// Fetch one page (1-based) of records matching `search`.
    ///
    /// Transport failures are normalized to [`CatalogError::SourceUnavailable`].
    async fn fetch_page(&self, search: &str, page: u32) -> Result<Vec<Value>, CatalogError>;

    /// Fetch a page, logging failures and returning an empty page instead.
    async fn fetch_page_or_empty(&self, search: &str, page: u32) -> Vec<Value> {
        match self.fetch_page(search, page).await {
            Ok(records) => records,
            Err(err) => {
                warn!(source = %self.kind(), page, %err, "page fetch failed; returning empty page");
                Vec::new()
            }
        }
    }
}

/// The personal collection, which also supports mutations.
#[async_trait]
pub trait LocalStore: GameSource {
    /// Look a record up by id.
    async fn get(&self, id: i64) -> Result<Option<Game>, CatalogError>;

    /// Insert a new record, refusing ids that already exist.
    ///
    /// The existence check and the insert are two separate requests, so two
    /// concurrent creators may both pass the check. Single-user use keeps that
    /// window acceptable.
    async fn create(&self, game: Game) -> Result<Game, CatalogError>;

    /// Apply `patch` to the record with `id` and return the stored result.
    async fn update(&self, id: i64, patch: GamePatch) -> Result<Game, CatalogError>;

    /// Remove the record with `id`.
    async fn delete(&self, id: i64) -> Result<(), CatalogError>;
}

/// Cloneable handle to both sources, handed to fetch tasks.
#[derive(Clone)]
pub struct Sources {
    remote: Arc<dyn GameSource>,
    local: Arc<dyn LocalStore>,
}

impl Sources {
    /// Pair a remote catalog with a local store.
    pub fn new(remote: Arc<dyn GameSource>, local: Arc<dyn LocalStore>) -> Self {
        Self { remote, local }
    }

    /// Source used for the given side.
    pub fn source(&self, source: Source) -> &dyn GameSource {
        match source {
            Source::Remote => self.remote.as_ref(),
            Source::Local => self.local.as_ref(),
        }
    }

    /// Local store for mutations.
    pub fn local(&self) -> &dyn LocalStore {
        self.local.as_ref()
    }

    /// Resolve a tagged request against the matching source.
    pub async fn fetch(&self, request: PageRequest) -> PageResponse {
        let tag = request.tag;
        let result = self
            .source(tag.context.source)
            .fetch_page(&tag.context.search, tag.page)
            .await;
        PageResponse { tag, result }
    }
}

/// Case-insensitive substring match on a display name.
pub(crate) fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.trim().to_lowercase())
}

pub(crate) fn record_matches(record: &Value, needle: &str) -> bool {
    record
        .get("name")
        .and_then(Value::as_str)
        .map(|name| name_matches(name, needle))
        .unwrap_or(false)
}

/// Slice the 1-based `page` out of an already filtered collection.
pub(crate) fn page_window<T>(items: Vec<T>, page: u32, page_size: u32) -> Vec<T> {
    let size = page_size.max(1) as usize;
    let start = (page.max(1) as usize - 1) * size;
    items.into_iter().skip(start).take(size).collect()
}
