use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    error::CatalogError,
    models::{Game, GamePatch, Source},
    validate::validate_record,
};

use super::{page_window, record_matches, remote::parse_base, GameSource, LocalStore};

/// Client for the json-server style collection store.
#[derive(Debug, Clone)]
pub struct LocalSource {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl LocalSource {
    /// Build a client for the store rooted at `base_url` (serving `/games`).
    pub fn new(base_url: &str, page_size: u32, timeout: Duration) -> Result<Self, CatalogError> {
        let base_url = parse_base(base_url).map_err(unavailable)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            base_url,
            page_size: page_size.max(1),
        })
    }

    /// Build a client from application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, CatalogError> {
        Self::new(&config.local_base_url, config.page_size, config.request_timeout())
    }

    fn collection_url(&self) -> Result<Url, CatalogError> {
        self.base_url.join("games").map_err(unavailable)
    }

    fn record_url(&self, id: i64) -> Result<Url, CatalogError> {
        self.base_url.join(&format!("games/{id}")).map_err(unavailable)
    }

    async fn list(&self, query: &[(&str, String)]) -> Result<Vec<Value>, CatalogError> {
        let response = self
            .client
            .get(self.collection_url()?)
            .query(query)
            .send()
            .await
            .map_err(unavailable)?;
        checked(response)?.json().await.map_err(unavailable)
    }

    async fn exists(&self, id: i64) -> Result<bool, CatalogError> {
        let response = self
            .client
            .get(self.record_url(id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        checked(response)?;
        Ok(true)
    }
}

#[async_trait]
impl GameSource for LocalSource {
    fn kind(&self) -> Source {
        Source::Local
    }

    async fn fetch_page(&self, search: &str, page: u32) -> Result<Vec<Value>, CatalogError> {
        let page = page.max(1);
        let needle = search.trim();
        let records = if needle.is_empty() {
            let start = (page - 1) * self.page_size;
            self.list(&[
                ("_start", start.to_string()),
                ("_limit", self.page_size.to_string()),
            ])
            .await?
        } else {
            // Filtering happens client-side, so page over the filtered set.
            let matching = self
                .list(&[])
                .await?
                .into_iter()
                .filter(|record| record_matches(record, needle))
                .collect();
            page_window(matching, page, self.page_size)
        };
        debug!(page, search, count = records.len(), "local page fetched");
        Ok(records)
    }
}

#[async_trait]
impl LocalStore for LocalSource {
    async fn get(&self, id: i64) -> Result<Option<Game>, CatalogError> {
        let response = self
            .client
            .get(self.record_url(id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: Value = checked(response)?.json().await.map_err(unavailable)?;
        Ok(Some(validate_record(&raw)?))
    }

    async fn create(&self, game: Game) -> Result<Game, CatalogError> {
        let record = to_record(&game)?;
        if self.exists(game.id).await? {
            return Err(CatalogError::DuplicateRecord { id: game.id });
        }

        let response = self
            .client
            .post(self.collection_url()?)
            .json(&record)
            .send()
            .await
            .map_err(unavailable)?;
        checked(response)?;
        info!(id = game.id, name = %game.name, "game added to collection");
        Ok(game)
    }

    async fn update(&self, id: i64, patch: GamePatch) -> Result<Game, CatalogError> {
        let mut game = self.get(id).await?.ok_or(CatalogError::NotFound { id })?;
        game.apply_patch(patch);
        let record = to_record(&game)?;

        let response = self
            .client
            .put(self.record_url(id)?)
            .json(&record)
            .send()
            .await
            .map_err(unavailable)?;
        checked(response)?;
        info!(id, "collection game updated");
        Ok(game)
    }

    async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let response = self
            .client
            .delete(self.record_url(id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound { id });
        }
        checked(response)?;
        info!(id, "game removed from collection");
        Ok(())
    }
}

/// Serialize and re-validate a game before it is written.
pub(crate) fn to_record(game: &Game) -> Result<Value, CatalogError> {
    let record = serde_json::to_value(game).map_err(unavailable)?;
    validate_record(&record)?;
    Ok(record)
}

fn checked(response: Response) -> Result<Response, CatalogError> {
    response
        .error_for_status()
        .map_err(unavailable)
}

fn unavailable(err: impl ToString) -> CatalogError {
    CatalogError::unavailable(Source::Local, err)
}
