use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{config::AppConfig, error::CatalogError, models::Source};

use super::GameSource;

/// Client for the external game catalog.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: Client,
    base_url: Url,
    api_key: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    results: Vec<Value>,
}

impl RemoteSource {
    /// Build a client for `base_url` (the API root, e.g. `https://api.rawg.io/api`).
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let base_url = parse_base(base_url).map_err(|err| CatalogError::unavailable(Source::Remote, err))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::unavailable(Source::Remote, err))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            page_size: page_size.max(1),
        })
    }

    /// Build a client from application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, CatalogError> {
        Self::new(
            &config.remote_base_url,
            config.api_key.clone(),
            config.page_size,
            config.request_timeout(),
        )
    }

    fn games_url(&self) -> Result<Url, CatalogError> {
        self.base_url
            .join("games")
            .map_err(|err| CatalogError::unavailable(Source::Remote, err))
    }
}

#[async_trait]
impl GameSource for RemoteSource {
    fn kind(&self) -> Source {
        Source::Remote
    }

    async fn fetch_page(&self, search: &str, page: u32) -> Result<Vec<Value>, CatalogError> {
        let page = page.max(1);
        let response = self
            .client
            .get(self.games_url()?)
            .query(&[
                ("page", page.to_string()),
                ("page_size", self.page_size.to_string()),
                ("search", search.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| CatalogError::unavailable(Source::Remote, err.without_url()))?;

        let body: CatalogPage = response
            .json()
            .await
            .map_err(|err| CatalogError::unavailable(Source::Remote, err.without_url()))?;

        debug!(page, search, count = body.results.len(), "remote page fetched");
        Ok(body.results.into_iter().map(flatten_record).collect())
    }
}

/// Bring a catalog result into the canonical record shape.
///
/// Nested `platforms[].platform` objects are lifted to `{id, slug, name}`,
/// a `null` platform list becomes empty and a `null` cover becomes `""`.
/// Everything else is passed through untouched for the validator to judge.
pub(crate) fn flatten_record(raw: Value) -> Value {
    let Value::Object(mut object) = raw else {
        return raw;
    };

    if matches!(object.get("background_image"), Some(Value::Null)) {
        object.insert("background_image".to_string(), Value::String(String::new()));
    }

    let platforms = match object.remove("platforms") {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Array(entries)) => Value::Array(entries.into_iter().map(flatten_platform).collect()),
        Some(other) => other,
    };
    object.insert("platforms".to_string(), platforms);

    Value::Object(object)
}

fn flatten_platform(entry: Value) -> Value {
    match entry {
        Value::Object(mut wrapper) => match wrapper.remove("platform") {
            Some(Value::Object(inner)) => {
                let mut platform = Map::new();
                for key in ["id", "slug", "name"] {
                    if let Some(value) = inner.get(key) {
                        platform.insert(key.to_string(), value.clone());
                    }
                }
                Value::Object(platform)
            }
            Some(other) => other,
            None => Value::Object(wrapper),
        },
        other => other,
    }
}

/// Parse a base URL so that relative joins append to its path.
pub(crate) fn parse_base(base: &str) -> Result<Url, String> {
    let trimmed = base.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized).map_err(|err| format!("invalid base url {trimmed}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_platforms() {
        let raw = json!({
            "id": 3328,
            "name": "The Witcher 3: Wild Hunt",
            "background_image": null,
            "platforms": [
                { "platform": { "id": 4, "slug": "pc", "name": "PC", "image": null }, "released_at": "2015-05-18" },
                { "platform": { "id": 18, "slug": "playstation4", "name": "PlayStation 4" } }
            ]
        });
        let flat = flatten_record(raw);
        assert_eq!(flat["background_image"], json!(""));
        assert_eq!(
            flat["platforms"],
            json!([
                { "id": 4, "slug": "pc", "name": "PC" },
                { "id": 18, "slug": "playstation4", "name": "PlayStation 4" }
            ])
        );
    }

    #[test]
    fn null_platforms_become_empty() {
        let flat = flatten_record(json!({ "id": 1, "platforms": null }));
        assert_eq!(flat["platforms"], json!([]));
    }

    #[test]
    fn base_url_keeps_its_path() {
        let base = parse_base("https://api.rawg.io/api").unwrap();
        assert_eq!(base.join("games").unwrap().as_str(), "https://api.rawg.io/api/games");
        assert!(parse_base("not a url").is_err());
    }
}
