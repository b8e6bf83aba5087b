//! Remote catalog adapter against a mock HTTP server.

use std::{sync::Arc, time::Duration};

use gamevault_core::{
    CatalogError, GameSource, LocalSource, PageOutcome, RemoteSource, ResultMerger, Source,
    Sources,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog_result(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "slug": name.to_lowercase().replace(' ', "-"),
        "name": name,
        "released": "2017-03-03",
        "background_image": "https://media.rawg.io/media/games/cc1/cover.jpg",
        "rating": 4.5,
        "rating_top": 5,
        "ratings_count": 1200,
        "platforms": [
            { "platform": { "id": 7, "name": "Nintendo Switch", "slug": "nintendo-switch" } }
        ]
    })
}

fn remote(server: &MockServer) -> RemoteSource {
    RemoteSource::new(&server.uri(), "secret", 10, Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn sends_paging_search_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games"))
        .and(query_param("page", "2"))
        .and(query_param("page_size", "10"))
        .and(query_param("search", "zelda"))
        .and(query_param("key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "results": [catalog_result(22511, "Breath of the Wild")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = remote(&server).fetch_page("zelda", 2).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0]["platforms"],
        json!([{ "id": 7, "slug": "nintendo-switch", "name": "Nintendo Switch" }])
    );
}

#[tokio::test]
async fn server_errors_become_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let source = remote(&server);
    let err = source.fetch_page("", 1).await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::SourceUnavailable { origin: Source::Remote, .. }
    ));
    assert!(!err.to_string().contains("secret"));
    assert!(source.fetch_page_or_empty("", 1).await.is_empty());
}

#[tokio::test]
async fn malformed_results_are_dropped_from_merged_page() {
    let server = MockServer::start().await;
    let mut broken = catalog_result(2, "Broken");
    broken["released"] = Value::Null;
    Mock::given(method("GET"))
        .and(path("/games"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [catalog_result(1, "Celeste"), broken, catalog_result(3, "Hades")]
        })))
        .mount(&server)
        .await;

    let sources = Sources::new(
        Arc::new(remote(&server)),
        Arc::new(LocalSource::new(&server.uri(), 10, Duration::from_secs(5)).expect("client")),
    );
    let mut merger = ResultMerger::new(Source::Remote);
    let outcome = merger.request_page(&sources, Source::Remote, "", 1).await;

    let ids: Vec<i64> = merger.games().iter().map(|game| game.id).collect();
    assert_eq!(ids, vec![1, 3]);
    match outcome {
        PageOutcome::Merged(report) => assert_eq!(report.rejected, 1),
        other => panic!("unexpected outcome {other:?}"),
    }
}
