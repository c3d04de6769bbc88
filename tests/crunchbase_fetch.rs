mod common;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use circular_radar::models::{read_csv_headers, CompanyRecord, CsvRow};
use circular_radar::providers::crunchbase::fetch::fetch_all;
use circular_radar::providers::crunchbase::{CrunchbaseClient, SearchError, SearchQuery};
use circular_radar::tasks::linkedin::{CompanyLookup, Pause};
use circular_radar::tasks::{analysis, download, linkedin};
use circular_radar::util::retry::RetryPolicy;
use common::wiremock_helpers::mock_search_server;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CrunchbaseClient {
    CrunchbaseClient::new(Some(&server.uri()), "test-key", 5, RetryPolicy::once()).unwrap()
}

#[tokio::test]
async fn pagination_stops_at_the_reported_count() {
    let server = mock_search_server(5, 2).await;
    let query = SearchQuery::organizations_in("germany-id");

    let records = fetch_all(&client(&server), &query).await.unwrap();

    let uuids: Vec<&str> = records.iter().map(|r| r.uuid.as_str()).collect();
    assert_eq!(uuids, ["org-0", "org-1", "org-2", "org-3", "org-4"]);
    assert_eq!(records[0].city.as_deref(), Some("Berlin"));
    assert_eq!(records[0].country.as_deref(), Some("Germany"));
    // one timestamp for the whole batch
    assert!(records.iter().all(|r| r.partition_date == records[0].partition_date));
    // page mocks carry .expect(1); verified on drop
}

#[tokio::test]
async fn zero_count_fetches_no_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "entities": []})))
        .expect(1)
        .mount(&server)
        .await;

    let records = fetch_all(&client(&server), &SearchQuery::default()).await.unwrap();
    assert!(records.is_empty());
}

struct NoCompanies;

#[async_trait]
impl CompanyLookup for NoCompanies {
    async fn company(&self, _name: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}

#[tokio::test]
async fn empty_download_leaves_a_readable_csv_for_later_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "entities": []})))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let fetched = dir.path().join("crunchbase.csv");

    let summary = download::run(&client(&server), &SearchQuery::default(), None, &fetched)
        .await
        .unwrap();
    assert_eq!(summary.rows, 0);
    assert_eq!(read_csv_headers(&fetched).unwrap(), CompanyRecord::HEADER);

    let pause = Pause {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };
    let enriched = linkedin::run(&NoCompanies, &fetched, &dir.path().join("linkedin.csv"), pause)
        .await
        .unwrap();
    assert_eq!(enriched, 0);

    let categorized = dir.path().join("categorized.csv");
    let analysis = analysis::run(&fetched, &categorized).unwrap();
    assert_eq!((analysis.total, analysis.categorized), (0, 0));
    assert!(read_csv_headers(&categorized)
        .unwrap()
        .iter()
        .any(|h| h == "RE_Strategy_Codes"));
}

#[tokio::test]
async fn empty_page_ends_the_loop_early() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 10, "entities": []})))
        .expect(2)
        .mount(&server)
        .await;

    let records = fetch_all(&client(&server), &SearchQuery::default()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn unauthorized_is_reported_as_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).check_connectivity().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn rejected_requests_carry_the_api_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([
            {"code": "MD403", "message": "too many results"}
        ])))
        .mount(&server)
        .await;

    let err = client(&server)
        .company_count(&SearchQuery::default())
        .await
        .unwrap_err();
    match err.downcast_ref::<SearchError>() {
        Some(SearchError::Rejected { status, code, .. }) => {
            assert_eq!(*status, 400);
            assert_eq!(code.as_deref(), Some("MD403"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
