use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One organization entity as returned by the search endpoint.
pub fn organization(uuid: &str, name: &str, city: &str) -> Value {
    json!({
        "uuid": uuid,
        "properties": {
            "identifier": {"uuid": uuid, "value": name, "permalink": name.to_lowercase()},
            "name": name,
            "short_description": format!("{name} recycles packaging"),
            "location_identifiers": [
                {"location_type": "city", "value": city},
                {"location_type": "country", "value": "Germany"},
                {"location_type": "continent", "value": "Europe"}
            ]
        }
    })
}

/// Search server reporting `total` organizations, served in pages of
/// `page_size`. Requests are matched on their `after_id` cursor.
pub async fn mock_search_server(total: usize, page_size: usize) -> MockServer {
    let server = MockServer::start().await;
    let entities: Vec<Value> = (0..total)
        .map(|i| organization(&format!("org-{i}"), &format!("Org {i}"), "Berlin"))
        .collect();

    Mock::given(method("POST"))
        .and(path("/searches/organizations"))
        .and(body_partial_json(json!({"limit": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": total,
            "entities": entities.iter().take(1).collect::<Vec<_>>()
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    for (page_no, chunk) in entities.chunks(page_size).enumerate() {
        let body = json!({"count": total, "entities": chunk});
        let mock = Mock::given(method("POST")).and(path("/searches/organizations"));
        let mock = if page_no == 0 {
            // first page has no cursor; lowest priority so cursor pages win
            mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(10)
        } else {
            let cursor = format!("org-{}", page_no * page_size - 1);
            mock.and(body_partial_json(json!({"after_id": cursor})))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(2)
        };
        mock.expect(1).mount(&server).await;
    }

    server
}

/// Geocoder answering `city` with the given coordinates.
pub async fn mock_geocoder(city: &str, country: &str, lat: &str, lon: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", format!("{city},{country}")))
        .and(query_param("format", "json"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"lat": lat, "lon": lon, "display_name": city}
        ])))
        .mount(&server)
        .await;
    server
}

/// Chat completion server that answers every prompt with `answer`.
pub async fn mock_chat_server(answer: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": format!("  {answer}\n")}}]
        })))
        .mount(&server)
        .await;
    server
}
