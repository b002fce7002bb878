use std::{collections::HashMap, net::SocketAddr};

use axum::{
	Json, Router,
	extract::{Path, Query},
	http::HeaderMap,
	routing::{get, post},
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use ymd_config::{Credentials, EmbeddingProviderConfig, Store};
use ymd_providers::{embedding::EmbeddingClient, store::StoreClient};

async fn spawn(router: Router) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener.");
	let addr = listener.local_addr().expect("Failed to read listener address.");

	tokio::spawn(async move {
		axum::serve(listener, router).await.expect("Test server failed.");
	});

	addr
}

fn credentials(base: &str) -> Credentials {
	Credentials {
		store_url: base.to_string(),
		store_key: "service-key".to_string(),
		embedding_api_base: base.to_string(),
		embedding_api_key: "sk-test".to_string(),
	}
}

fn store_config(page_size: u32) -> Store {
	Store {
		metrics_table: "metric_key_registry".to_string(),
		scopes_table: "ymq".to_string(),
		page_size,
		timeout_ms: 5_000,
	}
}

fn metric_rows() -> Vec<Value> {
	(0..5)
		.map(|index| {
			serde_json::json!({
				"key": format!("financial.metric_{index}"),
				"canonical_name": format!("Metric {index}"),
				"description": "Synthetic row.",
				"embedding": if index % 2 == 0 { Value::String("[1,0]".to_string()) } else { Value::Null },
			})
		})
		.collect()
}

async fn rest_table(
	Path(table): Path<String>,
	Query(params): Query<HashMap<String, String>>,
	headers: HeaderMap,
) -> Json<Value> {
	assert_eq!(headers.get("apikey").and_then(|v| v.to_str().ok()), Some("service-key"));

	let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(usize::MAX);
	let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
	let rows = match table.as_str() {
		"metric_key_registry" => metric_rows(),
		"ymq" => vec![
			serde_json::json!({ "id": 1, "expected_fields": { "use_fields": ["financial.metric_0"] } }),
			serde_json::json!({ "id": "bad" }),
		],
		_ => Vec::new(),
	};

	Json(Value::Array(rows.into_iter().skip(offset).take(limit).collect()))
}

async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
	let inputs = body.get("input").and_then(Value::as_array).cloned().unwrap_or_default();
	let data: Vec<Value> = inputs
		.iter()
		.enumerate()
		.rev()
		.map(|(index, _)| serde_json::json!({ "index": index, "embedding": [index as f64, 1.0] }))
		.collect();

	Json(serde_json::json!({ "data": data }))
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		ymd_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn store_headers_carry_api_key_twice() {
	let headers = ymd_providers::store_headers("secret").expect("Failed to build headers.");

	assert_eq!(headers.get(AUTHORIZATION).expect("Missing authorization header."), "Bearer secret");
	assert_eq!(headers.get("apikey").expect("Missing apikey header."), "secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("X-Trace".to_string(), Value::Bool(true));

	assert!(ymd_providers::auth_headers("secret", &defaults).is_err());
}

#[tokio::test]
async fn store_client_pages_through_tables() {
	let router = Router::new().route("/rest/v1/{table}", get(rest_table));
	let addr = spawn(router).await;
	let base = format!("http://{addr}");
	let client =
		StoreClient::new(&store_config(2), &credentials(&base)).expect("Failed to build client.");
	let metrics = client.fetch_metrics().await.expect("Failed to fetch metrics.");

	assert_eq!(metrics.len(), 5);
	assert_eq!(metrics[0].key, "financial.metric_0");
	assert_eq!(metrics[0].embedding, Some(vec![1.0, 0.0]));
	assert_eq!(metrics[1].embedding, None);

	let scopes = client.fetch_scopes().await.expect("Failed to fetch scopes.");

	assert_eq!(scopes.len(), 1);
	assert_eq!(scopes[0].id, 1);
}

#[tokio::test]
async fn embedding_client_restores_input_order() {
	let router = Router::new().route("/v1/embeddings", post(embeddings));
	let addr = spawn(router).await;
	let base = format!("http://{addr}");
	let cfg = EmbeddingProviderConfig {
		path: "/v1/embeddings".to_string(),
		model: "test-embedding".to_string(),
		dimensions: 2,
		timeout_ms: 5_000,
		default_headers: Map::new(),
	};
	let client = EmbeddingClient::new(&cfg, &credentials(&base)).expect("Failed to build client.");
	let vectors = client
		.embed(&["first".to_string(), "second".to_string()])
		.await
		.expect("Failed to embed.");

	assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);
	assert_eq!(client.dimensions(), 2);
}
