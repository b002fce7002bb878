//! Read-only client for the metric record store.
//!
//! The store speaks the PostgREST dialect: `GET {base}/rest/v1/{table}?select=...` with
//! `limit`/`offset` paging.

use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{Error, Result};
use ymd_config::{Credentials, Store};

const METRIC_COLUMNS: &str = "key,canonical_name,description,embedding";
const SCOPE_COLUMNS: &str = "id,expected_fields";

/// One row of the metric key registry.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRow {
	pub key: String,
	pub canonical_name: Option<String>,
	pub description: Option<String>,
	pub embedding: Option<Vec<f32>>,
}

/// One query configuration. `expected_fields` is kept raw; interpreting it belongs to the scope
/// registry.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeRow {
	pub id: i64,
	pub expected_fields: Value,
}

#[derive(Clone, Debug)]
pub struct StoreClient {
	client: Client,
	base: String,
	headers: HeaderMap,
	metrics_table: String,
	scopes_table: String,
	page_size: u32,
}
impl StoreClient {
	pub fn new(cfg: &Store, creds: &Credentials) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			client,
			base: format!("{}/rest/v1", creds.store_url),
			headers: crate::store_headers(&creds.store_key)?,
			metrics_table: cfg.metrics_table.clone(),
			scopes_table: cfg.scopes_table.clone(),
			page_size: cfg.page_size,
		})
	}

	pub async fn fetch_metrics(&self) -> Result<Vec<MetricRow>> {
		let rows = self.fetch_all(&self.metrics_table, METRIC_COLUMNS, "key.asc").await?;
		let mut out = Vec::with_capacity(rows.len());

		for row in rows {
			match parse_metric_row(&row) {
				Ok(metric) => out.push(metric),
				Err(err) => tracing::warn!(error = %err, "Skipping malformed metric row."),
			}
		}

		Ok(out)
	}

	pub async fn fetch_scopes(&self) -> Result<Vec<ScopeRow>> {
		let rows = self.fetch_all(&self.scopes_table, SCOPE_COLUMNS, "id.asc").await?;
		let mut out = Vec::with_capacity(rows.len());

		for row in rows {
			match parse_scope_row(&row) {
				Ok(scope) => out.push(scope),
				Err(err) => tracing::warn!(error = %err, "Skipping malformed scope row."),
			}
		}

		Ok(out)
	}

	async fn fetch_all(&self, table: &str, columns: &str, order: &str) -> Result<Vec<Value>> {
		let url = format!("{}/{}", self.base, table);
		let limit = self.page_size.to_string();
		let mut offset = 0_u64;
		let mut out = Vec::new();

		loop {
			let offset_param = offset.to_string();
			let res = self
				.client
				.get(&url)
				.headers(self.headers.clone())
				.query(&[
					("select", columns),
					("order", order),
					("limit", limit.as_str()),
					("offset", offset_param.as_str()),
				])
				.send()
				.await?;
			let json: Value = res.error_for_status()?.json().await?;
			let Value::Array(page) = json else {
				return Err(Error::InvalidResponse {
					message: format!("Store response for {table} must be an array."),
				});
			};
			let page_len = page.len();

			out.extend(page);

			if page_len < self.page_size as usize {
				break;
			}

			offset += page_len as u64;
		}

		tracing::debug!(table, rows = out.len(), "Fetched store table.");

		Ok(out)
	}
}

pub fn parse_metric_row(row: &Value) -> Result<MetricRow> {
	let key = row
		.get("key")
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|key| !key.is_empty())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Metric row is missing key.".to_string(),
		})?;
	let embedding = match row.get("embedding") {
		None | Some(Value::Null) => None,
		Some(value) => Some(parse_vector(value)?),
	};

	Ok(MetricRow {
		key: key.to_string(),
		canonical_name: optional_text(row, "canonical_name"),
		description: optional_text(row, "description"),
		embedding,
	})
}

pub fn parse_scope_row(row: &Value) -> Result<ScopeRow> {
	let id = row.get("id").and_then(Value::as_i64).ok_or_else(|| Error::InvalidResponse {
		message: "Scope row is missing integer id.".to_string(),
	})?;
	let expected_fields = row.get("expected_fields").cloned().unwrap_or(Value::Null);

	Ok(ScopeRow { id, expected_fields })
}

/// Accepts a JSON array of numbers or pgvector's text form (`"[0.1,0.2]"`).
fn parse_vector(value: &Value) -> Result<Vec<f32>> {
	match value {
		Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_f64().map(|number| number as f32).ok_or_else(|| Error::InvalidResponse {
					message: "Embedding value must be numeric.".to_string(),
				})
			})
			.collect(),
		Value::String(raw) => {
			let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');

			if inner.trim().is_empty() {
				return Ok(Vec::new());
			}

			inner
				.split(',')
				.map(|part| {
					part.trim().parse::<f32>().map_err(|err| Error::InvalidResponse {
						message: format!("Embedding text contains a non-numeric value: {err}."),
					})
				})
				.collect()
		},
		_ => Err(Error::InvalidResponse {
			message: "Embedding must be an array or a vector literal.".to_string(),
		}),
	}
}

fn optional_text(row: &Value, field: &str) -> Option<String> {
	row.get(field)
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(str::to_string)
}
