//! Deterministic stand-ins for the embedding provider and the record store.

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;

use ymd_providers::store::{MetricRow, ScopeRow};
use ymd_search::{BoxFuture, CorpusRows, CorpusSource, EmbeddingProvider, Error, Result, text};

pub const STUB_DIMENSIONS: usize = 16;

/// Hashed bag-of-words embedding: each token lands in a blake3-chosen bucket. Texts sharing terms
/// point in similar directions.
#[derive(Clone, Debug, Default)]
pub struct StubEmbedding {
	calls: Arc<AtomicUsize>,
}
impl StubEmbedding {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn vector_for(text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; STUB_DIMENSIONS];

		for token in text::tokenize(text) {
			let hash = blake3::hash(token.as_bytes());
			let bucket = hash.as_bytes()[0] as usize % STUB_DIMENSIONS;

			vector[bucket] += 1.0;
		}

		let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

		if norm > 0.0 {
			for value in &mut vector {
				*value /= norm;
			}
		}

		vector
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = texts.iter().map(|text| Self::vector_for(text)).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

/// Always fails, as an unreachable provider would.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(&'a self, _texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Err(Error::EmbeddingUnavailable { message: "Stub provider is offline.".to_string() })
		})
	}
}

/// Sleeps before answering. Used to hold invocations in flight.
#[derive(Clone, Debug)]
pub struct SlowEmbedding {
	delay: Duration,
	started: Arc<AtomicUsize>,
}
impl SlowEmbedding {
	pub fn new(delay: Duration) -> Self {
		Self { delay, started: Arc::new(AtomicUsize::new(0)) }
	}

	/// Number of calls that have begun waiting.
	pub fn started(&self) -> usize {
		self.started.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for SlowEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.started.fetch_add(1, Ordering::SeqCst);

			tokio::time::sleep(self.delay).await;

			Ok(texts.iter().map(|text| StubEmbedding::vector_for(text)).collect())
		})
	}
}

/// In-memory record store that can be told to fail the next few loads.
#[derive(Debug, Default)]
pub struct StaticCorpus {
	rows: Mutex<CorpusRows>,
	failures_left: AtomicUsize,
	loads: AtomicUsize,
}
impl StaticCorpus {
	pub fn new(rows: CorpusRows) -> Self {
		Self { rows: Mutex::new(rows), ..Self::default() }
	}

	pub fn set_rows(&self, rows: CorpusRows) {
		*self.rows.lock().unwrap_or_else(|err| err.into_inner()) = rows;
	}

	pub fn fail_next(&self, count: usize) {
		self.failures_left.store(count, Ordering::SeqCst);
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}
impl CorpusSource for StaticCorpus {
	fn load(&self) -> BoxFuture<'_, Result<CorpusRows>> {
		Box::pin(async move {
			self.loads.fetch_add(1, Ordering::SeqCst);

			let should_fail = self
				.failures_left
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
				.is_ok();

			if should_fail {
				return Err(Error::CorpusUnavailable {
					message: "Stub store is unreachable.".to_string(),
				});
			}

			Ok(self.rows.lock().unwrap_or_else(|err| err.into_inner()).clone())
		})
	}
}

/// A metric row whose embedding is the stub embedding of its key, name and description.
pub fn metric_row(key: &str, canonical_name: &str, description: &str) -> MetricRow {
	let text = format!("{} {canonical_name} {description}", text::key_to_words(key));

	MetricRow {
		key: key.to_string(),
		canonical_name: Some(canonical_name.to_string()),
		description: Some(description.to_string()),
		embedding: Some(StubEmbedding::vector_for(&text)),
	}
}

pub fn scope_row(id: i64, expected_fields: Value) -> ScopeRow {
	ScopeRow { id, expected_fields }
}

/// A small financial corpus with two scopes: `1` (capex fields) and `2` (payback fields).
pub fn sample_rows() -> CorpusRows {
	CorpusRows {
		metrics: vec![
			metric_row(
				"financial.capex.equipment",
				"Equipment CAPEX",
				"Capital expenditure on mining equipment in dollars.",
			),
			metric_row(
				"financial.capex.total",
				"Total CAPEX",
				"Total capital expenditure required before operation starts.",
			),
			metric_row(
				"financial.payback.months",
				"Payback period",
				"Months until cumulative revenue covers the initial investment.",
			),
			metric_row(
				"financial.revenue.daily",
				"Daily revenue",
				"Revenue generated per day at current difficulty.",
			),
			metric_row(
				"operations.power.consumption",
				"Power consumption",
				"Electricity consumed per machine in kilowatts.",
			),
			metric_row(
				"operations.uptime.ratio",
				"Uptime ratio",
				"Share of time the machines are operating.",
			),
		],
		scopes: vec![
			scope_row(1, serde_json::json!({ "use_fields": [{ "key": "financial.capex" }] })),
			scope_row(2, serde_json::json!(["financial.payback.months"])),
		],
	}
}
