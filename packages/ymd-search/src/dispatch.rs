//! The `search_metrics` pipeline: validate, narrow, score, fuse.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;
use tokio_util::sync::CancellationToken;

use crate::{
	CorpusCache, EmbeddingProvider, Error, Result, ScoringSignal,
	fusion::{self, WeightedScores},
	vector::VectorQuery,
};
use ymd_config::Config;

#[derive(Clone, Debug)]
pub struct SearchSettings {
	pub default_top_k: u32,
	pub max_top_k: u32,
	pub lexical_weight: f32,
	pub vector_weight: f32,
	pub embedding_timeout: Duration,
}
impl SearchSettings {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			default_top_k: cfg.search.default_top_k,
			max_top_k: cfg.search.max_top_k,
			lexical_weight: cfg.fusion.lexical_weight,
			vector_weight: cfg.fusion.vector_weight,
			embedding_timeout: Duration::from_millis(cfg.providers.embedding.timeout_ms),
		}
	}
}
impl Default for SearchSettings {
	fn default() -> Self {
		Self {
			default_top_k: 30,
			max_top_k: 100,
			lexical_weight: 0.5,
			vector_weight: 0.5,
			embedding_timeout: Duration::from_secs(10),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
	pub query_text: String,
	/// Any JSON number is accepted and saturated into `i64`; clamping happens at search time.
	#[serde(default, deserialize_with = "saturating_top_k")]
	pub top_k: Option<i64>,
	#[serde(default)]
	pub scope_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredCandidate {
	pub key: String,
	pub fused_score: f32,
	pub lexical_score: f32,
	pub vector_score: Option<f32>,
	pub rank: u32,
}

/// Per-query disclosure of reduced signal quality.
///
/// `vector_degraded` means no candidate received a vector score. When it is `false` but
/// `missing_embeddings > 0`, those candidates were ranked on the lexical signal alone; callers
/// wanting full hybrid scores must check both.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostics {
	pub candidates_considered: usize,
	pub vector_degraded: bool,
	pub missing_embeddings: usize,
	pub snapshot_version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResponse {
	pub query_text: String,
	pub top_k: u32,
	pub scope_id: Option<i64>,
	pub results: Vec<ScoredCandidate>,
	pub diagnostics: Diagnostics,
}

fn saturating_top_k<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(number) = Option::<Number>::deserialize(deserializer)? else { return Ok(None) };

	if let Some(value) = number.as_i64() {
		return Ok(Some(value));
	}
	if number.as_u64().is_some() {
		return Ok(Some(i64::MAX));
	}

	// Float-to-int `as` casts saturate.
	Ok(number.as_f64().map(|value| value.trunc() as i64))
}

pub struct SearchService {
	cache: Arc<CorpusCache>,
	embedding: Arc<dyn EmbeddingProvider>,
	settings: SearchSettings,
}
impl SearchService {
	pub fn new(
		cache: Arc<CorpusCache>,
		embedding: Arc<dyn EmbeddingProvider>,
		settings: SearchSettings,
	) -> Self {
		Self { cache, embedding, settings }
	}

	pub fn cache(&self) -> &Arc<CorpusCache> {
		&self.cache
	}

	pub fn settings(&self) -> &SearchSettings {
		&self.settings
	}

	/// Out-of-range values are clamped into `[1, max_top_k]`, never rejected.
	pub fn clamp_top_k(&self, requested: Option<i64>) -> u32 {
		let max = self.settings.max_top_k.max(1);

		match requested {
			Some(value) => value.clamp(1, max as i64) as u32,
			None => self.settings.default_top_k.clamp(1, max),
		}
	}

	pub async fn search(
		&self,
		req: SearchRequest,
		cancel: &CancellationToken,
	) -> Result<SearchResponse> {
		let query_text = req.query_text.trim();

		if query_text.is_empty() {
			return Err(Error::Validation { message: "query_text must be non-empty.".to_string() });
		}

		let top_k = self.clamp_top_k(req.top_k);
		let snapshot = self.cache.snapshot();
		let candidates = snapshot.scope_filter().resolve(req.scope_id)?;
		let mut response = SearchResponse {
			query_text: query_text.to_string(),
			top_k,
			scope_id: req.scope_id,
			results: Vec::new(),
			diagnostics: Diagnostics {
				candidates_considered: candidates.len(),
				vector_degraded: false,
				missing_embeddings: 0,
				snapshot_version: snapshot.version(),
			},
		};

		if candidates.is_empty() {
			return Ok(response);
		}

		let lexical = async { snapshot.lexical().query(query_text).score(&candidates) };
		let (embedding, lexical_scores) = tokio::join!(self.embed_query(query_text, cancel), lexical);
		let embedding = embedding?;

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let records = snapshot.records();
		let vector_scores = match embedding.as_deref() {
			Some(embedding) => VectorQuery::new(records, embedding).score(&candidates),
			None => vec![None; candidates.len()],
		};
		let missing_embeddings = match embedding {
			Some(_) => vector_scores.iter().filter(|score| score.is_none()).count(),
			None => candidates.iter().filter(|&&idx| records[idx].embedding.is_none()).count(),
		};
		let keys: Vec<&str> = candidates.iter().map(|&idx| records[idx].key.as_str()).collect();
		let signals = [
			WeightedScores::new(self.settings.lexical_weight, lexical_scores),
			WeightedScores::new(self.settings.vector_weight, vector_scores),
		];
		let vector_degraded = !signals[1].is_available();

		if vector_degraded {
			tracing::warn!(
				candidates = candidates.len(),
				missing_embeddings,
				"Vector scoring unavailable. Returning lexical ranking."
			);
		}

		response.results = fusion::fuse(&keys, &signals, top_k as usize)
			.into_iter()
			.map(|entry| ScoredCandidate {
				key: keys[entry.position].to_string(),
				fused_score: entry.fused,
				lexical_score: signals[0].scores[entry.position].unwrap_or(0.0),
				vector_score: signals[1].scores[entry.position],
				rank: entry.rank,
			})
			.collect();
		response.diagnostics.vector_degraded = vector_degraded;
		response.diagnostics.missing_embeddings = missing_embeddings;

		tracing::debug!(
			candidates = candidates.len(),
			returned = response.results.len(),
			vector_degraded,
			"Search completed."
		);

		Ok(response)
	}

	/// `Ok(None)` means the provider failed or timed out and vector scoring is skipped.
	async fn embed_query(
		&self,
		query_text: &str,
		cancel: &CancellationToken,
	) -> Result<Option<Vec<f32>>> {
		let texts = [query_text.to_string()];
		let call = tokio::time::timeout(self.settings.embedding_timeout, self.embedding.embed(&texts));

		tokio::select! {
			_ = cancel.cancelled() => Err(Error::Cancelled),
			outcome = call => match outcome {
				Ok(Ok(vectors)) => Ok(vectors.into_iter().next().filter(|vector| !vector.is_empty())),
				Ok(Err(err)) => {
					tracing::warn!(error = %err, "Embedding provider failed.");

					Ok(None)
				},
				Err(_) => {
					tracing::warn!(
						timeout_ms = self.settings.embedding_timeout.as_millis() as u64,
						"Embedding provider timed out."
					);

					Ok(None)
				},
			},
		}
	}
}
