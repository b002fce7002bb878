pub mod corpus;
pub mod dispatch;
pub mod fusion;
pub mod lexical;
pub mod refresh;
pub mod scope;
pub mod text;
pub mod vector;

mod error;

pub use corpus::{CorpusCache, CorpusRows, CorpusSnapshot, MetricRecord, RefreshReport};
pub use dispatch::{
	Diagnostics, ScoredCandidate, SearchRequest, SearchResponse, SearchService, SearchSettings,
};
pub use error::{Error, Result};

use std::{future::Future, pin::Pin};

use ymd_providers::{embedding::EmbeddingClient, store::StoreClient};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces query embeddings. Failures surface as [`Error::EmbeddingUnavailable`].
pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Reads the full set of metric and scope rows. Failures surface as
/// [`Error::CorpusUnavailable`].
pub trait CorpusSource
where
	Self: Send + Sync,
{
	fn load(&self) -> BoxFuture<'_, Result<CorpusRows>>;
}

/// One relevance signal over a candidate list. Output is aligned with `candidates`; `None` marks a
/// candidate the signal could not score.
pub trait ScoringSignal {
	fn score(&self, candidates: &[usize]) -> Vec<Option<f32>>;
}

impl EmbeddingProvider for EmbeddingClient {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			EmbeddingClient::embed(self, texts)
				.await
				.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })
		})
	}
}

impl CorpusSource for StoreClient {
	fn load(&self) -> BoxFuture<'_, Result<CorpusRows>> {
		Box::pin(async move {
			let metrics = self
				.fetch_metrics()
				.await
				.map_err(|err| Error::CorpusUnavailable { message: err.to_string() })?;
			let scopes = self
				.fetch_scopes()
				.await
				.map_err(|err| Error::CorpusUnavailable { message: err.to_string() })?;

			Ok(CorpusRows { metrics, scopes })
		})
	}
}
