use std::sync::Arc;

use ymd_config::{Config, Credentials};
use ymd_providers::{embedding::EmbeddingClient, store::StoreClient};
use ymd_search::{CorpusCache, CorpusSource, EmbeddingProvider, SearchService, SearchSettings};
use ymd_session::{SessionConfig, SessionManager};

use crate::protocol::McpHandler;

#[derive(Clone)]
pub struct AppState {
	pub search: Arc<SearchService>,
	pub sessions: Arc<SessionManager>,
	pub source: Arc<dyn CorpusSource>,
}
impl AppState {
	/// Connects the collaborators and loads the first corpus snapshot. A failed initial load is
	/// fatal.
	pub async fn new(config: &Config, credentials: &Credentials) -> color_eyre::Result<Self> {
		let embedding = EmbeddingClient::new(&config.providers.embedding, credentials)?;
		let store = StoreClient::new(&config.store, credentials)?;
		let source: Arc<dyn CorpusSource> = Arc::new(store);
		let cache = CorpusCache::load(source.as_ref(), config.lexical).await?;

		Ok(Self::from_parts(
			Arc::new(cache),
			Arc::new(embedding),
			source,
			SearchSettings::from_config(config),
			SessionConfig::from(&config.session),
		))
	}

	pub fn from_parts(
		cache: Arc<CorpusCache>,
		embedding: Arc<dyn EmbeddingProvider>,
		source: Arc<dyn CorpusSource>,
		settings: SearchSettings,
		session: SessionConfig,
	) -> Self {
		let search = Arc::new(SearchService::new(cache, embedding, settings));
		let handler = Arc::new(McpHandler::new(search.clone()));
		let sessions = Arc::new(SessionManager::new(session, handler));

		Self { search, sessions, source }
	}
}
