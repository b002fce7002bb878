mod env;
mod error;
mod types;

pub use env::Credentials;
pub use error::{Error, Result};
pub use types::{
	Config, Corpus, EmbeddingProviderConfig, Fusion, Lexical, Providers, Search, Service, Session,
	Store,
};

use std::{fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in
		[("service.http_bind", &cfg.service.http_bind), ("service.admin_bind", &cfg.service.admin_bind)]
	{
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
		if value.parse::<SocketAddr>().is_err() {
			return Err(Error::Validation {
				message: format!("{label} must be a valid socket address."),
			});
		}
	}

	if let Ok(admin) = cfg.service.admin_bind.parse::<SocketAddr>()
		&& !admin.ip().is_loopback()
	{
		return Err(Error::Validation {
			message: "service.admin_bind must be a loopback address.".to_string(),
		});
	}

	let embedding = &cfg.providers.embedding;

	if embedding.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.model must be non-empty.".to_string(),
		});
	}
	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !embedding.path.starts_with('/') {
		return Err(Error::Validation {
			message: "providers.embedding.path must start with '/'.".to_string(),
		});
	}
	if embedding.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "providers.embedding.default_headers values must be strings.".to_string(),
		});
	}

	for (label, value) in
		[("store.metrics_table", &cfg.store.metrics_table), ("store.scopes_table", &cfg.store.scopes_table)]
	{
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.store.page_size == 0 {
		return Err(Error::Validation {
			message: "store.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.store.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "store.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_top_k == 0 {
		return Err(Error::Validation {
			message: "search.max_top_k must be greater than zero.".to_string(),
		});
	}
	if !(1..=cfg.search.max_top_k).contains(&cfg.search.default_top_k) {
		return Err(Error::Validation {
			message: "search.default_top_k must be in the range 1-search.max_top_k.".to_string(),
		});
	}
	if !cfg.lexical.k1.is_finite() || cfg.lexical.k1 <= 0.0 {
		return Err(Error::Validation {
			message: "lexical.k1 must be a finite number greater than zero.".to_string(),
		});
	}
	if !cfg.lexical.b.is_finite() || !(0.0..=1.0).contains(&cfg.lexical.b) {
		return Err(Error::Validation {
			message: "lexical.b must be in the range 0.0-1.0.".to_string(),
		});
	}

	for (label, weight) in [
		("fusion.lexical_weight", cfg.fusion.lexical_weight),
		("fusion.vector_weight", cfg.fusion.vector_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if cfg.fusion.lexical_weight + cfg.fusion.vector_weight <= 0.0 {
		return Err(Error::Validation {
			message: "fusion weights must not both be zero.".to_string(),
		});
	}
	if cfg.corpus.retry_max_attempts == 0 {
		return Err(Error::Validation {
			message: "corpus.retry_max_attempts must be greater than zero.".to_string(),
		});
	}
	if !cfg.corpus.retry_backoff_factor.is_finite() || cfg.corpus.retry_backoff_factor < 1.0 {
		return Err(Error::Validation {
			message: "corpus.retry_backoff_factor must be a finite number of at least 1.0."
				.to_string(),
		});
	}
	if cfg.corpus.retry_max_backoff_ms < cfg.corpus.retry_initial_backoff_ms {
		return Err(Error::Validation {
			message: "corpus.retry_max_backoff_ms must be at least corpus.retry_initial_backoff_ms."
				.to_string(),
		});
	}

	let session = &cfg.session;

	for (label, value) in [
		("session.keepalive_interval_ms", session.keepalive_interval_ms),
		("session.ack_timeout_ms", session.ack_timeout_ms),
		("session.mailbox_capacity", session.mailbox_capacity as u64),
		("session.outbound_capacity", session.outbound_capacity as u64),
		("session.max_in_flight", session.max_in_flight as u64),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.http_bind = cfg.service.http_bind.trim().to_string();
	cfg.service.admin_bind = cfg.service.admin_bind.trim().to_string();

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}

	let path = cfg.providers.embedding.path.trim();

	cfg.providers.embedding.path =
		if path.is_empty() { "/v1/embeddings".to_string() } else { path.to_string() };
}
