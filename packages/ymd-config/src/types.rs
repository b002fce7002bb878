use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub store: Store,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub lexical: Lexical,
	#[serde(default)]
	pub fusion: Fusion,
	#[serde(default)]
	pub corpus: Corpus,
	#[serde(default)]
	pub session: Session,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

/// Request shape of the embedding provider. Endpoint and key come from the environment.
#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	#[serde(default = "default_embedding_path")]
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Store {
	pub metrics_table: String,
	pub scopes_table: String,
	pub page_size: u32,
	pub timeout_ms: u64,
}
impl Default for Store {
	fn default() -> Self {
		Self {
			metrics_table: "metric_key_registry".to_string(),
			scopes_table: "ymq".to_string(),
			page_size: 1_000,
			timeout_ms: 10_000,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_top_k: u32,
	pub max_top_k: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self { default_top_k: 30, max_top_k: 100 }
	}
}

/// BM25 constants.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Lexical {
	pub k1: f32,
	pub b: f32,
}
impl Default for Lexical {
	fn default() -> Self {
		Self { k1: 1.5, b: 0.75 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Fusion {
	pub lexical_weight: f32,
	pub vector_weight: f32,
}
impl Default for Fusion {
	fn default() -> Self {
		Self { lexical_weight: 0.5, vector_weight: 0.5 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Corpus {
	/// Zero disables the scheduled refresh.
	pub refresh_interval_secs: u64,
	pub retry_max_attempts: u32,
	pub retry_initial_backoff_ms: u64,
	pub retry_backoff_factor: f64,
	pub retry_max_backoff_ms: u64,
}
impl Default for Corpus {
	fn default() -> Self {
		Self {
			refresh_interval_secs: 900,
			retry_max_attempts: 3,
			retry_initial_backoff_ms: 1_000,
			retry_backoff_factor: 2.0,
			retry_max_backoff_ms: 30_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Session {
	pub keepalive_interval_ms: u64,
	pub ack_timeout_ms: u64,
	pub mailbox_capacity: usize,
	pub outbound_capacity: usize,
	pub max_in_flight: usize,
}
impl Default for Session {
	fn default() -> Self {
		Self {
			keepalive_interval_ms: 30_000,
			ack_timeout_ms: 15_000,
			mailbox_capacity: 64,
			outbound_capacity: 64,
			max_in_flight: 16,
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_embedding_path() -> String {
	"/v1/embeddings".to_string()
}
