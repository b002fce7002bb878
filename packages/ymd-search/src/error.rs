pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	Validation { message: String },
	#[error("Unknown scope: {scope_id}.")]
	UnknownScope { scope_id: i64 },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Corpus unavailable: {message}")]
	CorpusUnavailable { message: String },
	#[error("Invocation cancelled.")]
	Cancelled,
}
impl Error {
	/// Stable machine-readable code carried in structured tool errors.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation { .. } => "validation_error",
			Self::UnknownScope { .. } => "unknown_scope",
			Self::EmbeddingUnavailable { .. } => "embedding_unavailable",
			Self::CorpusUnavailable { .. } => "corpus_unavailable",
			Self::Cancelled => "cancelled",
		}
	}

	/// Caller-correctable failures. These never reach the ranking pipeline.
	pub fn is_rejection(&self) -> bool {
		matches!(self, Self::Validation { .. } | Self::UnknownScope { .. })
	}
}
