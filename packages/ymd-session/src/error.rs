use crate::CorrelationId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Session {session_id} was not found.")]
	SessionNotFound { session_id: String },
	#[error("Session {session_id} is not accepting invocations.")]
	SessionClosed { session_id: String },
	#[error("Invocation {correlation_id} is already in flight.")]
	DuplicateCorrelationId { correlation_id: CorrelationId },
	#[error("Session {session_id} has {limit} invocations in flight.")]
	Overloaded { session_id: String, limit: usize },
}
