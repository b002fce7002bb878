//! Per-connection session actors for a streaming tool transport.
//!
//! Each session is one task that owns an inbound command mailbox, an outbound event channel and
//! the set of invocations in flight on it. The transport layer feeds the mailbox and drains the
//! events; protocol encoding stays outside this crate.

mod error;
mod manager;
mod session;

pub use error::{Error, Result};
pub use manager::SessionManager;
pub use session::{SessionHandle, SessionState};

use std::{fmt, future::Future, pin::Pin, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Client-supplied request id. Numbers and strings are distinct ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
	Number(i64),
	String(String),
}
impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(value) => write!(f, "{value}"),
			Self::String(value) => write!(f, "{value:?}"),
		}
	}
}

/// Pushed to the client over the session's stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
	/// A reply to an invocation, already encoded by the handler.
	Message(Value),
	/// Liveness probe sent on an idle channel. The client answers with an ack carrying `seq`.
	Keepalive { seq: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum InvocationOutcome {
	Completed(Value),
	Failed(Value),
}
impl InvocationOutcome {
	pub fn into_message(self) -> Value {
		match self {
			Self::Completed(value) | Self::Failed(value) => value,
		}
	}
}

/// Runs one invocation. Implementations must observe `cancel` at every suspend point.
pub trait InvocationHandler
where
	Self: Send + Sync,
{
	fn handle<'a>(
		&'a self,
		correlation_id: &'a CorrelationId,
		payload: Value,
		cancel: CancellationToken,
	) -> BoxFuture<'a, InvocationOutcome>;
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
	pub keepalive_interval: Duration,
	pub ack_timeout: Duration,
	pub mailbox_capacity: usize,
	pub outbound_capacity: usize,
	pub max_in_flight: usize,
}
impl From<&ymd_config::Session> for SessionConfig {
	fn from(cfg: &ymd_config::Session) -> Self {
		Self {
			keepalive_interval: Duration::from_millis(cfg.keepalive_interval_ms),
			ack_timeout: Duration::from_millis(cfg.ack_timeout_ms),
			mailbox_capacity: cfg.mailbox_capacity.max(1),
			outbound_capacity: cfg.outbound_capacity.max(1),
			max_in_flight: cfg.max_in_flight.max(1),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn correlation_ids_keep_their_json_type() {
		let number: CorrelationId = serde_json::from_str("42").expect("Failed to parse id.");
		let string: CorrelationId = serde_json::from_str("\"42\"").expect("Failed to parse id.");

		assert_eq!(number, CorrelationId::Number(42));
		assert_eq!(string, CorrelationId::String("42".to_string()));
		assert_ne!(number, string);
		assert_eq!(serde_json::to_value(&string).expect("Failed to encode id."), "42");
	}
}
