use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ymd_session::{
	BoxFuture, CorrelationId, Error, InvocationHandler, InvocationOutcome, SessionConfig,
	SessionEvent, SessionManager, SessionState,
};

/// Echoes the payload after `payload.delay_ms`, or reports cancellation.
struct DelayedEcho;
impl InvocationHandler for DelayedEcho {
	fn handle<'a>(
		&'a self,
		correlation_id: &'a CorrelationId,
		payload: Value,
		cancel: CancellationToken,
	) -> BoxFuture<'a, InvocationOutcome> {
		Box::pin(async move {
			let delay = payload.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);

			tokio::select! {
				_ = cancel.cancelled() => InvocationOutcome::Failed(json!({ "id": correlation_id, "cancelled": true })),
				_ = tokio::time::sleep(Duration::from_millis(delay)) =>
					InvocationOutcome::Completed(json!({ "id": correlation_id, "echo": payload })),
			}
		})
	}
}

fn config() -> SessionConfig {
	SessionConfig {
		keepalive_interval: Duration::from_secs(3_600),
		ack_timeout: Duration::from_secs(3_600),
		mailbox_capacity: 8,
		outbound_capacity: 8,
		max_in_flight: 4,
	}
}

fn manager(config: SessionConfig) -> SessionManager {
	SessionManager::new(config, Arc::new(DelayedEcho))
}

fn id(value: i64) -> CorrelationId {
	CorrelationId::Number(value)
}

async fn next_message(events: &mut mpsc::Receiver<SessionEvent>) -> Value {
	loop {
		match tokio::time::timeout(Duration::from_secs(5), events.recv())
			.await
			.expect("Timed out waiting for an event.")
			.expect("Event stream ended.")
		{
			SessionEvent::Message(value) => return value,
			SessionEvent::Keepalive { .. } => continue,
		}
	}
}

async fn wait_for_removal(manager: &SessionManager) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !manager.is_empty() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("Session was not removed.");
}

#[tokio::test]
async fn invocation_result_is_delivered() {
	let manager = manager(config());
	let (handle, mut events) = manager.open();

	handle.invoke(id(1), json!({ "query": "capex" })).await.expect("Invoke failed.");

	let message = next_message(&mut events).await;

	assert_eq!(message["id"], 1);
	assert_eq!(message["echo"]["query"], "capex");
	assert_eq!(handle.state(), SessionState::Open);
}

#[tokio::test]
async fn invocations_are_pipelined() {
	let manager = manager(config());
	let (handle, mut events) = manager.open();

	handle.invoke(id(1), json!({ "delay_ms": 200 })).await.expect("Invoke failed.");
	handle.invoke(id(2), json!({ "delay_ms": 0 })).await.expect("Invoke failed.");

	assert_eq!(next_message(&mut events).await["id"], 2);
	assert_eq!(next_message(&mut events).await["id"], 1);
}

#[tokio::test]
async fn duplicate_correlation_ids_are_refused() {
	let manager = manager(config());
	let (handle, _events) = manager.open();

	handle.invoke(id(7), json!({ "delay_ms": 1_000 })).await.expect("Invoke failed.");

	let err = handle.invoke(id(7), json!({})).await.expect_err("Expected duplicate error.");

	assert!(matches!(err, Error::DuplicateCorrelationId { .. }), "unexpected error: {err:?}");

	handle
		.invoke(CorrelationId::String("7".to_string()), json!({}))
		.await
		.expect("String ids are distinct from numeric ids.");
}

#[tokio::test]
async fn in_flight_limit_is_enforced() {
	let manager = manager(SessionConfig { max_in_flight: 1, ..config() });
	let (handle, _events) = manager.open();

	handle.invoke(id(1), json!({ "delay_ms": 1_000 })).await.expect("Invoke failed.");

	let err = handle.invoke(id(2), json!({})).await.expect_err("Expected overload.");

	assert!(matches!(err, Error::Overloaded { limit: 1, .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn disconnect_cancels_pending_invocations() {
	let manager = manager(config());
	let (handle, _events) = manager.open();

	handle.invoke(id(1), json!({ "delay_ms": 60_000 })).await.expect("Invoke failed.");
	handle.invoke(id(2), json!({ "delay_ms": 60_000 })).await.expect("Invoke failed.");

	assert_eq!(manager.outstanding_invocations(), 2);

	handle.disconnect();
	handle.closed().await;

	assert_eq!(handle.state(), SessionState::Closed);
	assert_eq!(manager.outstanding_invocations(), 0);

	wait_for_removal(&manager).await;

	let err = manager.get(handle.id()).expect_err("Expected the session to be gone.");

	assert!(matches!(err, Error::SessionNotFound { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn dropped_transport_guard_closes_session() {
	let manager = manager(config());
	let (handle, events) = manager.open();
	let guard = handle.transport_token().drop_guard();

	handle.invoke(id(1), json!({ "delay_ms": 60_000 })).await.expect("Invoke failed.");

	drop(events);
	drop(guard);
	handle.closed().await;

	assert_eq!(manager.outstanding_invocations(), 0);
}

#[tokio::test]
async fn close_drains_in_flight_work() {
	let manager = manager(config());
	let (handle, mut events) = manager.open();

	handle.invoke(id(1), json!({ "delay_ms": 100 })).await.expect("Invoke failed.");
	handle.close().await.expect("Close failed.");

	let err = handle.invoke(id(2), json!({})).await.expect_err("Draining must refuse work.");

	assert!(matches!(err, Error::SessionClosed { .. }), "unexpected error: {err:?}");
	assert_eq!(handle.state(), SessionState::Draining);
	assert_eq!(next_message(&mut events).await["id"], 1);

	handle.closed().await;

	assert!(events.recv().await.is_none(), "Stream must end after the drain.");
}

#[tokio::test]
async fn cancelled_invocation_result_is_discarded() {
	let manager = manager(config());
	let (handle, mut events) = manager.open();

	handle.invoke(id(1), json!({ "delay_ms": 60_000 })).await.expect("Invoke failed.");
	handle.invoke(id(2), json!({ "delay_ms": 50 })).await.expect("Invoke failed.");
	handle.cancel(id(1)).await.expect("Cancel failed.");

	let message = next_message(&mut events).await;

	assert_eq!(message["id"], 2);
	assert!(message.get("cancelled").is_none());

	handle.close().await.expect("Close failed.");
	handle.closed().await;

	assert_eq!(manager.outstanding_invocations(), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_keepalive_closes_session() {
	let manager = manager(SessionConfig {
		keepalive_interval: Duration::from_millis(100),
		ack_timeout: Duration::from_millis(50),
		..config()
	});
	let (handle, mut events) = manager.open();

	assert_eq!(events.recv().await, Some(SessionEvent::Keepalive { seq: 1 }));

	handle.ack(1).await.expect("Ack failed.");

	assert_eq!(events.recv().await, Some(SessionEvent::Keepalive { seq: 2 }));

	handle.closed().await;

	assert_eq!(handle.state(), SessionState::Closed);
	assert_eq!(events.recv().await, None);
}
