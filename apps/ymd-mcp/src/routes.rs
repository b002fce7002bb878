use std::convert::Infallible;

use axum::{
	Json, Router,
	body::Bytes,
	extract::{Query, State},
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, Sse},
	},
	routing::{get, post},
};
use futures::{Stream, StreamExt, future, stream};
use rmcp::{ErrorData, model::ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use crate::{
	protocol::{self, Inbound},
	state::AppState,
};
use ymd_cli::BuildInfo;
use ymd_session::{CorrelationId, SessionEvent, SessionHandle};

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/sse/messages";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(status))
		.route("/health", get(health))
		.route(SSE_PATH, get(open_stream))
		.route(MESSAGES_PATH, post(post_message))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new().route("/admin/refresh", post(refresh)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
	session_id: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
	service: &'static str,
	status: &'static str,
	build: BuildInfo,
	sessions: usize,
	outstanding_invocations: usize,
	snapshot: SnapshotStatus,
}

#[derive(Debug, Serialize)]
struct SnapshotStatus {
	version: u64,
	fingerprint: String,
	records: usize,
	scopes: usize,
	loaded_at: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
	status: &'static str,
	records: usize,
	snapshot_version: u64,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
	let snapshot = state.search.cache().snapshot();

	Json(StatusResponse {
		service: protocol::SERVER_NAME,
		status: "ok",
		build: ymd_cli::build_info(),
		sessions: state.sessions.len(),
		outstanding_invocations: state.sessions.outstanding_invocations(),
		snapshot: SnapshotStatus {
			version: snapshot.version(),
			fingerprint: snapshot.fingerprint().to_string(),
			records: snapshot.records().len(),
			scopes: snapshot.scopes().len(),
			loaded_at: snapshot.loaded_at().format(&Rfc3339).unwrap_or_default(),
		},
	})
}

/// Unhealthy while the live snapshot holds no records.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let snapshot = state.search.cache().snapshot();
	let (code, status) = if snapshot.is_empty() {
		(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
	} else {
		(StatusCode::OK, "healthy")
	};

	(
		code,
		Json(HealthResponse {
			status,
			records: snapshot.records().len(),
			snapshot_version: snapshot.version(),
		}),
	)
}

async fn refresh(State(state): State<AppState>) -> Response {
	match state.search.cache().refresh(state.source.as_ref()).await {
		Ok(report) => Json(report).into_response(),
		Err(err) => {
			tracing::warn!(error = %err, "On-demand corpus refresh failed.");

			(
				StatusCode::SERVICE_UNAVAILABLE,
				Json(json!({ "error_code": err.code(), "message": err.to_string() })),
			)
				.into_response()
		},
	}
}

/// Opens a session. The first event names the endpoint for client messages; dropping the stream
/// disconnects the session.
async fn open_stream(
	State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
	let (handle, events) = state.sessions.open();
	let endpoint = Event::default()
		.event("endpoint")
		.data(format!("{MESSAGES_PATH}?session_id={}", handle.id()));
	let guard = handle.transport_token().drop_guard();

	tracing::info!(session_id = handle.id(), "Event stream opened.");

	let updates = stream::unfold((events, guard), |(mut events, guard)| async move {
		let event = events.recv().await?;

		Some((Ok(encode_event(event)), (events, guard)))
	});

	Sse::new(stream::once(future::ready(Ok::<_, Infallible>(endpoint))).chain(updates))
}

fn encode_event(event: SessionEvent) -> Event {
	let message = match event {
		SessionEvent::Message(message) => message,
		SessionEvent::Keepalive { seq } => protocol::keepalive_ping(seq),
	};

	Event::default().event("message").data(message.to_string())
}

async fn post_message(
	State(state): State<AppState>,
	Query(query): Query<SessionQuery>,
	body: Bytes,
) -> Response {
	let handle = match state.sessions.get(&query.session_id) {
		Ok(handle) => handle,
		Err(err) => return session_error(&err, None),
	};
	let message = match serde_json::from_slice(&body) {
		Ok(message) => message,
		Err(err) =>
			return rpc_error(
				StatusCode::BAD_REQUEST,
				None,
				&ErrorData::parse_error(format!("Invalid JSON: {err}."), None),
			),
	};

	match protocol::classify(message) {
		Ok(Inbound::Request { id, message }) => match handle.invoke(id.clone(), message).await {
			Ok(()) => StatusCode::ACCEPTED.into_response(),
			Err(err) => session_error(&err, Some(&id)),
		},
		Ok(Inbound::Notification { method, params }) =>
			match notify(&handle, &method, &params).await {
				Ok(()) => StatusCode::ACCEPTED.into_response(),
				Err(err) => session_error(&err, None),
			},
		Ok(Inbound::Response { id }) => {
			if let Some(seq) = protocol::keepalive_seq(&id)
				&& let Err(err) = handle.ack(seq).await
			{
				return session_error(&err, None);
			}

			StatusCode::ACCEPTED.into_response()
		},
		Err(err) => rpc_error(StatusCode::BAD_REQUEST, None, &err),
	}
}

async fn notify(
	handle: &SessionHandle,
	method: &str,
	params: &serde_json::Value,
) -> ymd_session::Result<()> {
	match method {
		"notifications/initialized" => {
			tracing::debug!(session_id = handle.id(), "Client initialized.");

			Ok(())
		},
		"notifications/cancelled" => match protocol::cancelled_request_id(params) {
			Some(id) => handle.cancel(id).await,
			None => Ok(()),
		},
		"notifications/session/close" => handle.close().await,
		other => {
			tracing::debug!(session_id = handle.id(), method = other, "Notification ignored.");

			Ok(())
		},
	}
}

fn session_error(err: &ymd_session::Error, id: Option<&CorrelationId>) -> Response {
	let (status, code) = match err {
		ymd_session::Error::SessionNotFound { .. } =>
			(StatusCode::NOT_FOUND, ErrorCode::INVALID_REQUEST),
		ymd_session::Error::SessionClosed { .. } => (StatusCode::GONE, ErrorCode::INVALID_REQUEST),
		ymd_session::Error::DuplicateCorrelationId { .. } =>
			(StatusCode::CONFLICT, ErrorCode::INVALID_REQUEST),
		ymd_session::Error::Overloaded { .. } =>
			(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::INTERNAL_ERROR),
	};

	rpc_error(status, id, &ErrorData::new(code, err.to_string(), None))
}

fn rpc_error(status: StatusCode, id: Option<&CorrelationId>, error: &ErrorData) -> Response {
	(status, Json(protocol::failure(id, error))).into_response()
}
