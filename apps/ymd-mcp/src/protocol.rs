//! JSON-RPC framing for the session transport.
//!
//! Requests carrying an id run inside the session as invocations; their replies travel back over
//! the event stream. Notifications and client replies are handled inline by the route.

use std::sync::Arc;

use rmcp::{
	ErrorData,
	model::{ErrorCode, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::tools::{self, TOOL_SEARCH_METRICS};
use ymd_search::SearchService;
use ymd_session::{BoxFuture, CorrelationId, InvocationHandler, InvocationOutcome};

pub const SERVER_NAME: &str = "ymd-mcp-server";
pub const JSONRPC_VERSION: &str = "2.0";

const KEEPALIVE_ID_PREFIX: &str = "keepalive-";

/// One inbound message, sorted by how the transport must treat it.
#[derive(Debug, PartialEq)]
pub enum Inbound {
	Request { id: CorrelationId, message: Value },
	Notification { method: String, params: Value },
	Response { id: Value },
}

pub fn classify(message: Value) -> Result<Inbound, ErrorData> {
	let Value::Object(object) = &message else {
		return Err(ErrorData::invalid_request("Message must be a JSON object.", None));
	};
	let method = object.get("method").and_then(Value::as_str).map(str::to_string);
	let id = object.get("id").cloned();

	match (method, id) {
		(Some(_), Some(id)) => {
			let id = serde_json::from_value(id).map_err(|_| {
				ErrorData::invalid_request("Request id must be a string or an integer.", None)
			})?;

			Ok(Inbound::Request { id, message })
		},
		(Some(method), None) => {
			let params = object.get("params").cloned().unwrap_or(Value::Null);

			Ok(Inbound::Notification { method, params })
		},
		(None, Some(id)) if object.contains_key("result") || object.contains_key("error") =>
			Ok(Inbound::Response { id }),
		_ => Err(ErrorData::invalid_request("Message is not a request or a reply.", None)),
	}
}

pub fn success(id: &CorrelationId, result: Value) -> Value {
	json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

pub fn failure(id: Option<&CorrelationId>, error: &ErrorData) -> Value {
	json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error })
}

/// Server-initiated ping used as the keepalive probe.
pub fn keepalive_ping(seq: u64) -> Value {
	json!({
		"jsonrpc": JSONRPC_VERSION,
		"id": format!("{KEEPALIVE_ID_PREFIX}{seq}"),
		"method": "ping",
	})
}

/// Sequence number of a client reply to [`keepalive_ping`].
pub fn keepalive_seq(id: &Value) -> Option<u64> {
	id.as_str()?.strip_prefix(KEEPALIVE_ID_PREFIX)?.parse().ok()
}

/// Request id named by a `notifications/cancelled` payload.
pub fn cancelled_request_id(params: &Value) -> Option<CorrelationId> {
	serde_json::from_value(params.get("requestId")?.clone()).ok()
}

pub fn server_info() -> ServerInfo {
	ServerInfo {
		protocol_version: ProtocolVersion::V_2024_11_05,
		capabilities: ServerCapabilities::builder().enable_tools().build(),
		server_info: Implementation {
			name: SERVER_NAME.to_string(),
			version: ymd_cli::VERSION.to_string(),
			..Default::default()
		},
		instructions: Some(
			"Metric key search. Call search_metrics with a natural-language query_text.".to_string(),
		),
		..Default::default()
	}
}

/// Dispatches session invocations to the protocol methods.
pub struct McpHandler {
	search: Arc<SearchService>,
}
impl McpHandler {
	pub fn new(search: Arc<SearchService>) -> Self {
		Self { search }
	}

	async fn dispatch(&self, payload: Value, cancel: CancellationToken) -> Result<Value, ErrorData> {
		let method = payload.get("method").and_then(Value::as_str).unwrap_or_default();
		let params = payload.get("params").cloned().unwrap_or(Value::Null);

		match method {
			"initialize" => encode(&server_info()),
			"ping" => Ok(json!({})),
			"tools/list" => Ok(json!({ "tools": encode(&tools::build_tools())? })),
			"prompts/list" => Ok(json!({ "prompts": [] })),
			"resources/list" => Ok(json!({ "resources": [] })),
			"tools/call" => self.call_tool(params, &cancel).await,
			other => Err(ErrorData::new(
				ErrorCode::METHOD_NOT_FOUND,
				format!("Unknown method: {other}."),
				None,
			)),
		}
	}

	async fn call_tool(&self, params: Value, cancel: &CancellationToken) -> Result<Value, ErrorData> {
		let Value::Object(mut params) = params else {
			return Err(ErrorData::invalid_params("params must be an object.", None));
		};
		let name = match params.remove("name") {
			Some(Value::String(name)) => name,
			_ => return Err(ErrorData::invalid_params("name is required.", None)),
		};
		let arguments = match params.remove("arguments") {
			None | Some(Value::Null) => None,
			Some(Value::Object(arguments)) => Some(arguments),
			Some(_) => return Err(ErrorData::invalid_params("arguments must be an object.", None)),
		};

		if name != TOOL_SEARCH_METRICS {
			return Err(ErrorData::invalid_params(format!("Unknown tool: {name}."), None));
		}

		let result = tools::call_search_metrics(&self.search, arguments, cancel).await?;

		encode(&result)
	}
}
impl InvocationHandler for McpHandler {
	fn handle<'a>(
		&'a self,
		correlation_id: &'a CorrelationId,
		payload: Value,
		cancel: CancellationToken,
	) -> BoxFuture<'a, InvocationOutcome> {
		Box::pin(async move {
			match self.dispatch(payload, cancel).await {
				Ok(result) => InvocationOutcome::Completed(success(correlation_id, result)),
				Err(err) => InvocationOutcome::Failed(failure(Some(correlation_id), &err)),
			}
		})
	}
}

fn encode<T>(value: &T) -> Result<Value, ErrorData>
where
	T: serde::Serialize,
{
	serde_json::to_value(value)
		.map_err(|err| ErrorData::internal_error(format!("Failed to encode result: {err}."), None))
}
