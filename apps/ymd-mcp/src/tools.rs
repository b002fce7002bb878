//! The `search_metrics` tool: schema, argument decoding and result encoding.

use std::sync::Arc;

use rmcp::{
	ErrorData,
	model::{CallToolResult, ErrorCode, JsonObject, Tool},
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use ymd_search::{Error, SearchRequest, SearchService};

pub const TOOL_SEARCH_METRICS: &str = "search_metrics";
/// JSON-RPC code for a request the client cancelled.
pub const REQUEST_CANCELLED: ErrorCode = ErrorCode(-32_800);

pub fn build_tools() -> Vec<Tool> {
	vec![Tool::new(
		TOOL_SEARCH_METRICS,
		"Rank metric keys against a natural-language query using lexical and semantic relevance, \
		 optionally restricted to one scope.",
		search_metrics_schema(),
	)]
}

fn search_metrics_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["query_text"],
		"properties": {
			"query_text": {
				"type": "string",
				"minLength": 1,
				"description": "Free-form query text."
			},
			"top_k": {
				"type": "integer",
				"description": "Result count. Clamped to the configured range."
			},
			"scope_id": {
				"type": ["integer", "null"],
				"description": "Restricts candidates to the fields of this scope."
			}
		}
	}))
}

/// Runs one `search_metrics` call. Caller mistakes and search failures become structured tool
/// errors. Cancellation and encoding failures are protocol errors.
pub async fn call_search_metrics(
	search: &SearchService,
	arguments: Option<Map<String, Value>>,
	cancel: &CancellationToken,
) -> Result<CallToolResult, ErrorData> {
	let request = match decode_arguments(arguments) {
		Ok(request) => request,
		Err(err) => return Ok(tool_error(&err)),
	};

	match search.search(request, cancel).await {
		Ok(response) => {
			let value = serde_json::to_value(&response).map_err(|err| {
				ErrorData::internal_error(format!("Failed to encode search results: {err}."), None)
			})?;

			Ok(CallToolResult::structured(value))
		},
		Err(Error::Cancelled) => Err(ErrorData::new(REQUEST_CANCELLED, "Request cancelled.", None)),
		Err(err) => Ok(tool_error(&err)),
	}
}

fn decode_arguments(arguments: Option<Map<String, Value>>) -> Result<SearchRequest, Error> {
	let arguments = arguments.ok_or_else(|| Error::Validation {
		message: "arguments object is required.".to_string(),
	})?;

	serde_json::from_value(Value::Object(arguments))
		.map_err(|err| Error::Validation { message: err.to_string() })
}

fn tool_error(err: &Error) -> CallToolResult {
	if err.is_rejection() {
		tracing::debug!(error_code = err.code(), error = %err, "Tool call rejected.");
	} else {
		tracing::warn!(error_code = err.code(), error = %err, "Tool call failed.");
	}

	CallToolResult::structured_error(serde_json::json!({
		"error_code": err.code(),
		"message": err.to_string(),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	use ymd_config::Lexical;
	use ymd_search::{CorpusCache, CorpusRows, SearchSettings};
	use ymd_testkit::StubEmbedding;

	fn wide_service(records: usize) -> SearchService {
		let metrics = (0..records)
			.map(|idx| {
				ymd_testkit::metric_row(
					&format!("financial.capex.item{idx:03}"),
					"Capex item",
					"Capital expenditure line item.",
				)
			})
			.collect();
		let rows = CorpusRows { metrics, scopes: Vec::new() };
		let cache = Arc::new(CorpusCache::new(rows, Lexical::default()));

		SearchService::new(cache, Arc::new(StubEmbedding::new()), SearchSettings::default())
	}

	fn arguments(raw: &str) -> Option<Map<String, Value>> {
		match serde_json::from_str(raw).expect("Failed to parse arguments.") {
			Value::Object(arguments) => Some(arguments),
			other => panic!("Arguments must be an object: {other}."),
		}
	}

	#[test]
	fn registers_search_metrics() {
		let tools = build_tools();

		assert_eq!(tools.len(), 1);
		assert_eq!(tools[0].name, TOOL_SEARCH_METRICS);

		let required = tools[0].input_schema.get("required").expect("Missing required list.");

		assert_eq!(required, &serde_json::json!(["query_text"]));
	}

	#[test]
	fn missing_query_text_is_a_validation_error() {
		let mut arguments = Map::new();

		arguments.insert("top_k".to_string(), Value::from(5));

		let err = decode_arguments(Some(arguments)).expect_err("Expected a validation error.");

		assert_eq!(err.code(), "validation_error");
	}

	#[tokio::test]
	async fn huge_top_k_is_clamped_not_rejected() {
		let service = wide_service(120);
		let result = call_search_metrics(
			&service,
			arguments(r#"{"query_text":"capex","top_k":99999999999999999999}"#),
			&CancellationToken::new(),
		)
		.await
		.expect("Tool call failed.");
		let content = result.structured_content.expect("Missing structured content.");

		assert_eq!(result.is_error, Some(false));
		assert_eq!(content["top_k"], 100);
		assert_eq!(content["results"].as_array().map(Vec::len), Some(100));
	}

	#[tokio::test]
	async fn unknown_argument_is_a_structured_validation_error() {
		let service = wide_service(3);
		let result = call_search_metrics(
			&service,
			arguments(r#"{"query_text":"capex","limit":5}"#),
			&CancellationToken::new(),
		)
		.await
		.expect("Tool call failed.");
		let content = result.structured_content.expect("Missing structured content.");

		assert_eq!(result.is_error, Some(true));
		assert_eq!(content["error_code"], "validation_error");
	}

	#[test]
	fn non_integer_top_k_is_a_validation_error() {
		let mut arguments = Map::new();

		arguments.insert("query_text".to_string(), Value::from("capex"));
		arguments.insert("top_k".to_string(), Value::from("five"));

		let err = decode_arguments(Some(arguments)).expect_err("Expected a validation error.");

		assert_eq!(err.code(), "validation_error");
	}
}
