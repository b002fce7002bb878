//! Scope registry and candidate narrowing.
//!
//! A scope is a query configuration whose `expected_fields` name metric keys. The loosely-typed
//! payload is resolved into a closed tag set once, at snapshot build time.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::Value;

use crate::{Error, Result, corpus::MetricRecord};
use ymd_providers::store::ScopeRow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeDefinition {
	pub id: i64,
	pub tags: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ScopeRegistry {
	scopes: BTreeMap<i64, ScopeDefinition>,
}
impl ScopeRegistry {
	/// Scopes that resolve to no valid field keys are dropped.
	pub fn from_rows(rows: &[ScopeRow]) -> Self {
		let mut scopes = BTreeMap::new();

		for row in rows {
			let keys = parse_expected_fields(&row.expected_fields);

			if keys.is_empty() {
				tracing::warn!(scope_id = row.id, "Dropping scope without valid expected fields.");

				continue;
			}
			if scopes.contains_key(&row.id) {
				tracing::warn!(scope_id = row.id, "Ignoring duplicate scope row.");

				continue;
			}

			scopes.insert(row.id, ScopeDefinition { id: row.id, tags: keys.into_iter().collect() });
		}

		Self { scopes }
	}

	pub fn get(&self, scope_id: i64) -> Option<&ScopeDefinition> {
		self.scopes.get(&scope_id)
	}

	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &ScopeDefinition> {
		self.scopes.values()
	}
}

/// Narrows a snapshot's records to those tagged for a scope.
pub struct FieldScopeFilter<'a> {
	registry: &'a ScopeRegistry,
	records: &'a [MetricRecord],
}
impl<'a> FieldScopeFilter<'a> {
	pub fn new(registry: &'a ScopeRegistry, records: &'a [MetricRecord]) -> Self {
		Self { registry, records }
	}

	/// Record positions eligible for scoring. No scope means the whole corpus; an unregistered
	/// scope is an error, never a silent widening.
	pub fn resolve(&self, scope_id: Option<i64>) -> Result<Vec<usize>> {
		let Some(scope_id) = scope_id else {
			return Ok((0..self.records.len()).collect());
		};
		let scope = self.registry.get(scope_id).ok_or(Error::UnknownScope { scope_id })?;

		Ok(self
			.records
			.iter()
			.enumerate()
			.filter(|(_, record)| !record.scope_tags.is_disjoint(&scope.tags))
			.map(|(idx, _)| idx)
			.collect())
	}
}

/// Extracts field keys from `expected_fields`.
///
/// Accepted shapes: `{"use_fields": [...]}`, `{"fields": [...]}` or a bare array, optionally
/// encoded as a JSON string. Items are strings or objects with a `key`. Keys are trimmed and must be
/// non-empty without whitespace; invalid items are skipped and duplicates removed in order.
pub fn parse_expected_fields(value: &Value) -> Vec<String> {
	if let Value::String(raw) = value {
		return match serde_json::from_str::<Value>(raw) {
			Ok(decoded) if !decoded.is_string() => parse_expected_fields(&decoded),
			_ => Vec::new(),
		};
	}

	let items = match value {
		Value::Array(items) => items,
		Value::Object(map) => match map.get("use_fields").or_else(|| map.get("fields")) {
			Some(Value::Array(items)) => items,
			_ => return Vec::new(),
		},
		_ => return Vec::new(),
	};
	let mut seen = HashSet::new();
	let mut keys = Vec::new();

	for (idx, item) in items.iter().enumerate() {
		let raw = match item {
			Value::String(key) => Some(key.as_str()),
			Value::Object(map) => map.get("key").and_then(Value::as_str),
			_ => None,
		};
		let Some(key) = raw.map(str::trim).filter(|key| is_valid_key(key)) else {
			tracing::warn!(index = idx, "Skipping invalid expected field.");

			continue;
		};

		if seen.insert(key.to_string()) {
			keys.push(key.to_string());
		}
	}

	keys
}

fn is_valid_key(key: &str) -> bool {
	!key.is_empty() && !key.chars().any(char::is_whitespace)
}
