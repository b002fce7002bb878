//! Immutable corpus snapshots and the cache that swaps them.

use std::{
	collections::BTreeSet,
	sync::{
		Arc, PoisonError, RwLock,
		atomic::{AtomicU64, Ordering},
	},
};

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
	CorpusSource, Result,
	lexical::LexicalIndex,
	scope::{FieldScopeFilter, ScopeRegistry},
	text,
};
use ymd_config::Lexical;
use ymd_providers::store::{MetricRow, ScopeRow};

#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
	pub key: String,
	/// Used for lexical scoring: the key as words, the canonical name and the description.
	pub text: String,
	pub embedding: Option<Vec<f32>>,
	/// The key and each of its dotted prefixes.
	pub scope_tags: BTreeSet<String>,
}
impl MetricRecord {
	pub fn from_row(row: MetricRow) -> Self {
		let parts: Vec<String> = [Some(text::key_to_words(&row.key)), row.canonical_name, row.description]
			.into_iter()
			.flatten()
			.filter(|part| !part.is_empty())
			.collect();

		Self {
			text: parts.join(" "),
			embedding: row.embedding.filter(|embedding| !embedding.is_empty()),
			scope_tags: scope_tags_for(&row.key),
			key: row.key,
		}
	}
}

/// Raw rows as read from the record store.
#[derive(Clone, Debug, Default)]
pub struct CorpusRows {
	pub metrics: Vec<MetricRow>,
	pub scopes: Vec<ScopeRow>,
}

/// One consistent view of the corpus. Readers hold an `Arc` to it for the whole query; a refresh
/// builds a new snapshot instead of touching this one.
#[derive(Debug)]
pub struct CorpusSnapshot {
	version: u64,
	fingerprint: String,
	loaded_at: OffsetDateTime,
	records: Vec<MetricRecord>,
	lexical: LexicalIndex,
	scopes: ScopeRegistry,
}
impl CorpusSnapshot {
	/// Records are ordered by key; duplicate keys keep the first row seen.
	pub fn build(version: u64, rows: CorpusRows, params: Lexical) -> Self {
		let mut metrics = rows.metrics;

		metrics.sort_by(|a, b| a.key.cmp(&b.key));
		metrics.dedup_by(|later, earlier| {
			let duplicate = later.key == earlier.key;

			if duplicate {
				tracing::warn!(key = %later.key, "Dropping duplicate metric key.");
			}

			duplicate
		});

		let records: Vec<MetricRecord> = metrics.into_iter().map(MetricRecord::from_row).collect();
		let scopes = ScopeRegistry::from_rows(&rows.scopes);
		let lexical = LexicalIndex::build(records.iter().map(|record| record.text.as_str()), params);
		let fingerprint = fingerprint(&records, &scopes);

		Self { version, fingerprint, loaded_at: OffsetDateTime::now_utc(), records, lexical, scopes }
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}

	pub fn loaded_at(&self) -> OffsetDateTime {
		self.loaded_at
	}

	pub fn records(&self) -> &[MetricRecord] {
		&self.records
	}

	pub fn lexical(&self) -> &LexicalIndex {
		&self.lexical
	}

	pub fn scopes(&self) -> &ScopeRegistry {
		&self.scopes
	}

	pub fn scope_filter(&self) -> FieldScopeFilter<'_> {
		FieldScopeFilter::new(&self.scopes, &self.records)
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshReport {
	pub snapshot_version: u64,
	pub fingerprint: String,
	pub records: usize,
	pub scopes: usize,
	pub changed: bool,
}

/// Holds the active snapshot. Reads clone an `Arc`; refreshes build off-lock and swap.
#[derive(Debug)]
pub struct CorpusCache {
	current: RwLock<Arc<CorpusSnapshot>>,
	next_version: AtomicU64,
	params: Lexical,
}
impl CorpusCache {
	pub fn new(rows: CorpusRows, params: Lexical) -> Self {
		let snapshot = CorpusSnapshot::build(1, rows, params);

		Self { current: RwLock::new(Arc::new(snapshot)), next_version: AtomicU64::new(2), params }
	}

	/// Initial load. Failure here is fatal to the caller.
	pub async fn load(source: &dyn CorpusSource, params: Lexical) -> Result<Self> {
		let rows = source.load().await?;
		let cache = Self::new(rows, params);
		let snapshot = cache.snapshot();

		tracing::info!(
			records = snapshot.records().len(),
			scopes = snapshot.scopes().len(),
			fingerprint = snapshot.fingerprint(),
			"Corpus snapshot loaded."
		);

		Ok(cache)
	}

	pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Loads fresh rows and swaps in a new snapshot. On error the current snapshot stays active.
	pub async fn refresh(&self, source: &dyn CorpusSource) -> Result<RefreshReport> {
		let rows = source.load().await?;
		let version = self.next_version.fetch_add(1, Ordering::SeqCst);
		let snapshot = Arc::new(CorpusSnapshot::build(version, rows, self.params));
		let previous = self.swap(snapshot.clone());
		let changed = previous.fingerprint() != snapshot.fingerprint();

		if changed {
			tracing::info!(
				snapshot_version = version,
				records = snapshot.records().len(),
				fingerprint = snapshot.fingerprint(),
				"Corpus snapshot swapped."
			);
		} else {
			tracing::info!(snapshot_version = version, "Corpus refresh found no changes.");
		}

		Ok(RefreshReport {
			snapshot_version: version,
			fingerprint: snapshot.fingerprint().to_string(),
			records: snapshot.records().len(),
			scopes: snapshot.scopes().len(),
			changed,
		})
	}

	fn swap(&self, snapshot: Arc<CorpusSnapshot>) -> Arc<CorpusSnapshot> {
		let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);

		std::mem::replace(&mut *guard, snapshot)
	}
}

pub fn scope_tags_for(key: &str) -> BTreeSet<String> {
	let mut tags = BTreeSet::new();

	for (idx, ch) in key.char_indices() {
		if ch == '.' && idx > 0 {
			tags.insert(key[..idx].to_string());
		}
	}

	tags.insert(key.to_string());

	tags
}

fn fingerprint(records: &[MetricRecord], scopes: &ScopeRegistry) -> String {
	let mut hasher = blake3::Hasher::new();

	for record in records {
		hasher.update(record.key.as_bytes());
		hasher.update(&[0]);
		hasher.update(record.text.as_bytes());
		hasher.update(&[0]);

		if let Some(embedding) = &record.embedding {
			for value in embedding {
				hasher.update(&value.to_le_bytes());
			}
		}

		hasher.update(&[0xff]);
	}
	for scope in scopes.iter() {
		hasher.update(&scope.id.to_le_bytes());

		for tag in &scope.tags {
			hasher.update(tag.as_bytes());
			hasher.update(&[0]);
		}

		hasher.update(&[0xff]);
	}

	hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn row(key: &str, name: Option<&str>) -> MetricRow {
		MetricRow {
			key: key.to_string(),
			canonical_name: name.map(str::to_string),
			description: Some("Synthetic description.".to_string()),
			embedding: Some(vec![1.0, 0.0]),
		}
	}

	fn rows() -> CorpusRows {
		CorpusRows {
			metrics: vec![row("financial.payback", Some("Payback")), row("financial.capex", None)],
			scopes: vec![ScopeRow { id: 1, expected_fields: json!(["financial.capex"]) }],
		}
	}

	#[test]
	fn record_text_joins_key_words_and_labels() {
		let record = MetricRecord::from_row(row("financial.payback_period", Some("Payback period")));

		assert_eq!(record.text, "financial payback period Payback period Synthetic description.");
	}

	#[test]
	fn scope_tags_include_dotted_prefixes() {
		let tags: Vec<String> = scope_tags_for("financial.capex.total").into_iter().collect();

		assert_eq!(tags, vec!["financial", "financial.capex", "financial.capex.total"]);
	}

	#[test]
	fn snapshot_orders_and_dedupes_records() {
		let mut input = rows();

		input.metrics.push(row("financial.capex", Some("Duplicate")));

		let snapshot = CorpusSnapshot::build(1, input, Lexical::default());
		let keys: Vec<&str> = snapshot.records().iter().map(|record| record.key.as_str()).collect();

		assert_eq!(keys, vec!["financial.capex", "financial.payback"]);
		assert_eq!(snapshot.lexical().stats().doc_count, 2);
		assert_eq!(snapshot.scopes().len(), 1);
	}

	#[test]
	fn fingerprint_is_stable_across_row_order() {
		let mut reversed = rows();

		reversed.metrics.reverse();

		let a = CorpusSnapshot::build(1, rows(), Lexical::default());
		let b = CorpusSnapshot::build(2, reversed, Lexical::default());

		assert_eq!(a.fingerprint(), b.fingerprint());
	}

	#[test]
	fn swap_keeps_old_snapshot_alive_for_readers() {
		let cache = CorpusCache::new(rows(), Lexical::default());
		let held = cache.snapshot();
		let replacement = Arc::new(CorpusSnapshot::build(2, CorpusRows::default(), Lexical::default()));

		cache.swap(replacement);

		assert_eq!(held.records().len(), 2);
		assert!(cache.snapshot().is_empty());
		assert_eq!(cache.snapshot().version(), 2);
	}
}
