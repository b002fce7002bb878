//! BM25 scoring over a corpus snapshot.

use std::collections::{HashMap, HashSet};

use crate::{ScoringSignal, text};
use ymd_config::Lexical;

/// Aggregate term statistics over every record in a snapshot. Never mutated after build.
#[derive(Clone, Debug, Default)]
pub struct CorpusStats {
	pub doc_count: usize,
	pub avg_doc_len: f32,
	pub doc_freq: HashMap<String, u32>,
}
impl CorpusStats {
	/// `ln((N - df + 0.5) / (df + 0.5) + 1)`, which stays positive for terms present in every
	/// document.
	pub fn idf(&self, term: &str) -> f32 {
		let n = self.doc_count as f32;
		let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;

		((n - df + 0.5) / (df + 0.5) + 1.0).ln()
	}
}

#[derive(Clone, Debug)]
struct DocTerms {
	len: u32,
	tf: HashMap<String, u32>,
}

/// Per-record term frequencies aligned with the snapshot's record order.
#[derive(Clone, Debug)]
pub struct LexicalIndex {
	params: Lexical,
	stats: CorpusStats,
	docs: Vec<DocTerms>,
}
impl LexicalIndex {
	pub fn build<'a, I>(texts: I, params: Lexical) -> Self
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut doc_freq: HashMap<String, u32> = HashMap::new();
		let mut docs = Vec::new();
		let mut total_len = 0_u64;

		for text in texts {
			let tokens = text::tokenize(text);
			let mut tf: HashMap<String, u32> = HashMap::new();

			for token in &tokens {
				*tf.entry(token.clone()).or_default() += 1;
			}
			for term in tf.keys() {
				*doc_freq.entry(term.clone()).or_default() += 1;
			}

			total_len += tokens.len() as u64;

			docs.push(DocTerms { len: tokens.len() as u32, tf });
		}

		let doc_count = docs.len();
		let avg_doc_len = if doc_count == 0 { 0.0 } else { total_len as f32 / doc_count as f32 };

		Self { params, stats: CorpusStats { doc_count, avg_doc_len, doc_freq }, docs }
	}

	pub fn stats(&self) -> &CorpusStats {
		&self.stats
	}

	pub fn query(&self, query_text: &str) -> LexicalQuery<'_> {
		let mut seen = HashSet::new();
		let terms = text::tokenize(query_text)
			.into_iter()
			.filter(|term| seen.insert(term.clone()))
			.map(|term| {
				let idf = self.stats.idf(&term);

				(term, idf)
			})
			.collect();

		LexicalQuery { index: self, terms }
	}

	fn score_doc(&self, doc: &DocTerms, terms: &[(String, f32)]) -> f32 {
		let Lexical { k1, b } = self.params;
		let avg = if self.stats.avg_doc_len > 0.0 { self.stats.avg_doc_len } else { 1.0 };
		let length_norm = 1.0 - b + b * doc.len as f32 / avg;
		let mut score = 0.0;

		for (term, idf) in terms {
			let Some(&tf) = doc.tf.get(term) else {
				continue;
			};
			let tf = tf as f32;

			score += idf * tf * (k1 + 1.0) / (tf + k1 * length_norm);
		}

		score
	}
}

/// A query bound to an index, with terms deduplicated and IDF resolved once.
pub struct LexicalQuery<'a> {
	index: &'a LexicalIndex,
	terms: Vec<(String, f32)>,
}
impl LexicalQuery<'_> {
	pub fn has_terms(&self) -> bool {
		!self.terms.is_empty()
	}
}
impl ScoringSignal for LexicalQuery<'_> {
	fn score(&self, candidates: &[usize]) -> Vec<Option<f32>> {
		candidates
			.iter()
			.map(|&idx| {
				let score = match self.index.docs.get(idx) {
					Some(doc) if self.has_terms() => self.index.score_doc(doc, &self.terms),
					_ => 0.0,
				};

				Some(score)
			})
			.collect()
	}
}
