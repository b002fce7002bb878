//! Tokenization shared by index build and query time.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into lowercase alphanumeric terms.
///
/// Input is NFKC-normalized first, then segmented on word boundaries. Word-internal punctuation
/// that the boundary rules keep (`capex.total`, `year's`) is split as well, so punctuation never
/// survives into a term.
pub fn tokenize(text: &str) -> Vec<String> {
	let normalized: String = text.nfkc().collect();
	let mut out = Vec::new();

	for word in normalized.unicode_words() {
		for part in word.split(|ch: char| !ch.is_alphanumeric()) {
			if part.is_empty() {
				continue;
			}

			out.push(part.to_lowercase());
		}
	}

	out
}

/// Turns a dotted or snake-cased metric key into plain words.
pub fn key_to_words(key: &str) -> String {
	key.split(|ch: char| ch == '.' || ch == '_' || ch == '-')
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_punctuation_and_case() {
		assert_eq!(tokenize("Payback, PERIOD! (months)"), vec!["payback", "period", "months"]);
	}

	#[test]
	fn splits_word_internal_punctuation() {
		assert_eq!(tokenize("financial.capex.total"), vec!["financial", "capex", "total"]);
	}

	#[test]
	fn normalizes_fullwidth_forms() {
		assert_eq!(tokenize("ＣＡＰＥＸ"), vec!["capex"]);
	}

	#[test]
	fn punctuation_only_yields_nothing() {
		assert!(tokenize(" ... ?! ").is_empty());
	}

	#[test]
	fn key_words_drop_separators() {
		assert_eq!(key_to_words("financial.payback_period"), "financial payback period");
	}
}
