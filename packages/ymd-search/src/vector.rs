use crate::{ScoringSignal, corpus::MetricRecord};

/// Cosine similarity in `[-1, 1]`. `None` when the vectors differ in length or either has zero
/// norm.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.len() != b.len() || a.is_empty() {
		return None;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (*x as f64, *y as f64);

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
		return None;
	}

	let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());

	similarity.is_finite().then(|| similarity.clamp(-1.0, 1.0) as f32)
}

/// A query embedding bound to the snapshot's records.
pub struct VectorQuery<'a> {
	records: &'a [MetricRecord],
	embedding: &'a [f32],
}
impl<'a> VectorQuery<'a> {
	pub fn new(records: &'a [MetricRecord], embedding: &'a [f32]) -> Self {
		Self { records, embedding }
	}
}
impl ScoringSignal for VectorQuery<'_> {
	/// Candidates without a usable embedding get `None` and stay out of vector scoring.
	fn score(&self, candidates: &[usize]) -> Vec<Option<f32>> {
		candidates
			.iter()
			.map(|&idx| {
				self.records
					.get(idx)
					.and_then(|record| record.embedding.as_deref())
					.and_then(|embedding| cosine(self.embedding, embedding))
			})
			.collect()
	}
}
