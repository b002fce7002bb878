//! Weighted min-max fusion of independent scoring signals.

const DEGENERATE_VALUE: f32 = 0.5;
const NUMERIC_EPSILON: f32 = 1e-9;

/// One signal's raw scores, aligned with the candidate list.
#[derive(Clone, Debug)]
pub struct WeightedScores {
	pub weight: f32,
	pub scores: Vec<Option<f32>>,
}
impl WeightedScores {
	pub fn new(weight: f32, scores: Vec<Option<f32>>) -> Self {
		Self { weight, scores }
	}

	/// A signal takes part in fusion when at least one candidate has a finite score.
	pub fn is_available(&self) -> bool {
		self.scores.iter().flatten().any(|score| score.is_finite())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct FusedEntry {
	/// Position in the candidate list passed to [`fuse`].
	pub position: usize,
	pub fused: f32,
	/// One-based.
	pub rank: u32,
}

/// Min-max normalization into `[0, 1]` over the scores that are present.
///
/// Missing or non-finite scores stay `None`. When every present score is the same, each one maps
/// to 0.5.
pub fn min_max_normalize(scores: &[Option<f32>]) -> Vec<Option<f32>> {
	let finite = scores.iter().flatten().copied().filter(|score| score.is_finite());
	let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), score| {
		(min.min(score), max.max(score))
	});
	let range = max - min;

	scores
		.iter()
		.map(|score| {
			let score = (*score).filter(|score| score.is_finite())?;

			if range.abs() <= NUMERIC_EPSILON {
				Some(DEGENERATE_VALUE)
			} else {
				Some(((score - min) / range).clamp(0.0, 1.0))
			}
		})
		.collect()
}

/// Fuses signals over `keys` and returns the top `top_k` entries.
///
/// `fused = Σ w·norm / Σ w` where both sums run over the signals available for this query; a
/// candidate missing a score from an available signal contributes zero for it. Ordering is fused
/// score descending, then key ascending.
pub fn fuse(keys: &[&str], signals: &[WeightedScores], top_k: usize) -> Vec<FusedEntry> {
	let available: Vec<(f32, Vec<Option<f32>>)> = signals
		.iter()
		.filter(|signal| signal.weight > 0.0 && signal.is_available())
		.map(|signal| (signal.weight, min_max_normalize(&signal.scores)))
		.collect();
	let total_weight: f32 = available.iter().map(|(weight, _)| weight).sum();
	let mut entries: Vec<FusedEntry> = (0..keys.len())
		.map(|position| {
			let weighted: f32 = available
				.iter()
				.map(|(weight, norm)| weight * norm.get(position).copied().flatten().unwrap_or(0.0))
				.sum();
			let fused = if total_weight > 0.0 { weighted / total_weight } else { 0.0 };

			FusedEntry { position, fused, rank: 0 }
		})
		.collect();

	entries.sort_by(|a, b| {
		b.fused.total_cmp(&a.fused).then_with(|| keys[a.position].cmp(keys[b.position]))
	});
	entries.truncate(top_k);

	for (idx, entry) in entries.iter_mut().enumerate() {
		entry.rank = idx as u32 + 1;
	}

	entries
}
