// ============================================================
// Layer 3   Core Traits (Abstractions)
// ============================================================
// The application layer talks to data sources and scorers
// through these traits only, so a file loader can be swapped
// for another source and the neural scorer for any other
// similarity function without touching the workflows.

use anyhow::Result;
use crate::domain::text_pair::{PairScore, TextPair};

// ─── PairSource ───────────────────────────────────────────────────────────────
/// Any component that can produce text pairs.
///
/// Implementations:
///   - PairFileLoader → JSONL or tab-separated files
pub trait PairSource {
    /// Load every pair available from this source.
    fn load_all(&self) -> Result<Vec<TextPair>>;
}

// ─── PairScorer ───────────────────────────────────────────────────────────────
/// Any component that can judge whether two texts match.
///
/// Implementations:
///   - PredictUseCase → DSMM checkpoint
pub trait PairScorer {
    /// Score each pair, in order. The returned Vec has the same
    /// length as `pairs`.
    fn score(&self, pairs: &[TextPair]) -> Result<Vec<PairScore>>;
}
