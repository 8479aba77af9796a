// ── xmemory: Token Estimation ───────────────────────────────────────────────
//
// Single source of truth for token estimation in budgeted retrieval.
// This is a fixed characters-per-token heuristic, not a real tokenizer:
// cost = ceil(chars / 4), in integer arithmetic so the estimate stays exact
// for arbitrarily long text. Counting uses chars (not bytes) so CJK/emoji
// text is not overcharged.

use crate::atoms::constants::AVG_CHARS_PER_TOKEN;

/// Token estimator used for every budget decision in adaptive search.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// The 4-chars-per-token estimator.
    pub fn heuristic() -> Self {
        Self
    }

    /// Estimate the number of tokens in a string.
    pub fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(AVG_CHARS_PER_TOKEN)
    }
}

/// `ceil(chars / 4)` with the default estimator.
pub fn estimate_tokens(text: &str) -> usize {
    Tokenizer::heuristic().count_tokens(text)
}
