use serde::{Deserialize, Serialize};

/// The score of one word given its history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmScore {
    /// The weighted log probability
    pub log_prob: f64,
    /// The length of the n-gram that actually produced the score
    pub n_used: usize,
}

/// An n-gram language model that lattice searches can consult.
///
/// Word sequences are passed predicted word first, followed by the
/// history with the most recent word first: `["c", "b", "a"]` asks for
/// `P(c | a b)`. Implementations may use fewer history words than given.
pub trait LanguageModel: Send + Sync {
    /// The weighted log probability of `words[0]` given `words[1..]`.
    fn score(&self, words: &[&str]) -> LmScore;

    /// The unweighted log probability of `words[0]` given `words[1..]`.
    fn prob(&self, words: &[&str]) -> f64;

    /// The longest n-gram the model knows about.
    fn order(&self) -> usize;

    /// The scale that was applied to produce weighted scores.
    fn language_weight(&self) -> f64 {
        1.0
    }
}
