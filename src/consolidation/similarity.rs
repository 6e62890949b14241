//! Pattern similarity scoring
//!
//! The engine only asks "is this candidate the same pattern as that one?".
//! [`TokenOverlap`] answers with shared-keyword counting; an embedding-based
//! comparator can replace it without touching the merge logic.

use std::collections::HashSet;

/// Pluggable similarity between two pattern descriptions
pub trait PatternSimilarity: Send + Sync {
    /// Higher = more similar
    fn score(&self, candidate: &str, existing: &str) -> f64;

    /// Whether a score is high enough to treat both as one pattern
    fn is_match(&self, score: f64) -> bool;
}

/// Shared-token count between two descriptions
#[derive(Debug, Clone, Copy)]
pub struct TokenOverlap {
    /// Minimum shared tokens for a match
    pub min_shared: usize,
}

impl Default for TokenOverlap {
    fn default() -> Self {
        Self { min_shared: 2 }
    }
}

/// Lower-cased whitespace tokens with edge punctuation trimmed
pub fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

impl PatternSimilarity for TokenOverlap {
    fn score(&self, candidate: &str, existing: &str) -> f64 {
        tokens(candidate).intersection(&tokens(existing)).count() as f64
    }

    fn is_match(&self, score: f64) -> bool {
        score >= self.min_shared as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_tokens_merge() {
        let sim = TokenOverlap::default();
        let score = sim.score(
            "pattern of recursive memory consolidation",
            "recursive memory structures in consolidation",
        );
        assert_eq!(score, 3.0);
        assert!(sim.is_match(score));
    }

    #[test]
    fn test_disjoint_descriptions_stay_distinct() {
        let sim = TokenOverlap::default();
        let score = sim.score("curiosity about new domains", "skill practice improves proficiency");
        assert_eq!(score, 0.0);
        assert!(!sim.is_match(score));

        // One shared token is not enough
        let one = sim.score("curiosity drives learning", "curiosity about domains");
        assert!(!sim.is_match(one));
    }

    #[test]
    fn test_tokens_ignore_case_and_punctuation() {
        let t = tokens("Memory, memory! (Recursion)");
        assert_eq!(t.len(), 2);
        assert!(t.contains("memory"));
        assert!(t.contains("recursion"));
    }
}
