//! Lexical (edit-distance) similarity

/// Character-level string similarity on a 0-100 scale
pub trait LexicalSimilarity: Send + Sync {
    fn ratio(&self, a: &str, b: &str) -> f64;
}

/// Normalized Levenshtein similarity scaled to 0-100
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl LexicalSimilarity for LevenshteinRatio {
    fn ratio(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bounds() {
        let lexical = LevenshteinRatio;
        assert_eq!(lexical.ratio("steel pipe", "steel pipe"), 100.0);
        assert_eq!(lexical.ratio("abc", "xyz"), 0.0);

        let partial = lexical.ratio("steel pipe", "steel pipes");
        assert!(partial > 80.0 && partial < 100.0);
    }

    #[test]
    fn test_empty_strings() {
        let lexical = LevenshteinRatio;
        assert_eq!(lexical.ratio("", ""), 100.0);
        assert_eq!(lexical.ratio("pipe", ""), 0.0);
    }
}
