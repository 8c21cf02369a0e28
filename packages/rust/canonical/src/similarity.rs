//! String similarity over comparison keys.

/// Edit-distance ratio in `[0, 1]`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Similarity of two store keys: 1 when equal, shorter/longer when one
/// contains the other, the edit ratio otherwise.
pub fn key_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        let (la, lb) = (a.chars().count(), b.chars().count());
        return la.min(lb) as f64 / la.max(lb) as f64;
    }
    similarity_ratio(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_and_empty() {
        assert_eq!(key_similarity("tesla", "tesla"), 1.0);
        assert_eq!(key_similarity("", "tesla"), 0.0);
    }

    #[test]
    fn containment_uses_length_ratio() {
        assert!((key_similarity("特斯拉", "特斯拉汽车") - 0.6).abs() < 1e-9);
        assert!((key_similarity("iphone14", "iphone") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn near_spellings_score_high() {
        assert!(key_similarity("volkswagen", "volkswagon") >= 0.85);
        assert!(key_similarity("toyota", "honda") < 0.6);
    }
}
