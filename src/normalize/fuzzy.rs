//! Fuzzy string matching. Two distinct matchers cover two distinct needs:
//! `category_similarity`/`fuzzy_match_category` implement the character-
//! overlap formula used to map typos onto an allowed category set, and
//! `EntityMatcher` implements the title-stripping, Jaro-Winkler-based
//! comparison used to group entity-name variants.

use regex::Regex;
use std::collections::HashSet;
use strsim::jaro_winkler;

/// Character-overlap similarity: `|A∩B| / max(|A|,|B|)`, case-insensitive.
/// An exact (case-insensitive) match always scores 1.0.
pub fn category_similarity(a: &str, b: &str) -> f64 {
    if a.eq_ignore_ascii_case(b) {
        return 1.0;
    }
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let set_a: HashSet<char> = a_lower.chars().collect();
    let set_b: HashSet<char> = b_lower.chars().collect();
    let max_len = a_lower.chars().count().max(b_lower.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let overlap = set_a.intersection(&set_b).count();
    overlap as f64 / max_len as f64
}

/// Finds the best-scoring entry in `allowed` for `value`, above `threshold`.
pub fn fuzzy_match_category(value: &str, allowed: &[String], threshold: f64) -> Option<(String, f64)> {
    if let Some(exact) = allowed.iter().find(|a| a.eq_ignore_ascii_case(value)) {
        return Some((exact.clone(), 1.0));
    }
    allowed
        .iter()
        .map(|candidate| (candidate.clone(), category_similarity(value, candidate)))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
}

/// Normalizes and compares entity-name variants (used for grouping company
/// / organization / brand strings before canonicalization).
pub struct EntityMatcher {
    pub similarity_threshold: f64,
}

impl Default for EntityMatcher {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
        }
    }
}

impl EntityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            similarity_threshold: threshold,
        }
    }

    /// Lowercases, strips punctuation, collapses whitespace, drops leading
    /// honorific titles (mr, mrs, dr, ...), and drops trailing corporate
    /// entity suffixes (inc, corp, ltd, ...) — the only consumer of this
    /// matcher groups company-name variants, and "Acme Inc" / "Acme
    /// Incorporated" should normalize the same way "Mr. Doe" / "Doe" do.
    pub fn normalize(&self, s: &str) -> String {
        let titles = [
            "mr", "mrs", "ms", "miss", "dr", "prof", "professor", "sir", "madam", "lord", "lady",
        ];
        let entity_suffixes = [
            "incorporated", "corporation", "limited", "inc", "corp", "ltd", "llc", "plc", "co",
        ];
        let lowered = s.to_lowercase();
        let stripped: String = lowered
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        let whitespace_re = Regex::new(r"\s+").unwrap();
        let mut collapsed = whitespace_re.replace_all(&stripped, " ").trim().to_string();
        for title in titles {
            let pattern = Regex::new(&format!(r"^{title}\s+")).unwrap();
            collapsed = pattern.replace(&collapsed, "").to_string();
        }
        for suffix in entity_suffixes {
            let pattern = Regex::new(&format!(r"\s+{suffix}$")).unwrap();
            collapsed = pattern.replace(&collapsed, "").to_string();
        }
        whitespace_re.replace_all(&collapsed, " ").trim().to_string()
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let norm_a = self.normalize(a);
        let norm_b = self.normalize(b);
        let jw = jaro_winkler(&norm_a, &norm_b);

        let is_substring = !norm_a.is_empty() && !norm_b.is_empty() && (norm_a.contains(&norm_b) || norm_b.contains(&norm_a));
        let substring_bonus = if is_substring {
            let len_diff = (norm_a.len() as f64 - norm_b.len() as f64).abs();
            let max_len = norm_a.len().max(norm_b.len()) as f64;
            if max_len > 0.0 {
                (1.0 - (len_diff / max_len)) * 0.1
            } else {
                0.0
            }
        } else {
            0.0
        };

        (jw + substring_bonus).min(1.0)
    }

    pub fn is_match(&self, a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b) || self.similarity(a, b) >= self.similarity_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(category_similarity("Delhi", "delhi"), 1.0);
    }

    #[test]
    fn typo_is_close_but_not_exact() {
        let score = category_similarity("Delih", "Delhi");
        assert!(score > 0.6 && score < 1.0);
    }

    #[test]
    fn fuzzy_match_category_respects_threshold() {
        let allowed = vec!["Male".to_string(), "Female".to_string()];
        assert_eq!(
            fuzzy_match_category("Mal", &allowed, 0.6),
            Some(("Male".to_string(), category_similarity("Mal", "Male")))
        );
        assert!(fuzzy_match_category("Xyz123", &allowed, 0.6).is_none());
    }

    #[test]
    fn entity_matcher_strips_titles_and_punctuation() {
        let matcher = EntityMatcher::default();
        assert_eq!(matcher.normalize("Mr. John   Doe"), "john doe");
    }

    #[test]
    fn entity_matcher_strips_corporate_suffixes() {
        let matcher = EntityMatcher::default();
        assert_eq!(matcher.normalize("Acme Corporation"), "acme");
        assert_eq!(matcher.normalize("Acme Inc."), "acme");
        assert!(matcher.is_match("Acme Corporation", "Acme Inc."));
    }

    #[test]
    fn entity_matcher_is_match_handles_substrings() {
        let matcher = EntityMatcher::new(0.85);
        assert!(matcher.is_match("Radhika Apte", "Radhika apte"));
        assert!(!matcher.is_match("John Doe", "Jane Smith"));
    }
}
