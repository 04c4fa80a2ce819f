// src/location/similarity.rs
//! String similarity used by the fuzzy district match.
//!
//! `similarity_ratio(a, b)` = `1 - levenshtein(a, b) / max(len(a), len(b))` counted in
//! Unicode scalar values (`strsim::normalized_levenshtein`). Both inputs are compared
//! as given; callers normalize first. Cost is O(|a| * |b|) time and O(|b|) memory,
//! which is fine for utterance-sized inputs against ~150 aliases.
//!
//! Ties: scores are compared with a fixed epsilon, and tied districts are ordered
//! by canonical name so the best match is the alphabetically first one.

use strsim::normalized_levenshtein;

use super::districts::District;

/// Two scores closer than this are considered equal.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Normalized edit-distance ratio in `[0, 1]`; identical strings score 1.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Best score of `alias` against `input` or any word window of `input` with the
/// same word count as `alias`. Windows are only tried for aliases of at least
/// `min_window_alias_len` chars, so short aliases ("wed", "hain") cannot match
/// ordinary words inside a sentence.
pub fn best_window_ratio(input: &str, alias: &str, min_window_alias_len: usize) -> f64 {
    let whole = similarity_ratio(input, alias);
    if alias.chars().count() < min_window_alias_len {
        return whole;
    }

    let words: Vec<&str> = input.split_whitespace().collect();
    let width = alias.split_whitespace().count().max(1);
    if words.len() <= width {
        return whole;
    }

    words
        .windows(width)
        .map(|w| similarity_ratio(&w.join(" "), alias))
        .fold(whole, f64::max)
}

/// Accumulates the maximum score and every district tied at it.
#[derive(Debug, Default, Clone)]
pub struct TopMatches {
    best: f64,
    tied: Vec<District>,
}

impl TopMatches {
    pub fn offer(&mut self, district: District, score: f64) {
        if score > self.best + SCORE_EPSILON {
            self.best = score;
            self.tied.clear();
            self.tied.push(district);
        } else if (score - self.best).abs() <= SCORE_EPSILON && !self.tied.contains(&district) {
            self.tied.push(district);
        }
    }

    pub fn best_score(&self) -> f64 {
        self.best
    }

    /// Tied districts ordered by canonical name.
    pub fn into_ranked(mut self) -> Vec<District> {
        self.tied.sort_by_key(|d| d.name());
        self.tied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_and_disjoint() {
        assert!((similarity_ratio("mitte", "mitte") - 1.0).abs() < 1e-9);
        assert!(similarity_ratio("xyzqqq", "mitte") < 0.2);
        assert!((similarity_ratio("", "") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_edit_on_ten_chars() {
        // one insertion against an 11-char alias
        let s = similarity_ratio("schoenberg", "schoeneberg");
        assert!((s - (1.0 - 1.0 / 11.0)).abs() < 1e-9);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // ö vs o is one substitution, not two byte edits
        let s = similarity_ratio("köpenick", "kopenick");
        assert!((s - 0.875).abs() < 1e-9);
    }

    #[test]
    fn windows_find_alias_inside_sentence() {
        let s = best_window_ratio("i am near kreuzberg now", "kreuzberg", 5);
        assert!((s - 1.0).abs() < 1e-9);
        // short aliases only compare against the whole input
        let short = best_window_ratio("heavy rain here", "hain", 5);
        assert!(short < 0.5);
    }

    #[test]
    fn ties_rank_alphabetically() {
        let mut top = TopMatches::default();
        top.offer(District::Wedding, 0.8);
        top.offer(District::Mitte, 0.8);
        top.offer(District::Spandau, 0.5);
        assert!((top.best_score() - 0.8).abs() < 1e-9);
        assert_eq!(top.into_ranked(), vec![District::Mitte, District::Wedding]);
    }

    #[test]
    fn higher_score_replaces_ties() {
        let mut top = TopMatches::default();
        top.offer(District::Wedding, 0.8);
        top.offer(District::Mitte, 0.9);
        assert_eq!(top.into_ranked(), vec![District::Mitte]);
    }
}
