use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed::FeedEntry;

/// Keyword relevance table. `high_priority` is the subset of `keywords` that
/// carries the higher weight and the title bonus. Loaded once at startup and
/// treated as read-only after that.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeywordWeights {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub high_priority: Vec<String>,
    #[serde(default = "default_high_weight")]
    pub high_weight: f64,
    #[serde(default = "default_medium_weight")]
    pub medium_weight: f64,
    #[serde(default = "default_title_bonus")]
    pub title_bonus: f64,
}

fn default_high_weight() -> f64 {
    2.0
}

fn default_medium_weight() -> f64 {
    1.0
}

fn default_title_bonus() -> f64 {
    1.0
}

impl Default for KeywordWeights {
    fn default() -> Self {
        KeywordWeights {
            keywords: Vec::new(),
            high_priority: Vec::new(),
            high_weight: default_high_weight(),
            medium_weight: default_medium_weight(),
            title_bonus: default_title_bonus(),
        }
    }
}

impl KeywordWeights {
    /// Load a weight table from a JSON file. Missing weight fields fall back
    /// to the defaults, so a file can carry only the keyword lists.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keywords file {path}"))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse keywords file {path}"))
    }

    fn is_high(&self, keyword: &str) -> bool {
        self.high_priority
            .iter()
            .any(|h| h.eq_ignore_ascii_case(keyword))
    }
}

/// A feed entry paired with its relevance score.
#[derive(Serialize, Debug, Clone)]
pub struct ScoredEntry {
    pub entry: FeedEntry,
    pub score: f64,
}

/// Score an entry against the weight table.
///
/// Each keyword contributes its whole-word occurrence count over the combined
/// title + description text, multiplied by the high or medium weight. On top
/// of that, every high-priority keyword found as a substring of the title adds
/// a flat title bonus; a high-priority keyword can therefore count twice, once
/// through occurrences and once through the bonus. Deterministic, two-decimal
/// result.
pub fn score_entry(entry: &FeedEntry, weights: &KeywordWeights) -> f64 {
    let text = format!("{} {}", entry.title, entry.description).to_lowercase();
    let title = entry.title.to_lowercase();

    let mut total = 0.0;
    for keyword in &weights.keywords {
        let needle = keyword.to_lowercase();
        let occurrences = count_whole_word(&text, &needle);
        if occurrences == 0 {
            continue;
        }
        let weight = if weights.is_high(&needle) {
            weights.high_weight
        } else {
            weights.medium_weight
        };
        total += occurrences as f64 * weight;
    }

    for keyword in &weights.high_priority {
        if title.contains(&keyword.to_lowercase()) {
            total += weights.title_bonus;
        }
    }

    round2(total)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Non-overlapping whole-word occurrences; a match only counts when it is not
// flanked by alphanumeric characters. Works for multi-word phrases too.
fn count_whole_word(text: &str, word: &str) -> usize {
    if word.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = text[start..].find(word) {
        let at = start + pos;
        let end = at + word.len();
        let bounded_left = text[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let bounded_right = text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if bounded_left && bounded_right {
            count += 1;
            start = end;
        } else {
            start = at + text[at..].chars().next().map_or(1, |c| c.len_utf8());
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_whole_word_basic() {
        assert_eq!(count_whole_word("prophecy news", "prophecy"), 1);
        assert_eq!(count_whole_word("prophecy, prophecy!", "prophecy"), 2);
        assert_eq!(count_whole_word("no match here", "prophecy"), 0);
    }

    #[test]
    fn test_count_whole_word_rejects_substrings() {
        assert_eq!(count_whole_word("prophecies", "prophecy"), 0);
        assert_eq!(count_whole_word("xprophecy prophecy", "prophecy"), 1);
        assert_eq!(count_whole_word("prophecyx", "prophecy"), 0);
    }

    #[test]
    fn test_count_whole_word_at_string_edges() {
        assert_eq!(count_whole_word("prophecy", "prophecy"), 1);
        assert_eq!(count_whole_word("prophecy again prophecy", "prophecy"), 2);
    }

    #[test]
    fn test_count_whole_word_phrase() {
        assert_eq!(count_whole_word("the end times are near", "end times"), 1);
        assert_eq!(count_whole_word("weekend times listing", "end times"), 0);
    }

    #[test]
    fn test_count_whole_word_empty_needle() {
        assert_eq!(count_whole_word("anything", ""), 0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(2.005), 2.0); // 2.005 is stored below 2.005
        assert_eq!(round2(7.0), 7.0);
    }
}
