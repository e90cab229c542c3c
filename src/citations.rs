use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::passage::Verse;

/// Hard cap on citations per summary.
pub const MAX_CITATIONS: usize = 12;

// Matches v3 and v5-7 (hyphen or en-dash). The leading boundary keeps the
// scan off the tail of words like "Lev" followed by digits.
static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bv(\d+)(?:[-–](\d+))?\b").expect("Failed to parse citation pattern")
});

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Citation {
    pub label: String,
    pub verses: Vec<Verse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub invalid_numbers: Vec<u32>,
    pub max_verse: u32,
}

/// Scans `text` for verse references and flags every endpoint outside
/// `[1, verses.len()]`.
pub fn validate(text: &str, verses: &[Verse]) -> Validation {
    let max_verse = verses.len() as u32;
    let mut invalid = BTreeSet::new();

    for caps in TOKEN.captures_iter(text) {
        for idx in [1, 2] {
            if let Some(m) = caps.get(idx) {
                // Numbers too large for u32 are certainly out of range
                let n = m.as_str().parse::<u32>().unwrap_or(u32::MAX);
                if n < 1 || n > max_verse {
                    invalid.insert(n);
                }
            }
        }
    }

    Validation {
        valid: invalid.is_empty(),
        invalid_numbers: invalid.into_iter().collect(),
        max_verse,
    }
}

/// Builds the citation list for a summary: first occurrence of each distinct
/// reference wins, ranges are clamped to the passage, out-of-range singles
/// and empty ranges are dropped, and collection stops at `MAX_CITATIONS`.
pub fn extract(text: &str, verses: &[Verse]) -> Vec<Citation> {
    let max_verse = verses.len() as u32;
    let mut seen_ranges: HashSet<(u32, u32)> = HashSet::new();
    let mut seen_singles: HashSet<u32> = HashSet::new();
    let mut citations = Vec::new();

    for caps in TOKEN.captures_iter(text) {
        if citations.len() >= MAX_CITATIONS {
            break;
        }

        let from = caps[1].parse::<u32>().unwrap_or(u32::MAX);

        match caps.get(2) {
            Some(to_match) => {
                let to = to_match.as_str().parse::<u32>().unwrap_or(u32::MAX);
                if !seen_ranges.insert((from, to)) {
                    continue;
                }

                let start = from.min(to).max(1);
                let end = from.max(to).min(max_verse);
                if start > end {
                    continue;
                }

                let selected: Vec<Verse> = verses
                    .iter()
                    .filter(|v| v.number >= start && v.number <= end)
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    continue;
                }

                citations.push(Citation {
                    // Label keeps the numbers as written, separator normalized
                    label: format!("v{}\u{2013}{}", from, to),
                    verses: selected,
                });
            }
            None => {
                if !seen_singles.insert(from) {
                    continue;
                }
                if from < 1 || from > max_verse {
                    continue;
                }

                let Some(verse) = verses.iter().find(|v| v.number == from) else {
                    continue;
                };

                citations.push(Citation {
                    label: format!("v{}", from),
                    verses: vec![verse.clone()],
                });
            }
        }
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verses(n: u32) -> Vec<Verse> {
        (1..=n)
            .map(|number| Verse {
                number,
                text: format!("verse {}", number),
            })
            .collect()
    }

    #[test]
    fn reports_out_of_range_references() {
        let vs = verses(10);
        let report = validate("opens with v3, then v5-7, then v99", &vs);

        assert!(!report.valid);
        assert_eq!(report.invalid_numbers, vec![99]);
        assert_eq!(report.max_verse, 10);
    }

    #[test]
    fn accepts_text_with_only_valid_references() {
        let vs = verses(10);
        let report = validate("see v1 and v9-10", &vs);

        assert!(report.valid);
        assert!(report.invalid_numbers.is_empty());
    }

    #[test]
    fn extracts_valid_references_in_first_appearance_order() {
        let vs = verses(10);
        let found = extract("opens with v3, then v5-7, then v99", &vs);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label, "v3");
        assert_eq!(found[0].verses, vec![vs[2].clone()]);
        assert_eq!(found[1].label, "v5\u{2013}7");
        assert_eq!(
            found[1].verses,
            vec![vs[4].clone(), vs[5].clone(), vs[6].clone()]
        );
    }

    #[test]
    fn en_dash_ranges_match_like_hyphens() {
        let vs = verses(10);
        let found = extract("compare v2\u{2013}4 with the rest", &vs);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].verses.len(), 3);
    }

    #[test]
    fn repeated_references_keep_only_the_first() {
        let vs = verses(10);
        let found = extract("v3 then v5 then v3 again, v5-6 and v5-6", &vs);

        let labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["v3", "v5", "v5\u{2013}6"]);
    }

    #[test]
    fn reversed_ranges_are_distinct_references_over_the_same_verses() {
        let vs = verses(10);
        let found = extract("v4-3 and v3-4", &vs);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label, "v4\u{2013}3");
        assert_eq!(found[1].label, "v3\u{2013}4");
        assert_eq!(found[0].verses, found[1].verses);
    }

    #[test]
    fn ranges_clamp_to_the_passage() {
        let vs = verses(5);
        let found = extract("v4-9 covers the end", &vs);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "v4\u{2013}9");
        assert_eq!(found[0].verses.len(), 2);
        assert_eq!(found[0].verses[0].number, 4);
        assert_eq!(found[0].verses[1].number, 5);
    }

    #[test]
    fn fully_out_of_range_references_are_skipped() {
        let vs = verses(5);
        assert!(extract("v9-20 and v0 and v77", &vs).is_empty());
    }

    #[test]
    fn collection_stops_at_the_cap() {
        let vs = verses(30);
        let text = (1..=15).map(|n| format!("v{}", n)).collect::<Vec<_>>().join(" ");
        let found = extract(&text, &vs);

        assert_eq!(found.len(), MAX_CITATIONS);
        assert_eq!(found.last().unwrap().label, "v12");
    }

    #[test]
    fn references_inside_words_are_ignored() {
        let vs = verses(10);
        let found = extract("Lev3 is a word but v2 counts, as does (v7).", &vs);

        let labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["v2", "v7"]);
    }
}
