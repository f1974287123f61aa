//! Term normalization shared by indexing and querying.

use std::collections::BTreeMap;

/// Weight of one occurrence in the title/key line relative to body text.
pub const TITLE_BOOST: u32 = 3;

/// Split on anything that is not alphanumeric, case-fold, and drop one-character
/// fragments.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// Weighted postings for a list of lines, keyed by `(term, line)`.
///
/// Line 0 is the title field. A `BTreeMap` keeps insertion order deterministic.
pub fn line_postings(lines: &[String]) -> BTreeMap<(String, u32), u32> {
    let mut postings = BTreeMap::new();
    for (line_no, line) in lines.iter().enumerate() {
        let boost = if line_no == 0 { TITLE_BOOST } else { 1 };
        for term in tokenize(line) {
            *postings.entry((term, line_no as u32)).or_insert(0) += boost;
        }
    }
    postings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_folds_case() {
        let terms: Vec<String> = tokenize("Use Postgres (v16), NOT MySQL!").collect();
        assert_eq!(terms, vec!["use", "postgres", "v16", "not", "mysql"]);
    }

    #[test]
    fn drops_single_characters() {
        let terms: Vec<String> = tokenize("hexagonal + X").collect();
        assert_eq!(terms, vec!["hexagonal"]);
    }

    #[test]
    fn title_line_is_boosted_and_repeats_accumulate() {
        let lines = vec!["Postgres".to_string(), "postgres postgres".to_string()];
        let postings = line_postings(&lines);
        assert_eq!(postings[&("postgres".to_string(), 0)], TITLE_BOOST);
        assert_eq!(postings[&("postgres".to_string(), 1)], 2);
    }
}
