//! One compiled alternation over every known keyword fragment.
//!
//! A single regex pass per path replaces probing each classification's
//! fragments one by one; the regex engine runs in time linear in the input,
//! and compile size is capped instead of imposing a match timeout.

use ahash::{AHashMap, AHashSet};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::Result;
use crate::storage::models::FileClassification;

const PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;
const PATTERN_DFA_SIZE_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct KeywordPattern {
    regex: Option<Regex>,
    /// Lowercased fragment to the ids owning it or any fragment inside it.
    owners_within: AHashMap<String, BTreeSet<i64>>,
    fragment_count: usize,
}

impl KeywordPattern {
    /// Build from saved classifications; unsaved ones (no id) are ignored.
    pub fn build(classifications: &[FileClassification]) -> Result<Self> {
        let mut owners: AHashMap<String, BTreeSet<i64>> = AHashMap::new();
        let mut fragment_count = 0;

        for classification in classifications {
            let Some(id) = classification.id else {
                continue;
            };
            for part in &classification.file_name_parts {
                let text = part.text.trim().to_lowercase();
                if text.is_empty() {
                    continue;
                }
                owners.entry(text).or_default().insert(id);
                fragment_count += 1;
            }
        }

        if owners.is_empty() {
            debug!("No keyword fragments, pattern matches nothing");
            return Ok(Self {
                regex: None,
                owners_within: AHashMap::new(),
                fragment_count,
            });
        }

        let owners_within: AHashMap<String, BTreeSet<i64>> = owners
            .keys()
            .map(|outer| (outer.clone(), owners_inside(outer, &owners)))
            .collect();

        // Longest first, so a fragment that extends another wins at the same position.
        let mut alternatives: Vec<&String> = owners.keys().collect();
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = alternatives
            .iter()
            .map(|text| regex::escape(text))
            .collect::<Vec<_>>()
            .join("|");

        let regex = RegexBuilder::new(&format!("(?:{})", alternation))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .dfa_size_limit(PATTERN_DFA_SIZE_LIMIT)
            .build()?;

        debug!(
            "Compiled keyword pattern over {} distinct fragments",
            alternatives.len()
        );
        Ok(Self {
            regex: Some(regex),
            owners_within,
            fragment_count,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Distinct, non-empty matches in `text`, lowercased, in order of first
    /// appearance.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let mut seen: AHashSet<String> = AHashSet::new();
        regex
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect()
    }

    /// Ids of every classification owning a fragment contained in `text`
    /// (case-insensitive).
    ///
    /// The regex is restarted one character past each match start, so the
    /// longest fragment beginning at every position is seen. Fragments that
    /// sit inside it are covered by `owners_within`.
    pub fn classifications_in(&self, text: &str) -> BTreeSet<i64> {
        let mut ids = BTreeSet::new();
        let Some(regex) = &self.regex else {
            return ids;
        };
        let lowered = text.to_lowercase();
        let mut start = 0;
        while let Some(m) = regex.find_at(&lowered, start) {
            match self.owners_within.get(m.as_str()) {
                Some(owners) => ids.extend(owners),
                None => {
                    // Case folding can match text that differs from the stored fragment.
                    for (fragment, owners) in &self.owners_within {
                        if m.as_str().contains(fragment.as_str()) {
                            ids.extend(owners);
                        }
                    }
                }
            }
            let step = lowered[m.start()..].chars().next().map_or(1, char::len_utf8);
            start = m.start() + step;
        }
        ids
    }
}

fn owners_inside(outer: &str, owners: &AHashMap<String, BTreeSet<i64>>) -> BTreeSet<i64> {
    owners
        .iter()
        .filter(|(inner, _)| outer.contains(inner.as_str()))
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect()
}
