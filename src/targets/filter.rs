//! Regex filtering of republished labels.

use dashmap::DashMap;
use regex::Regex;

use crate::targets::labels::LabelSet;

/// Keeps only the labels whose name matches a pattern.
///
/// Match results are memoized per label name. The decision never depends on
/// the label value, so the cache stays valid for the filter's lifetime; its
/// size is bounded by the number of distinct label names seen.
#[derive(Debug, Default)]
pub struct LabelFilter {
    pattern: Option<Regex>,
    matches: DashMap<String, bool>,
}

impl LabelFilter {
    /// Create a filter. `None` disables filtering.
    pub fn new(pattern: Option<Regex>) -> Self {
        Self {
            pattern,
            matches: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }

    /// Return the labels whose name matches the pattern.
    pub fn filter(&self, labels: &LabelSet) -> LabelSet {
        let Some(pattern) = &self.pattern else {
            return labels.clone();
        };

        labels
            .iter()
            .filter(|(name, _)| self.name_matches(pattern, name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn name_matches(&self, pattern: &Regex, name: &str) -> bool {
        if let Some(cached) = self.matches.get(name) {
            return *cached;
        }
        let matched = pattern.is_match(name);
        self.matches.insert(name.to_string(), matched);
        matched
    }

    /// Number of label names with a memoized decision.
    pub fn cached_names(&self) -> usize {
        self.matches.len()
    }
}
