//! Label sets and target groups as produced by discovery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A set of label name/value pairs, ordered by name.
pub type LabelSet = BTreeMap<String, String>;

/// Scheme used to scrape the target.
pub const SCHEME_LABEL: &str = "__scheme__";
/// `host:port` of the target.
pub const ADDRESS_LABEL: &str = "__address__";
/// Path of the metrics endpoint.
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

/// Prefix shared by the override labels.
pub const OVERRIDE_LABEL_PREFIX: &str = "prommux.";
/// Template overriding the scheme.
pub const OVERRIDE_SCHEME_LABEL: &str = "prommux.scheme";
/// Template overriding the address.
pub const OVERRIDE_ADDRESS_LABEL: &str = "prommux.address";
/// Template overriding the metrics path.
pub const OVERRIDE_METRICS_PATH_LABEL: &str = "prommux.metrics_path";

/// Diagnostic label carrying the upstream URL behind a proxy route.
pub const DETECTED_URL_LABEL: &str = "prommux_detected_url";

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Labels consumed by URL resolution. They are never republished as-is.
pub const RESERVED_LABELS: [&str; 6] = [
    ADDRESS_LABEL,
    SCHEME_LABEL,
    METRICS_PATH_LABEL,
    OVERRIDE_ADDRESS_LABEL,
    OVERRIDE_SCHEME_LABEL,
    OVERRIDE_METRICS_PATH_LABEL,
];

/// A group of targets sharing common labels, as emitted by a discoverer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Per-target label sets.
    pub targets: Vec<LabelSet>,
    /// Labels applied to every target in the group.
    #[serde(default)]
    pub labels: LabelSet,
    /// Identifier of the producer of this group.
    #[serde(default)]
    pub source: String,
}

impl TargetGroup {
    /// Iterate the targets with group labels merged in. Target labels win.
    pub fn merged_targets(&self) -> impl Iterator<Item = LabelSet> + '_ {
        self.targets.iter().map(move |target| {
            let mut merged = self.labels.clone();
            merged.extend(target.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        })
    }
}

/// Return a copy of `labels` without the reserved and override labels.
pub fn strip_reserved(labels: &LabelSet) -> LabelSet {
    labels
        .iter()
        .filter(|(name, _)| !RESERVED_LABELS.contains(&name.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Replace every character that is not valid in a Prometheus label name with `_`.
pub fn sanitize_label_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Whether `name` is a valid Prometheus label name.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn group_labels_are_overridden_by_target_labels() {
        let group = TargetGroup {
            targets: vec![labels(&[(ADDRESS_LABEL, "a:1"), ("env", "target")])],
            labels: labels(&[("env", "group"), ("team", "core")]),
            source: "test".into(),
        };

        let merged: Vec<_> = group.merged_targets().collect();
        assert_eq!(
            merged,
            vec![labels(&[(ADDRESS_LABEL, "a:1"), ("env", "target"), ("team", "core")])]
        );
    }

    #[test]
    fn strip_reserved_keeps_user_labels() {
        let stripped = strip_reserved(&labels(&[
            (ADDRESS_LABEL, "a:1"),
            (OVERRIDE_SCHEME_LABEL, "https"),
            ("foo", "bar"),
        ]));
        assert_eq!(stripped, labels(&[("foo", "bar")]));
    }

    #[test]
    fn label_names() {
        assert_eq!(sanitize_label_name("com.docker.compose-project"), "com_docker_compose_project");
        assert!(is_valid_label_name("_foo1"));
        assert!(!is_valid_label_name("1foo"));
        assert!(!is_valid_label_name("foo.bar"));
        assert!(!is_valid_label_name(""));
    }
}
