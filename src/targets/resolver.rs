//! Resolution of discovered labels into the URL to scrape.
//!
//! The URL is built from the Prometheus reserved labels `__scheme__`,
//! `__address__` and `__metrics_path__`, and may then be rewritten by the
//! `prommux.scheme`, `prommux.address` and `prommux.metrics_path` override
//! templates.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use thiserror::Error;

use crate::targets::labels::{
    LabelSet, ADDRESS_LABEL, DEFAULT_METRICS_PATH, DEFAULT_SCHEME, METRICS_PATH_LABEL,
    OVERRIDE_ADDRESS_LABEL, OVERRIDE_METRICS_PATH_LABEL, OVERRIDE_SCHEME_LABEL, SCHEME_LABEL,
};
use crate::targets::template::{self, TemplateError, TemplateParams};

/// Bytes escaped in the path of a canonical URL: everything except the
/// unreserved characters and the sub-delimiters allowed in a path segment.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Error raised when a target's labels cannot be turned into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("failed to split `{label}` label `{address}` into host and port: {reason}")]
    MalformedAddress {
        label: &'static str,
        address: String,
        reason: &'static str,
    },
    #[error("failed to apply template for `{field}`: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: TemplateError,
    },
}

/// The endpoint a target resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedEndpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl ResolvedEndpoint {
    /// Canonical URL string, with the path percent-encoded. Route ids and the
    /// proxy cache are keyed by it.
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if !self.scheme.is_empty() || !self.host.is_empty() {
            write!(f, "//{}", self.host)?;
        }
        if !self.path.is_empty() && !self.path.starts_with('/') && !self.host.is_empty() {
            f.write_str("/")?;
        }
        write!(f, "{}", utf8_percent_encode(&self.path, PATH_ESCAPE))
    }
}

/// Resolve `labels` into the endpoint to scrape.
pub fn resolve(labels: &LabelSet) -> Result<ResolvedEndpoint, ResolutionError> {
    let mut scheme = non_empty(labels.get(SCHEME_LABEL)).unwrap_or(DEFAULT_SCHEME).to_string();
    let address = labels.get(ADDRESS_LABEL).map(String::as_str).unwrap_or_default();
    let path = non_empty(labels.get(METRICS_PATH_LABEL)).unwrap_or(DEFAULT_METRICS_PATH);

    let (original_host, original_port) =
        split_host_port(address).map_err(|reason| ResolutionError::MalformedAddress {
            label: ADDRESS_LABEL,
            address: address.to_string(),
            reason,
        })?;

    let params = TemplateParams {
        original_host,
        original_port,
        original_metrics_path: path,
    };

    let mut host = address.to_string();
    let mut path = path.to_string();

    if let Some(tmpl) = labels.get(OVERRIDE_SCHEME_LABEL) {
        scheme = apply("scheme", tmpl, &params)?;
    }
    if let Some(tmpl) = labels.get(OVERRIDE_ADDRESS_LABEL) {
        host = apply("address", tmpl, &params)?;
    }
    if let Some(tmpl) = labels.get(OVERRIDE_METRICS_PATH_LABEL) {
        path = apply("metrics_path", tmpl, &params)?;
    }

    Ok(ResolvedEndpoint { scheme, host, path })
}

fn apply(field: &'static str, tmpl: &str, params: &TemplateParams<'_>) -> Result<String, ResolutionError> {
    template::render(tmpl, params).map_err(|source| ResolutionError::Template { field, source })
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Split `host:port`, accepting a bracketed IPv6 host (`[::1]:9090`).
fn split_host_port(hostport: &str) -> Result<(&str, &str), &'static str> {
    let Some(colon) = hostport.rfind(':') else {
        return Err("missing port in address");
    };

    let (host, host_end) = if hostport.starts_with('[') {
        let Some(close) = hostport.find(']') else {
            return Err("missing ']' in address");
        };
        if close + 1 == hostport.len() {
            return Err("missing port in address");
        }
        if close + 1 != colon {
            return Err(if hostport.as_bytes()[close + 1] == b':' {
                "too many colons in address"
            } else {
                "missing port in address"
            });
        }
        (&hostport[1..close], close + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return Err("too many colons in address");
        }
        (host, 0)
    };

    let bracket_search_start = if host_end == 0 { 0 } else { 1 };
    if hostport[bracket_search_start..].contains('[') {
        return Err("unexpected '[' in address");
    }
    if hostport[host_end..].contains(']') {
        return Err("unexpected ']' in address");
    }

    Ok((host, &hostport[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn resolves_urls_from_labels() {
        let cases = [
            (
                "default labels",
                labels(&[
                    (SCHEME_LABEL, "http"),
                    (ADDRESS_LABEL, "example.com:9090"),
                    (METRICS_PATH_LABEL, "/metrics"),
                ]),
                "http://example.com:9090/metrics",
            ),
            (
                "override scheme",
                labels(&[
                    (SCHEME_LABEL, "http"),
                    (ADDRESS_LABEL, "example.com:9090"),
                    (METRICS_PATH_LABEL, "/metrics"),
                    (OVERRIDE_SCHEME_LABEL, "https"),
                ]),
                "https://example.com:9090/metrics",
            ),
            (
                "override address",
                labels(&[
                    (SCHEME_LABEL, "http"),
                    (ADDRESS_LABEL, "example.com:9090"),
                    (METRICS_PATH_LABEL, "/metrics"),
                    (OVERRIDE_ADDRESS_LABEL, "override.com:8080"),
                ]),
                "http://override.com:8080/metrics",
            ),
            (
                "override metrics path",
                labels(&[
                    (SCHEME_LABEL, "http"),
                    (ADDRESS_LABEL, "example.com:9090"),
                    (METRICS_PATH_LABEL, "/metrics"),
                    (OVERRIDE_METRICS_PATH_LABEL, "/new-metrics"),
                ]),
                "http://example.com:9090/new-metrics",
            ),
            (
                "missing labels fall back to defaults",
                labels(&[(ADDRESS_LABEL, "example.com:9090")]),
                "http://example.com:9090/metrics",
            ),
            (
                "empty labels fall back to defaults",
                labels(&[(SCHEME_LABEL, ""), (ADDRESS_LABEL, "example.com:9090"), (METRICS_PATH_LABEL, "")]),
                "http://example.com:9090/metrics",
            ),
            (
                "override with templates",
                labels(&[
                    (SCHEME_LABEL, "http"),
                    (ADDRESS_LABEL, "example.com:9090"),
                    (METRICS_PATH_LABEL, "/metrics"),
                    (OVERRIDE_ADDRESS_LABEL, "mod-{{OriginalHost}}-mod:1{{OriginalPort}}"),
                    (OVERRIDE_METRICS_PATH_LABEL, "{{OriginalMetricsPath}}/foo"),
                ]),
                "http://mod-example.com-mod:19090/metrics/foo",
            ),
            (
                "ipv6 address",
                labels(&[(ADDRESS_LABEL, "[::1]:9100")]),
                "http://[::1]:9100/metrics",
            ),
            (
                "relative path gains a slash",
                labels(&[(ADDRESS_LABEL, "example.com:9090"), (METRICS_PATH_LABEL, "stats")]),
                "http://example.com:9090/stats",
            ),
            (
                "path with a space is escaped",
                labels(&[(ADDRESS_LABEL, "127.0.0.1:1"), (METRICS_PATH_LABEL, "/my metrics")]),
                "http://127.0.0.1:1/my%20metrics",
            ),
            (
                "path sub-delimiters are kept",
                labels(&[(ADDRESS_LABEL, "example.com:9090"), (METRICS_PATH_LABEL, "/a/b;c=d@e,f:g")]),
                "http://example.com:9090/a/b;c=d@e,f:g",
            ),
            (
                "query and percent signs in a path are escaped",
                labels(&[(ADDRESS_LABEL, "example.com:9090"), (METRICS_PATH_LABEL, "/m?x=1%")]),
                "http://example.com:9090/m%3Fx=1%25",
            ),
        ];

        for (name, labels, expected) in cases {
            let endpoint = resolve(&labels).unwrap_or_else(|e| panic!("{name}: unexpected error: {e}"));
            assert_eq!(endpoint.url(), expected, "{name}");
        }
    }

    #[test]
    fn escaped_urls_parse_as_uris() {
        let endpoint = resolve(&labels(&[(ADDRESS_LABEL, "127.0.0.1:1"), (METRICS_PATH_LABEL, "/my metrics")])).unwrap();
        let uri: axum::http::Uri = endpoint.url().parse().unwrap();
        assert_eq!(uri.path(), "/my%20metrics");
        assert_eq!(endpoint.path, "/my metrics");
    }

    #[test]
    fn resolution_is_deterministic() {
        let ls = labels(&[(ADDRESS_LABEL, "example.com:9090"), ("foo", "bar")]);
        assert_eq!(resolve(&ls).unwrap(), resolve(&ls).unwrap());
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for address in ["", "example.com", "a:b:c", "[::1]", "[::1", "[::1]x9090", "ex]ample:1"] {
            let err = resolve(&labels(&[(ADDRESS_LABEL, address)])).unwrap_err();
            assert!(
                matches!(err, ResolutionError::MalformedAddress { .. }),
                "{address:?} gave {err:?}"
            );
        }
        assert!(matches!(
            resolve(&LabelSet::new()),
            Err(ResolutionError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn template_errors_name_the_field() {
        let err = resolve(&labels(&[
            (ADDRESS_LABEL, "example.com:9090"),
            (OVERRIDE_METRICS_PATH_LABEL, "{{ .Nope }}"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::Template {
                field: "metrics_path",
                source: TemplateError::UnknownVariable("Nope".into()),
            }
        );
    }

    #[test]
    fn split_host_port_cases() {
        assert_eq!(split_host_port("example.com:9090"), Ok(("example.com", "9090")));
        assert_eq!(split_host_port("[fe80::1]:80"), Ok(("fe80::1", "80")));
        assert_eq!(split_host_port("host:"), Ok(("host", "")));
        assert_eq!(split_host_port("a:b:c"), Err("too many colons in address"));
        assert_eq!(split_host_port("[::1]:80:90"), Err("too many colons in address"));
    }
}
