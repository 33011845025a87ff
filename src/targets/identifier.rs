//! Stable route identifiers.
//!
//! A route id is the hex-encoded SHA-1 of an endpoint's canonical URL. Ids are
//! embedded in the URLs Prometheus scrapes, so they must depend on nothing but
//! the URL bytes.

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;
use sha1::{Digest, Sha1};

/// Content-addressed identifier of a proxied endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RouteId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Compute the route id of `url`.
pub fn identify(url: &str) -> RouteId {
    let digest = Sha1::digest(url.as_bytes());
    RouteId(hex::encode(digest))
}
