//! Route storage.
//!
//! # Concurrency
//! - Readers take a consistent snapshot with a single atomic load and never
//!   block, even while a replacement is in progress
//! - A single writer at a time holds [`StoreWriter`]; a replacement swaps the
//!   whole snapshot, so readers see either the old or the new routes
//! - There is no incremental update: every discovery cycle builds a fresh
//!   snapshot

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, MutexGuard};

use crate::targets::identifier::{identify, RouteId};
use crate::targets::labels::LabelSet;
use crate::targets::resolver::ResolvedEndpoint;

/// A proxied endpoint and the labels it was discovered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub endpoint: ResolvedEndpoint,
    pub labels: LabelSet,
}

impl Route {
    pub fn new(endpoint: ResolvedEndpoint, labels: LabelSet) -> Self {
        Self {
            id: identify(&endpoint.url()),
            endpoint,
            labels,
        }
    }
}

/// All routes known at one instant, in first-seen order.
#[derive(Debug, Default)]
pub struct TargetSnapshot {
    routes: Vec<Route>,
    index: HashMap<RouteId, usize>,
}

impl TargetSnapshot {
    /// Build a snapshot, keeping the first route for each id.
    pub fn from_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut snapshot = Self::default();
        for route in routes {
            if snapshot.index.contains_key(&route.id) {
                continue;
            }
            snapshot.index.insert(route.id.clone(), snapshot.routes.len());
            snapshot.routes.push(route);
        }
        snapshot
    }

    pub fn get(&self, id: &str) -> Option<&Route> {
        self.index.get(id).map(|&i| &self.routes[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The current routing table.
#[derive(Debug, Default)]
pub struct TargetStore {
    current: ArcSwap<TargetSnapshot>,
    writer: Mutex<()>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<TargetSnapshot> {
        self.current.load_full()
    }

    /// Acquire exclusive write access.
    pub async fn lock(&self) -> StoreWriter<'_> {
        StoreWriter {
            store: self,
            _guard: self.writer.lock().await,
        }
    }
}

/// Exclusive write access to a [`TargetStore`].
pub struct StoreWriter<'a> {
    store: &'a TargetStore,
    _guard: MutexGuard<'a, ()>,
}

impl StoreWriter<'_> {
    /// Snapshot that is current while this writer is held.
    pub fn current(&self) -> Arc<TargetSnapshot> {
        self.store.load()
    }

    /// Atomically replace the whole snapshot.
    pub fn replace(&self, snapshot: TargetSnapshot) {
        self.store.current.store(Arc::new(snapshot));
    }
}
