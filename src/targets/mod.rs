//! Target subsystem.
//!
//! # Data Flow
//! ```text
//! TargetGroup[] from discovery
//!     → labels.rs (merge group labels into each target)
//!     → resolver.rs (labels → ResolvedEndpoint, override templates via template.rs)
//!     → identifier.rs (canonical URL → RouteId)
//!     → store.rs (TargetSnapshot, swapped wholesale)
//!
//! Republishing (/discover):
//!     Route.labels
//!     → labels.rs (strip reserved labels)
//!     → filter.rs (regex on label names, memoized)
//! ```
//!
//! # Design Decisions
//! - Resolution is a pure function of the labels
//! - Route ids hash only the final URL, never raw label values
//! - Snapshots are immutable once published

pub mod filter;
pub mod identifier;
pub mod labels;
pub mod resolver;
pub mod store;
pub mod template;

pub use filter::LabelFilter;
pub use identifier::{identify, RouteId};
pub use labels::{LabelSet, TargetGroup};
pub use resolver::{resolve, ResolutionError, ResolvedEndpoint};
pub use store::{Route, TargetSnapshot, TargetStore};
