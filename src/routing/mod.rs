//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered scan over registered routes)
//!     → matcher.rs (segment-by-segment pattern match)
//!     → Return: RouteMatch { route, params } or no match
//! ```
//!
//! # Design Decisions
//! - Routes registered at build time, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, Segment};
pub use router::{Route, RouteMatch, Router};
