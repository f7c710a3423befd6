//! Query engine - structural element resolution
//!
//! This crate resolves element queries against snapshots of the application's
//! document tree:
//! - Structural selectors (tag, id, class, attribute) built without string parsing
//! - Query chains whose traversal steps are scoped to the previous step's result
//! - Pluggable custom queries registered by name
//! - Predicates evaluated inside the same retry loop as the query itself

pub mod chain;
pub mod engine;
pub mod predicate;
pub mod registry;
pub mod selector;

pub use chain::*;
pub use engine::*;
pub use predicate::*;
pub use registry::*;
pub use selector::*;
