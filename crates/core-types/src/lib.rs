//! Shared primitives for the Trellis engine crates.
//!
//! Everything the queue, the query engine and the interception layer need to
//! agree on lives here: identifiers, the error taxonomy, the element-tree
//! snapshot exposed by the application under test and the HTTP model seen by
//! the interception layer.

pub mod dom;
pub mod error;
pub mod http;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use dom::{DomSnapshot, ElementNode, NewElement};
pub use error::{EngineError, EngineResult};
pub use http::{HttpMethod, HttpResponse, OutboundRequest, StaticResponse};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TestCaseId(pub String);

impl TestCaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TestCaseId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub String);

impl RouteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StubId(pub String);

impl StubId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StubId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of an element inside the application's document tree.
///
/// Ids are assigned by the application and stay stable for as long as the
/// element is attached, which is what lets aliases refer to "the same"
/// element across snapshots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}
