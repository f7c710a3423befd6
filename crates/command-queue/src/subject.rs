//! Values threaded from one command to the next.

use std::sync::Arc;

use net_intercept::{CallRecord, RouteHandle};
use query_engine::ElementSet;
use serde_json::Value;
use stub_spy::StubHandle;
use trellis_core_types::{EngineError, EngineResult};

#[derive(Clone, Debug, Default)]
pub enum Subject {
    #[default]
    Empty,
    /// The application's global scope
    Window,
    Elements(ElementSet),
    Call(Arc<CallRecord>),
    Route(RouteHandle),
    Stub(StubHandle),
    Value(Value),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::Empty => "nothing",
            Subject::Window => "window",
            Subject::Elements(_) => "elements",
            Subject::Call(_) => "call record",
            Subject::Route(_) => "route",
            Subject::Stub(_) => "stub",
            Subject::Value(_) => "value",
        }
    }

    pub fn elements(&self, command: &str) -> EngineResult<&ElementSet> {
        match self {
            Subject::Elements(set) => Ok(set),
            other => Err(mismatch(command, "elements", other)),
        }
    }

    pub fn route(&self, command: &str) -> EngineResult<&RouteHandle> {
        match self {
            Subject::Route(route) => Ok(route),
            other => Err(mismatch(command, "a route", other)),
        }
    }

    pub fn call(&self, command: &str) -> EngineResult<&Arc<CallRecord>> {
        match self {
            Subject::Call(record) => Ok(record),
            other => Err(mismatch(command, "a call record", other)),
        }
    }

    pub fn stub(&self, command: &str) -> EngineResult<&StubHandle> {
        match self {
            Subject::Stub(stub) => Ok(stub),
            other => Err(mismatch(command, "a stub", other)),
        }
    }
}

fn mismatch(command: &str, expected: &str, actual: &Subject) -> EngineError {
    EngineError::invalid_subject(
        command,
        format!("expected {expected}, got {}", actual.kind()),
    )
}
