//! Per-test stub bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};
use trellis_core_types::{EngineError, EngineResult, StubId};

use crate::table::{same_method, Arg, Method, MethodTable};

/// What a stubbed method does when invoked.
#[derive(Clone)]
pub enum StubBehavior {
    /// Return a fixed value
    Returns(Value),
    /// Run a replacement implementation
    CallsFake(Method),
    /// Fail the call with an application error
    Throws(String),
    /// Delegate to the original implementation (a spy)
    CallThrough,
}

impl StubBehavior {
    pub fn calls_fake<F>(f: F) -> Self
    where
        F: Fn(&[Arg]) -> EngineResult<Value> + Send + Sync + 'static,
    {
        StubBehavior::CallsFake(Arc::new(f))
    }
}

impl fmt::Debug for StubBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubBehavior::Returns(value) => write!(f, "Returns({value})"),
            StubBehavior::CallsFake(_) => f.write_str("CallsFake(<fn>)"),
            StubBehavior::Throws(message) => write!(f, "Throws({message:?})"),
            StubBehavior::CallThrough => f.write_str("CallThrough"),
        }
    }
}

/// One recorded invocation. The call is logged before the behavior runs;
/// `result` stays `None` until it returns.
#[derive(Clone, Debug)]
pub struct StubCall {
    pub args: Vec<Arg>,
    pub result: Option<Result<Value, String>>,
    pub at: DateTime<Utc>,
}

impl StubCall {
    /// Plain-value arguments, skipping callbacks.
    pub fn values(&self) -> Vec<&Value> {
        self.args.iter().filter_map(Arg::as_value).collect()
    }
}

struct StubState {
    id: StubId,
    target: Arc<MethodTable>,
    method: String,
    /// Implementation bound when this stub was installed
    original: Method,
    /// Stub whose wrapper `original` is, when stubs are stacked
    below: Option<Arc<StubState>>,
    /// Replacement bound on the target while this stub is active
    wrapper: Method,
    calls: Mutex<Vec<StubCall>>,
    restored: AtomicBool,
}

impl StubState {
    fn is_restored(&self) -> bool {
        self.restored.load(Ordering::SeqCst)
    }

    /// Nearest implementation below this stub that is not a restored stub.
    fn passthrough(&self) -> Method {
        match &self.below {
            Some(below) if below.is_restored() => below.passthrough(),
            _ => self.original.clone(),
        }
    }

    fn record(&self, args: &[Arg]) -> usize {
        let mut calls = self.calls.lock();
        calls.push(StubCall {
            args: args.to_vec(),
            result: None,
            at: Utc::now(),
        });
        calls.len() - 1
    }

    fn settle(&self, index: usize, result: &EngineResult<Value>) {
        if let Some(call) = self.calls.lock().get_mut(index) {
            call.result = Some(result.as_ref().map(Value::clone).map_err(|e| e.to_string()));
        }
    }

    /// Unbind this stub. A stub that is still on top hands the method back to
    /// the nearest live implementation below it; one buried under newer stubs
    /// only turns its wrapper into a pass-through.
    fn restore(&self) -> bool {
        if self.restored.swap(true, Ordering::SeqCst) {
            return false;
        }
        let unbound = self
            .target
            .replace_if_bound(&self.method, &self.wrapper, self.passthrough());
        debug!(
            stub = %self.id.0,
            target = self.target.name(),
            method = %self.method,
            unbound,
            "stub restored"
        );
        true
    }
}

/// Handle to an installed stub or spy.
#[derive(Clone)]
pub struct StubHandle {
    state: Arc<StubState>,
}

impl StubHandle {
    pub fn id(&self) -> &StubId {
        &self.state.id
    }

    /// `target.method`, for messages.
    pub fn label(&self) -> String {
        format!("{}.{}", self.state.target.name(), self.state.method)
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// Some call's plain-value arguments start with `expected`.
    pub fn called_with(&self, expected: &[Value]) -> bool {
        self.state.calls.lock().iter().any(|call| {
            let values = call.values();
            values.len() >= expected.len()
                && values.iter().zip(expected).all(|(seen, want)| *seen == want)
        })
    }

    pub fn is_restored(&self) -> bool {
        self.state.is_restored()
    }

    /// Put the original implementation back. Idempotent.
    pub fn restore(&self) -> bool {
        self.state.restore()
    }
}

impl fmt::Debug for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubHandle")
            .field("id", &self.state.id)
            .field("target", &self.label())
            .field("calls", &self.call_count())
            .finish()
    }
}

/// Every stub installed during one test.
#[derive(Default)]
pub struct StubRegistry {
    installed: Mutex<Vec<Arc<StubState>>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `target.method` with `behavior`.
    ///
    /// Fails with `StubTargetMissing` when the method does not exist, so a
    /// typo surfaces at install time rather than as a silently unused stub.
    pub fn stub(
        &self,
        target: &Arc<MethodTable>,
        method: &str,
        behavior: StubBehavior,
    ) -> EngineResult<StubHandle> {
        let original = target
            .get(method)
            .ok_or_else(|| EngineError::StubTargetMissing {
                target: target.name().to_string(),
                method: method.to_string(),
            })?;

        let below = self
            .installed
            .lock()
            .iter()
            .rev()
            .find(|state| {
                Arc::ptr_eq(&state.target, target)
                    && state.method == method
                    && same_method(&state.wrapper, &original)
            })
            .cloned();

        let state = Arc::new_cyclic(|me: &Weak<StubState>| {
            let me = me.clone();
            let delegate = original.clone();
            let wrapper: Method = Arc::new(move |args: &[Arg]| {
                let Some(state) = me.upgrade() else {
                    return delegate(args);
                };
                if state.is_restored() {
                    return state.passthrough()(args);
                }
                let index = state.record(args);
                let result = match &behavior {
                    StubBehavior::Returns(value) => Ok(value.clone()),
                    StubBehavior::CallsFake(fake) => fake(args),
                    StubBehavior::Throws(message) => Err(EngineError::Application(message.clone())),
                    StubBehavior::CallThrough => delegate(args),
                };
                state.settle(index, &result);
                result
            });
            StubState {
                id: StubId::new(),
                target: target.clone(),
                method: method.to_string(),
                original,
                below,
                wrapper,
                calls: Mutex::new(Vec::new()),
                restored: AtomicBool::new(false),
            }
        });

        target.replace(method, state.wrapper.clone());
        info!(stub = %state.id.0, target = target.name(), method, "stub installed");
        self.installed.lock().push(state.clone());
        Ok(StubHandle { state })
    }

    /// Record calls to `target.method` while keeping its behavior.
    pub fn spy(&self, target: &Arc<MethodTable>, method: &str) -> EngineResult<StubHandle> {
        self.stub(target, method, StubBehavior::CallThrough)
    }

    pub fn active_count(&self) -> usize {
        self.installed
            .lock()
            .iter()
            .filter(|s| !s.is_restored())
            .count()
    }

    /// Undo every stub, newest first, so stacked stubs on one method unwind
    /// back to the real implementation. Returns how many were restored.
    pub fn restore_all(&self) -> usize {
        let installed: Vec<_> = self.installed.lock().drain(..).collect();
        installed
            .iter()
            .rev()
            .filter(|state| state.restore())
            .count()
    }
}
