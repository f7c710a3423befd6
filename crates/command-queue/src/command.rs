use std::fmt;
use std::time::Duration;

use net_intercept::{Ordinal, RouteHandler, UrlSource};
use query_engine::{Predicate, QueryStep, Selector};
use stub_spy::StubBehavior;
use trellis_core_types::{CommandId, EngineResult};

use crate::context::TestContext;
use crate::subject::Subject;

/// Closure run by `then`. Returning `Some` replaces the subject.
pub type ThenFn = Box<dyn FnOnce(&Subject, &TestContext) -> EngineResult<Option<Subject>> + Send>;

pub enum CommandKind {
    Visit { url: String },
    Get(Selector),
    /// Registered custom query at the start of a chain
    Query { name: String, arg: String },
    /// Document-wide text lookup
    Contains(String),
    GetAlias(String),
    /// Step applied to the previous subject's elements
    Traverse(QueryStep),
    Should(Predicate),
    Click,
    TypeText(String),
    Then(ThenFn),
    Intercept {
        method: String,
        url: UrlSource,
        handler: Option<RouteHandler>,
    },
    Wait { alias: String, ordinal: Ordinal },
    WaitMs(Duration),
    Window,
    Stub {
        object: String,
        method: String,
        behavior: StubBehavior,
    },
    Spy { object: String, method: String },
    Log(String),
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Visit { .. } => "visit",
            CommandKind::Get(_) => "get",
            CommandKind::Query { .. } => "query",
            CommandKind::Contains(_) => "contains",
            CommandKind::GetAlias(_) => "get",
            CommandKind::Traverse(step) => step.name(),
            CommandKind::Should(_) => "should",
            CommandKind::Click => "click",
            CommandKind::TypeText(_) => "type",
            CommandKind::Then(_) => "then",
            CommandKind::Intercept { .. } => "intercept",
            CommandKind::Wait { .. } => "wait",
            CommandKind::WaitMs(_) => "wait",
            CommandKind::Window => "window",
            CommandKind::Stub { .. } => "stub",
            CommandKind::Spy { .. } => "spy",
            CommandKind::Log(_) => "log",
        }
    }

    /// Whether the command ignores the subject it is handed.
    pub fn starts_fresh(&self) -> bool {
        !matches!(
            self,
            CommandKind::Traverse(_)
                | CommandKind::Should(_)
                | CommandKind::Click
                | CommandKind::TypeText(_)
                | CommandKind::Then(_)
        )
    }

    /// Element queries absorb the assertions queued right after them.
    pub(crate) fn is_query(&self) -> bool {
        matches!(
            self,
            CommandKind::Get(_)
                | CommandKind::Query { .. }
                | CommandKind::Contains(_)
                | CommandKind::GetAlias(_)
                | CommandKind::Traverse(_)
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Visit { url } => write!(f, "visit {url}"),
            CommandKind::Get(selector) => write!(f, "get {selector}"),
            CommandKind::Query { name, arg } => write!(f, "{name}({arg:?})"),
            CommandKind::Contains(text) => write!(f, "contains {text:?}"),
            CommandKind::GetAlias(alias) => write!(f, "get @{}", alias.trim_start_matches('@')),
            CommandKind::Traverse(step) => write!(f, "{step}"),
            CommandKind::Should(predicate) => write!(f, "should {}", predicate.description()),
            CommandKind::Click => f.write_str("click"),
            CommandKind::TypeText(text) => write!(f, "type {text:?}"),
            CommandKind::Then(_) => f.write_str("then"),
            CommandKind::Intercept { method, url, handler } => {
                let mode = if handler.is_some() { "stub" } else { "spy" };
                write!(f, "intercept {method} {url} ({mode})")
            }
            CommandKind::Wait { alias, ordinal } => match ordinal {
                Ordinal::Next => write!(f, "wait @{}", alias.trim_start_matches('@')),
                Ordinal::Nth(n) => write!(f, "wait @{} #{n}", alias.trim_start_matches('@')),
            },
            CommandKind::WaitMs(duration) => write!(f, "wait {}ms", duration.as_millis()),
            CommandKind::Window => f.write_str("window"),
            CommandKind::Stub { object, method, .. } => write!(f, "stub {object}.{method}"),
            CommandKind::Spy { object, method } => write!(f, "spy {object}.{method}"),
            CommandKind::Log(message) => write!(f, "log {message:?}"),
        }
    }
}

impl fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasBinding {
    pub name: String,
    pub overwrite: bool,
}

/// One queued operation.
#[derive(Debug)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    pub alias: Option<AliasBinding>,
    pub timeout: Option<Duration>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: CommandId::new(),
            kind,
            alias: None,
            timeout: None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(binding) = &self.alias {
            write!(f, " as @{}", binding.name)?;
        }
        Ok(())
    }
}
