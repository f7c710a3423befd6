//! Fluent surface for writing test bodies.
//!
//! Every method only enqueues; nothing runs until the queue is handed to
//! [`CommandQueue::run`].
//!
//! ```ignore
//! cy.get(Selector::attr("data-cy", "Dropdown"))
//!     .find(Selector::tag("a"))
//!     .alias("options");
//! cy.get_alias("@options").last().click();
//! ```

use std::time::Duration;

use net_intercept::{Ordinal, RouteHandler, UrlSource};
use query_engine::{Predicate, QueryStep, Selector};
use serde_json::Value;
use stub_spy::StubBehavior;
use trellis_core_types::{EngineResult, StaticResponse};

use crate::command::{AliasBinding, CommandKind};
use crate::context::TestContext;
use crate::queue::CommandQueue;
use crate::subject::Subject;

/// Builder for one test body's command queue.
#[derive(Debug, Default)]
pub struct Cy {
    queue: CommandQueue,
}

impl Cy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_queue(self) -> CommandQueue {
        self.queue
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    fn push(&mut self, kind: CommandKind) -> Chain<'_> {
        self.queue.enqueue(kind);
        Chain { cy: self }
    }

    pub fn visit(&mut self, url: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Visit { url: url.into() })
    }

    pub fn get(&mut self, selector: Selector) -> Chain<'_> {
        self.push(CommandKind::Get(selector))
    }

    /// Read an alias; the leading `@` is optional.
    pub fn get_alias(&mut self, alias: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::GetAlias(alias.into()))
    }

    /// Start a chain with a registered custom query.
    pub fn query(&mut self, name: impl Into<String>, arg: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Query {
            name: name.into(),
            arg: arg.into(),
        })
    }

    pub fn contains(&mut self, text: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Contains(text.into()))
    }

    /// Spy on matching calls without changing them.
    pub fn intercept(&mut self, method: impl Into<String>, url: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Intercept {
            method: method.into(),
            url: UrlSource::Pattern(url.into()),
            handler: None,
        })
    }

    pub fn intercept_reply(
        &mut self,
        method: impl Into<String>,
        url: impl Into<String>,
        response: StaticResponse,
    ) -> Chain<'_> {
        self.intercept_with(method, url, RouteHandler::reply(response))
    }

    pub fn intercept_with(
        &mut self,
        method: impl Into<String>,
        url: impl Into<String>,
        handler: RouteHandler,
    ) -> Chain<'_> {
        self.push(CommandKind::Intercept {
            method: method.into(),
            url: UrlSource::Pattern(url.into()),
            handler: Some(handler),
        })
    }

    /// Route whose URL is matched by a regular expression. `handler: None`
    /// only records matching calls.
    pub fn intercept_regex(
        &mut self,
        method: impl Into<String>,
        pattern: impl Into<String>,
        handler: Option<RouteHandler>,
    ) -> Chain<'_> {
        self.push(CommandKind::Intercept {
            method: method.into(),
            url: UrlSource::Regex(pattern.into()),
            handler,
        })
    }

    /// Next call on an aliased route not consumed by an earlier wait.
    pub fn wait(&mut self, alias: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Wait {
            alias: alias.into(),
            ordinal: Ordinal::Next,
        })
    }

    /// The n-th call (1-based) on an aliased route.
    pub fn wait_nth(&mut self, alias: impl Into<String>, nth: usize) -> Chain<'_> {
        self.push(CommandKind::Wait {
            alias: alias.into(),
            ordinal: Ordinal::Nth(nth),
        })
    }

    pub fn wait_ms(&mut self, millis: u64) -> Chain<'_> {
        self.push(CommandKind::WaitMs(Duration::from_millis(millis)))
    }

    pub fn window(&mut self) -> Chain<'_> {
        self.push(CommandKind::Window)
    }

    pub fn stub(
        &mut self,
        object: impl Into<String>,
        method: impl Into<String>,
        behavior: StubBehavior,
    ) -> Chain<'_> {
        self.push(CommandKind::Stub {
            object: object.into(),
            method: method.into(),
            behavior,
        })
    }

    pub fn spy(&mut self, object: impl Into<String>, method: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Spy {
            object: object.into(),
            method: method.into(),
        })
    }

    pub fn log(&mut self, message: impl Into<String>) -> Chain<'_> {
        self.push(CommandKind::Log(message.into()))
    }
}

/// Continuation of a chain; each call appends a command that receives the
/// previous command's subject.
pub struct Chain<'a> {
    cy: &'a mut Cy,
}

impl<'a> Chain<'a> {
    fn push(self, kind: CommandKind) -> Self {
        self.cy.queue.enqueue(kind);
        self
    }

    fn traverse(self, step: QueryStep) -> Self {
        self.push(CommandKind::Traverse(step))
    }

    pub fn find(self, selector: Selector) -> Self {
        self.traverse(QueryStep::Find(selector))
    }

    pub fn filter(self, selector: Selector) -> Self {
        self.traverse(QueryStep::Filter(selector))
    }

    pub fn parent(self) -> Self {
        self.traverse(QueryStep::Parent)
    }

    pub fn first(self) -> Self {
        self.traverse(QueryStep::First)
    }

    pub fn last(self) -> Self {
        self.traverse(QueryStep::Last)
    }

    pub fn eq(self, index: usize) -> Self {
        self.traverse(QueryStep::Eq(index))
    }

    pub fn contains(self, text: impl Into<String>) -> Self {
        self.traverse(QueryStep::Contains(text.into()))
    }

    /// Custom query scoped to the current elements.
    pub fn query(self, name: impl Into<String>, arg: impl Into<String>) -> Self {
        self.traverse(QueryStep::Custom {
            name: name.into(),
            arg: arg.into(),
        })
    }

    pub fn click(self) -> Self {
        self.push(CommandKind::Click)
    }

    pub fn type_text(self, text: impl Into<String>) -> Self {
        self.push(CommandKind::TypeText(text.into()))
    }

    pub fn should(self, predicate: Predicate) -> Self {
        self.push(CommandKind::Should(predicate))
    }

    pub fn then<F>(self, callback: F) -> Self
    where
        F: FnOnce(&Subject, &TestContext) -> EngineResult<Option<Subject>> + Send + 'static,
    {
        self.push(CommandKind::Then(Box::new(callback)))
    }

    /// Replace the subject with a plain value.
    pub fn then_value(self, value: Value) -> Self {
        self.then(move |_, _| Ok(Some(Subject::Value(value))))
    }

    /// Bind the previous command's subject under `name` (write-once).
    pub fn alias(self, name: impl Into<String>) -> Self {
        self.bind(name.into(), false)
    }

    pub fn alias_overwrite(self, name: impl Into<String>) -> Self {
        self.bind(name.into(), true)
    }

    fn bind(self, name: String, overwrite: bool) -> Self {
        if let Some(command) = self.cy.queue.last_mut() {
            command.alias = Some(AliasBinding { name, overwrite });
        }
        self
    }

    /// Override the retry budget of the previous command.
    pub fn timeout(self, millis: u64) -> Self {
        if let Some(command) = self.cy.queue.last_mut() {
            command.timeout = Some(Duration::from_millis(millis));
        }
        self
    }
}
