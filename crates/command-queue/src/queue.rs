//! Strict FIFO execution of a test's commands.

use std::collections::VecDeque;
use std::time::Duration;

use query_engine::{DocumentSource, ElementSet, Predicate, QueryChain, QueryStep, Resolution};
use thiserror::Error;
use tracing::{debug, info, warn};
use trellis_core_types::{ElementId, EngineError, EngineResult};
use trellis_retry::{pause, retry_until};

use crate::command::{Command, CommandKind};
use crate::context::TestContext;
use crate::metrics;
use crate::subject::Subject;

/// The single failure of a test case. `index` is the failing command's
/// zero-based position in the queue.
#[derive(Debug, Error)]
#[error("command #{index} `{command}` failed: {error}")]
pub struct CommandFailure {
    pub index: usize,
    pub command: String,
    #[source]
    pub error: EngineError,
}

#[derive(Debug)]
pub struct QueueOutcome {
    pub executed: usize,
    /// Subject yielded by the last command
    pub subject: Subject,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, kind: CommandKind) -> &mut Command {
        metrics::record_enqueued();
        self.commands.push_back(Command::new(kind));
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    pub fn last_mut(&mut self) -> Option<&mut Command> {
        self.commands.back_mut()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Run every command in order against `ctx`.
    ///
    /// Each command starts only after its predecessor yielded a subject. An
    /// element query absorbs the `should` commands queued directly after it
    /// so the query and its assertions retry as one unit. The first failure
    /// discards everything still queued.
    pub async fn run(self, ctx: &mut TestContext) -> Result<QueueOutcome, CommandFailure> {
        let mut pending: VecDeque<(usize, Command)> =
            self.commands.into_iter().enumerate().collect();
        let mut subject = Subject::Empty;
        let mut executed = 0;

        while let Some((index, command)) = pending.pop_front() {
            let mut assertions: Vec<(usize, String, Predicate)> = Vec::new();
            let mut timeout = command.timeout;
            if command.kind.is_query() {
                while let Some((_, next)) = pending.front() {
                    if !matches!(next.kind, CommandKind::Should(_)) {
                        break;
                    }
                    let Some((should_index, should)) = pending.pop_front() else {
                        break;
                    };
                    timeout = timeout.max(should.timeout);
                    let label = should.to_string();
                    if let CommandKind::Should(predicate) = should.kind {
                        assertions.push((should_index, label, predicate));
                    }
                }
            }

            let label = command.to_string();
            let Command { kind, alias, .. } = command;
            for _ in 0..=assertions.len() {
                metrics::record_started();
            }
            info!(test = ctx.name(), index, command = %label, "command started");

            let outcome = if ctx.cancel_token().is_cancelled() {
                Err(EngineError::Cancelled(format!("{label} was never started")))
            } else {
                let predicates: Vec<Predicate> =
                    assertions.iter().map(|(_, _, p)| p.clone()).collect();
                let previous = std::mem::take(&mut subject);
                match execute(kind, timeout, &predicates, previous, ctx).await {
                    Ok(next) => match alias {
                        Some(binding) => bind_alias(ctx, &binding.name, binding.overwrite, next),
                        None => Ok(next),
                    },
                    Err(err) => Err(err),
                }
            };

            match outcome {
                Ok(next) => {
                    for _ in 0..=assertions.len() {
                        metrics::record_completed();
                    }
                    executed += 1 + assertions.len();
                    debug!(index, subject = next.kind(), "command completed");
                    subject = next;
                }
                Err(error) => {
                    let (index, command) = attribute(index, label, &assertions, &error);
                    metrics::record_failed();
                    metrics::record_discarded(pending.len());
                    warn!(
                        test = ctx.name(),
                        index,
                        command = %command,
                        error = %error,
                        discarded = pending.len(),
                        "command failed"
                    );
                    return Err(CommandFailure {
                        index,
                        command,
                        error,
                    });
                }
            }
        }

        Ok(QueueOutcome { executed, subject })
    }
}

/// Blame an assertion failure on the `should` whose predicate failed.
fn attribute(
    index: usize,
    label: String,
    assertions: &[(usize, String, Predicate)],
    error: &EngineError,
) -> (usize, String) {
    match error.failed_predicate().and_then(|position| assertions.get(position)) {
        Some((should_index, should_label, _)) => (*should_index, should_label.clone()),
        None => (index, label),
    }
}

fn bind_alias(
    ctx: &mut TestContext,
    name: &str,
    overwrite: bool,
    subject: Subject,
) -> EngineResult<Subject> {
    let name = name.trim_start_matches('@');
    let bound = match &subject {
        Subject::Elements(set) => Subject::Elements(ElementSet::new(
            set.ids().to_vec(),
            set.pinned(format!("@{name}")),
        )),
        Subject::Route(route) => {
            ctx.layer().set_alias(&route.id, name)?;
            subject.clone()
        }
        other => other.clone(),
    };
    ctx.aliases.bind(name, bound, overwrite)?;
    Ok(subject)
}

async fn execute(
    kind: CommandKind,
    timeout: Option<Duration>,
    assertions: &[Predicate],
    subject: Subject,
    ctx: &TestContext,
) -> EngineResult<Subject> {
    match kind {
        CommandKind::Visit { url } => {
            let url = ctx.config().resolve_url(&url);
            ctx.app().visit(&url).await?;
            Ok(Subject::Window)
        }
        CommandKind::Get(selector) => {
            let chain = QueryChain::from_document(QueryStep::Get(selector));
            query(ctx, &chain, assertions, timeout).await
        }
        CommandKind::Query { name, arg } => {
            let chain = QueryChain::from_document(QueryStep::Custom { name, arg });
            query(ctx, &chain, assertions, timeout).await
        }
        CommandKind::Contains(text) => {
            let chain = QueryChain::from_document(QueryStep::Contains(text));
            query(ctx, &chain, assertions, timeout).await
        }
        CommandKind::GetAlias(name) => match ctx.aliases().get(&name)? {
            Subject::Elements(set) => query(ctx, set.chain(), assertions, timeout).await,
            other if assertions.is_empty() => Ok(other),
            other => Err(EngineError::invalid_subject(
                "should",
                format!("assertions need elements, @{name} holds a {}", other.kind()),
            )),
        },
        CommandKind::Traverse(step) => {
            let chain = subject.elements(step.name())?.scope().then(step);
            query(ctx, &chain, assertions, timeout).await
        }
        CommandKind::Should(predicate) => {
            let chain = subject.elements("should")?.scope();
            query(ctx, &chain, &[predicate], timeout).await
        }
        CommandKind::Click => {
            let id = actionable(ctx, subject.elements("click")?, "click", timeout).await?;
            ctx.app().click(id).await?;
            Ok(subject)
        }
        CommandKind::TypeText(text) => {
            let id = actionable(ctx, subject.elements("type")?, "type", timeout).await?;
            ctx.app().type_text(id, &text).await?;
            Ok(subject)
        }
        CommandKind::Then(callback) => Ok(callback(&subject, ctx)?.unwrap_or(subject)),
        CommandKind::Intercept {
            method,
            url,
            handler,
        } => {
            let route = ctx.layer().register(&method, url, handler)?;
            Ok(Subject::Route(route))
        }
        CommandKind::Wait { alias, ordinal } => {
            let bound = ctx.aliases().get(&alias)?;
            let route = bound.route("wait")?;
            let retry = ctx.wait_ctx(timeout);
            let record = ctx.layer().wait_for(&route.id, ordinal, &retry).await?;
            Ok(Subject::Call(record))
        }
        CommandKind::WaitMs(duration) => {
            pause(duration, ctx.cancel_token()).await?;
            Ok(subject)
        }
        CommandKind::Window => Ok(Subject::Window),
        CommandKind::Stub {
            object,
            method,
            behavior,
        } => {
            let table = ctx.app().platform_object(&object)?;
            Ok(Subject::Stub(ctx.stubs().stub(&table, &method, behavior)?))
        }
        CommandKind::Spy { object, method } => {
            let table = ctx.app().platform_object(&object)?;
            Ok(Subject::Stub(ctx.stubs().spy(&table, &method)?))
        }
        CommandKind::Log(message) => {
            info!(test = ctx.name(), %message, "log");
            Ok(subject)
        }
    }
}

async fn query(
    ctx: &TestContext,
    chain: &QueryChain,
    assertions: &[Predicate],
    timeout: Option<Duration>,
) -> EngineResult<Subject> {
    let retry = ctx.command_ctx(timeout);
    let set = ctx
        .engine()
        .query(ctx.app().as_ref(), chain, assertions, &retry)
        .await?;
    Ok(Subject::Elements(set))
}

/// Wait until the subject re-resolves to exactly one enabled element.
async fn actionable(
    ctx: &TestContext,
    set: &ElementSet,
    command: &str,
    timeout: Option<Duration>,
) -> EngineResult<ElementId> {
    let retry = ctx.command_ctx(timeout);
    let engine = ctx.engine();
    let app = ctx.app();
    let chain = set.chain();
    let operation = format!("{command} {chain}");
    retry_until(&retry, &operation, || async move {
        let snapshot = app.snapshot();
        let ids = engine.resolve(chain, &snapshot, Resolution::Strict)?;
        let [id] = ids.as_slice() else {
            return Err(EngineError::NotActionable(format!(
                "{command} needs a single element, {} matched",
                ids.len()
            )));
        };
        if let Some(node) = snapshot.node(*id) {
            if node.is_disabled() {
                return Err(EngineError::NotActionable(format!(
                    "{} is disabled",
                    node.describe()
                )));
            }
        }
        Ok::<_, EngineError>(*id)
    })
    .await
}
