//! Chain resolution and the retrying query loop.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use trellis_core_types::{DomSnapshot, ElementId, EngineError, EngineResult};
use trellis_retry::{retry_until, RetryContext};

use crate::chain::{ChainRoot, ElementSet, QueryChain, QueryStep};
use crate::predicate::{Matched, Predicate};
use crate::registry::{QueryRegistry, Scope};

/// Anything that can hand out a fresh snapshot of its element tree.
pub trait DocumentSource: Send + Sync {
    fn snapshot(&self) -> DomSnapshot;
}

/// How empty intermediate results are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Zero matches on a matching step is `NotFound`
    Strict,
    /// Zero matches propagate as an empty set (used by `not_exist`)
    AllowEmpty,
}

pub struct QueryEngine {
    registry: Arc<QueryRegistry>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(Arc::new(QueryRegistry::with_defaults()))
    }
}

impl QueryEngine {
    pub fn new(registry: Arc<QueryRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Structural checks that no amount of waiting can fix.
    pub fn validate(&self, chain: &QueryChain) -> EngineResult<()> {
        for (index, step) in chain.steps.iter().enumerate() {
            match step {
                QueryStep::Get(selector) => {
                    if index != 0 || chain.root != ChainRoot::Document {
                        return Err(EngineError::InvalidSelector(
                            "`get` can only start a chain".to_string(),
                        ));
                    }
                    selector.validate()?;
                }
                QueryStep::Find(selector) | QueryStep::Filter(selector) => selector.validate()?,
                QueryStep::Contains(text) if text.is_empty() => {
                    return Err(EngineError::InvalidSelector(
                        "`contains` needs non-empty text".to_string(),
                    ));
                }
                QueryStep::Custom { name, .. } => {
                    if !self.registry.contains(name) {
                        return Err(EngineError::UnknownQuery(name.clone()));
                    }
                }
                _ => {}
            }
        }
        if chain.steps.is_empty() && chain.root == ChainRoot::Document {
            return Err(EngineError::InvalidSelector("empty query chain".to_string()));
        }
        Ok(())
    }

    /// Resolve `chain` once against `snapshot`.
    pub fn resolve(
        &self,
        chain: &QueryChain,
        snapshot: &DomSnapshot,
        mode: Resolution,
    ) -> EngineResult<Vec<ElementId>> {
        let mut current: Vec<ElementId> = match &chain.root {
            ChainRoot::Document => vec![snapshot.root()],
            ChainRoot::Fixed { label, ids } => {
                let attached: Vec<ElementId> =
                    ids.iter().copied().filter(|id| snapshot.contains(*id)).collect();
                if attached.len() != ids.len() && mode == Resolution::Strict {
                    return Err(EngineError::Detached(format!(
                        "{label} refers to {} element(s) no longer in the document",
                        ids.len() - attached.len()
                    )));
                }
                attached
            }
        };

        for (index, step) in chain.steps.iter().enumerate() {
            let starts_chain = index == 0 && chain.root == ChainRoot::Document;
            current = self.apply(step, &current, snapshot, starts_chain)?;
            if current.is_empty() && mode == Resolution::Strict && step.requires_match() {
                return Err(EngineError::NotFound {
                    selector: chain.describe_until(index),
                });
            }
        }
        Ok(current)
    }

    fn apply(
        &self,
        step: &QueryStep,
        scope: &[ElementId],
        snapshot: &DomSnapshot,
        starts_chain: bool,
    ) -> EngineResult<Vec<ElementId>> {
        let out = match step {
            QueryStep::Get(selector) => snapshot
                .document_order()
                .into_iter()
                .filter(|id| matches_selector(snapshot, *id, |n| selector.matches(n)))
                .collect(),
            QueryStep::Find(selector) => Scope::Within(scope)
                .candidates(snapshot)
                .into_iter()
                .filter(|id| matches_selector(snapshot, *id, |n| selector.matches(n)))
                .collect(),
            QueryStep::Filter(selector) => scope
                .iter()
                .copied()
                .filter(|id| matches_selector(snapshot, *id, |n| selector.matches(n)))
                .collect(),
            QueryStep::Parent => {
                let parents: HashSet<ElementId> =
                    scope.iter().filter_map(|id| snapshot.parent(*id)).collect();
                in_document_order(snapshot, &parents)
            }
            QueryStep::First => scope.first().copied().into_iter().collect(),
            QueryStep::Last => scope.last().copied().into_iter().collect(),
            QueryStep::Eq(index) => scope.get(*index).copied().into_iter().collect(),
            QueryStep::Contains(text) => deepest_containing(snapshot, scope, text)
                .into_iter()
                .collect(),
            QueryStep::Custom { name, arg } => {
                let query = self.registry.get(name)?;
                let scope = if starts_chain {
                    Scope::Document
                } else {
                    Scope::Within(scope)
                };
                query.resolve(snapshot, scope, arg)?
            }
        };
        Ok(out)
    }

    /// Resolve `chain` and evaluate `predicates` as one unit, retrying until
    /// all succeed or `ctx` runs out.
    ///
    /// Predicates run in order and the first one that fails is the failure of
    /// that poll. An empty result is acceptable only when every predicate
    /// allows it. A window that ends on `NotFound` surfaces as `NotFound`
    /// rather than a generic timeout.
    pub async fn query<S>(
        &self,
        source: &S,
        chain: &QueryChain,
        predicates: &[Predicate],
        ctx: &RetryContext,
    ) -> EngineResult<ElementSet>
    where
        S: DocumentSource + ?Sized,
    {
        self.validate(chain)?;
        let mode = if !predicates.is_empty() && predicates.iter().all(Predicate::allows_empty) {
            Resolution::AllowEmpty
        } else {
            Resolution::Strict
        };
        let operation = if predicates.is_empty() {
            chain.to_string()
        } else {
            let expectations: Vec<&str> = predicates.iter().map(Predicate::description).collect();
            format!("{chain} should {}", expectations.join(" and "))
        };
        debug!(query = %operation, "resolving query");

        let outcome = retry_until(ctx, &operation, || async move {
            let snapshot = source.snapshot();
            let ids = self.resolve(chain, &snapshot, mode)?;
            let matched = Matched::new(&snapshot, &ids);
            for (index, predicate) in predicates.iter().enumerate() {
                predicate
                    .evaluate(&matched)
                    .map_err(|err| err.at_predicate(index))?;
            }
            Ok::<_, EngineError>(ids)
        })
        .await;

        match outcome {
            Ok(ids) => {
                info!(query = %operation, matched = ids.len(), "query resolved");
                Ok(ElementSet::new(ids, chain.clone()))
            }
            Err(EngineError::Timeout { last, .. })
                if matches!(*last, EngineError::NotFound { .. }) =>
            {
                Err(*last)
            }
            Err(err) => Err(err),
        }
    }
}

fn matches_selector<F>(snapshot: &DomSnapshot, id: ElementId, check: F) -> bool
where
    F: Fn(&trellis_core_types::ElementNode) -> bool,
{
    snapshot.node(id).map(check).unwrap_or(false)
}

fn in_document_order(snapshot: &DomSnapshot, members: &HashSet<ElementId>) -> Vec<ElementId> {
    snapshot
        .document_order()
        .into_iter()
        .filter(|id| members.contains(id))
        .collect()
}

/// First of the deepest elements (scope members included) whose text
/// content contains `text`.
fn deepest_containing(snapshot: &DomSnapshot, scope: &[ElementId], text: &str) -> Option<ElementId> {
    let mut pool: HashSet<ElementId> = scope.iter().copied().collect();
    for id in scope {
        pool.extend(snapshot.descendants(*id));
    }
    let candidates: Vec<ElementId> = in_document_order(snapshot, &pool)
        .into_iter()
        .filter(|id| snapshot.text_content(*id).contains(text))
        .collect();
    candidates
        .iter()
        .copied()
        .find(|id| !candidates.iter().any(|other| snapshot.is_ancestor(*id, *other)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use trellis_core_types::NewElement;

    struct Fixture {
        dom: DomSnapshot,
        dropdown: ElementId,
        toggle: ElementId,
        links: Vec<ElementId>,
    }

    fn fixture() -> Fixture {
        let mut dom = DomSnapshot::new("body");
        let root = dom.root();
        let dropdown = dom
            .append(root, NewElement::new("div").attr("data-cy", "Dropdown"))
            .unwrap();
        let toggle = dom
            .append(dropdown, NewElement::new("button").text("Options"))
            .unwrap();
        let menu = dom.append(dropdown, NewElement::new("div")).unwrap();
        let links = ["Account", "Support", "License"]
            .iter()
            .map(|label| dom.append(menu, NewElement::new("a").text(*label)).unwrap())
            .collect();
        dom.append(root, NewElement::new("a").text("Outside"));
        Fixture {
            dom,
            dropdown,
            toggle,
            links,
        }
    }

    fn dropdown_chain() -> QueryChain {
        QueryChain::from_document(QueryStep::Get(Selector::attr("data-cy", "Dropdown")))
    }

    #[test]
    fn find_is_scoped_to_previous_subject() {
        let fx = fixture();
        let engine = QueryEngine::default();
        let chain = dropdown_chain().then(QueryStep::Find(Selector::tag("a")));
        let ids = engine.resolve(&chain, &fx.dom, Resolution::Strict).unwrap();
        assert_eq!(ids, fx.links);
    }

    #[test]
    fn last_parent_and_eq() {
        let fx = fixture();
        let engine = QueryEngine::default();
        let links = dropdown_chain().then(QueryStep::Find(Selector::tag("a")));

        let last = engine
            .resolve(&links.then(QueryStep::Last), &fx.dom, Resolution::Strict)
            .unwrap();
        assert_eq!(last, vec![fx.links[2]]);

        let parent = engine
            .resolve(&links.then(QueryStep::Parent), &fx.dom, Resolution::Strict)
            .unwrap();
        assert_eq!(parent.len(), 1);
        assert_eq!(fx.dom.parent(fx.links[0]), Some(parent[0]));

        let err = engine
            .resolve(&links.then(QueryStep::Eq(9)), &fx.dom, Resolution::Strict)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn contains_prefers_deepest_match() {
        let fx = fixture();
        let engine = QueryEngine::default();
        let chain = dropdown_chain().then(QueryStep::Contains("Options".into()));
        let ids = engine.resolve(&chain, &fx.dom, Resolution::Strict).unwrap();
        assert_eq!(ids, vec![fx.toggle]);
    }

    #[test]
    fn not_found_names_failing_step() {
        let fx = fixture();
        let engine = QueryEngine::default();
        let chain = dropdown_chain()
            .then(QueryStep::Find(Selector::tag("select")))
            .then(QueryStep::Last);
        match engine.resolve(&chain, &fx.dom, Resolution::Strict) {
            Err(EngineError::NotFound { selector }) => {
                assert_eq!(selector, "get [data-cy=\"Dropdown\"] > find select")
            }
            other => panic!("unexpected: {other:?}"),
        }
        let empty = engine
            .resolve(&chain, &fx.dom, Resolution::AllowEmpty)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn fixed_root_detects_detached_elements() {
        let mut fx = fixture();
        let engine = QueryEngine::default();
        let chain = QueryChain::from_elements("@options", fx.links.clone()).then(QueryStep::Last);
        assert_eq!(
            engine.resolve(&chain, &fx.dom, Resolution::Strict).unwrap(),
            vec![fx.links[2]]
        );
        fx.dom.remove(fx.dropdown);
        assert!(matches!(
            engine.resolve(&chain, &fx.dom, Resolution::Strict),
            Err(EngineError::Detached(_))
        ));
    }

    #[test]
    fn validate_rejects_structural_mistakes() {
        let engine = QueryEngine::default();
        let nested_get = dropdown_chain().then(QueryStep::Get(Selector::tag("a")));
        assert!(engine.validate(&nested_get).is_err());
        let unknown = QueryChain::from_document(QueryStep::Custom {
            name: "byRole".into(),
            arg: "button".into(),
        });
        assert!(matches!(
            engine.validate(&unknown),
            Err(EngineError::UnknownQuery(_))
        ));
        let custom = QueryChain::from_document(QueryStep::Custom {
            name: "cyId".into(),
            arg: "Dropdown".into(),
        });
        assert!(engine.validate(&custom).is_ok());
    }
}
