//! Custom query extension point.
//!
//! Projects register lookup strategies by name (for example a test-id
//! attribute convention) and chains refer to them through
//! [`QueryStep::Custom`](crate::QueryStep::Custom) without any change to the engine.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use trellis_core_types::{DomSnapshot, ElementId, EngineError, EngineResult};

/// Search scope handed to a custom query.
#[derive(Clone, Copy, Debug)]
pub enum Scope<'a> {
    /// Whole document, used when the custom query starts a chain
    Document,
    /// Descendants of the previous step's elements
    Within(&'a [ElementId]),
}

impl Scope<'_> {
    /// Candidate elements in document order.
    pub fn candidates(&self, snapshot: &DomSnapshot) -> Vec<ElementId> {
        match self {
            Scope::Document => snapshot.document_order(),
            Scope::Within(ids) => {
                let mut seen = std::collections::HashSet::new();
                for id in ids.iter() {
                    seen.extend(snapshot.descendants(*id));
                }
                snapshot
                    .document_order()
                    .into_iter()
                    .filter(|id| seen.contains(id))
                    .collect()
            }
        }
    }
}

pub trait CustomQuery: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve `arg` within `scope`. An empty result is reported by the
    /// engine as `NotFound`; implementations only fail for malformed input.
    fn resolve(
        &self,
        snapshot: &DomSnapshot,
        scope: Scope<'_>,
        arg: &str,
    ) -> EngineResult<Vec<ElementId>>;
}

/// Looks elements up by the value of a fixed attribute.
pub struct AttributeQuery {
    name: String,
    attribute: String,
}

impl AttributeQuery {
    pub fn new(name: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into(),
        }
    }

    /// `cyId("x")` selects `[data-cy="x"]`.
    pub fn cy_id() -> Self {
        Self::new("cyId", "data-cy")
    }
}

impl CustomQuery for AttributeQuery {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(
        &self,
        snapshot: &DomSnapshot,
        scope: Scope<'_>,
        arg: &str,
    ) -> EngineResult<Vec<ElementId>> {
        if arg.trim().is_empty() {
            return Err(EngineError::InvalidSelector(format!(
                "{}() needs a non-empty value",
                self.name
            )));
        }
        Ok(scope
            .candidates(snapshot)
            .into_iter()
            .filter(|id| {
                snapshot
                    .node(*id)
                    .and_then(|node| node.attr(&self.attribute))
                    == Some(arg)
            })
            .collect())
    }
}

/// Named custom queries available to every chain.
#[derive(Default)]
pub struct QueryRegistry {
    queries: DashMap<String, Arc<dyn CustomQuery>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the `cyId` attribute convention.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(AttributeQuery::cy_id()));
        registry
    }

    /// Register `query`, replacing and returning any query with the same name.
    pub fn register(&self, query: Arc<dyn CustomQuery>) -> Option<Arc<dyn CustomQuery>> {
        let name = query.name().to_string();
        debug!(query = %name, "registering custom query");
        self.queries.insert(name, query)
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn CustomQuery>> {
        self.queries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownQuery(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core_types::NewElement;

    struct TextQuery;

    impl CustomQuery for TextQuery {
        fn name(&self) -> &str {
            "byText"
        }

        fn resolve(
            &self,
            snapshot: &DomSnapshot,
            scope: Scope<'_>,
            arg: &str,
        ) -> EngineResult<Vec<ElementId>> {
            Ok(scope
                .candidates(snapshot)
                .into_iter()
                .filter(|id| snapshot.node(*id).map(|n| n.text == arg).unwrap_or(false))
                .collect())
        }
    }

    #[test]
    fn cy_id_matches_data_cy_attribute() {
        let mut dom = DomSnapshot::new("body");
        let root = dom.root();
        let active = dom
            .append(root, NewElement::new("button").attr("data-cy", "active"))
            .unwrap();
        dom.append(root, NewElement::new("button").attr("data-cy", "notActive"));

        let registry = QueryRegistry::with_defaults();
        let query = registry.get("cyId").unwrap();
        let found = query.resolve(&dom, Scope::Document, "active").unwrap();
        assert_eq!(found, vec![active]);
        assert!(query.resolve(&dom, Scope::Document, " ").is_err());
    }

    #[test]
    fn custom_queries_can_be_added_and_replaced() {
        let registry = QueryRegistry::with_defaults();
        assert!(registry.register(Arc::new(TextQuery)).is_none());
        assert!(registry.register(Arc::new(TextQuery)).is_some());
        assert_eq!(registry.names(), vec!["byText".to_string(), "cyId".to_string()]);
        assert!(matches!(
            registry.get("byRole"),
            Err(EngineError::UnknownQuery(_))
        ));
    }

    #[test]
    fn within_scope_excludes_outside_elements() {
        let mut dom = DomSnapshot::new("body");
        let root = dom.root();
        let left = dom.append(root, NewElement::new("div")).unwrap();
        let right = dom.append(root, NewElement::new("div")).unwrap();
        let inside = dom.append(left, NewElement::new("span").text("x")).unwrap();
        dom.append(right, NewElement::new("span").text("x"));

        let scope_ids = [left];
        let found = TextQuery
            .resolve(&dom, Scope::Within(&scope_ids), "x")
            .unwrap();
        assert_eq!(found, vec![inside]);
    }
}
