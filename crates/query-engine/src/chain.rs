//! Query chains and the element sets they produce.

use std::fmt;

use trellis_core_types::ElementId;

use crate::selector::Selector;

/// One step of a query chain. Every step after the first operates only on
/// the elements produced by the step before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryStep {
    /// Match against the whole document; only valid as the first step
    Get(Selector),
    /// Descendants of the current elements
    Find(Selector),
    /// Current elements that also match
    Filter(Selector),
    Parent,
    First,
    Last,
    /// Zero-based index into the current elements
    Eq(usize),
    /// Deepest element within the current scope whose text contains the value
    Contains(String),
    /// Lookup delegated to a registered custom query
    Custom { name: String, arg: String },
}

impl QueryStep {
    pub fn name(&self) -> &'static str {
        match self {
            QueryStep::Get(_) => "get",
            QueryStep::Find(_) => "find",
            QueryStep::Filter(_) => "filter",
            QueryStep::Parent => "parent",
            QueryStep::First => "first",
            QueryStep::Last => "last",
            QueryStep::Eq(_) => "eq",
            QueryStep::Contains(_) => "contains",
            QueryStep::Custom { .. } => "custom",
        }
    }

    /// Whether a zero-element result of this step counts as "not found".
    pub(crate) fn requires_match(&self) -> bool {
        matches!(
            self,
            QueryStep::Get(_)
                | QueryStep::Find(_)
                | QueryStep::Contains(_)
                | QueryStep::Custom { .. }
                | QueryStep::Eq(_)
        )
    }
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStep::Get(selector) => write!(f, "get {selector}"),
            QueryStep::Find(selector) => write!(f, "find {selector}"),
            QueryStep::Filter(selector) => write!(f, "filter {selector}"),
            QueryStep::Parent => f.write_str("parent"),
            QueryStep::First => f.write_str("first"),
            QueryStep::Last => f.write_str("last"),
            QueryStep::Eq(index) => write!(f, "eq({index})"),
            QueryStep::Contains(text) => write!(f, "contains `{text}`"),
            QueryStep::Custom { name, arg } => write!(f, "{name}({arg})"),
        }
    }
}

/// Where resolution starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainRoot {
    Document,
    /// A previously captured element set, e.g. an alias
    Fixed { label: String, ids: Vec<ElementId> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryChain {
    pub root: ChainRoot,
    pub steps: Vec<QueryStep>,
}

impl QueryChain {
    pub fn from_document(first: QueryStep) -> Self {
        Self {
            root: ChainRoot::Document,
            steps: vec![first],
        }
    }

    pub fn from_elements(label: impl Into<String>, ids: Vec<ElementId>) -> Self {
        Self {
            root: ChainRoot::Fixed {
                label: label.into(),
                ids,
            },
            steps: Vec::new(),
        }
    }

    /// A new chain with `step` appended.
    pub fn then(&self, step: QueryStep) -> Self {
        let mut next = self.clone();
        next.steps.push(step);
        next
    }

    /// Human-readable rendering of the chain up to (and including) `upto`.
    pub fn describe_until(&self, upto: usize) -> String {
        let mut parts = Vec::new();
        if let ChainRoot::Fixed { label, .. } = &self.root {
            parts.push(label.clone());
        }
        parts.extend(self.steps.iter().take(upto + 1).map(ToString::to_string));
        parts.join(" > ")
    }
}

impl fmt::Display for QueryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe_until(self.steps.len()))
    }
}

/// Elements resolved by a query, together with the chain that produced them
/// so later assertions can re-run the same query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementSet {
    ids: Vec<ElementId>,
    chain: QueryChain,
}

impl ElementSet {
    pub fn new(ids: Vec<ElementId>, chain: QueryChain) -> Self {
        Self { ids, chain }
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    pub fn chain(&self) -> &QueryChain {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(&self) -> Option<ElementId> {
        self.ids.first().copied()
    }

    /// Chain rooted at exactly these elements, used when the set is
    /// re-read through an alias.
    pub fn pinned(&self, label: impl Into<String>) -> QueryChain {
        QueryChain::from_elements(label, self.ids.clone())
    }

    /// Chain rooted at exactly these elements and labelled with the query
    /// that produced them. Traversals from a previous subject start here so
    /// they never re-query the document.
    pub fn scope(&self) -> QueryChain {
        self.pinned(self.chain.to_string())
    }
}
