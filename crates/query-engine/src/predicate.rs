//! Pluggable predicates evaluated against resolved elements.

use std::fmt;
use std::sync::Arc;

use trellis_core_types::{DomSnapshot, ElementId, ElementNode, EngineError, EngineResult};

/// Read-only view over the elements a query matched, bound to the snapshot
/// they were resolved from.
pub struct Matched<'a> {
    snapshot: &'a DomSnapshot,
    ids: &'a [ElementId],
}

impl<'a> Matched<'a> {
    pub fn new(snapshot: &'a DomSnapshot, ids: &'a [ElementId]) -> Self {
        Self { snapshot, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ElementId] {
        self.ids
    }

    pub fn snapshot(&self) -> &DomSnapshot {
        self.snapshot
    }

    pub fn nodes(&self) -> impl Iterator<Item = &'a ElementNode> + '_ {
        self.ids.iter().filter_map(|id| self.snapshot.node(*id))
    }

    pub fn first(&self) -> Option<&'a ElementNode> {
        self.ids.first().and_then(|id| self.snapshot.node(*id))
    }

    /// Combined text content of every matched element.
    pub fn text(&self) -> String {
        self.ids
            .iter()
            .map(|id| self.snapshot.text_content(*id))
            .collect()
    }

    fn describe(&self) -> String {
        match self.ids {
            [] => "nothing matched".to_string(),
            [only] => self.snapshot.describe(*only),
            many => format!("{} elements", many.len()),
        }
    }
}

type CheckFn = dyn for<'a> Fn(&Matched<'a>) -> Result<(), String> + Send + Sync;

/// A check over matched elements.
///
/// The engine only ever calls [`Predicate::evaluate`]; the constructors below
/// are conveniences for the checks end-to-end suites use most. A failing
/// check reports what it actually observed, which becomes the `actual` half of
/// [`EngineError::AssertionFailed`].
#[derive(Clone)]
pub struct Predicate {
    description: String,
    allows_empty: bool,
    check: Arc<CheckFn>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .field("allows_empty", &self.allows_empty)
            .finish()
    }
}

impl Predicate {
    pub fn new<F>(description: impl Into<String>, check: F) -> Self
    where
        F: for<'a> Fn(&Matched<'a>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            allows_empty: false,
            check: Arc::new(check),
        }
    }

    /// Let the query resolve to zero elements instead of failing with `NotFound`.
    pub fn allowing_empty(mut self) -> Self {
        self.allows_empty = true;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn allows_empty(&self) -> bool {
        self.allows_empty
    }

    pub fn evaluate(&self, matched: &Matched<'_>) -> EngineResult<()> {
        (self.check)(matched).map_err(|actual| EngineError::assertion(&self.description, actual))
    }

    /// Arbitrary closure, the escape hatch for checks not covered below.
    pub fn satisfy<F>(description: impl Into<String>, check: F) -> Self
    where
        F: for<'a> Fn(&Matched<'a>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(description, check)
    }

    pub fn exist() -> Self {
        Self::new("element to exist", |m| {
            if m.is_empty() {
                Err("nothing matched".to_string())
            } else {
                Ok(())
            }
        })
    }

    pub fn not_exist() -> Self {
        Self::new("element not to exist", |m| {
            if m.is_empty() {
                Ok(())
            } else {
                Err(format!("found {}", m.describe()))
            }
        })
        .allowing_empty()
    }

    pub fn have_length(expected: usize) -> Self {
        Self::new(format!("{expected} element(s)"), move |m| {
            if m.len() == expected {
                Ok(())
            } else {
                Err(format!("found {}", m.len()))
            }
        })
    }

    /// Exact text content.
    pub fn have_text(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(format!("text `{expected}`"), move |m| {
            let text = m.text();
            if text == expected {
                Ok(())
            } else {
                Err(format!("the text was `{text}`"))
            }
        })
    }

    pub fn contain_text(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(format!("to contain `{expected}`"), move |m| {
            let text = m.text();
            if text.contains(&expected) {
                Ok(())
            } else {
                Err(format!("the text was `{text}`"))
            }
        })
    }

    pub fn be_enabled() -> Self {
        Self::new("to be enabled", |m| match m.nodes().find(|n| n.is_disabled()) {
            Some(node) => Err(format!("{} is disabled", node.describe())),
            None if m.is_empty() => Err("nothing matched".to_string()),
            None => Ok(()),
        })
    }

    pub fn be_disabled() -> Self {
        Self::new("to be disabled", |m| match m.nodes().find(|n| !n.is_disabled()) {
            Some(node) => Err(format!("{} is enabled", node.describe())),
            None if m.is_empty() => Err("nothing matched".to_string()),
            None => Ok(()),
        })
    }

    /// Attribute present on the first matched element.
    pub fn have_attr(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(format!("to have attribute `{name}`"), move |m| match m.first() {
            Some(node) if node.has_attr(&name) => Ok(()),
            Some(node) => Err(format!("{} has no `{name}`", node.describe())),
            None => Err("nothing matched".to_string()),
        })
    }

    pub fn have_attr_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        Self::new(
            format!("attribute `{name}` to equal `{value}`"),
            move |m| match m.first().map(|node| node.attr(&name)) {
                Some(Some(actual)) if actual == value => Ok(()),
                Some(Some(actual)) => Err(format!("it was `{actual}`")),
                Some(None) => Err(format!("`{name}` is absent")),
                None => Err("nothing matched".to_string()),
            },
        )
    }

    /// Every matched element carries the class.
    pub fn have_class(class: impl Into<String>) -> Self {
        let class = class.into();
        Self::new(format!("to have class `{class}`"), move |m| {
            match m.nodes().find(|n| !n.has_class(&class)) {
                Some(node) => Err(format!("{} lacks it", node.describe())),
                None if m.is_empty() => Err("nothing matched".to_string()),
                None => Ok(()),
            }
        })
    }
}
