//! Structural selectors.

use std::fmt;

use trellis_core_types::{ElementNode, EngineError, EngineResult};

/// Structural element matcher.
///
/// Selectors are values, not strings: the engine never parses CSS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Tag name, `*` matches everything
    Tag(String),
    Id(String),
    Class(String),
    /// Attribute present, any value
    HasAttr(String),
    /// Attribute present with exactly this value
    AttrEq { name: String, value: String },
    /// Every inner selector must match
    All(Vec<Selector>),
}

impl Selector {
    pub fn any() -> Self {
        Selector::Tag("*".to_string())
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Selector::Tag(tag.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Selector::Id(id.into())
    }

    pub fn class(class: impl Into<String>) -> Self {
        Selector::Class(class.into())
    }

    pub fn has_attr(name: impl Into<String>) -> Self {
        Selector::HasAttr(name.into())
    }

    pub fn attr(name: impl Into<String>, value: impl Into<String>) -> Self {
        Selector::AttrEq {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Selector) -> Self {
        match self {
            Selector::All(mut inner) => {
                inner.push(other);
                Selector::All(inner)
            }
            first => Selector::All(vec![first, other]),
        }
    }

    /// Reject selectors that can never be meaningful.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Selector::Tag(name) => check_name("tag", name),
            Selector::Id(name) => check_name("id", name),
            Selector::Class(name) => check_name("class", name),
            Selector::HasAttr(name) => check_name("attribute", name),
            Selector::AttrEq { name, .. } => check_name("attribute", name),
            Selector::All(inner) => {
                if inner.is_empty() {
                    return Err(EngineError::InvalidSelector(
                        "empty selector conjunction".to_string(),
                    ));
                }
                inner.iter().try_for_each(Selector::validate)
            }
        }
    }

    pub fn matches(&self, node: &ElementNode) -> bool {
        match self {
            Selector::Tag(tag) => tag == "*" || node.tag.eq_ignore_ascii_case(tag),
            Selector::Id(id) => node.attr("id") == Some(id.as_str()),
            Selector::Class(class) => node.has_class(class),
            Selector::HasAttr(name) => node.has_attr(name),
            Selector::AttrEq { name, value } => node.attr(name) == Some(value.as_str()),
            Selector::All(inner) => inner.iter().all(|selector| selector.matches(node)),
        }
    }
}

fn check_name(kind: &str, name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidSelector(format!("empty {kind} name")));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(EngineError::InvalidSelector(format!(
            "{kind} name `{name}` contains whitespace"
        )));
    }
    Ok(())
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Tag(tag) => write!(f, "{tag}"),
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::Class(class) => write!(f, ".{class}"),
            Selector::HasAttr(name) => write!(f, "[{name}]"),
            Selector::AttrEq { name, value } => write!(f, "[{name}=\"{value}\"]"),
            Selector::All(inner) => inner.iter().try_for_each(|s| write!(f, "{s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core_types::{DomSnapshot, NewElement};

    #[test]
    fn display_reads_like_css() {
        let selector = Selector::tag("button")
            .and(Selector::attr("data-cy", "active"))
            .and(Selector::class("primary"));
        assert_eq!(selector.to_string(), "button[data-cy=\"active\"].primary");
    }

    #[test]
    fn validate_rejects_empty_names() {
        assert!(Selector::attr("", "x").validate().is_err());
        assert!(Selector::All(vec![]).validate().is_err());
        assert!(Selector::class("flex row").validate().is_err());
        assert!(Selector::has_attr("disabled").validate().is_ok());
    }

    #[test]
    fn matches_on_attributes_and_classes() {
        let mut dom = DomSnapshot::new("body");
        let root = dom.root();
        let id = dom
            .append(
                root,
                NewElement::new("BUTTON")
                    .attr("data-cy", "active")
                    .class("btn"),
            )
            .unwrap();
        let node = dom.node(id).unwrap();
        assert!(Selector::tag("button").matches(node));
        assert!(Selector::attr("data-cy", "active").matches(node));
        assert!(!Selector::attr("data-cy", "notActive").matches(node));
        assert!(Selector::class("btn").and(Selector::any()).matches(node));
        assert!(!Selector::has_attr("disabled").matches(node));
    }
}
