//! Element-tree model exposed by the application under test.
//!
//! The engine never renders anything. Applications hand out a
//! [`DomSnapshot`], a point-in-time copy of their element tree, and the
//! query engine evaluates selectors against it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::ElementId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub id: ElementId,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    /// Text owned directly by this element, excluding descendants.
    pub text: String,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
}

impl ElementNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    /// Short HTML-ish rendering used in error messages.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for (name, value) in &self.attributes {
            if value.is_empty() {
                out.push_str(&format!(" {name}"));
            } else {
                out.push_str(&format!(" {name}=\"{value}\""));
            }
        }
        if !self.classes.is_empty() {
            out.push_str(&format!(" class=\"{}\"", self.classes.join(" ")));
        }
        out.push('>');
        out
    }
}

/// Description of an element to insert into a snapshot.
#[derive(Clone, Debug, Default)]
pub struct NewElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub text: String,
}

impl NewElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Point-in-time copy of an element tree.
///
/// Children are kept in document order, so a pre-order walk from the root
/// yields elements in the order a browser would report them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomSnapshot {
    root: ElementId,
    nodes: HashMap<ElementId, ElementNode>,
    next_id: u64,
    pub url: Option<String>,
}

impl DomSnapshot {
    /// Create a tree holding only a root element with the given tag.
    pub fn new(root_tag: impl Into<String>) -> Self {
        let root = ElementId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            ElementNode {
                id: root,
                tag: root_tag.into(),
                attributes: BTreeMap::new(),
                classes: Vec::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            root,
            nodes,
            next_id: 2,
            url: None,
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: ElementId) -> Option<&ElementNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: ElementId) -> Option<&mut ElementNode> {
        self.nodes.get_mut(&id)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Append a new element as the last child of `parent`.
    ///
    /// Returns `None` when `parent` is not part of the tree.
    pub fn append(&mut self, parent: ElementId, element: NewElement) -> Option<ElementId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            ElementNode {
                id,
                tag: element.tag,
                attributes: element.attributes,
                classes: element.classes,
                text: element.text,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    /// Detach `id` and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, id: ElementId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }
        if let Some(parent) = self.parent(id) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }
        let mut doomed = self.descendants(id);
        doomed.push(id);
        for node in doomed {
            self.nodes.remove(&node);
        }
        true
    }

    pub fn set_text(&mut self, id: ElementId, text: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_attr(&mut self, id: ElementId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attributes.insert(name.into(), value.into());
        }
    }

    pub fn remove_attr(&mut self, id: ElementId, name: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attributes.remove(name);
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = match self.nodes.get(&id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every element, root first, in document order.
    pub fn document_order(&self) -> Vec<ElementId> {
        let mut all = vec![self.root];
        all.extend(self.descendants(self.root));
        all
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Own text followed by descendant text, like `textContent`.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut out = String::new();
        if let Some(node) = self.nodes.get(&id) {
            out.push_str(&node.text);
            for child in &node.children {
                out.push_str(&self.text_content(*child));
            }
        }
        out
    }

    pub fn describe(&self, id: ElementId) -> String {
        self.nodes
            .get(&id)
            .map(ElementNode::describe)
            .unwrap_or_else(|| format!("<detached {id}>"))
    }
}
