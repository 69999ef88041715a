use quick_xml::events::Event;
use quick_xml::Reader;

use super::LoadError;

/// Handle into an [`XmlTree`]. Ids are only meaningful for the tree that
/// produced them and stay valid across mutations (nodes are never reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element { name: String, attrs: Vec<(String, String)> },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Owned, mutable XML tree built from a single parse pass.
///
/// Element and attribute names are stored as they appear in the source
/// (qualified, e.g. `xml:id`). The pipeline normalizes every document to one
/// canonical default namespace before parsing, so plain-name matching is the
/// namespace-scoped matching.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlTree {
    /// Parse a tree from UTF-8 bytes. The bytes are expected to already be
    /// normalized (single default namespace, no stylesheet PI).
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        let text = std::str::from_utf8(bytes).map_err(LoadError::Utf8)?;
        let mut reader = Reader::from_str(text);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| LoadError::Parse(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let id = push_element(&mut nodes, &stack, &mut root, &e)?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    push_element(&mut nodes, &stack, &mut root, &e)?;
                }
                Event::End(_) => {
                    // Name mismatches are already rejected by the reader.
                    if stack.pop().is_none() {
                        return Err(LoadError::Parse("unexpected closing tag".into()));
                    }
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| LoadError::Parse(e.to_string()))?
                        .into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = NodeId(nodes.len());
                        nodes.push(Node {
                            kind: NodeKind::Text(text),
                            parent: Some(parent),
                            children: Vec::new(),
                        });
                        nodes[parent.0].children.push(id);
                    }
                }
                Event::CData(t) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = NodeId(nodes.len());
                        nodes.push(Node {
                            kind: NodeKind::Text(text),
                            parent: Some(parent),
                            children: Vec::new(),
                        });
                        nodes[parent.0].children.push(id);
                    }
                }
                // Declaration, comments, PIs and doctype carry nothing the
                // pipeline consumes downstream.
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(LoadError::Parse("unclosed element at end of input".into()));
        }
        match root {
            Some(root) => Ok(Self { nodes, root }),
            None => Err(LoadError::Parse("document has no root element".into())),
        }
    }

    /// Create a tree holding a single empty root element.
    pub fn with_root(name: &str) -> Self {
        let nodes = vec![Node {
            kind: NodeKind::Element {
                name: name.to_string(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        }];
        Self {
            nodes,
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Direct text of a text node, `None` for elements.
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }

    /// Concatenated descendant text, document order.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let NodeKind::Text(t) = &self.nodes[node.0].kind {
                out.push_str(t);
            }
        }
        out
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(entry) = attrs.iter_mut().find(|(k, _)| k == name) {
                entry.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(pos) = attrs.iter().position(|(k, _)| k == name) {
                return Some(attrs.remove(pos).1);
            }
        }
        None
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs.as_slice(),
            NodeKind::Text(_) => &[],
        }
    }

    /// Remove attributes not accepted by the filter.
    pub fn retain_attrs<F: Fn(&str) -> bool>(&mut self, id: NodeId, keep: F) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.retain(|(k, _)| keep(k));
        }
    }

    /// Append a new empty element under `parent`.
    pub fn push_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                name: name.to_string(),
                attrs: Vec::new(),
            },
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a text node under `parent`.
    pub fn push_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Replace the children of an element with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].children.clear();
        self.push_text(id, text);
    }

    /// Detach a node from its parent. The node itself stays allocated but is
    /// no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Pre-order document-order iterator over `id` and its subtree.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    /// Element descendants of `id` (excluding `id` itself), document order.
    pub fn element_descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(id)
            .skip(1)
            .filter(move |&n| self.is_element(n))
    }

    /// Walk parent links from `id` (excluding `id` itself) up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes[id.0].parent,
        }
    }
}

fn push_element(
    nodes: &mut Vec<Node>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    start: &quick_xml::events::BytesStart,
) -> Result<NodeId, LoadError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| LoadError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| LoadError::Parse(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }

    let parent = stack.last().copied();
    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind: NodeKind::Element { name, attrs },
        parent,
        children: Vec::new(),
    });
    match parent {
        Some(parent) => nodes[parent.0].children.push(id),
        None => {
            if root.is_some() {
                return Err(LoadError::Parse(
                    "multiple root elements in document".into(),
                ));
            }
            *root = Some(id);
        }
    }
    Ok(id)
}

pub struct Descendants<'t> {
    tree: &'t XmlTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = &self.tree.nodes[id.0].children;
        self.stack.extend(children.iter().rev());
        Some(id)
    }
}

pub struct Ancestors<'t> {
    tree: &'t XmlTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.nodes[id.0].parent;
        Some(id)
    }
}
