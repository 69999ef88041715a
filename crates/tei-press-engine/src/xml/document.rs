use std::fs;
use std::path::Path;

use quick_xml::escape::escape;

use crate::normalize;

use super::{LoadError, NodeId, Selector, XmlTree};

/// Pre-parse normalization switches for [`XmlDocument::load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Excise `delSpan` regions (tracked editorial deletions) from the byte
    /// stream before parsing.
    pub remove_del_spans: bool,
}

/// A loaded publication document: normalized source bytes parsed into a
/// mutable tree. All pipeline stages mutate the tree in place; [`save`]
/// serializes the current state.
///
/// [`save`]: XmlDocument::save
#[derive(Debug, Clone)]
pub struct XmlDocument {
    tree: XmlTree,
}

impl XmlDocument {
    /// Load a master file: read bytes, normalize to `namespace_uri`, parse.
    pub fn load(
        path: &Path,
        namespace_uri: &str,
        options: LoadOptions,
    ) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, namespace_uri, options)
    }

    /// Load from in-memory bytes, applying the same normalization as [`load`].
    ///
    /// [`load`]: XmlDocument::load
    pub fn from_bytes(
        bytes: &[u8],
        namespace_uri: &str,
        options: LoadOptions,
    ) -> Result<Self, LoadError> {
        let normalized = normalize::normalize(bytes, namespace_uri, options.remove_del_spans);
        let tree = XmlTree::parse(&normalized)?;
        Ok(Self { tree })
    }

    /// Wrap an already-built tree (used by tests and the fragment converter).
    pub fn from_tree(tree: XmlTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut XmlTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// First element in `scope`'s subtree matching the selector, document
    /// order. `scope` itself is not considered.
    pub fn find(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.tree
            .element_descendants(scope)
            .find(|&n| selector.matches(&self.tree, n))
    }

    /// All elements in `scope`'s subtree matching the selector.
    pub fn find_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.tree
            .element_descendants(scope)
            .filter(|&n| selector.matches(&self.tree, n))
            .collect()
    }

    /// Nearest ancestor of `id` matching the selector.
    pub fn find_ancestor(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        self.tree
            .ancestors(id)
            .find(|&n| selector.matches(&self.tree, n))
    }

    /// Return the first element under `parent` matching `selector`, creating
    /// and appending an empty `tag_name` element when there is none.
    /// Idempotent: a second identical call returns the node created by the
    /// first without adding a duplicate.
    pub fn get_or_create(
        &mut self,
        parent: NodeId,
        selector: &Selector,
        tag_name: &str,
    ) -> NodeId {
        match self.find(parent, selector) {
            Some(existing) => existing,
            None => self.tree.push_element(parent, tag_name),
        }
    }

    /// Serialize the current tree as UTF-8 with an XML declaration.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version='1.0' encoding='UTF-8'?>\n");
        write_node(&self.tree, self.tree.root(), &mut out);
        out
    }

    /// Write the serialized document to `path`.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.to_xml_string())
    }
}

fn write_node(tree: &XmlTree, id: NodeId, out: &mut String) {
    match tree.name(id) {
        Some(name) => {
            out.push('<');
            out.push_str(name);
            for (key, value) in tree.attrs(id) {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value));
                out.push('"');
            }
            let children = tree.children(id);
            if children.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for &child in children {
                    write_node(tree, child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
        None => {
            if let Some(text) = tree.text_content(id) {
                out.push_str(&escape(text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TEI_NS: &str = "http://www.tei-c.org/ns/1.0";

    fn doc(xml: &str) -> XmlDocument {
        XmlDocument::from_bytes(xml.as_bytes(), TEI_NS, LoadOptions::default()).unwrap()
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let result = XmlDocument::load(
            Path::new("/nonexistent/master.xml"),
            TEI_NS,
            LoadOptions::default(),
        );
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn load_malformed_file_propagates_parse_diagnostic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xml");
        std::fs::write(&path, "<TEI><body></TEI>").unwrap();

        let result = XmlDocument::load(&path, TEI_NS, LoadOptions::default());
        assert!(matches!(result, Err(LoadError::Parse(_))));
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut doc = doc(r#"<TEI xmlns="urn:x"><body/></TEI>"#);
        let body = doc.find(doc.root(), &Selector::name("body")).unwrap();

        let sel = Selector::name("div").with_attr("type", "notes");
        let first = doc.get_or_create(body, &sel, "div");
        doc.tree_mut().set_attr(first, "type", "notes");
        let second = doc.get_or_create(body, &sel, "div");

        assert_eq!(first, second);
        assert_eq!(doc.find_all(body, &Selector::name("div")).len(), 1);
    }

    #[test]
    fn save_and_reload_round_trips_structure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xml");

        let doc = doc(r#"<TEI xmlns="urn:x"><body><p n="1">a &amp; b</p></body></TEI>"#);
        doc.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<?xml version='1.0' encoding='UTF-8'?>"));

        let reloaded = XmlDocument::load(&path, TEI_NS, LoadOptions::default()).unwrap();
        let p = reloaded.find(reloaded.root(), &Selector::name("p")).unwrap();
        assert_eq!(reloaded.tree().attr(p, "n"), Some("1"));
        assert_eq!(reloaded.tree().text(p), "a & b");
    }

    #[test]
    fn empty_elements_serialize_self_closed() {
        let doc = doc(r#"<TEI xmlns="urn:x"><body><anchor xml:id="start1"/></body></TEI>"#);
        let xml = doc.to_xml_string();
        assert!(xml.contains(r#"<anchor xml:id="start1"/>"#));
    }
}
