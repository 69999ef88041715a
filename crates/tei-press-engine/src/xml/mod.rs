mod document;
mod tree;

use std::path::PathBuf;

pub use document::{LoadOptions, XmlDocument};
pub use tree::{NodeId, NodeKind, XmlTree};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Document is not valid UTF-8: {0}")]
    Utf8(std::str::Utf8Error),
    #[error("XML parse error: {0}")]
    Parse(String),
}

/// Typed element matcher, the structured replacement for the ad hoc XPath
/// strings the pipeline queries used to be written as.
///
/// A selector matches on local tag name plus at most one attribute
/// constraint: an exact value, mere presence, or required absence.
#[derive(Debug, Clone)]
pub struct Selector {
    name: String,
    attr_eq: Option<(String, String)>,
    attr_present: Option<String>,
    attr_absent: Option<String>,
}

impl Selector {
    pub fn name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attr_eq: None,
            attr_present: None,
            attr_absent: None,
        }
    }

    /// Require an attribute with an exact value, e.g. `div[@type="notes"]`.
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attr_eq = Some((key.to_string(), value.to_string()));
        self
    }

    /// Require an attribute to exist, e.g. `note[@place]`.
    pub fn with_attr_present(mut self, key: &str) -> Self {
        self.attr_present = Some(key.to_string());
        self
    }

    /// Require an attribute to be absent, e.g. `idNo[not(@type)]`.
    pub fn without_attr(mut self, key: &str) -> Self {
        self.attr_absent = Some(key.to_string());
        self
    }

    pub fn matches(&self, tree: &XmlTree, id: NodeId) -> bool {
        if tree.name(id) != Some(self.name.as_str()) {
            return false;
        }
        if let Some((key, value)) = &self.attr_eq {
            if tree.attr(id, key) != Some(value.as_str()) {
                return false;
            }
        }
        if let Some(key) = &self.attr_present {
            if tree.attr(id, key).is_none() {
                return false;
            }
        }
        if let Some(key) = &self.attr_absent {
            if tree.attr(id, key).is_some() {
                return false;
            }
        }
        true
    }
}
