use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const TEI_NAMESPACE: &str = "http://www.tei-c.org/ns/1.0";

/// Immutable pipeline configuration, passed in at construction time.
///
/// Everything here used to be project-editable lookup tables: the canonical
/// namespace all sources are normalized to, the literal labels written for
/// non-block note positions, and the genre / text-type vocabulary mappings
/// used when stamping metadata into headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub namespace_uri: String,
    pub labels: PositionLabels,
    /// Project genre names (lowercased) to canonical `cg_` category ids.
    pub genres: BTreeMap<String, String>,
    /// Text type codes (est/com/ms/var) to canonical `ce_` category ids.
    pub text_types: BTreeMap<String, String>,
}

/// Literal position markers written into `seg[type=notePosition]` when a
/// comment anchor sits outside any numbered block element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionLabels {
    pub footnote: String,
    pub header: String,
    pub date: String,
}

impl Default for PositionLabels {
    fn default() -> Self {
        Self {
            footnote: "footnote".to_string(),
            header: "header".to_string(),
            date: "date".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let text_types = [
            ("est", "ce_readingtext"),
            ("com", "ce_annotations"),
            ("ms", "ce_manuscript"),
            ("var", "ce_version"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            namespace_uri: TEI_NAMESPACE.to_string(),
            labels: PositionLabels::default(),
            genres: BTreeMap::new(),
            text_types,
        }
    }
}
