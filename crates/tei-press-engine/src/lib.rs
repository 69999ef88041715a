//! Publication pipeline for digital scholarly editions.
//!
//! Master TEI files are normalized at the byte level, parsed into a mutable
//! tree, numbered, enriched with editorial comments and apparatus
//! classifications, and serialized to web-facing target files. The
//! [`publish`] module drives the whole pass with an mtime staleness gate.

pub mod config;
pub mod fragment;
pub mod header;
pub mod normalize;
pub mod notes;
pub mod number;
pub mod publish;
pub mod variants;
pub mod xml;

pub use config::{PipelineConfig, PositionLabels, TEI_NAMESPACE};
pub use fragment::FragmentError;
pub use header::Metadata;
pub use notes::{CommentAnchorId, CommentRecord};
pub use publish::{
    CommentSource, EstComPair, ManuscriptItem, NoComments, PublicationBatch, PublishError,
    PublishReport, Publisher, VariantItem,
};
pub use xml::{LoadError, LoadOptions, Selector, XmlDocument, XmlTree};
