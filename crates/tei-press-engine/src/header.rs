//! TEI header and document-level operations: root cleanup, whitespace
//! preservation, taxonomy declarations, metadata stamping and the title and
//! anchor lookups the regeneration driver needs.

use crate::config::PipelineConfig;
use crate::number;
use crate::xml::{Selector, XmlDocument};

const GENRE_CATEGORIES: &[(&str, &str)] = &[
    ("cg_poem", "Poem"),
    ("cg_letter", "Letter"),
    ("cg_childrensliterature", "Children's literature"),
    ("cg_diary", "Diary"),
    ("cg_nonfiction", "Non-fiction"),
    ("cg_prose", "Prose"),
    ("cg_drama", "Drama"),
];

const EDITORIAL_CATEGORIES: &[(&str, &str)] = &[
    ("ce_readingtext", "Reading text"),
    ("ce_introduction", "Introduction"),
    ("ce_titlepage", "Title Page"),
    ("ce_annotations", "Annotations"),
    ("ce_basetext", "Base text"),
    ("ce_version", "Version"),
    ("ce_manuscript", "Manuscript"),
];

/// Metadata stamped into a document header from the publication database.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub orig_date: String,
    pub item_id: String,
    pub main_title: String,
    pub genre: String,
    pub text_type: String,
    pub collection_id: String,
    pub group_id: String,
}

/// Make a loaded master document publication ready: strip root attributes,
/// preserve body whitespace, assign structural ids, declare taxonomies.
/// Reading texts and other texts (variants, manuscripts) share this
/// pipeline.
pub fn post_process(doc: &mut XmlDocument) {
    cleanup_root(doc);
    insert_preserve_space(doc);
    number::auto_number(doc, true);
    insert_class_decl(doc);
}

/// Remove all attributes from the root element. Namespace declarations are
/// kept: they are what the pre-parse normalization just canonicalized.
pub fn cleanup_root(doc: &mut XmlDocument) {
    let root = doc.root();
    doc.tree_mut()
        .retain_attrs(root, |name| name.starts_with("xmlns"));
}

/// Set `xml:space="preserve"` on the first body element.
pub fn insert_preserve_space(doc: &mut XmlDocument) {
    if let Some(body) = doc.find(doc.root(), &Selector::name("body")) {
        doc.tree_mut().set_attr(body, "xml:space", "preserve");
    }
}

/// Rebuild the genre and editorial `classDecl` taxonomies in the header.
/// Requires a `profileDesc`; documents without one are left untouched.
pub fn insert_class_decl(doc: &mut XmlDocument) {
    if doc.find(doc.root(), &Selector::name("profileDesc")).is_none() {
        return;
    }

    let encoding_desc = match doc.find(doc.root(), &Selector::name("encodingDesc")) {
        Some(existing) => existing,
        None => match doc.find(doc.root(), &Selector::name("teiHeader")) {
            Some(header) => doc.tree_mut().push_element(header, "encodingDesc"),
            None => return,
        },
    };

    let class_decl = doc.get_or_create(encoding_desc, &Selector::name("classDecl"), "classDecl");

    // Stale taxonomies are removed document-wide and rebuilt from scratch.
    for taxonomy_id in ["cat_genre", "cat_editorial"] {
        let stale = doc.find_all(
            doc.root(),
            &Selector::name("taxonomy").with_attr("xml:id", taxonomy_id),
        );
        for node in stale {
            doc.tree_mut().detach(node);
        }
    }

    write_taxonomy(doc, class_decl, "cat_genre", GENRE_CATEGORIES);
    write_taxonomy(doc, class_decl, "cat_editorial", EDITORIAL_CATEGORIES);
}

fn write_taxonomy(
    doc: &mut XmlDocument,
    class_decl: crate::xml::NodeId,
    taxonomy_id: &str,
    categories: &[(&str, &str)],
) {
    let taxonomy = doc.tree_mut().push_element(class_decl, "taxonomy");
    doc.tree_mut().set_attr(taxonomy, "xml:id", taxonomy_id);
    for (id, description) in categories {
        let category = doc.tree_mut().push_element(taxonomy, "category");
        doc.tree_mut().set_attr(category, "xml:id", id);
        let desc = doc.tree_mut().push_element(category, "catDesc");
        doc.tree_mut().set_text(desc, description);
    }
}

/// Stamp publication metadata into `profileDesc/creation` and `textClass`.
/// Every element is get-or-created, so re-stamping updates in place instead
/// of duplicating.
pub fn set_metadata(doc: &mut XmlDocument, metadata: &Metadata, config: &PipelineConfig) {
    let profile_desc = match doc.find(doc.root(), &Selector::name("profileDesc")) {
        Some(existing) => existing,
        None => match doc.find(doc.root(), &Selector::name("teiHeader")) {
            Some(header) => doc.tree_mut().push_element(header, "profileDesc"),
            None => return,
        },
    };

    let creation = doc.get_or_create(profile_desc, &Selector::name("creation"), "creation");

    if !metadata.orig_date.is_empty() {
        let elem = doc.get_or_create(creation, &Selector::name("origDate"), "origDate");
        doc.tree_mut().set_text(elem, &metadata.orig_date);
    }

    if !metadata.item_id.is_empty() {
        let elem = doc.get_or_create(
            creation,
            &Selector::name("idNo").without_attr("type"),
            "idNo",
        );
        doc.tree_mut().set_text(elem, &metadata.item_id);

        // Book id: the item id up to its first underscore.
        let elem = doc.get_or_create(
            creation,
            &Selector::name("idNo").with_attr("type", "bookid"),
            "idNo",
        );
        doc.tree_mut().set_attr(elem, "type", "bookid");
        if let Some((book_id, _)) = metadata.item_id.split_once('_') {
            let book_id = book_id.to_string();
            doc.tree_mut().set_text(elem, &book_id);
        }
    }

    if !metadata.collection_id.is_empty() {
        let elem = doc.get_or_create(
            creation,
            &Selector::name("idNo").with_attr("type", "collection"),
            "idNo",
        );
        doc.tree_mut().set_attr(elem, "type", "collection");
        doc.tree_mut().set_text(elem, &metadata.collection_id);
    }

    if !metadata.group_id.is_empty() {
        let elem = doc.get_or_create(
            creation,
            &Selector::name("idNo").with_attr("type", "group"),
            "idNo",
        );
        doc.tree_mut().set_attr(elem, "type", "group");
        doc.tree_mut().set_text(elem, &metadata.group_id);
    }

    if !metadata.main_title.is_empty() {
        let elem = doc.get_or_create(
            creation,
            &Selector::name("title").with_attr("type", "main"),
            "title",
        );
        doc.tree_mut().set_attr(elem, "type", "main");
        doc.tree_mut().set_text(elem, &metadata.main_title);
    }

    let text_class = doc.get_or_create(profile_desc, &Selector::name("textClass"), "textClass");

    let genre = metadata.genre.to_lowercase();
    if !genre.is_empty() {
        let genre_id = config.genres.get(&genre).cloned().unwrap_or(genre);
        let elem = doc.get_or_create(
            text_class,
            &Selector::name("catRef").with_attr("target", &genre_id),
            "catRef",
        );
        doc.tree_mut().set_attr(elem, "target", &genre_id);
    }

    let text_type = metadata.text_type.to_lowercase();
    let text_class_id = config
        .text_types
        .get(&text_type)
        .cloned()
        .unwrap_or(text_type);
    if !text_class_id.is_empty() {
        let elem = doc.get_or_create(
            text_class,
            &Selector::name("catRef").with_attr("target", &text_class_id),
            "catRef",
        );
        doc.tree_mut().set_attr(elem, "target", &text_class_id);
    }
}

/// The document's main title from `titleStmt/title`.
pub fn main_title(doc: &XmlDocument) -> Option<String> {
    let title_stmt = doc.find(doc.root(), &Selector::name("titleStmt"))?;
    let title = doc.find(title_stmt, &Selector::name("title"))?;
    Some(doc.tree().text(title))
}

/// A descriptive title from `profileDesc/creation/title[@type="desc"]`.
pub fn custom_title(doc: &XmlDocument) -> Option<String> {
    let profile_desc = doc.find(doc.root(), &Selector::name("profileDesc"))?;
    let creation = doc.find(profile_desc, &Selector::name("creation"))?;
    let title = doc.find(creation, &Selector::name("title").with_attr("type", "desc"))?;
    Some(doc.tree().text(title))
}

/// All comment note ids in the document: the suffixes of
/// `anchor[@xml:id="start..."]` elements, document order.
pub fn note_ids(doc: &XmlDocument) -> Vec<String> {
    doc.tree()
        .element_descendants(doc.root())
        .filter(|&n| doc.tree().name(n) == Some("anchor"))
        .filter_map(|n| doc.tree().attr(n, "xml:id"))
        .filter_map(|id| id.strip_prefix("start"))
        .map(str::to_string)
        .collect()
}
