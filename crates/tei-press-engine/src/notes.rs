//! Merging editorial comments into the annotations document.
//!
//! Comment records come from a separate annotations store; each one is tied
//! to the reading text by a pair of anchor elements (`start<id>` /
//! `end<id>`) planted by the commenting tool. The merger classifies each
//! anchor's position by walking the ancestor axis of the numbered reading
//! text, then writes a `<note>` per comment into a `div[@type="notes"]`
//! container of the annotations document.

use tracing::warn;

use crate::config::PipelineConfig;
use crate::fragment::{self, FragmentError};
use crate::xml::{NodeId, Selector, XmlDocument};

/// One comment row from the annotations store. Never mutated by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: i64,
    /// Selection excerpt with literal `[...]` elision markers.
    pub shortened_selection: String,
    /// HTML fragment from the commenting tool.
    pub description: String,
}

/// Typed link between a comment and its anchor pair in the reading text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentAnchorId(pub i64);

impl CommentAnchorId {
    pub fn start(&self) -> String {
        format!("start{}", self.0)
    }

    pub fn end(&self) -> String {
        format!("end{}", self.0)
    }
}

/// Merge comment records into `doc`, resolving each comment's textual
/// position against `reading_text`. Comments whose start anchor is missing
/// from the reading text are dropped silently: the source note does not
/// correspond to any location in this document revision.
pub fn merge_comments(
    doc: &mut XmlDocument,
    reading_text: &XmlDocument,
    comments: &[CommentRecord],
    config: &PipelineConfig,
) {
    let body = match doc.find(doc.root(), &Selector::name("body")) {
        Some(body) => body,
        None => doc.root(),
    };
    let notes_sel = Selector::name("div").with_attr("type", "notes");
    let notes_div = doc.get_or_create(body, &notes_sel, "div");
    doc.tree_mut().set_attr(notes_div, "type", "notes");

    for comment in comments {
        let anchor = CommentAnchorId(comment.id);
        let Some(position) = note_position(reading_text, anchor, config) else {
            continue;
        };

        let note = doc.tree_mut().push_element(notes_div, "note");
        doc.tree_mut().set_attr(note, "type", "editor");
        doc.tree_mut().set_attr(note, "id", &format!("en{}", comment.id));
        doc.tree_mut()
            .set_attr(note, "target", &format!("#{}", anchor.start()));

        if !position.is_empty() {
            let seg = doc.tree_mut().push_element(note, "seg");
            doc.tree_mut().set_attr(seg, "type", "notePosition");
            doc.tree_mut().set_text(seg, &position);

            let chapter = chapter_of_position(&position);
            if !chapter.is_empty() {
                let seg = doc.tree_mut().push_element(note, "seg");
                doc.tree_mut().set_attr(seg, "type", "noteSection");
                doc.tree_mut().set_text(seg, &format!("ch{chapter}"));
            }
        }

        let lemma = comment
            .shortened_selection
            .replace("[...]", r#"<seg type="lemmaBreak">[...]</seg>"#);
        if let Err(e) = fragment::append_html_fragment(doc.tree_mut(), note, &lemma, "noteLemma") {
            warn!(comment_id = comment.id, error = %e, "comment lemma could not be converted");
        }

        // A failed body conversion is not fatal: the note and its position
        // are still written, only the text segment is omitted.
        match fragment::append_html_fragment(doc.tree_mut(), note, &comment.description, "noteText")
        {
            Ok(_) => {}
            Err(e @ FragmentError::Empty) => {
                warn!(comment_id = comment.id, error = %e, "comment body omitted");
            }
        }
    }
}

/// Resolve a comment's textual position in the reading text.
///
/// Returns `None` when the start anchor does not exist (the comment is
/// dropped), an empty string when the anchor exists but sits in no
/// classifiable ancestor, and otherwise either a single position or a
/// `start–end` range.
pub fn note_position(
    reading_text: &XmlDocument,
    anchor: CommentAnchorId,
    config: &PipelineConfig,
) -> Option<String> {
    let start_anchor = reading_text.find(
        reading_text.root(),
        &Selector::name("anchor").with_attr("xml:id", &anchor.start()),
    )?;

    let start = classify_start(reading_text, start_anchor, config);

    // Footnote-anchored comments have no meaningful end position.
    if start == config.labels.footnote {
        return Some(start);
    }

    let end = reading_text
        .find(
            reading_text.root(),
            &Selector::name("anchor").with_attr("xml:id", &anchor.end()),
        )
        .map(|end_anchor| classify_end(reading_text, end_anchor))
        .unwrap_or_default();

    if start.is_empty() {
        return Some(String::new());
    }
    if !end.is_empty() && end != start {
        Some(format!("{start}\u{2013}{end}"))
    } else {
        Some(start)
    }
}

/// Ancestor-axis classification for the start anchor, in precedence order:
/// footnote, numbered p / l / lg / list, header (except letter heads),
/// dateline, otherwise empty.
fn classify_start(doc: &XmlDocument, anchor: NodeId, config: &PipelineConfig) -> String {
    if doc
        .find_ancestor(anchor, &Selector::name("note").with_attr_present("place"))
        .is_some()
    {
        return config.labels.footnote.to_string();
    }
    if let Some(position) = numbered_ancestor(doc, anchor, &["p", "lg", "list"]) {
        return position;
    }
    if let Some(head) = doc.find_ancestor(anchor, &Selector::name("head")) {
        // Letter heads are excluded from the header classification and fall
        // through to no further check.
        return match doc.tree().attr(head, "type") {
            Some("letter") => String::new(),
            _ => config.labels.header.to_string(),
        };
    }
    if doc
        .find_ancestor(anchor, &Selector::name("dateline"))
        .is_some()
    {
        return config.labels.date.to_string();
    }
    String::new()
}

/// End anchors only classify against numbered block ancestors.
fn classify_end(doc: &XmlDocument, anchor: NodeId) -> String {
    numbered_ancestor(doc, anchor, &["p", "list", "lg"]).unwrap_or_default()
}

/// Nearest ancestor among `p[@xml:id]`, `l[@n]` and the given id-bearing
/// block names, in that precedence. Line positions use the `n` attribute
/// prefixed with `l`.
fn numbered_ancestor(doc: &XmlDocument, anchor: NodeId, id_blocks: &[&str]) -> Option<String> {
    for &name in id_blocks {
        if name == "p" {
            if let Some(p) = doc.find_ancestor(anchor, &Selector::name("p").with_attr_present("xml:id")) {
                return doc.tree().attr(p, "xml:id").map(str::to_string);
            }
            if let Some(l) = doc.find_ancestor(anchor, &Selector::name("l").with_attr_present("n")) {
                return doc.tree().attr(l, "n").map(|n| format!("l{n}"));
            }
            continue;
        }
        if let Some(node) =
            doc.find_ancestor(anchor, &Selector::name(name).with_attr_present("xml:id"))
        {
            return doc.tree().attr(node, "xml:id").map(str::to_string);
        }
    }
    None
}

/// Digits of the position text before its first underscore, the chapter part
/// of a chapter-relative block id.
fn chapter_of_position(position: &str) -> String {
    match position.split_once('_') {
        Some((head, _)) => head.chars().filter(|c| c.is_ascii_digit()).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::LoadOptions;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn doc(xml: &str) -> XmlDocument {
        XmlDocument::from_bytes(xml.as_bytes(), crate::config::TEI_NAMESPACE, LoadOptions::default())
            .unwrap()
    }

    fn reading_text() -> XmlDocument {
        doc(r#"<TEI xmlns="urn:x"><text><body>
            <div type="chapter" id="ch3">
                <p xml:id="p3_1">text <anchor xml:id="start1"/>lemma<anchor xml:id="end1"/> more</p>
                <p xml:id="p3_2">tail <anchor xml:id="end2"/></p>
            </div>
            <note place="foot">foot <anchor xml:id="start7"/> note</note>
            <head><anchor xml:id="start8"/></head>
            <head type="letter"><anchor xml:id="start9"/></head>
            <dateline><anchor xml:id="start10"/></dateline>
            <lg xml:id="lg1"><l n="4">line <anchor xml:id="start11"/></l></lg>
            <p xml:id="p3_3"><anchor xml:id="start2"/>spans</p>
        </body></text></TEI>"#)
    }

    fn comment(id: i64) -> CommentRecord {
        CommentRecord {
            id,
            shortened_selection: "before [...] after".to_string(),
            description: "<p>an <b>explanation</b></p>".to_string(),
        }
    }

    fn empty_com_doc() -> XmlDocument {
        doc(r#"<TEI xmlns="urn:x"><text><body/></text></TEI>"#)
    }

    #[test]
    fn position_inside_numbered_paragraph() {
        let rt = reading_text();
        let pos = note_position(&rt, CommentAnchorId(1), &PipelineConfig::default());
        assert_eq!(pos, Some("p3_1".to_string()));
    }

    #[test]
    fn position_spanning_paragraphs_uses_en_dash_range() {
        let rt = reading_text();
        let pos = note_position(&rt, CommentAnchorId(2), &PipelineConfig::default());
        assert_eq!(pos, Some("p3_3\u{2013}p3_2".to_string()));
    }

    #[test]
    fn footnote_wins_over_everything_and_skips_end_anchor() {
        let rt = reading_text();
        let pos = note_position(&rt, CommentAnchorId(7), &PipelineConfig::default());
        assert_eq!(pos, Some("footnote".to_string()));
    }

    #[test]
    fn header_classification_excludes_letter_heads() {
        let rt = reading_text();
        let config = PipelineConfig::default();
        assert_eq!(
            note_position(&rt, CommentAnchorId(8), &config),
            Some("header".to_string())
        );
        // Letter heads fall through to no classification at all.
        assert_eq!(
            note_position(&rt, CommentAnchorId(9), &config),
            Some(String::new())
        );
    }

    #[test]
    fn dateline_classifies_as_date() {
        let rt = reading_text();
        let pos = note_position(&rt, CommentAnchorId(10), &PipelineConfig::default());
        assert_eq!(pos, Some("date".to_string()));
    }

    #[test]
    fn numbered_line_prefixed_with_l() {
        let rt = reading_text();
        let pos = note_position(&rt, CommentAnchorId(11), &PipelineConfig::default());
        assert_eq!(pos, Some("l4".to_string()));
    }

    #[test]
    fn missing_start_anchor_returns_none() {
        let rt = reading_text();
        assert_eq!(
            note_position(&rt, CommentAnchorId(999), &PipelineConfig::default()),
            None
        );
    }

    #[test]
    fn merge_writes_note_with_position_and_section() {
        let rt = reading_text();
        let mut com = empty_com_doc();
        merge_comments(&mut com, &rt, &[comment(1)], &PipelineConfig::default());

        let xml = com.to_xml_string();
        assert!(xml.contains(r#"<div type="notes">"#));
        assert!(xml.contains(r##"<note type="editor" id="en1" target="#start1">"##));
        assert!(xml.contains(r#"<seg type="notePosition">p3_1</seg>"#));
        assert!(xml.contains(r#"<seg type="noteSection">ch3</seg>"#));
        assert!(xml.contains(r#"<seg type="lemmaBreak">[...]</seg>"#));
        assert!(xml.contains(r#"<seg type="noteText"><p>an <hi rend="bold">explanation</hi></p></seg>"#));
    }

    #[test]
    fn dropped_comment_produces_no_note_and_processing_continues() {
        let rt = reading_text();
        let mut com = empty_com_doc();
        merge_comments(
            &mut com,
            &rt,
            &[comment(999), comment(1)],
            &PipelineConfig::default(),
        );

        let xml = com.to_xml_string();
        assert!(!xml.contains("en999"));
        assert!(xml.contains("en1"));
    }

    #[test]
    fn empty_body_omits_note_text_but_keeps_note() {
        let rt = reading_text();
        let mut com = empty_com_doc();
        let mut record = comment(1);
        record.description = "  ".to_string();
        merge_comments(&mut com, &rt, &[record], &PipelineConfig::default());

        let xml = com.to_xml_string();
        assert!(xml.contains("en1"));
        assert!(xml.contains(r#"<seg type="notePosition">p3_1</seg>"#));
        assert!(!xml.contains("noteText"));
    }

    #[test]
    fn merge_is_reusable_without_duplicating_notes_container() {
        let rt = reading_text();
        let mut com = empty_com_doc();
        merge_comments(&mut com, &rt, &[comment(1)], &PipelineConfig::default());
        merge_comments(&mut com, &rt, &[comment(7)], &PipelineConfig::default());

        let body = com.find(com.root(), &Selector::name("body")).unwrap();
        let divs = com.find_all(body, &Selector::name("div").with_attr("type", "notes"));
        assert_eq!(divs.len(), 1);
    }

    #[rstest]
    #[case("p12a_3", "12")]
    #[case("p3_1", "3")]
    #[case("l4", "")]
    #[case("footnote", "")]
    fn chapter_extraction_keeps_digits_only(#[case] position: &str, #[case] chapter: &str) {
        assert_eq!(chapter_of_position(position), chapter);
    }
}
