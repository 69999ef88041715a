//! Stable structural id assignment.
//!
//! Numbering is a pure function of document order and ancestor structure:
//! re-running it on an unchanged source reproduces identical ids, which the
//! mtime-gated regeneration and downstream note targets depend on.

use crate::xml::{NodeId, Selector, XmlDocument};

const BLOCK_CANDIDATES: &[&str] = &["p", "lg", "list", "sp", "castList"];

/// Assign `xml:id`s to block-level elements with chapter-relative counters,
/// optionally number poem lines, then number tables and headers globally.
pub fn auto_number(doc: &mut XmlDocument, number_lines: bool) {
    number_blocks(doc);
    if number_lines {
        number_poem_lines(doc);
    }
    number_flat(doc, "table", "table");
    number_flat(doc, "head", "h");
}

/// Number paragraph, line-group, list, speech and cast-list elements inside
/// `text/body`, in document order, with the counter restarting at 1 whenever
/// the enclosing chapter changes.
fn number_blocks(doc: &mut XmlDocument) {
    let candidates: Vec<NodeId> = doc
        .tree()
        .element_descendants(doc.root())
        .filter(|&n| {
            let name = doc.tree().name(n).unwrap_or_default();
            BLOCK_CANDIDATES.contains(&name) && is_inside_text_body(doc, n)
        })
        .collect();

    let chapter_sel = Selector::name("div").with_attr("type", "chapter");
    let mut counter = 1u32;
    // The chapter id is only updated when a candidate actually sits inside a
    // chapter div; candidates outside any chapter inherit the previous one.
    let mut div_id = String::new();
    let mut previous_div_id = String::new();

    for node in candidates {
        if let Some(chapter) = doc.find_ancestor(node, &chapter_sel) {
            div_id = doc.tree().attr(chapter, "id").unwrap_or_default().to_string();
        }
        if div_id != previous_div_id {
            counter = 1;
        }

        let prefix = node_prefix(doc.tree().name(node).unwrap_or_default());
        let value = match chapter_suffix(&div_id) {
            Some(suffix) => format!("{prefix}{suffix}_{counter}"),
            None => format!("{prefix}{counter}"),
        };
        doc.tree_mut().set_attr(node, "xml:id", &value);

        counter += 1;
        previous_div_id = div_id.clone();
    }
}

/// Chapter suffix: the chapter id minus its first two characters, only when
/// the id is longer than that.
fn chapter_suffix(div_id: &str) -> Option<String> {
    let mut chars = div_id.chars();
    chars.next()?;
    chars.next()?;
    let rest = chars.as_str();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn node_prefix(name: &str) -> &str {
    if name == "castList" {
        "cl"
    } else {
        name
    }
}

fn is_inside_text_body(doc: &XmlDocument, node: NodeId) -> bool {
    doc.tree().ancestors(node).any(|a| {
        doc.tree().name(a) == Some("body")
            && doc
                .tree()
                .parent(a)
                .and_then(|p| doc.tree().name(p))
                == Some("text")
    })
}

/// Number all `<l>` descendants of each `div[@type="poem"]` 1..N via the `n`
/// attribute, independently per poem.
fn number_poem_lines(doc: &mut XmlDocument) {
    let poem_sel = Selector::name("div").with_attr("type", "poem");
    let poems = doc.find_all(doc.root(), &poem_sel);
    for poem in poems {
        let lines = doc.find_all(poem, &Selector::name("l"));
        for (i, line) in lines.into_iter().enumerate() {
            doc.tree_mut().set_attr(line, "n", &(i + 1).to_string());
        }
    }
}

/// Flat global numbering for one element name, clearing any legacy `id`
/// attribute first.
fn number_flat(doc: &mut XmlDocument, element_name: &str, prefix: &str) {
    let nodes = doc.find_all(doc.root(), &Selector::name(element_name));
    for (i, node) in nodes.into_iter().enumerate() {
        doc.tree_mut().remove_attr(node, "id");
        doc.tree_mut()
            .set_attr(node, "xml:id", &format!("{prefix}{}", i + 1));
    }
}
