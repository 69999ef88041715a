//! Tolerant HTML-to-TEI fragment conversion.
//!
//! Comment bodies arrive as HTML fragments from a commenting tool and are
//! not guaranteed to be well formed. This pass converts them into TEI markup
//! in a single scan that always produces a well-formed subtree: known tags
//! are mapped to their TEI equivalents, unknown tags are dropped with their
//! children kept, unclosed tags are closed at the end of the fragment and
//! stray close tags are ignored.

use crate::xml::{NodeId, XmlTree};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FragmentError {
    #[error("empty HTML fragment")]
    Empty,
}

/// How one source tag maps into the output tree.
enum Mapped {
    /// A TEI element with fixed attributes.
    Element {
        name: &'static str,
        attrs: Vec<(String, String)>,
    },
    /// A childless TEI element (line breaks).
    Void { name: &'static str },
    /// Tag dropped, children kept.
    Transparent,
}

/// Convert an HTML fragment into TEI markup under a new `seg[type=seg_type]`
/// element appended to `parent`. Returns the new segment's node id.
pub fn append_html_fragment(
    tree: &mut XmlTree,
    parent: NodeId,
    html: &str,
    seg_type: &str,
) -> Result<NodeId, FragmentError> {
    let html = html.trim();
    if html.is_empty() {
        return Err(FragmentError::Empty);
    }

    let root = tree.push_element(parent, "seg");
    tree.set_attr(root, "type", seg_type);

    // Open-tag stack. Transparent entries reuse their parent's output node so
    // close tags still pair up with what was opened.
    let mut open: Vec<Open> = Vec::new();

    let mut rest = html;
    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            push_text(tree, current(&open, root), rest);
            break;
        };
        if lt > 0 {
            push_text(tree, current(&open, root), &rest[..lt]);
        }
        rest = &rest[lt..];

        if rest.starts_with("<!--") {
            rest = match rest.find("-->") {
                Some(end) => &rest[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(gt) = rest.find('>') else {
            // No closing bracket: the rest is literal text.
            push_text(tree, current(&open, root), rest);
            break;
        };
        let inner = &rest[1..gt];
        rest = &rest[gt + 1..];

        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim().to_ascii_lowercase();
            if let Some(pos) = open.iter().rposition(|o| o.source_name == name) {
                open.truncate(pos);
            }
            continue;
        }

        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }

        let self_closing = inner.trim_end().ends_with('/');
        let inner = inner.trim_end().trim_end_matches('/');
        let name_end = inner
            .find(|c: char| c.is_whitespace())
            .unwrap_or(inner.len());
        let name = inner[..name_end].to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let attrs = parse_attrs(&inner[name_end..]);

        match map_tag(&name, &attrs) {
            Mapped::Element { name: out_name, attrs } => {
                let node = tree.push_element(current(&open, root), out_name);
                for (key, value) in attrs {
                    tree.set_attr(node, &key, &value);
                }
                if !self_closing {
                    open.push(Open {
                        source_name: name,
                        node,
                    });
                }
            }
            Mapped::Void { name: out_name } => {
                tree.push_element(current(&open, root), out_name);
            }
            Mapped::Transparent => {
                if !self_closing {
                    let node = current(&open, root);
                    open.push(Open {
                        source_name: name,
                        node,
                    });
                }
            }
        }
    }

    // Unclosed tags are implicitly closed at the end of the fragment.
    Ok(root)
}

struct Open {
    source_name: String,
    node: NodeId,
}

fn current(open: &[Open], root: NodeId) -> NodeId {
    open.last().map(|o| o.node).unwrap_or(root)
}

fn push_text(tree: &mut XmlTree, parent: NodeId, raw: &str) {
    let decoded = html_escape::decode_html_entities(raw);
    if !decoded.is_empty() {
        tree.push_text(parent, &decoded);
    }
}

fn parse_attrs(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = input;
    loop {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();
        let Some(quote) = rest.chars().next() else { break };
        if quote != '"' && quote != '\'' {
            break;
        }
        rest = &rest[1..];
        let Some(end) = rest.find(quote) else { break };
        let value = html_escape::decode_html_entities(&rest[..end]).into_owned();
        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = &rest[end + 1..];
    }
    attrs
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn map_tag(name: &str, attrs: &[(String, String)]) -> Mapped {
    let hi = |rend: &str| Mapped::Element {
        name: "hi",
        attrs: vec![("rend".to_string(), rend.to_string())],
    };
    match name {
        "p" => Mapped::Element {
            name: "p",
            attrs: Vec::new(),
        },
        "b" | "strong" => hi("bold"),
        "i" | "em" => hi("italic"),
        "u" => hi("underline"),
        "sup" => hi("superscript"),
        "sub" => hi("subscript"),
        "a" => {
            let mut out = Vec::new();
            if let Some(href) = attr(attrs, "href") {
                out.push(("target".to_string(), href.to_string()));
            }
            Mapped::Element {
                name: "ref",
                attrs: out,
            }
        }
        "ul" | "ol" => Mapped::Element {
            name: "list",
            attrs: Vec::new(),
        },
        "li" => Mapped::Element {
            name: "item",
            attrs: Vec::new(),
        },
        "br" => Mapped::Void { name: "lb" },
        "span" | "div" => Mapped::Element {
            name: "seg",
            attrs: Vec::new(),
        },
        // TEI seg passed through with its type, used by the lemma-break
        // pre-substitution.
        "seg" => {
            let mut out = Vec::new();
            if let Some(seg_type) = attr(attrs, "type") {
                out.push(("type".to_string(), seg_type.to_string()));
            }
            Mapped::Element {
                name: "seg",
                attrs: out,
            }
        }
        _ => Mapped::Transparent,
    }
}
