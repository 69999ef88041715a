//! Pre-parse byte normalization.
//!
//! These fixups run on raw bytes because well-formedness cannot be assumed
//! yet: master files come straight out of editors and commenting tools. Each
//! rule is pinned by byte-level fixture tests; none of them should be
//! generalized into post-parse tree operations.

use std::sync::OnceLock;

use regex::bytes::{NoExpand, Regex};

/// Apply all pre-parse fixups in order: namespace rewrite, stylesheet PI
/// removal, optional delete-span excision, end-anchor repositioning.
pub fn normalize(bytes: &[u8], namespace_uri: &str, remove_del_spans: bool) -> Vec<u8> {
    let out = rewrite_namespace(bytes, namespace_uri);
    let out = strip_stylesheet_pi(&out);
    let out = if remove_del_spans {
        remove_delete_spans(&out)
    } else {
        out
    };
    move_end_anchors(&out)
}

/// Rewrite every `xmlns="..."` declaration to the canonical namespace URI.
/// Source files declare project-specific namespaces that downstream queries
/// do not expect.
pub fn rewrite_namespace(bytes: &[u8], namespace_uri: &str) -> Vec<u8> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"xmlns="[^"\r\n]*""#).expect("valid regex"));
    let replacement = format!(r#"xmlns="{namespace_uri}""#);
    re.replace_all(bytes, NoExpand(replacement.as_bytes()))
        .into_owned()
}

/// Drop any `<?xml-stylesheet ...?>` processing instruction.
pub fn strip_stylesheet_pi(bytes: &[u8]) -> Vec<u8> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<\?xml-stylesheet.*?\?>").expect("valid regex"));
    re.replace_all(bytes, NoExpand(b"")).into_owned()
}

/// Move an end anchor placed just before the closing tag of an enclosing
/// inline element to after that closing tag. Commenting tools put the anchor
/// on the wrong side, which breaks the ancestor-axis position classification
/// that expects the anchor to be a sibling of the annotated span.
pub fn move_end_anchors(bytes: &[u8]) -> Vec<u8> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(<anchor[^/]+xml:id="end[^/]+/>)(</(?:persName|placeName|title|reg|foreign|rs)>)"#,
        )
        .expect("valid regex")
    });
    re.replace_all(bytes, &b"$2$1"[..]).into_owned()
}

/// Excise tracked-deletion spans from the byte stream.
///
/// Each span starts at a `<delSpan` open tag and runs through the `>` of the
/// first tag after it carrying an `id="del...` attribute (in practice the
/// `<anchor xml:id="del..."/>` the delSpan's `spanTo` points at). When no
/// such marker follows, the span runs through the matching `</delSpan>`
/// close tag; an unterminated span swallows the rest of the input.
pub fn remove_delete_spans(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut current = 0;

    while let Some(start) = find(bytes, b"<delSpan", current) {
        out.extend_from_slice(&bytes[current..start]);

        // End of the delSpan open tag itself; the end marker is searched
        // after it so an id on the open tag does not terminate the span.
        let open_end = find(bytes, b">", start).map(|p| p + 1).unwrap_or(bytes.len());

        current = match find(bytes, b"id=\"del", open_end) {
            Some(marker) => find(bytes, b">", marker)
                .map(|p| p + 1)
                .unwrap_or(bytes.len()),
            None => match find(bytes, b"</delSpan", open_end) {
                Some(close) => find(bytes, b">", close)
                    .map(|p| p + 1)
                    .unwrap_or(bytes.len()),
                None => bytes.len(),
            },
        };
    }
    out.extend_from_slice(&bytes[current..]);
    out
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
