//! Apparatus type classification across sibling variant documents.

use crate::xml::{Selector, XmlDocument};

/// Classify every id-bearing `<app>` element of `base` against the `<app>`
/// elements with the same id in `siblings`.
///
/// Any pre-existing `type` attribute is stripped from every `app` element
/// first. The classification follows substring matches on sibling types with
/// precedence `sub` over `ort` over `int`; when no sibling contributes a
/// match the element ends up with no type attribute at all.
pub fn classify_variants(base: &mut XmlDocument, siblings: &[XmlDocument]) {
    let apps = base.find_all(base.root(), &Selector::name("app"));

    for app in apps {
        base.tree_mut().remove_attr(app, "type");

        let Some(id) = base.tree().attr(app, "id").map(str::to_string) else {
            continue;
        };

        let mut current = "";
        for sibling in siblings {
            let matching = sibling.find(
                sibling.root(),
                &Selector::name("app").with_attr("id", &id),
            );
            let Some(node) = matching else { continue };
            let Some(node_type) = sibling.tree().attr(node, "type") else {
                continue;
            };

            if node_type.contains("sub") {
                current = "sub";
            }
            if node_type.contains("ort") && current != "sub" {
                current = "ort";
            }
            if node_type.contains("int") && current != "sub" && current != "ort" {
                current = "int";
            }
        }

        if !current.is_empty() {
            base.tree_mut().set_attr(app, "type", current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::LoadOptions;

    fn doc(xml: &str) -> XmlDocument {
        XmlDocument::from_bytes(xml.as_bytes(), crate::config::TEI_NAMESPACE, LoadOptions::default())
            .unwrap()
    }

    fn app_type(doc: &XmlDocument, id: &str) -> Option<String> {
        let app = doc
            .find(doc.root(), &Selector::name("app").with_attr("id", id))
            .unwrap();
        doc.tree().attr(app, "type").map(str::to_string)
    }

    #[test]
    fn sub_wins_over_ort_and_int() {
        let mut base = doc(r#"<TEI xmlns="urn:x"><body><app id="x"/></body></TEI>"#);
        let siblings = vec![
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="orthographic"/></body></TEI>"#),
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="interpunction"/></body></TEI>"#),
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="substantial"/></body></TEI>"#),
        ];
        classify_variants(&mut base, &siblings);
        assert_eq!(app_type(&base, "x"), Some("sub".to_string()));
    }

    #[test]
    fn ort_wins_over_int() {
        let mut base = doc(r#"<TEI xmlns="urn:x"><body><app id="x"/></body></TEI>"#);
        let siblings = vec![
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="interpunction"/></body></TEI>"#),
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="orthographic"/></body></TEI>"#),
        ];
        classify_variants(&mut base, &siblings);
        assert_eq!(app_type(&base, "x"), Some("ort".to_string()));
    }

    #[test]
    fn stale_type_is_stripped_even_without_siblings() {
        let mut base =
            doc(r#"<TEI xmlns="urn:x"><body><app id="x" type="sub"/><app type="ort"/></body></TEI>"#);
        classify_variants(&mut base, &[]);
        assert_eq!(app_type(&base, "x"), None);
        assert!(!base.to_xml_string().contains("ort"));
    }

    #[test]
    fn app_without_id_or_match_keeps_no_type() {
        let mut base = doc(r#"<TEI xmlns="urn:x"><body><app id="y"/></body></TEI>"#);
        let siblings = vec![doc(
            r#"<TEI xmlns="urn:x"><body><app id="z" type="sub"/></body></TEI>"#,
        )];
        classify_variants(&mut base, &siblings);
        assert_eq!(app_type(&base, "y"), None);
    }
}
