//! Namespace-qualified lookups over the fixed configuration document shapes.

use roxmltree::{Document, Node};

use crate::ConfigError;

/// Namespace of `iocs.xml`.
pub(crate) const IOCS_NS: &str = "http://epics.isis.rl.ac.uk/schema/iocs/1.0";
/// Namespace of `components.xml`.
pub(crate) const COMPONENTS_NS: &str = "http://epics.isis.rl.ac.uk/schema/components/1.0";
/// Namespace of `blocks.xml`.
pub(crate) const BLOCKS_NS: &str = "http://epics.isis.rl.ac.uk/schema/blocks/1.0";
/// Namespace of the device screens document (trailing slash is part of it).
pub(crate) const DEVICES_NS: &str = "http://epics.isis.rl.ac.uk/schema/screens/1.0/";
/// Namespace of synoptic documents (the double slash is part of it).
pub(crate) const SYNOPTIC_NS: &str = "http://www.isis.stfc.ac.uk//instrument";

/// Parse `text`, naming the document in any error.
pub(crate) fn parse<'a>(document: &str, text: &'a str) -> Result<Document<'a>, ConfigError> {
    Document::parse(text).map_err(|source| ConfigError::Xml {
        document: document.to_string(),
        source,
    })
}

/// Every element named `{ns}name` at or below `node`, in document order.
pub(crate) fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: &'a str,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .filter(move |n| n.is_element() && n.has_tag_name((ns, name)))
}

/// First direct child element named `{ns}name`.
pub(crate) fn child<'a, 'input>(
    node: Node<'a, 'input>,
    ns: &str,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name((ns, name)))
}

/// First direct child element with local name `name`, in any namespace.
pub(crate) fn local_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Text of the first direct child `{ns}name`; `None` if the child is absent.
///
/// An empty child yields `Some("")`.
pub(crate) fn child_text<'a>(node: Node<'a, '_>, ns: &str, name: &str) -> Option<&'a str> {
    child(node, ns, name).map(|c| c.text().unwrap_or(""))
}

/// Text of a required child, or [`ConfigError::MissingElement`].
pub(crate) fn required_text<'a>(
    node: Node<'a, '_>,
    ns: &str,
    name: &'static str,
    parent: &'static str,
) -> Result<&'a str, ConfigError> {
    child_text(node, ns, name).ok_or(ConfigError::MissingElement {
        element: name,
        parent,
    })
}

/// A required attribute, or [`ConfigError::MissingElement`].
pub(crate) fn required_attr<'a>(
    node: Node<'a, '_>,
    name: &'static str,
    parent: &'static str,
) -> Result<&'a str, ConfigError> {
    node.attribute(name).ok_or(ConfigError::MissingElement {
        element: name,
        parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_elements_from_other_namespaces() {
        let text = format!(
            r#"<iocs xmlns="{IOCS_NS}" xmlns:b="{BLOCKS_NS}">
                 <ioc name="A"/>
                 <b:ioc name="B"/>
                 <ioc name="C"/>
               </iocs>"#
        );
        let doc = parse("iocs.xml", &text).unwrap();
        let names: Vec<_> = elements(doc.root(), IOCS_NS, "ioc")
            .filter_map(|n| n.attribute("name"))
            .collect();
        assert_eq!(names, ["A", "C"]);
    }

    #[test]
    fn unqualified_elements_do_not_match() {
        let doc = parse("iocs.xml", r#"<iocs><ioc name="A"/></iocs>"#).unwrap();
        assert_eq!(elements(doc.root(), IOCS_NS, "ioc").count(), 0);
    }

    #[test]
    fn empty_child_text_is_present_but_empty() {
        let text = format!(r#"<pv xmlns="{SYNOPTIC_NS}"><address/></pv>"#);
        let doc = parse("s.xml", &text).unwrap();
        let pv = doc.root_element();
        assert_eq!(child_text(pv, SYNOPTIC_NS, "address"), Some(""));
        assert_eq!(child_text(pv, SYNOPTIC_NS, "displayname"), None);
    }

    #[test]
    fn parse_errors_name_the_document() {
        let err = parse("blocks.xml", "<blocks>").unwrap_err();
        assert!(err.to_string().starts_with("blocks.xml is not well-formed XML"));
    }
}
