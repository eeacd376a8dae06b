//! Small XML helpers shared by the HTTP/XML brands and ONVIF

use std::borrow::Cow;
use xmltree::{Element, XMLNode};

use crate::error::{ApiError, Result};

/// Parse a response body into its root element
pub fn parse_root(body: &str) -> Result<Element> {
    Ok(Element::parse(body.trim().as_bytes())?)
}

/// First descendant (depth first, including `element` itself) with local name `name`
///
/// Namespace prefixes are not part of xmltree's element name, so `wsnt:Topic`
/// matches `"Topic"`.
pub fn find<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    if element.name == name {
        return Some(element);
    }
    element.children.iter().find_map(|node| match node {
        XMLNode::Element(child) => find(child, name),
        _ => None,
    })
}

/// All descendants with local name `name`, in document order
pub fn find_all<'a>(element: &'a Element, name: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    collect(element, name, &mut found);
    found
}

fn collect<'a>(element: &'a Element, name: &str, found: &mut Vec<&'a Element>) {
    for node in &element.children {
        if let XMLNode::Element(child) = node {
            if child.name == name {
                found.push(child);
            }
            collect(child, name, found);
        }
    }
}

/// Trimmed text of the first descendant called `name`
pub fn text(element: &Element, name: &str) -> Option<String> {
    find(element, name)
        .and_then(Element::get_text)
        .map(|t| t.trim().to_string())
}

/// Text of `name` parsed into `T`; missing elements yield `None`
pub fn parse_text<T: std::str::FromStr>(element: &Element, name: &str) -> Result<Option<T>> {
    match text(element, name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::ParseError(format!("<{name}> has unexpected value '{raw}'"))),
    }
}

/// Text of `name` parsed into `T`, failing when absent
pub fn require_text<T: std::str::FromStr>(element: &Element, name: &str) -> Result<T> {
    parse_text(element, name)?
        .ok_or_else(|| ApiError::ParseError(format!("missing <{name}>")))
}

pub fn escape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
        <s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
          <s:Body><Outer><Item> 1 </Item><Item>2</Item><Flag>true</Flag></Outer></s:Body>
        </s:Envelope>"#;

    #[test]
    fn test_find_ignores_prefixes() {
        let root = parse_root(DOC).unwrap();
        assert!(find(&root, "Body").is_some());
        assert_eq!(text(&root, "Item").as_deref(), Some("1"));
        assert_eq!(find_all(&root, "Item").len(), 2);
    }

    #[test]
    fn test_typed_text() {
        let root = parse_root(DOC).unwrap();
        assert_eq!(require_text::<bool>(&root, "Flag").unwrap(), true);
        assert_eq!(parse_text::<u32>(&root, "Missing").unwrap(), None);
        assert!(require_text::<u32>(&root, "Flag").is_err());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("Gate <A> & B"), "Gate &lt;A&gt; &amp; B");
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(parse_root("<open>"), Err(ApiError::ParseError(_))));
    }
}
