//! A minimal, whitespace-preserving XML tree. The pipeline needs exactly
//! enough DOM to (a) strip a handful of named elements and (b) re-serialize
//! in C14N 1.1 form; it never needs schema awareness, entity expansion
//! beyond the five predefined XML entities, or streaming.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use zatca_core::{SignError, SignResult};

/// A parsed XML node: either an element or a run of character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element, with its qualified name (`prefix:local` or bare `local`),
    /// attributes in source order, and children.
    Element(Element),
    /// Text content (entities already resolved; CDATA sections are folded
    /// into plain text, matching C14N's treatment of CDATA).
    Text(String),
}

/// An XML element: tag name, attributes (source order, not yet
/// canonically sorted), and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified tag name, e.g. `"cac:Signature"`.
    pub name: String,
    /// Attribute `(qualified-name, value)` pairs in source order, values
    /// already entity-decoded.
    pub attrs: Vec<(String, String)>,
    /// Child nodes in source order.
    pub children: Vec<Node>,
}

impl Element {
    /// First direct child element with the given qualified name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Depth-first search for the first descendant element (including
    /// self) with the given qualified name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        for n in &self.children {
            if let Node::Element(e) = n {
                if let Some(found) = e.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Concatenated direct text children (no descent into child elements).
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Value of the attribute with the given qualified name, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// `find` followed by `text()`, the common case of reading a leaf value
    /// by tag name anywhere under this element.
    #[must_use]
    pub fn find_text(&self, name: &str) -> Option<String> {
        self.find(name).map(Element::text)
    }
}

/// Parse a full XML document into its single root element. Leading/trailing
/// whitespace, the XML declaration, comments, and processing instructions
/// outside the document element are discarded; none of them survive C14N
/// anyway (the declaration is explicitly excluded, comments are dropped by
/// the non-`WithComments` variant this pipeline always uses).
///
/// # Errors
/// Returns [`SignError::InvoiceParse`] on malformed XML, and
/// [`SignError::Encoding`] if the input is not valid UTF-8.
pub fn parse(xml: &[u8]) -> SignResult<Element> {
    std::str::from_utf8(xml).map_err(|e| SignError::Encoding(e.to_string()))?;

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SignError::InvoiceParse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let name = decode_name(e.name().as_ref())?;
                let attrs = decode_attrs(&e)?;
                stack.push(Element { name, attrs, children: Vec::new() });
            }
            Event::Empty(e) => {
                let name = decode_name(e.name().as_ref())?;
                let attrs = decode_attrs(&e)?;
                let elem = Element { name, attrs, children: Vec::new() };
                push_node(&mut stack, &mut root, Node::Element(elem))?;
            }
            Event::End(_) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| SignError::InvoiceParse("unmatched end tag".into()))?;
                push_node(&mut stack, &mut root, Node::Element(elem))?;
            }
            Event::Text(t) => {
                let text = unescape(&t.into_inner())?;
                if !text.is_empty() {
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Node::Text(text));
                    }
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8(c.into_inner().to_vec())
                    .map_err(|e| SignError::Encoding(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(text));
                }
            }
            Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    root.ok_or_else(|| SignError::InvoiceParse("no document element".into()))
}

fn push_node(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    node: Node,
) -> SignResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(e) => *root = Some(e),
            Node::Text(_) => {}
        },
    }
    Ok(())
}

fn decode_name(raw: &[u8]) -> SignResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| SignError::Encoding(e.to_string()))
}

fn decode_attrs(e: &quick_xml::events::BytesStart<'_>) -> SignResult<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|e| SignError::InvoiceParse(e.to_string()))?;
        let key = decode_name(a.key.as_ref())?;
        let value = unescape(&a.value)?;
        attrs.push((key, value));
    }
    Ok(attrs)
}

/// Resolve the five predefined XML entities and numeric character
/// references. Invoice XML never relies on DTD-defined general entities.
fn unescape(raw: &[u8]) -> SignResult<String> {
    let s = std::str::from_utf8(raw).map_err(|e| SignError::Encoding(e.to_string()))?;
    if !s.as_bytes().contains(&b'&') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            let rest = &s[i..];
            if let Some(semi) = rest.find(';') {
                let entity = &rest[1..semi];
                let resolved = match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "apos" => Some('\''),
                    "quot" => Some('"'),
                    _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                        u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                    }
                    _ if entity.starts_with('#') => {
                        entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                    }
                    _ => None,
                };
                if let Some(c) = resolved {
                    out.push(c);
                    i += semi + 1;
                    continue;
                }
            }
        }
        let ch = match s[i..].chars().next() {
            Some(c) => c,
            None => unreachable!("i < bytes.len() and i is always on a char boundary"),
        };
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attrs() {
        let xml = br#"<a x="1"><b>hello</b><c y="2"/></a>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().text(), "hello");
        assert_eq!(root.child("c").unwrap().attr("y"), Some("2"));
    }

    #[test]
    fn resolves_entities_in_text_and_attrs() {
        let xml = br#"<a x="&quot;q&quot; &amp; r">A &amp; B &lt;tag&gt;</a>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.attr("x"), Some("\"q\" & r"));
        assert_eq!(root.text(), "A & B <tag>");
    }

    #[test]
    fn finds_nested_text_by_name() {
        let xml = br#"<Invoice><cac:Party><cbc:Name>Acme</cbc:Name></cac:Party></Invoice>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.find_text("cbc:Name").as_deref(), Some("Acme"));
    }

    #[test]
    fn rejects_malformed_xml() {
        let xml = b"<a><b></a>";
        assert!(parse(xml).is_err());
    }
}
