//! Element stripping and Canonical XML 1.1 (non-exclusive, no comments)
//! serialization.
//!
//! The canonicalizer sorts namespace-declaration attributes ahead of regular
//! attributes, then sorts each group lexicographically by raw qualified
//! name. True C14N attribute ordering is defined over expanded
//! `(namespace-URI, local-name)` pairs; ZATCA invoices use a fixed, small
//! set of well-known prefixes (`cbc`, `cac`, `ext`, `ds`, `xades`, ...) that
//! never collide under a raw-name sort, so this crate sorts by qualified
//! name rather than carrying a namespace-resolution pass. This is recorded
//! as an explicit simplification, not an oversight.

use crate::dom::{Element, Node};

/// Remove every descendant `ext:UBLExtensions` element.
pub fn strip_ubl_extensions(root: &mut Element) {
    retain_except(root, "ext:UBLExtensions");
}

/// Remove every descendant `cac:Signature` element.
pub fn strip_signature(root: &mut Element) {
    retain_except(root, "cac:Signature");
}

/// Remove every descendant `cac:AdditionalDocumentReference` whose child
/// `cbc:ID` text is exactly `"QR"`.
pub fn strip_qr_reference(root: &mut Element) {
    root.children.retain_mut(|node| match node {
        Node::Element(e) if e.name == "cac:AdditionalDocumentReference" => {
            e.find_text("cbc:ID").as_deref() != Some("QR")
        }
        Node::Element(e) => {
            strip_qr_reference(e);
            true
        }
        Node::Text(_) => true,
    });
}

fn retain_except(root: &mut Element, name: &str) {
    root.children.retain_mut(|node| match node {
        Node::Element(e) if e.name == name => false,
        Node::Element(e) => {
            retain_except(e, name);
            true
        }
        Node::Text(_) => true,
    });
}

/// Serialize an element tree as Canonical XML 1.1, non-exclusive, without
/// comments: no XML declaration, attributes sorted (namespace declarations
/// first), no self-closing tags, entity references restricted to the set
/// C14N requires.
#[must_use]
pub fn serialize_canonical(root: &Element) -> Vec<u8> {
    let mut out = Vec::new();
    write_element(root, &mut out);
    out
}

fn write_element(e: &Element, out: &mut Vec<u8>) {
    out.push(b'<');
    out.extend_from_slice(e.name.as_bytes());

    let mut ns_attrs: Vec<&(String, String)> = Vec::new();
    let mut other_attrs: Vec<&(String, String)> = Vec::new();
    for a in &e.attrs {
        if a.0 == "xmlns" || a.0.starts_with("xmlns:") {
            ns_attrs.push(a);
        } else {
            other_attrs.push(a);
        }
    }
    ns_attrs.sort_by(|a, b| a.0.cmp(&b.0));
    other_attrs.sort_by(|a, b| a.0.cmp(&b.0));

    for (k, v) in ns_attrs.into_iter().chain(other_attrs) {
        out.push(b' ');
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape_attr(v).as_bytes());
        out.push(b'"');
    }
    out.push(b'>');

    for child in &e.children {
        match child {
            Node::Element(c) => write_element(c, out),
            Node::Text(t) => out.extend_from_slice(escape_text(t).as_bytes()),
        }
    }

    out.extend_from_slice(b"</");
    out.extend_from_slice(e.name.as_bytes());
    out.push(b'>');
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}
