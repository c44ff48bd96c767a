// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small namespace-aware XML tree.
//!
//! Decoding works on [`rxml`] events; encoding is hand-written because the
//! wire format of an XMPP stream is pinned down to the byte (the stream
//! opener is an element that is never closed, and namespace declarations
//! already established by the opener must not be repeated on every stanza).

use core::fmt;

use crate::ns;

/// An XML element: resolved namespace, local name, attributes in document
/// order, character data, and child elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    /// Resolved namespace URI; empty for no namespace.
    pub ns: String,
    /// Local name.
    pub name: String,
    /// Attributes in document order. Names carry the `xml:` prefix where
    /// the attribute lives in the XML namespace; all other attributes are
    /// unqualified.
    pub attrs: Vec<(String, String)>,
    /// Concatenated character data of this element.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    pub fn new<N: Into<String>, L: Into<String>>(ns: N, name: L) -> Element {
        Element {
            ns: ns.into(),
            name: name.into(),
            ..Element::default()
        }
    }

    /// Is this element `{ns}name`?
    pub fn is(&self, ns: &str, name: &str) -> bool {
        self.ns == ns && self.name == name
    }

    /// Look up an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set_attr<V: Into<String>>(&mut self, name: &str, value: V) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.into(),
            None => self.attrs.push((name.to_owned(), value.into())),
        }
    }

    /// Builder-style [`Element::set_attr`].
    pub fn with_attr<V: Into<String>>(mut self, name: &str, value: V) -> Element {
        self.set_attr(name, value);
        self
    }

    /// Builder-style character data.
    pub fn with_text<T: Into<String>>(mut self, text: T) -> Element {
        self.text = text.into();
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Element {
        self.children.push(child);
        self
    }

    /// First child matching `{ns}name`.
    pub fn child(&self, ns: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    /// All children matching `{ns}name`.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// Serialize into `out`, assuming the surrounding context has
    /// `parent_ns` as its default namespace.
    ///
    /// Elements in the `stream:` namespace use the prefix declared by the
    /// stream opener; elements in the parent namespace inherit it silently;
    /// anything else declares `xmlns`.
    pub fn serialize_into(&self, parent_ns: &str, out: &mut String) {
        let (tag, declare) = if self.ns == ns::STREAM {
            (format!("stream:{}", self.name), false)
        } else {
            (
                self.name.clone(),
                !self.ns.is_empty() && self.ns != parent_ns,
            )
        };
        out.push('<');
        out.push_str(&tag);
        if declare {
            out.push_str(" xmlns=\"");
            escape_into(&self.ns, out);
            out.push('"');
        }
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, out);
            out.push('"');
        }
        out.push('>');
        escape_into(&self.text, out);
        let child_ns = if self.ns.is_empty() { parent_ns } else { &self.ns };
        for child in &self.children {
            child.serialize_into(child_ns, out);
        }
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }

    /// Serialize the children only; this is the preserved "inner XML" of a
    /// stanza.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        escape_into(&self.text, &mut out);
        for child in &self.children {
            child.serialize_into(&self.ns, &mut out);
        }
        out
    }
}

impl fmt::Display for Element {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut out = String::new();
        self.serialize_into(ns::CLIENT, &mut out);
        fmt.write_str(&out)
    }
}

/// Append `s` to `out`, escaping the five XML-special characters.
pub fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

/// Escape a string for use in attribute or character data position.
pub fn escape(s: &str) -> String {
    let mut out = String::new();
    escape_into(s, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_nested_namespaces() {
        let el = Element::new(ns::CLIENT, "iq")
            .with_attr("id", "3")
            .with_attr("type", "set")
            .with_child(Element::new(ns::BIND, "bind"));
        assert_eq!(
            el.to_string(),
            "<iq id=\"3\" type=\"set\"><bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"></bind></iq>"
        );
    }

    #[test]
    fn serialize_escapes_text_and_attrs() {
        let el = Element::new(ns::CLIENT, "message")
            .with_attr("to", "a&b")
            .with_child(Element::new(ns::CLIENT, "body").with_text("&<!-- \""));
        assert_eq!(
            el.to_string(),
            "<message to=\"a&amp;b\"><body>&amp;&lt;!-- &quot;</body></message>"
        );
    }

    #[test]
    fn stream_prefix_is_not_redeclared() {
        let el = Element::new(ns::STREAM, "error")
            .with_child(Element::new(ns::STREAMS, "conflict"));
        assert_eq!(
            el.to_string(),
            "<stream:error><conflict xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\"></conflict></stream:error>"
        );
    }

    #[test]
    fn inner_xml_preserves_children() {
        let el = Element::new(ns::CLIENT, "message")
            .with_child(Element::new(ns::CLIENT, "body").with_text("foo!"));
        assert_eq!(el.inner_xml(), "<body>foo!</body>");
    }
}
