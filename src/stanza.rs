// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed representations of everything that travels on the XML stream:
//! the three stanza kinds, and the non-stanza stream objects used during
//! negotiation.

use core::fmt;

use crate::extension::Payload;
use crate::jid::Jid;
use crate::ns;
use crate::xml::{escape_into, Element};

/// Version of RFC 3920 that we implement.
pub const XMPP_VERSION: &str = "1.0";

/// Human-readable text with an optional language tag. Multiple instances
/// can appear together, letting software choose which language to present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Text {
    /// Value of the `xml:lang` attribute, empty if absent.
    pub lang: String,
    /// The text itself.
    pub value: String,
}

impl Text {
    /// Plain text without a language tag.
    pub fn plain<S: Into<String>>(value: S) -> Text {
        Text {
            lang: String::new(),
            value: value.into(),
        }
    }
}

/// The fields shared by the three core stanza types. See RFC 3920,
/// section 9. Filters may freely rewrite any of this.
#[derive(Clone, Debug, Default)]
pub struct Header {
    /// Destination of the stanza.
    pub to: Option<Jid>,
    /// Sender of the stanza.
    pub from: Option<Jid>,
    /// Stanza identifier, empty if absent.
    pub id: String,
    /// Stanza type attribute, empty if absent.
    pub type_: String,
    /// `xml:lang`, empty if absent.
    pub lang: String,
    /// The stanza's inner XML, preserved as received. Purely informational
    /// on outgoing stanzas; it is never re-encoded.
    pub innerxml: String,
    /// A stanza-level error, delivered inline and not fatal to the stream.
    pub error: Option<StanzaError>,
    /// Parsed extension payloads, in document order. This is the
    /// extensibility seam: parsers registered by extensions fill it.
    pub nested: Vec<Payload>,
}

impl Header {
    fn to_element(&self, name: &str) -> Element {
        let mut el = Element::new(ns::CLIENT, name);
        if let Some(to) = &self.to {
            el.set_attr("to", to.as_str());
        }
        if let Some(from) = &self.from {
            el.set_attr("from", from.as_str());
        }
        if !self.id.is_empty() {
            el.set_attr("id", &*self.id);
        }
        if !self.type_.is_empty() {
            el.set_attr("type", &*self.type_);
        }
        if !self.lang.is_empty() {
            el.set_attr("xml:lang", &*self.lang);
        }
        el
    }

    fn from_element(el: &Element) -> Header {
        Header {
            to: el.attr("to").map(Jid::from),
            from: el.attr("from").map(Jid::from),
            id: el.attr("id").unwrap_or("").to_owned(),
            type_: el.attr("type").unwrap_or("").to_owned(),
            lang: el.attr("xml:lang").unwrap_or("").to_owned(),
            innerxml: el.inner_xml(),
            error: el
                .child(ns::CLIENT, "error")
                .map(StanzaError::from_element),
            nested: Vec::new(),
        }
    }

    fn finish_element(&self, mut el: Element) -> Element {
        for payload in &self.nested {
            el.children.push(payload.to_element());
        }
        if let Some(error) = &self.error {
            el.children.push(error.to_element());
        }
        el
    }
}

/// iq stanza.
#[derive(Clone, Debug, Default)]
pub struct Iq {
    /// The common stanza fields.
    pub header: Header,
}

/// message stanza.
#[derive(Clone, Debug, Default)]
pub struct Message {
    /// The common stanza fields.
    pub header: Header,
    /// `<subject/>` children.
    pub subject: Vec<Text>,
    /// `<body/>` children.
    pub body: Vec<Text>,
    /// `<thread/>` child, if any.
    pub thread: Option<String>,
}

/// presence stanza.
#[derive(Clone, Debug, Default)]
pub struct Presence {
    /// The common stanza fields.
    pub header: Header,
    /// `<show/>` child, if any.
    pub show: Option<String>,
    /// `<status/>` children.
    pub status: Vec<Text>,
    /// `<priority/>` child, if any.
    pub priority: Option<String>,
}

/// One of the three core stanza types: iq, message, presence.
#[derive(Clone, Debug)]
pub enum Stanza {
    /// An `<iq/>` stanza.
    Iq(Iq),
    /// A `<message/>` stanza.
    Message(Message),
    /// A `<presence/>` stanza.
    Presence(Presence),
}

impl Stanza {
    /// The stanza's wrapper element name.
    pub fn name(&self) -> &'static str {
        match self {
            Stanza::Iq(_) => "iq",
            Stanza::Message(_) => "message",
            Stanza::Presence(_) => "presence",
        }
    }

    /// Shared access to the common fields.
    pub fn header(&self) -> &Header {
        match self {
            Stanza::Iq(iq) => &iq.header,
            Stanza::Message(m) => &m.header,
            Stanza::Presence(p) => &p.header,
        }
    }

    /// Mutable access to the common fields.
    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            Stanza::Iq(iq) => &mut iq.header,
            Stanza::Message(m) => &mut m.header,
            Stanza::Presence(p) => &mut p.header,
        }
    }

    pub(crate) fn to_element(&self) -> Element {
        match self {
            Stanza::Iq(iq) => iq.header.finish_element(iq.header.to_element("iq")),
            Stanza::Message(m) => {
                let mut el = m.header.to_element("message");
                for subject in &m.subject {
                    el.children.push(text_element("subject", subject));
                }
                for body in &m.body {
                    el.children.push(text_element("body", body));
                }
                if let Some(thread) = &m.thread {
                    el.children
                        .push(Element::new(ns::CLIENT, "thread").with_text(&**thread));
                }
                m.header.finish_element(el)
            }
            Stanza::Presence(p) => {
                let mut el = p.header.to_element("presence");
                if let Some(show) = &p.show {
                    el.children
                        .push(Element::new(ns::CLIENT, "show").with_text(&**show));
                }
                for status in &p.status {
                    el.children.push(text_element("status", status));
                }
                if let Some(priority) = &p.priority {
                    el.children
                        .push(Element::new(ns::CLIENT, "priority").with_text(&**priority));
                }
                p.header.finish_element(el)
            }
        }
    }

    /// Structural decode of a stanza wrapper element. Extension payloads
    /// are matched separately against the registry by the codec.
    pub(crate) fn from_element(el: &Element) -> Option<Stanza> {
        if el.ns != ns::CLIENT {
            return None;
        }
        let header = Header::from_element(el);
        match &*el.name {
            "iq" => Some(Stanza::Iq(Iq { header })),
            "message" => {
                let mut m = Message {
                    header,
                    ..Message::default()
                };
                for child in &el.children {
                    if child.is(ns::CLIENT, "subject") {
                        m.subject.push(element_text(child));
                    } else if child.is(ns::CLIENT, "body") {
                        m.body.push(element_text(child));
                    } else if child.is(ns::CLIENT, "thread") {
                        m.thread = Some(child.text.clone());
                    }
                }
                Some(Stanza::Message(m))
            }
            "presence" => {
                let mut p = Presence {
                    header,
                    ..Presence::default()
                };
                for child in &el.children {
                    if child.is(ns::CLIENT, "show") {
                        p.show = Some(child.text.clone());
                    } else if child.is(ns::CLIENT, "status") {
                        p.status.push(element_text(child));
                    } else if child.is(ns::CLIENT, "priority") {
                        p.priority = Some(child.text.clone());
                    }
                }
                Some(Stanza::Presence(p))
            }
            _ => None,
        }
    }
}

fn text_element(name: &str, text: &Text) -> Element {
    let mut el = Element::new(ns::CLIENT, name).with_text(&*text.value);
    if !text.lang.is_empty() {
        el.set_attr("xml:lang", &*text.lang);
    }
    el
}

fn element_text(el: &Element) -> Text {
    Text {
        lang: el.attr("xml:lang").unwrap_or("").to_owned(),
        value: el.text.clone(),
    }
}

/// A stanza-level error, RFC 3920 section 9.3. Not fatal to the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StanzaError {
    /// The error type attribute.
    pub type_: String,
    /// The defined condition element, if present.
    pub condition: Option<Element>,
}

impl StanzaError {
    fn from_element(el: &Element) -> StanzaError {
        StanzaError {
            type_: el.attr("type").unwrap_or("").to_owned(),
            condition: el.children.first().cloned(),
        }
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new(ns::CLIENT, "error");
        if !self.type_.is_empty() {
            el.set_attr("type", &*self.type_);
        }
        if let Some(condition) = &self.condition {
            el.children.push(condition.clone());
        }
        el
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(fmt, "{} ({})", condition.name, self.type_),
            None => write!(fmt, "unspecified error ({})", self.type_),
        }
    }
}

/// The `<stream:stream>` negotiation header. This element is special on
/// both sides: it is never closed, so it cannot go through the generic
/// element codec.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamOpen {
    /// The `to` attribute.
    pub to: String,
    /// The `from` attribute.
    pub from: String,
    /// The `id` attribute.
    pub id: String,
    /// The `xml:lang` attribute.
    pub lang: String,
    /// The `version` attribute.
    pub version: String,
}

impl StreamOpen {
    /// The opener a client sends to start (or restart) a stream towards
    /// `domain`.
    pub fn client(domain: &str) -> StreamOpen {
        StreamOpen {
            to: domain.to_owned(),
            version: XMPP_VERSION.to_owned(),
            ..StreamOpen::default()
        }
    }

    /// Serialize the opener by hand: element-opener text with escaped
    /// attributes and no closing tag, attributes omitted when empty.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("<stream:stream xmlns=\"");
        out.push_str(ns::CLIENT);
        out.push_str("\" xmlns:stream=\"");
        out.push_str(ns::STREAM);
        out.push('"');
        for (name, value) in [
            ("to", &self.to),
            ("from", &self.from),
            ("id", &self.id),
            ("xml:lang", &self.lang),
            ("version", &self.version),
        ] {
            if !value.is_empty() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, &mut out);
                out.push('"');
            }
        }
        out.push('>');
        out
    }
}

/// `<stream:error>` from the peer. Always fatal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamError {
    /// Local name of the defined condition child, if present.
    pub condition: String,
    /// Descriptive text, if present.
    pub text: Option<String>,
}

impl StreamError {
    pub(crate) fn from_element(el: &Element) -> StreamError {
        StreamError {
            condition: el
                .children
                .iter()
                .find(|c| c.ns == ns::STREAMS && c.name != "text")
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            text: el
                .child(ns::STREAMS, "text")
                .map(|c| c.text.clone()),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let condition = if self.condition.is_empty() {
            "undefined-condition"
        } else {
            &self.condition
        };
        match &self.text {
            Some(text) => write!(fmt, "{}: {}", condition, text),
            None => fmt.write_str(condition),
        }
    }
}

/// `<stream:features>`: what the server wants negotiated next.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features {
    /// `<starttls/>` advertised; `true` inside means it is required.
    pub starttls: Option<bool>,
    /// SASL mechanism names, in server preference order.
    pub mechanisms: Vec<String>,
    /// `<bind/>` advertised.
    pub bind: bool,
    /// `<session/>` advertised.
    pub session: bool,
}

impl Features {
    pub(crate) fn from_element(el: &Element) -> Features {
        Features {
            starttls: el
                .child(ns::TLS, "starttls")
                .map(|tls| tls.child(ns::TLS, "required").is_some()),
            mechanisms: el
                .child(ns::SASL, "mechanisms")
                .map(|mechs| {
                    mechs
                        .children_named(ns::SASL, "mechanism")
                        .map(|m| m.text.clone())
                        .collect()
                })
                .unwrap_or_default(),
            bind: el.child(ns::BIND, "bind").is_some(),
            session: el.child(ns::SESSION, "session").is_some(),
        }
    }
}

/// STARTTLS negotiation elements.
#[derive(Clone, Debug, PartialEq)]
pub enum Starttls {
    /// `<starttls/>`: our request to upgrade.
    Request,
    /// `<proceed/>`: the server is ready for the handshake.
    Proceed,
    /// `<failure/>`: the server refused the upgrade.
    Failure,
}

impl Starttls {
    pub(crate) fn from_element(el: &Element) -> Starttls {
        match &*el.name {
            "proceed" => Starttls::Proceed,
            _ => Starttls::Failure,
        }
    }

    pub(crate) fn to_element(&self) -> Element {
        let name = match self {
            Starttls::Request => "starttls",
            Starttls::Proceed => "proceed",
            Starttls::Failure => "failure",
        };
        Element::new(ns::TLS, name)
    }
}

/// SASL negotiation elements. `Auth` and `Response` travel towards the
/// server, the rest towards us.
#[derive(Clone, Debug, PartialEq)]
pub enum Auth {
    /// `<auth mechanism="…">`: mechanism selection with optional initial
    /// response.
    Auth {
        /// Selected mechanism name.
        mechanism: String,
        /// Base64 initial response, empty for none.
        data: String,
    },
    /// `<challenge>` from the server.
    Challenge(String),
    /// `<response>` towards the server.
    Response(String),
    /// `<success>` from the server.
    Success(String),
    /// `<failure>`; when sent by us it carries the abort child.
    Failure(Option<Element>),
}

impl Auth {
    pub(crate) fn from_element(el: &Element) -> Auth {
        match &*el.name {
            "challenge" => Auth::Challenge(el.text.clone()),
            "success" => Auth::Success(el.text.clone()),
            _ => Auth::Failure(el.children.first().cloned()),
        }
    }

    pub(crate) fn to_element(&self) -> Element {
        match self {
            Auth::Auth { mechanism, data } => {
                let mut el = Element::new(ns::SASL, "auth").with_attr("mechanism", &**mechanism);
                el.text = data.clone();
                el
            }
            Auth::Challenge(data) => Element::new(ns::SASL, "challenge").with_text(&**data),
            Auth::Response(data) => Element::new(ns::SASL, "response").with_text(&**data),
            Auth::Success(data) => Element::new(ns::SASL, "success").with_text(&**data),
            Auth::Failure(child) => {
                let mut el = Element::new(ns::SASL, "failure");
                if let Some(child) = child {
                    el.children.push(child.clone());
                }
                el
            }
        }
    }
}

/// Everything the XML codec can produce or consume: the stream-level
/// objects plus application stanzas.
#[derive(Debug)]
pub enum Packet {
    /// A stream opener, in either direction.
    StreamOpen(StreamOpen),
    /// `<stream:error>` from the peer.
    StreamError(StreamError),
    /// `<stream:features>` from the peer.
    Features(Features),
    /// STARTTLS negotiation element.
    Starttls(Starttls),
    /// SASL negotiation element.
    Auth(Auth),
    /// An application stanza.
    Stanza(Stanza),
    /// An element we do not recognize, passed through for logging.
    Unknown(Element),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_opener_exact_bytes() {
        let s = StreamOpen {
            to: "bob".to_owned(),
            ..StreamOpen::default()
        };
        assert_eq!(
            s.serialize(),
            "<stream:stream xmlns=\"jabber:client\" \
             xmlns:stream=\"http://etherx.jabber.org/streams\" to=\"bob\">"
        );

        let s = StreamOpen {
            to: "bob".to_owned(),
            from: "alice".to_owned(),
            id: "#3".to_owned(),
            version: "5.3".to_owned(),
            ..StreamOpen::default()
        };
        assert_eq!(
            s.serialize(),
            "<stream:stream xmlns=\"jabber:client\" \
             xmlns:stream=\"http://etherx.jabber.org/streams\" \
             to=\"bob\" from=\"alice\" id=\"#3\" version=\"5.3\">"
        );

        let s = StreamOpen {
            lang: "en_US".to_owned(),
            ..StreamOpen::default()
        };
        assert_eq!(
            s.serialize(),
            "<stream:stream xmlns=\"jabber:client\" \
             xmlns:stream=\"http://etherx.jabber.org/streams\" xml:lang=\"en_US\">"
        );
    }

    #[test]
    fn iq_marshal() {
        let iq = Stanza::Iq(Iq {
            header: Header {
                id: "3".to_owned(),
                type_: "set".to_owned(),
                nested: vec![Payload::Generic(Element::new(ns::BIND, "bind"))],
                ..Header::default()
            },
        });
        assert_eq!(
            iq.to_element().to_string(),
            "<iq id=\"3\" type=\"set\"><bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"></bind></iq>"
        );
    }

    #[test]
    fn marshal_escaping() {
        let msg = Stanza::Message(Message {
            body: vec![Text::plain("&<!-- \"")],
            ..Message::default()
        });
        assert_eq!(
            msg.to_element().to_string(),
            "<message><body>&amp;&lt;!-- &quot;</body></message>"
        );
    }

    #[test]
    fn features_decode() {
        let el = Element::new(ns::STREAM, "features")
            .with_child(
                Element::new(ns::TLS, "starttls").with_child(Element::new(ns::TLS, "required")),
            )
            .with_child(
                Element::new(ns::SASL, "mechanisms")
                    .with_child(Element::new(ns::SASL, "mechanism").with_text("DIGEST-MD5"))
                    .with_child(Element::new(ns::SASL, "mechanism").with_text("PLAIN")),
            )
            .with_child(Element::new(ns::BIND, "bind"));
        let features = Features::from_element(&el);
        assert_eq!(features.starttls, Some(true));
        assert_eq!(features.mechanisms, vec!["DIGEST-MD5", "PLAIN"]);
        assert!(features.bind);
        assert!(!features.session);
    }

    #[test]
    fn stream_error_display() {
        let el = Element::new(ns::STREAM, "error")
            .with_child(Element::new(ns::STREAMS, "conflict"))
            .with_child(Element::new(ns::STREAMS, "text").with_text("replaced by new connection"));
        let err = StreamError::from_element(&el);
        assert_eq!(err.condition, "conflict");
        assert_eq!(err.to_string(), "conflict: replaced by new connection");
    }
}
