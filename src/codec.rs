// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The codec layer translates between the byte pipes of the transport and
//! typed [`Packet`]s.
//!
//! The receive side runs an [`rxml`] parser over the pipe. A synthetic
//! document opener is chained in front of the peer's bytes so that the
//! `jabber:client` default namespace and the `stream:` prefix are
//! established before the peer's (never-closed) stream header arrives;
//! this also lets bare stanzas be decoded outside a stream, which the
//! tests rely on.

use core::pin::Pin;
use std::io;
use std::sync::Arc;

use futures::future::poll_fn;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::io::{ReadHalf, SimplexStream, WriteHalf};
use tokio::sync::mpsc;

use crate::client::Core;
use crate::error::{Error, ProtocolError};
use crate::extension::PayloadRegistry;
use crate::ns;
use crate::stanza::{Auth, Features, Packet, Stanza, Starttls, StreamError, StreamOpen};
use crate::xml::Element;

/// Primes the parser with the stream namespaces. One start-element token is
/// consumed and discarded to get past it.
const NS_PRIME: &[u8] =
    b"<a xmlns=\"jabber:client\" xmlns:stream=\"http://etherx.jabber.org/streams\">";

/// Pulls [`rxml::Event`]s out of an async byte source.
struct EventReader<Io> {
    inner: rxml::AsyncReader<Io>,
}

impl<Io: AsyncBufRead + Unpin> EventReader<Io> {
    fn new(io: Io) -> EventReader<Io> {
        EventReader {
            inner: rxml::AsyncReader::wrap(io, rxml::Parser::default()),
        }
    }

    async fn next(&mut self) -> io::Result<Option<rxml::Event>> {
        poll_fn(|cx| Pin::new(&mut self.inner).poll_read(cx)).await
    }
}

fn element_from_start(name: (rxml::Namespace, rxml::NcName), attrs: rxml::AttrMap) -> Element {
    let (ens, local) = name;
    let mut el = Element::new(ens.to_string(), local.to_string());
    for ((ans, aname), value) in attrs.into_iter() {
        let key = if ans == *rxml::Namespace::xml() {
            format!("xml:{}", aname)
        } else {
            aname.to_string()
        };
        el.attrs.push((key, value.to_string()));
    }
    el
}

/// Decode one complete element subtree, the start event of which has
/// already been consumed into `root`.
async fn read_element<Io: AsyncBufRead + Unpin>(
    reader: &mut EventReader<Io>,
    root: Element,
) -> io::Result<Element> {
    let mut current = root;
    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.next().await? {
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "eof inside an element",
                ))
            }
            Some(rxml::Event::XmlDeclaration(_, _)) => (),
            Some(rxml::Event::Text(_, data)) => current.text.push_str(&data),
            Some(rxml::Event::StartElement(_, name, attrs)) => {
                stack.push(current);
                current = element_from_start(name, attrs);
            }
            Some(rxml::Event::EndElement(_)) => match stack.pop() {
                Some(mut parent) => {
                    parent.children.push(current);
                    current = parent;
                }
                None => return Ok(current),
            },
        }
    }
}

fn stream_open_from_attrs(attrs: rxml::AttrMap) -> StreamOpen {
    let mut open = StreamOpen::default();
    for ((_, name), value) in attrs.into_iter() {
        match name.to_string().to_lowercase().as_str() {
            "to" => open.to = value.to_string(),
            "from" => open.from = value.to_string(),
            "id" => open.id = value.to_string(),
            "lang" => open.lang = value.to_string(),
            "version" => open.version = value.to_string(),
            _ => (),
        }
    }
    open
}

/// Map a decoded element to the typed object the negotiation layer wants.
fn classify(el: Element, registry: &PayloadRegistry) -> Result<Packet, Error> {
    let packet = match (&*el.ns, &*el.name) {
        (ns::STREAM, "error") => Packet::StreamError(StreamError::from_element(&el)),
        (ns::STREAM, "features") => Packet::Features(Features::from_element(&el)),
        (ns::TLS, "proceed") | (ns::TLS, "failure") => {
            Packet::Starttls(Starttls::from_element(&el))
        }
        (ns::SASL, "challenge") | (ns::SASL, "failure") | (ns::SASL, "success") => {
            Packet::Auth(Auth::from_element(&el))
        }
        (ns::CLIENT, "iq") | (ns::CLIENT, "message") | (ns::CLIENT, "presence") => {
            match Stanza::from_element(&el) {
                Some(mut stanza) => {
                    registry
                        .parse_nested(stanza.header_mut(), &el)
                        .map_err(|e| Error::from(ProtocolError::Parse(e)))?;
                    Packet::Stanza(stanza)
                }
                None => Packet::Unknown(el),
            }
        }
        _ => {
            log::debug!("ignoring unrecognized element: {} {}", el.ns, el.name);
            Packet::Unknown(el)
        }
    };
    Ok(packet)
}

/// Read bytes from the receive pipe, decode them into typed packets, and
/// publish them downstream. The output channel is closed on exit.
pub(crate) async fn recv_xml(
    core: Arc<Core>,
    pipe: ReadHalf<SimplexStream>,
    tx: mpsc::Sender<Packet>,
    registry: Arc<PayloadRegistry>,
) {
    let mut reader = EventReader::new(NS_PRIME.chain(BufReader::new(pipe)));

    // The synthetic opener.
    match reader.next().await {
        Ok(Some(rxml::Event::StartElement(_, _, _))) => (),
        _ => {
            core.set_error(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "recv: namespace preamble rejected",
            )));
            return;
        }
    }

    loop {
        let event = match reader.next().await {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                // Pipe closure during engine teardown surfaces as a parse
                // error here; the originating error is already latched.
                if !core.statmgr.current().is_fatal() {
                    core.set_error(Error::Io(e));
                }
                return;
            }
        };
        let (name, attrs) = match event {
            rxml::Event::StartElement(_, name, attrs) => (name, attrs),
            // Whitespace keepalives, the stream root closing, and anything
            // else between stanzas.
            _ => continue,
        };

        if name.0 == ns::STREAM && name.1 == "stream" {
            // The peer's stream opener is an unclosed element; only its
            // attributes exist.
            if tx.send(Packet::StreamOpen(stream_open_from_attrs(attrs)))
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        let root = element_from_start(name, attrs);
        let el = match read_element(&mut reader, root).await {
            Ok(el) => el,
            Err(e) => {
                if !core.statmgr.current().is_fatal() {
                    core.set_error(Error::Io(e));
                }
                return;
            }
        };
        match classify(el, &registry) {
            Ok(packet) => {
                if tx.send(packet).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                core.set_error(e);
                return;
            }
        }
    }
}

/// Receive packets, encode them, and write the bytes to the send pipe.
/// The pipe is closed on exit.
pub(crate) async fn send_xml(
    core: Arc<Core>,
    mut pipe: WriteHalf<SimplexStream>,
    mut rx: mpsc::Receiver<Packet>,
) {
    while let Some(packet) = rx.recv().await {
        let bytes = match packet {
            // Streams are never closed at the element level, so the opener
            // is serialized by hand rather than through the element codec.
            Packet::StreamOpen(open) => open.serialize(),
            Packet::Starttls(tls) => tls.to_element().to_string(),
            Packet::Auth(auth) => auth.to_element().to_string(),
            Packet::Stanza(stanza) => stanza.to_element().to_string(),
            Packet::Unknown(el) => el.to_string(),
            Packet::StreamError(_) | Packet::Features(_) => {
                log::debug!("dropping packet that only the server may send");
                continue;
            }
        };
        if let Err(e) = pipe.write_all(bytes.as_bytes()).await {
            if !core.statmgr.current().is_fatal() {
                core.set_error(Error::Io(e));
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Payload;
    use crate::jid::Jid;

    fn registry() -> Arc<PayloadRegistry> {
        Arc::new(PayloadRegistry::new(&mut []).unwrap())
    }

    async fn decode_str(input: &'static str) -> Vec<Packet> {
        let core = Arc::new(Core::new(None));
        let (pipe_rd, mut pipe_wr) = tokio::io::simplex(4096);
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(recv_xml(core, pipe_rd, tx, registry()));
        pipe_wr.write_all(input.as_bytes()).await.unwrap();
        drop(pipe_wr);
        let mut packets = Vec::new();
        while let Some(packet) = rx.recv().await {
            packets.push(packet);
        }
        packets
    }

    #[tokio::test]
    async fn decode_message_roundtrip() {
        let packets = decode_str("<message to=\"a@b.c\"><body>foo!</body></message>").await;
        let [Packet::Stanza(stanza)] = &packets[..] else {
            panic!("wrong packets: {:?}", packets);
        };
        let Stanza::Message(msg) = stanza else {
            panic!("not a message: {:?}", stanza);
        };
        assert_eq!(msg.header.to, Some(Jid::new("a@b.c")));
        assert_eq!(msg.body.len(), 1);
        assert_eq!(msg.body[0].value, "foo!");
        assert_eq!(msg.header.innerxml, "<body>foo!</body>");
        assert_eq!(
            stanza.to_element().to_string(),
            "<message to=\"a@b.c\"><body>foo!</body></message>"
        );
    }

    #[tokio::test]
    async fn decode_stream_negotiation_sequence() {
        let packets = decode_str(
            "<stream:stream xmlns=\"jabber:client\" \
             xmlns:stream=\"http://etherx.jabber.org/streams\" id=\"s1\" from=\"b.c\" \
             version=\"1.0\"><stream:features><mechanisms \
             xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\"><mechanism>PLAIN</mechanism>\
             </mechanisms></stream:features>",
        )
        .await;
        assert_eq!(packets.len(), 2);
        let Packet::StreamOpen(open) = &packets[0] else {
            panic!("expected stream opener, got {:?}", packets[0]);
        };
        assert_eq!(open.id, "s1");
        assert_eq!(open.from, "b.c");
        assert_eq!(open.version, "1.0");
        let Packet::Features(features) = &packets[1] else {
            panic!("expected features, got {:?}", packets[1]);
        };
        assert_eq!(features.mechanisms, vec!["PLAIN"]);
    }

    #[tokio::test]
    async fn decode_iq_with_registered_payload() {
        let core = Arc::new(Core::new(None));
        let (pipe_rd, mut pipe_wr) = tokio::io::simplex(4096);
        let (tx, mut rx) = mpsc::channel(1);
        let registry = Arc::new(
            PayloadRegistry::new(&mut [crate::negotiation::bind_extension()]).unwrap(),
        );
        tokio::spawn(recv_xml(core, pipe_rd, tx, registry));
        pipe_wr
            .write_all(
                b"<iq id=\"id_1\" type=\"result\"><bind \
                  xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"><jid>n@d/r</jid></bind></iq>",
            )
            .await
            .unwrap();
        drop(pipe_wr);
        let Some(Packet::Stanza(stanza)) = rx.recv().await else {
            panic!("no stanza");
        };
        let [Payload::Bind(bind)] = &stanza.header().nested[..] else {
            panic!("bind payload missing: {:?}", stanza.header().nested);
        };
        assert_eq!(bind.jid, Some(Jid::new("n@d/r")));
    }

    #[tokio::test]
    async fn encode_stream_opener_and_stanza() {
        let core = Arc::new(Core::new(None));
        let (mut pipe_rd, pipe_wr) = tokio::io::simplex(4096);
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(send_xml(core, pipe_wr, rx));
        tx.send(Packet::StreamOpen(StreamOpen::client("b.c")))
            .await
            .unwrap();
        tx.send(Packet::Starttls(Starttls::Request)).await.unwrap();
        drop(tx);
        let mut out = String::new();
        pipe_rd.read_to_string(&mut out).await.unwrap();
        assert_eq!(
            out,
            "<stream:stream xmlns=\"jabber:client\" \
             xmlns:stream=\"http://etherx.jabber.org/streams\" to=\"b.c\" version=\"1.0\">\
             <starttls xmlns=\"urn:ietf:params:xml:ns:xmpp-tls\"></starttls>"
        );
    }
}
