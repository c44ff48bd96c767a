// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The negotiation layer reads the typed object stream and responds to it:
//! stream setup, TLS upgrade, SASL authentication, resource binding. Until
//! the engine reaches [`Status::Running`], nothing the application sends
//! or receives crosses this layer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_rustls::rustls::ClientConfig;

use crate::client::Core;
use crate::error::{Error, ProtocolError};
use crate::extension::{Extension, Payload};
use crate::id::next_id;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::{Features, Header, Iq, Packet, Stanza, Starttls, StreamOpen};
use crate::status::Status;
use crate::transport::Layer1;
use crate::xml::Element;

/// A single-shot handler for the stanza carrying a particular id. Invoked
/// on the task running the receive loop, before the stanza (if the engine
/// is running) is forwarded to the application.
pub type Callback = Box<dyn FnOnce(&Stanza) + Send + Sync>;

/// Depth of the callback registration channel.
pub(crate) const HANDLER_QUEUE: usize = 100;

/// Receive stanzas from the application and pass them down to the encoder.
///
/// The input is gated on the connection status: anywhere below `Running`
/// the application branch is disabled entirely, so nothing the application
/// queues can leak into a negotiation in flight. The negotiation logic
/// itself bypasses this gate by writing straight to the encoder channel.
pub(crate) async fn send_stream(
    core: Arc<Core>,
    xml_tx: mpsc::Sender<Packet>,
    mut input: mpsc::Receiver<Stanza>,
) {
    let mut status = core.statmgr.listen();
    let mut running = core.statmgr.current() == Status::Running;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
                let stat = *status.borrow_and_update();
                if stat.is_fatal() {
                    return;
                }
                running = stat == Status::Running;
            },
            stanza = input.recv(), if running => match stanza {
                None => return,
                Some(stanza) => {
                    if xml_tx.send(Packet::Stanza(stanza)).await.is_err() {
                        return;
                    }
                }
            },
        }
    }
}

/// State owned by the receive loop: everything the negotiation needs to
/// answer the server on its own.
pub(crate) struct Negotiation {
    pub(crate) core: Arc<Core>,
    pub(crate) layer1: Layer1,
    pub(crate) send_raw: mpsc::Sender<Packet>,
    pub(crate) tls_config: Arc<ClientConfig>,
    /// The identity we are negotiating for; the bound JID lives in the
    /// core once the server has assigned it.
    pub(crate) jid: Jid,
    /// Cleared as soon as authentication succeeds.
    pub(crate) password: String,
    /// The rspauth value the server must present in its second DIGEST-MD5
    /// challenge; empty before the first challenge.
    pub(crate) sasl_expected: String,
    callbacks: HashMap<String, Callback>,
}

impl Negotiation {
    pub(crate) fn new(
        core: Arc<Core>,
        layer1: Layer1,
        send_raw: mpsc::Sender<Packet>,
        tls_config: Arc<ClientConfig>,
        jid: Jid,
        password: String,
    ) -> Negotiation {
        Negotiation {
            core,
            layer1,
            send_raw,
            tls_config,
            jid,
            password,
            sasl_expected: String::new(),
            callbacks: HashMap::new(),
        }
    }

    /// Receive typed objects, handle all the stream-related ones, and pass
    /// stanzas on to the application once the connection is running.
    pub(crate) async fn run(
        mut self,
        mut xml_rx: mpsc::Receiver<Packet>,
        app_tx: mpsc::Sender<Stanza>,
        mut handlers: mpsc::Receiver<(String, Callback)>,
    ) {
        let mut status = self.core.statmgr.listen();
        let mut do_send = false;
        let mut registering = true;
        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_ok() {
                        do_send = *status.borrow_and_update() == Status::Running;
                    }
                },
                handler = handlers.recv(), if registering => match handler {
                    Some((id, callback)) => {
                        self.callbacks.insert(id, callback);
                    }
                    None => registering = false,
                },
                packet = xml_rx.recv() => match packet {
                    None => break,
                    Some(packet) => {
                        if let Err(e) = self.handle(packet, &app_tx, do_send).await {
                            self.core.set_error(e);
                            break;
                        }
                    }
                },
            }
        }
        self.core.statmgr.close();
    }

    async fn handle(
        &mut self,
        packet: Packet,
        app_tx: &mpsc::Sender<Stanza>,
        do_send: bool,
    ) -> Result<(), Error> {
        match packet {
            // The peer's opener is acknowledged by its presence alone.
            Packet::StreamOpen(_) => Ok(()),
            Packet::StreamError(e) => Err(Error::Stream(e)),
            Packet::Features(features) => self.handle_features(features).await,
            Packet::Starttls(Starttls::Proceed) => self.handle_tls().await,
            Packet::Starttls(_) => Err(ProtocolError::TlsRefused.into()),
            Packet::Auth(auth) => self.handle_sasl(auth).await,
            Packet::Stanza(stanza) => {
                let id = stanza.header().id.clone();
                if let Some(callback) = self.callbacks.remove(&id) {
                    callback(&stanza);
                }
                if do_send && app_tx.send(stanza).await.is_err() {
                    return Err(Error::Disconnected);
                }
                Ok(())
            }
            Packet::Unknown(el) => {
                log::debug!("unrecognized input: {} {}", el.ns, el.name);
                Ok(())
            }
        }
    }

    /// First match wins: TLS before SASL before binding.
    async fn handle_features(&mut self, features: Features) -> Result<(), Error> {
        self.core.set_features(features.clone());
        if features.starttls.is_some() {
            return self.send_raw(Packet::Starttls(Starttls::Request)).await;
        }
        if !features.mechanisms.is_empty() {
            return self.choose_sasl(&features).await;
        }
        if features.bind {
            return self.bind().await;
        }
        Ok(())
    }

    /// `<proceed/>` arrived: run the handshake over the raw socket, then
    /// restart the stream on the encrypted channel.
    async fn handle_tls(&mut self) -> Result<(), Error> {
        self.layer1
            .start_tls(self.tls_config.clone(), self.jid.domain())
            .await?;
        self.core.statmgr.set(Status::ConnectedTls);
        self.send_opener().await
    }

    /// Send a request to bind a resource. RFC 3920, section 7.
    async fn bind(&mut self) -> Result<(), Error> {
        let resource = self.jid.resource();
        let request = BindQuery {
            resource: if resource.is_empty() {
                None
            } else {
                Some(resource.to_owned())
            },
            jid: None,
        };
        let id = next_id();
        let core = self.core.clone();
        self.callbacks.insert(
            id.clone(),
            Box::new(move |reply: &Stanza| {
                let Stanza::Iq(iq) = reply else {
                    core.set_error(ProtocolError::NonIqResponse.into());
                    return;
                };
                if iq.header.type_ == "error" {
                    core.set_error(ProtocolError::BindFailed.into());
                    return;
                }
                let bound = iq.header.nested.iter().find_map(|payload| match payload {
                    Payload::Bind(bind) => Some(bind),
                    _ => None,
                });
                let Some(bound) = bound else {
                    core.set_error(ProtocolError::InvalidBindResponse.into());
                    return;
                };
                match &bound.jid {
                    Some(jid) if !jid.is_empty() => {
                        core.set_jid(jid.clone());
                        core.statmgr.set(Status::Bound);
                    }
                    _ => core.set_error(ProtocolError::EmptyBindJid.into()),
                }
            }),
        );
        let iq = Stanza::Iq(Iq {
            header: Header {
                id,
                type_: "set".to_owned(),
                nested: vec![Payload::Bind(request)],
                ..Header::default()
            },
        });
        self.send_raw(Packet::Stanza(iq)).await
    }

    pub(crate) async fn send_opener(&self) -> Result<(), Error> {
        self.send_raw(Packet::StreamOpen(StreamOpen::client(self.jid.domain())))
            .await
    }

    pub(crate) async fn send_raw(&self, packet: Packet) -> Result<(), Error> {
        self.send_raw
            .send(packet)
            .await
            .map_err(|_| Error::Disconnected)
    }
}

/// Resource binding payload, nested in an iq in either direction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindQuery {
    /// The resource the client asks for; absent to let the server pick.
    pub resource: Option<String>,
    /// The full JID assigned by the server in its reply.
    pub jid: Option<Jid>,
}

impl BindQuery {
    pub(crate) fn to_element(&self) -> Element {
        let mut el = Element::new(ns::BIND, "bind");
        if let Some(resource) = &self.resource {
            el.children
                .push(Element::new(ns::BIND, "resource").with_text(&**resource));
        }
        if let Some(jid) = &self.jid {
            el.children
                .push(Element::new(ns::BIND, "jid").with_text(jid.as_str()));
        }
        el
    }

    fn from_element(el: &Element) -> BindQuery {
        BindQuery {
            resource: el.child(ns::BIND, "resource").map(|c| c.text.clone()),
            jid: el.child(ns::BIND, "jid").map(|c| Jid::new(&*c.text)),
        }
    }
}

/// The built-in extension teaching the codec about bind payloads.
pub(crate) fn bind_extension() -> Extension {
    Extension::default().with_payload(ns::BIND, "bind", |el| {
        Ok(Payload::Bind(BindQuery::from_element(el)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_request_with_resource() {
        let bind = BindQuery {
            resource: Some("balcony".to_owned()),
            jid: None,
        };
        assert_eq!(
            bind.to_element().to_string(),
            "<bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\">\
             <resource>balcony</resource></bind>"
        );
    }

    #[test]
    fn bind_reply_parses_jid() {
        let el = Element::new(ns::BIND, "bind")
            .with_child(Element::new(ns::BIND, "jid").with_text("romeo@example.net/balcony"));
        let bind = BindQuery::from_element(&el);
        assert_eq!(bind.jid, Some(Jid::new("romeo@example.net/balcony")));
        assert_eq!(bind.resource, None);
    }
}
