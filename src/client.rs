// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The orchestrator: wires the pipeline stages together, drives the
//! initial handshake, and presents the application surface.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::{Arc, Mutex, RwLock};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::rustls::ClientConfig;

use crate::codec;
use crate::error::{Error, ProtocolError};
use crate::extension::{Extension, Payload, PayloadRegistry};
use crate::filter::{filter_mgr, Filter, STANZA_QUEUE};
use crate::id::next_id;
use crate::jid::Jid;
use crate::negotiation::{self, bind_extension, Callback, Negotiation, HANDLER_QUEUE};
use crate::ns;
use crate::roster::{roster_extension, Roster};
use crate::stanza::{Features, Header, Iq, Packet, Presence, Stanza, StreamOpen};
use crate::status::{Status, StatusManager};
use crate::transport::{AsyncReadAndWrite, Layer1};

/// Capacity of the byte pipes between the transport and the codec.
const PIPE_CAPACITY: usize = 4096;

/// The engine state every stage can reach: the status broadcaster, the
/// single-slot error latch, the application send channel (closed exactly
/// once), and the identity the stream is bound to.
pub(crate) struct Core {
    pub(crate) statmgr: StatusManager,
    error: Mutex<Option<Error>>,
    app_send: Mutex<Option<mpsc::Sender<Stanza>>>,
    jid: RwLock<Jid>,
    features: RwLock<Option<Features>>,
}

impl Core {
    pub(crate) fn new(status: Option<mpsc::Sender<Status>>) -> Core {
        Core {
            statmgr: StatusManager::new(status),
            error: Mutex::new(None),
            app_send: Mutex::new(None),
            jid: RwLock::new(Jid::default()),
            features: RwLock::new(None),
        }
    }

    /// Register an error that happened in the internals somewhere. The
    /// first error wins; it probably caused whatever came after it. Any
    /// error shuts the engine down.
    pub(crate) fn set_error(&self, err: Error) {
        {
            let mut slot = self.error.lock().expect("error slot");
            if slot.is_none() {
                log::debug!("engine error: {}", err);
                *slot = Some(err);
            }
        }
        self.statmgr.set(Status::Error);
        self.close();
    }

    /// Shut down: broadcast a terminal status and close the application
    /// send channel exactly once.
    pub(crate) fn close(&self) {
        self.statmgr.set(Status::Shutdown);
        self.app_send.lock().expect("app send slot").take();
    }

    /// If an error is latched, return it; otherwise return `fallback`.
    /// The latched error preceded (and probably caused) the fallback.
    pub(crate) fn take_error(&self, fallback: Error) -> Error {
        self.error
            .lock()
            .expect("error slot")
            .take()
            .unwrap_or(fallback)
    }

    pub(crate) fn install_app_send(&self, tx: mpsc::Sender<Stanza>) {
        *self.app_send.lock().expect("app send slot") = Some(tx);
    }

    pub(crate) fn app_send(&self) -> Option<mpsc::Sender<Stanza>> {
        self.app_send.lock().expect("app send slot").clone()
    }

    pub(crate) fn set_jid(&self, jid: Jid) {
        *self.jid.write().expect("jid slot") = jid;
    }

    pub(crate) fn jid(&self) -> Jid {
        self.jid.read().expect("jid slot").clone()
    }

    pub(crate) fn set_features(&self, features: Features) {
        *self.features.write().expect("features slot") = Some(features);
    }

    pub(crate) fn clear_features(&self) {
        *self.features.write().expect("features slot") = None;
    }

    pub(crate) fn features(&self) -> Option<Features> {
        self.features.read().expect("features slot").clone()
    }
}

/// The client half of a client-server XMPP connection.
///
/// Stanzas the server sends arrive through [`Client::recv`] (or the
/// [`Stream`] impl) once the connection is running; everything the
/// library needed for stream setup never shows up there. Outgoing
/// stanzas go through [`Client::send`].
pub struct Client {
    core: Arc<Core>,
    recv: mpsc::Receiver<Stanza>,
    handler_tx: mpsc::Sender<(String, Callback)>,
    recv_filter_tx: mpsc::Sender<Filter>,
    send_filter_tx: mpsc::Sender<Filter>,
    /// The client's roster, kept current by the roster extension.
    pub roster: Roster,
}

impl Client {
    /// Create a client over an already-connected byte stream, identified
    /// by `jid` and authenticating with `password`. Zero or more
    /// extensions may be given; the roster and bind extensions are always
    /// installed. The initial presence is broadcast once the session is
    /// running. If `status` is given, connection progress is sent on it.
    ///
    /// This resolves only after the full handshake: TLS upgrade if the
    /// server offers it, SASL, resource binding, and session start.
    pub async fn new_with_stream<S: AsyncReadAndWrite + 'static>(
        sock: S,
        jid: Jid,
        password: String,
        tls_config: Arc<ClientConfig>,
        extensions: Vec<Extension>,
        initial_presence: Presence,
        status: Option<mpsc::Sender<Status>>,
    ) -> Result<Client, Error> {
        let mut extensions = extensions;
        let (roster, roster_ext) = roster_extension();
        extensions.push(roster_ext);
        extensions.push(bind_extension());
        let registry = Arc::new(PayloadRegistry::new(&mut extensions)?);

        let core = Arc::new(Core::new(status));
        core.set_jid(jid.clone());
        // Whoever called us made the connection, so it is connected.
        core.statmgr.set(Status::Connected);

        // The transport, shuttling bytes between the socket and the pipes.
        let (recv_pipe_rd, recv_pipe_wr) = tokio::io::simplex(PIPE_CAPACITY);
        let (send_pipe_rd, send_pipe_wr) = tokio::io::simplex(PIPE_CAPACITY);
        let layer1 = Layer1::start(core.clone(), Box::new(sock), recv_pipe_wr, send_pipe_rd);

        // The codec, converting between bytes and typed packets.
        let (xml_in_tx, xml_in_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(codec::recv_xml(
            core.clone(),
            recv_pipe_rd,
            xml_in_tx,
            registry,
        ));
        let (xml_out_tx, xml_out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(codec::send_xml(core.clone(), send_pipe_wr, xml_out_rx));

        // The negotiation layer, gating both directions until running.
        let (handler_tx, handler_rx) = mpsc::channel(HANDLER_QUEUE);
        let (recv_raw_tx, recv_raw_rx) = mpsc::channel(STANZA_QUEUE);
        let negotiation = Negotiation::new(
            core.clone(),
            layer1,
            xml_out_tx.clone(),
            tls_config,
            jid.clone(),
            password,
        );
        tokio::spawn(negotiation.run(xml_in_rx, recv_raw_tx, handler_rx));
        let (send_gate_tx, send_gate_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(negotiation::send_stream(
            core.clone(),
            xml_out_tx.clone(),
            send_gate_rx,
        ));

        // The filter stacks the application and extensions can hook into.
        let (recv_filter_tx, recv_filter_rx) = mpsc::channel(1);
        let (recv_app_tx, recv_app_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(filter_mgr(recv_filter_rx, recv_raw_rx, recv_app_tx));
        let (send_app_tx, send_app_rx) = mpsc::channel(STANZA_QUEUE);
        let (send_filter_tx, send_filter_rx) = mpsc::channel(1);
        tokio::spawn(filter_mgr(send_filter_rx, send_app_rx, send_gate_tx));
        core.install_app_send(send_app_tx);

        for ext in &mut extensions {
            if let Some(filter) = ext.recv_filter.take() {
                recv_filter_tx
                    .send(filter)
                    .await
                    .map_err(|_| Error::Disconnected)?;
            }
            if let Some(filter) = ext.send_filter.take() {
                send_filter_tx
                    .send(filter)
                    .await
                    .map_err(|_| Error::Disconnected)?;
            }
        }

        let client = Client {
            core,
            recv: recv_app_rx,
            handler_tx,
            recv_filter_tx,
            send_filter_tx,
            roster,
        };

        // Initial handshake: open the stream and let the negotiation layer
        // work its way up to a bound resource.
        let send_raw = xml_out_tx;
        if send_raw
            .send(Packet::StreamOpen(StreamOpen::client(jid.domain())))
            .await
            .is_err()
        {
            return Err(client.core.take_error(Error::Disconnected));
        }
        if let Err(e) = client.core.statmgr.await_status(Status::Bound).await {
            return Err(client.core.take_error(e));
        }

        // Initialize the session.
        let id = next_id();
        let (done_tx, done_rx) = oneshot::channel();
        client
            .set_callback(&id, move |reply: &Stanza| {
                let result = match reply {
                    Stanza::Iq(iq) if iq.header.type_ == "error" => {
                        Err(Error::from(ProtocolError::SessionFailed))
                    }
                    Stanza::Iq(_) => Ok(()),
                    _ => Err(ProtocolError::NonIqResponse.into()),
                };
                let _ = done_tx.send(result);
            })
            .await?;
        let bound = client.core.jid();
        let session = Stanza::Iq(Iq {
            header: Header {
                to: Some(Jid::new(bound.domain())),
                id,
                type_: "set".to_owned(),
                nested: vec![Payload::Generic(crate::xml::Element::new(
                    ns::SESSION,
                    "session",
                ))],
                ..Header::default()
            },
        });
        if send_raw.send(Packet::Stanza(session)).await.is_err() {
            return Err(client.core.take_error(Error::Disconnected));
        }
        match done_rx.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                client.core.set_error(e);
                return Err(client.core.take_error(Error::Disconnected));
            }
            Err(_) => return Err(client.core.take_error(Error::Disconnected)),
        }
        drop(send_raw);

        // This lets the application receive and send stanzas.
        client.core.statmgr.set(Status::Running);

        // Request the roster and announce ourselves.
        if let Err(e) = client.roster.update().await {
            return Err(client.core.take_error(e));
        }
        if let Err(e) = client.send(Stanza::Presence(initial_presence)).await {
            return Err(client.core.take_error(e));
        }

        Ok(client)
    }

    /// The full JID the server bound this session to.
    pub fn jid(&self) -> Jid {
        self.core.jid()
    }

    /// The most recent `<stream:features>` advertised by the server, if a
    /// negotiation is in flight.
    pub fn features(&self) -> Option<Features> {
        self.core.features()
    }

    /// Receive the next stanza. `None` means the engine has shut down.
    pub async fn recv(&mut self) -> Option<Stanza> {
        self.recv.recv().await
    }

    /// Send a stanza. It travels through the send filter stack before
    /// going out on the wire.
    pub async fn send(&self, stanza: Stanza) -> Result<(), Error> {
        match self.core.app_send() {
            Some(tx) => tx.send(stanza).await.map_err(|_| Error::Disconnected),
            None => Err(Error::Disconnected),
        }
    }

    /// Shut the engine down. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    /// Register a one-shot handler for the stanza with the given id. The
    /// handler runs on the engine's receive task, before the stanza (if
    /// the connection is running) is delivered to [`Client::recv`]; it
    /// must not block on that channel.
    pub async fn set_callback<F>(&self, id: &str, callback: F) -> Result<(), Error>
    where
        F: FnOnce(&Stanza) + Send + Sync + 'static,
    {
        self.handler_tx
            .send((id.to_owned(), Box::new(callback)))
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Push a filter onto the receive stack, closest to the application.
    pub async fn add_recv_filter(&self, filter: Filter) -> Result<(), Error> {
        self.recv_filter_tx
            .send(filter)
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Push a filter onto the send stack, closest to the application.
    pub async fn add_send_filter(&self, filter: Filter) -> Result<(), Error> {
        self.send_filter_tx
            .send(filter)
            .await
            .map_err(|_| Error::Disconnected)
    }
}

impl Stream for Client {
    type Item = Stanza;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        self.recv.poll_recv(cx)
    }
}
