// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Finding and dialing the server for a JID.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hickory_resolver::TokioAsyncResolver;
use log::debug;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::ClientConfig;

use crate::client::Client;
use crate::error::Error;
use crate::extension::Extension;
use crate::jid::Jid;
use crate::stanza::Presence;
use crate::status::Status;

/// DNS SRV service for client-to-server connections.
const CLIENT_SRV: &str = "_xmpp-client._tcp";

/// Port to dial when SRV resolution yields nothing.
const FALLBACK_PORT: u16 = 5222;

impl Client {
    /// Create a client, locating the server through the `_xmpp-client._tcp`
    /// SRV records of the JID's domain. Records are dialed in order; the
    /// first connection to succeed is used. Otherwise identical to
    /// [`Client::new_with_stream`].
    pub async fn new(
        jid: Jid,
        password: String,
        tls_config: Arc<ClientConfig>,
        extensions: Vec<Extension>,
        initial_presence: Presence,
        status: Option<mpsc::Sender<Status>>,
    ) -> Result<Client, Error> {
        let stream = dial_srv(jid.domain()).await?;
        Client::new_with_stream(
            stream,
            jid,
            password,
            tls_config,
            extensions,
            initial_presence,
            status,
        )
        .await
    }

    /// Connect to the given host and port instead of consulting DNS SRV.
    /// Otherwise identical to [`Client::new`].
    pub async fn new_with_host_port(
        host: &str,
        port: u16,
        jid: Jid,
        password: String,
        tls_config: Arc<ClientConfig>,
        extensions: Vec<Extension>,
        initial_presence: Presence,
        status: Option<mpsc::Sender<Status>>,
    ) -> Result<Client, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        Client::new_with_stream(
            stream,
            jid,
            password,
            tls_config,
            extensions,
            initial_presence,
            status,
        )
        .await
    }
}

async fn dial_srv(domain: &str) -> Result<TcpStream, Error> {
    if let Ok(ip) = domain.parse::<IpAddr>() {
        debug!("attempting connection to {}:{}", ip, FALLBACK_PORT);
        return Ok(TcpStream::connect(SocketAddr::new(ip, FALLBACK_PORT)).await?);
    }

    let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
    let srv_domain = format!("{}.{}.", CLIENT_SRV, domain);
    match resolver.srv_lookup(srv_domain.clone()).await {
        Ok(lookup) => {
            let mut last_error = None;
            for srv in lookup.iter() {
                let target = srv.target().to_ascii();
                debug!("attempting connection to {} {}:{}", srv_domain, target, srv.port());
                match TcpStream::connect((target.as_str(), srv.port())).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_error = Some(e),
                }
            }
            Err(last_error.map(Error::Io).unwrap_or(Error::Disconnected))
        }
        Err(_) => {
            // No SRV records; dial the domain directly.
            debug!("attempting connection to {}:{}", domain, FALLBACK_PORT);
            Ok(TcpStream::connect((domain, FALLBACK_PORT)).await?)
        }
    }
}
