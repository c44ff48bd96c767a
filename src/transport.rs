// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The lowest layer of the pipeline: it owns the socket, shuttles raw
//! bytes between the socket and the byte pipes of the XML codec, and
//! performs the in-place TLS upgrade.
//!
//! The socket is owned by two tasks, a reader and a writer, each holding
//! one half. Each task polls a control channel through which the half can
//! be taken away (pausing the task) and a replacement installed. The TLS
//! upgrade is an ownership round-trip: take both halves, reunite them,
//! wrap them in TLS, split again, hand them back.

use core::time::Duration;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::io::{ReadHalf, SimplexStream, WriteHalf};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::client::Core;
use crate::error::Error;

/// Everything a transport socket must be able to do.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// A boxed transport socket.
pub type Socket = Box<dyn AsyncReadAndWrite + 'static>;

/// How long a transport task sleeps while paused, and the read deadline
/// used so the reader can notice status changes between reads.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

const READ_BUF: usize = 1024;

/// A TLS client configuration trusting the bundled webpki roots, for
/// callers without more specific needs.
pub fn default_tls_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Socket replacement command. `Take` pauses the task and hands its half
/// back through the reply channel; `Install` resumes it with a new half.
enum Swap<T> {
    Take(oneshot::Sender<T>),
    Install(T),
}

/// Control handle to the two transport tasks.
pub(crate) struct Layer1 {
    recv_ctrl: mpsc::Sender<Swap<ReadHalf<Socket>>>,
    send_ctrl: mpsc::Sender<Swap<WriteHalf<Socket>>>,
}

impl Layer1 {
    /// Spawn the reader and writer tasks over `sock`, wiring them to the
    /// codec's byte pipes.
    pub(crate) fn start(
        core: Arc<Core>,
        sock: Socket,
        recv_pipe: WriteHalf<SimplexStream>,
        send_pipe: ReadHalf<SimplexStream>,
    ) -> Layer1 {
        let (recv_ctrl, recv_ctrl_rx) = mpsc::channel(1);
        let (send_ctrl, send_ctrl_rx) = mpsc::channel(1);
        let (rd, wr) = tokio::io::split(sock);
        tokio::spawn(recv_transport(core.clone(), recv_ctrl_rx, recv_pipe));
        tokio::spawn(send_transport(core, send_ctrl_rx, send_pipe));
        recv_ctrl
            .try_send(Swap::Install(rd))
            .ok()
            .expect("fresh recv control channel");
        send_ctrl
            .try_send(Swap::Install(wr))
            .ok()
            .expect("fresh send control channel");
        Layer1 {
            recv_ctrl,
            send_ctrl,
        }
    }

    /// Upgrade the connection to TLS in place, preserving the byte stream
    /// abstraction above it.
    ///
    /// The writer is paused first so nothing is written during the
    /// handshake; once the reader has acknowledged its pause too, the
    /// socket is whole again and ours alone, and the handshake can run on
    /// it directly.
    pub(crate) async fn start_tls(
        &self,
        config: Arc<ClientConfig>,
        domain: &str,
    ) -> Result<(), Error> {
        let (reply, taken) = oneshot::channel();
        self.send_ctrl
            .send(Swap::Take(reply))
            .await
            .map_err(|_| Error::Disconnected)?;
        let wr = taken.await.map_err(|_| Error::Disconnected)?;

        let (reply, taken) = oneshot::channel();
        self.recv_ctrl
            .send(Swap::Take(reply))
            .await
            .map_err(|_| Error::Disconnected)?;
        let rd = taken.await.map_err(|_| Error::Disconnected)?;

        let sock = rd.unsplit(wr);
        let server_name = ServerName::try_from(domain.to_owned())?;
        let tls = TlsConnector::from(config).connect(server_name, sock).await?;
        let sock: Socket = Box::new(tls);

        let (rd, wr) = tokio::io::split(sock);
        self.send_ctrl
            .send(Swap::Install(wr))
            .await
            .map_err(|_| Error::Disconnected)?;
        self.recv_ctrl
            .send(Swap::Install(rd))
            .await
            .map_err(|_| Error::Disconnected)?;
        Ok(())
    }
}

/// Move bytes from the socket to the codec's receive pipe.
async fn recv_transport(
    core: Arc<Core>,
    mut ctrl: mpsc::Receiver<Swap<ReadHalf<Socket>>>,
    mut pipe: WriteHalf<SimplexStream>,
) {
    let mut status = core.statmgr.listen();
    let mut sock: Option<ReadHalf<Socket>> = None;
    let mut buf = [0u8; READ_BUF];
    loop {
        if status.borrow_and_update().is_fatal() {
            return;
        }

        loop {
            match ctrl.try_recv() {
                Ok(Swap::Take(reply)) => {
                    if let Some(sock) = sock.take() {
                        let _ = reply.send(sock);
                    }
                }
                Ok(Swap::Install(new)) => sock = Some(new),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let Some(current) = sock.as_mut() else {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        };

        match tokio::time::timeout(POLL_INTERVAL, current.read(&mut buf)).await {
            // Deadline reached with nothing to read; loop so the status
            // check above runs again.
            Err(_) => continue,
            Ok(Ok(0)) => {
                core.set_error(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "recv: connection closed",
                )));
                return;
            }
            Ok(Ok(nr)) => {
                log::debug!("recv: {}", String::from_utf8_lossy(&buf[..nr]));
                if let Err(e) = pipe.write_all(&buf[..nr]).await {
                    core.set_error(Error::Io(e));
                    return;
                }
            }
            Ok(Err(e)) => {
                core.set_error(Error::Io(e));
                return;
            }
        }
    }
}

/// Move bytes from the codec's send pipe to the socket.
async fn send_transport(
    core: Arc<Core>,
    mut ctrl: mpsc::Receiver<Swap<WriteHalf<Socket>>>,
    mut pipe: ReadHalf<SimplexStream>,
) {
    let mut sock: Option<WriteHalf<Socket>> = None;
    let mut accepting = true;
    let mut buf = [0u8; READ_BUF];
    loop {
        tokio::select! {
            cmd = ctrl.recv(), if accepting => match cmd {
                Some(Swap::Take(reply)) => {
                    if let Some(sock) = sock.take() {
                        let _ = reply.send(sock);
                    }
                }
                Some(Swap::Install(new)) => {
                    // The previous socket, if any, is closed by the drop
                    // now that the replacement is in.
                    sock = Some(new);
                }
                None => accepting = false,
            },
            nr = pipe.read(&mut buf) => {
                let nr = match nr {
                    Ok(0) | Err(_) => {
                        if !core.statmgr.current().is_fatal() {
                            core.set_error(Error::Disconnected);
                        }
                        return;
                    }
                    Ok(nr) => nr,
                };
                log::debug!("send: {}", String::from_utf8_lossy(&buf[..nr]));
                loop {
                    while let Ok(cmd) = ctrl.try_recv() {
                        match cmd {
                            Swap::Take(reply) => {
                                if let Some(sock) = sock.take() {
                                    let _ = reply.send(sock);
                                }
                            }
                            Swap::Install(new) => sock = Some(new),
                        }
                    }
                    match sock.as_mut() {
                        None => tokio::time::sleep(POLL_INTERVAL).await,
                        Some(current) => {
                            // Flush too: a TLS socket may hold the record
                            // back otherwise, and the peer's answer is the
                            // only thing that drives this loop again.
                            let written = async {
                                current.write_all(&buf[..nr]).await?;
                                current.flush().await
                            };
                            if let Err(e) = written.await {
                                core.set_error(Error::Io(e));
                                return;
                            }
                            break;
                        }
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    fn pipes() -> (
        WriteHalf<SimplexStream>,
        ReadHalf<SimplexStream>,
        ReadHalf<SimplexStream>,
        WriteHalf<SimplexStream>,
    ) {
        let (recv_rd, recv_wr) = tokio::io::simplex(READ_BUF);
        let (send_rd, send_wr) = tokio::io::simplex(READ_BUF);
        (recv_wr, send_rd, recv_rd, send_wr)
    }

    #[tokio::test]
    async fn shuttles_bytes_both_ways() {
        let core = Arc::new(Core::new(None));
        core.statmgr.set(Status::Connected);
        let (sock, mut peer) = tokio::io::duplex(4096);
        let (recv_wr, send_rd, mut recv_rd, mut send_wr) = pipes();
        let _l1 = Layer1::start(core.clone(), Box::new(sock), recv_wr, send_rd);

        peer.write_all(b"from the peer").await.unwrap();
        let mut buf = [0u8; 13];
        recv_rd.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"from the peer");

        send_wr.write_all(b"to the peer").await.unwrap();
        let mut buf = [0u8; 11];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to the peer");
    }

    #[tokio::test]
    async fn socket_eof_is_fatal() {
        let core = Arc::new(Core::new(None));
        core.statmgr.set(Status::Connected);
        let (sock, peer) = tokio::io::duplex(4096);
        let (recv_wr, send_rd, mut recv_rd, _send_wr) = pipes();
        let _l1 = Layer1::start(core.clone(), Box::new(sock), recv_wr, send_rd);

        drop(peer);
        // The pipe closes once the reader task exits.
        let mut buf = Vec::new();
        recv_rd.read_to_end(&mut buf).await.unwrap();
        assert!(core.statmgr.current().is_fatal());
    }

    #[tokio::test]
    async fn fatal_status_stops_the_reader() {
        let core = Arc::new(Core::new(None));
        core.statmgr.set(Status::Connected);
        let (sock, _peer) = tokio::io::duplex(4096);
        let (recv_wr, send_rd, mut recv_rd, _send_wr) = pipes();
        let _l1 = Layer1::start(core.clone(), Box::new(sock), recv_wr, send_rd);

        core.statmgr.set(Status::Shutdown);
        let mut buf = Vec::new();
        // Reader exit closes the receive pipe without an error.
        recv_rd.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
