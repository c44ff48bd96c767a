// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Connection lifecycle tracking.
//!
//! Every stage of the pipeline subscribes to the [`StatusManager`] and uses
//! the broadcast value to decide whether to keep running. Subscribers get a
//! coalesced view: a slow listener only sees the most recent status, never
//! an intermediate one it failed to drain in time.

use tokio::sync::{mpsc, watch};

use crate::error::Error;

/// Status of the connection to the server.
///
/// The values are totally ordered and, apart from the two terminal values,
/// only ever increase over the lifetime of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// The client has not yet connected, or it has been disconnected from
    /// the server.
    Unconnected,
    /// Initial connection established.
    Connected,
    /// Like [`Status::Connected`], but with TLS.
    ConnectedTls,
    /// Authentication succeeded.
    Authenticated,
    /// Resource binding complete.
    Bound,
    /// Session has started and normal message traffic can be sent and
    /// received.
    Running,
    /// The session has closed, or is in the process of closing.
    Shutdown,
    /// The session has encountered an error. Otherwise identical to
    /// [`Status::Shutdown`].
    Error,
}

impl Status {
    /// Does the status value indicate that the client is or has
    /// disconnected?
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::Shutdown | Status::Error)
    }
}

/// Broadcasts status transitions to all pipeline stages and, optionally, to
/// an application-supplied channel.
pub(crate) struct StatusManager {
    tx: watch::Sender<Status>,
}

impl StatusManager {
    /// Create a manager starting at [`Status::Unconnected`]. If `app` is
    /// given, connection progress is forwarded on it; on shutdown the
    /// channel receives a final best-effort [`Status::Shutdown`] and is
    /// closed.
    pub(crate) fn new(app: Option<mpsc::Sender<Status>>) -> StatusManager {
        let tx = watch::Sender::new(Status::Unconnected);
        if let Some(app) = app {
            tokio::spawn(forward_to_app(tx.subscribe(), app));
        }
        StatusManager { tx }
    }

    /// Record a status transition and wake all listeners. Transitions out
    /// of a terminal state are ignored; a late error from a stage that is
    /// still winding down must not resurrect a closed engine.
    pub(crate) fn set(&self, stat: Status) {
        self.tx.send_if_modified(|current| {
            if current.is_fatal() || *current == stat {
                false
            } else {
                *current = stat;
                true
            }
        });
    }

    /// The status as of this call.
    pub(crate) fn current(&self) -> Status {
        *self.tx.borrow()
    }

    /// Register a new listener. The receiver observes the current value
    /// immediately and a coalesced suffix of the transition sequence from
    /// then on.
    pub(crate) fn listen(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Wait until the status reaches `target` or greater. Returns an error
    /// if a fatal status is observed first. The listener registered for the
    /// wait is deregistered when this returns.
    pub(crate) async fn await_status(&self, target: Status) -> Result<(), Error> {
        let mut rx = self.listen();
        let result = match rx.wait_for(|s| s.is_fatal() || *s >= target).await {
            Ok(stat) if stat.is_fatal() => Err(Error::Disconnected),
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Disconnected),
        };
        result
    }

    /// Signal teardown: force a terminal status if none has been reached.
    pub(crate) fn close(&self) {
        self.set(Status::Shutdown);
    }
}

/// Forward transitions to the application's status channel.
///
/// `Shutdown` is handled specially: it is delivered best-effort (a receiver
/// that is not draining does not hold up teardown) and the channel is closed
/// right after.
async fn forward_to_app(mut rx: watch::Receiver<Status>, app: mpsc::Sender<Status>) {
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let stat = *rx.borrow_and_update();
        if stat.is_fatal() {
            if stat == Status::Error && app.send(stat).await.is_err() {
                return;
            }
            break;
        }
        if app.send(stat).await.is_err() {
            return;
        }
    }
    let _ = app.try_send(Status::Shutdown);
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;

    #[tokio::test]
    async fn listen_sees_current_then_updates() {
        let sm = StatusManager::new(None);
        let mut l = sm.listen();
        assert_eq!(*l.borrow_and_update(), Status::Unconnected);

        sm.set(Status::Connected);
        l.changed().await.unwrap();
        assert_eq!(*l.borrow_and_update(), Status::Connected);

        sm.set(Status::Bound);
        l.changed().await.unwrap();
        assert_eq!(*l.borrow_and_update(), Status::Bound);

        sm.set(Status::Shutdown);
        l.changed().await.unwrap();
        assert_eq!(*l.borrow_and_update(), Status::Shutdown);
    }

    #[tokio::test]
    async fn listeners_observe_a_monotone_sequence() {
        let sm = StatusManager::new(None);
        let mut l = sm.listen();
        for stat in [
            Status::Connected,
            Status::ConnectedTls,
            Status::Authenticated,
            Status::Bound,
            Status::Running,
        ] {
            sm.set(stat);
        }
        // The listener was not draining, so it only sees the newest value.
        l.changed().await.unwrap();
        assert_eq!(*l.borrow_and_update(), Status::Running);
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let sm = StatusManager::new(None);
        sm.set(Status::Error);
        sm.set(Status::Connected);
        assert_eq!(sm.current(), Status::Error);
    }

    #[tokio::test]
    async fn await_status_blocks_until_target() {
        let sm = std::sync::Arc::new(StatusManager::new(None));
        let (sync_tx, mut sync_rx) = mpsc::channel::<()>(1);

        let sm2 = sm.clone();
        tokio::spawn(async move {
            sm2.set(Status::Connected);
            sm2.set(Status::Bound);
            tokio::time::sleep(Duration::from_millis(100)).await;
            sync_tx.send(()).await.unwrap();
        });

        sm.await_status(Status::Bound).await.unwrap();
        // Proves the wait completed before the helper's sleep elapsed.
        assert!(sync_rx.try_recv().is_err());
        sync_rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn await_status_fails_on_fatal() {
        let sm = std::sync::Arc::new(StatusManager::new(None));
        let sm2 = sm.clone();
        tokio::spawn(async move {
            sm2.set(Status::Connected);
            sm2.set(Status::Error);
        });
        assert!(sm.await_status(Status::Bound).await.is_err());
    }

    #[tokio::test]
    async fn app_channel_sees_error_then_shutdown() {
        let (tx, mut rx) = mpsc::channel(10);
        let sm = StatusManager::new(Some(tx));
        sm.set(Status::Connected);
        assert_eq!(rx.recv().await, Some(Status::Connected));
        sm.set(Status::Error);
        assert_eq!(rx.recv().await, Some(Status::Error));
        assert_eq!(rx.recv().await, Some(Status::Shutdown));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn app_channel_gets_final_shutdown_and_closes() {
        let (tx, mut rx) = mpsc::channel(10);
        let sm = StatusManager::new(Some(tx));
        sm.set(Status::Connected);
        assert_eq!(rx.recv().await, Some(Status::Connected));
        sm.close();
        assert_eq!(rx.recv().await, Some(Status::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
