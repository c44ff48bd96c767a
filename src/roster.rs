// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Roster management, RFC 3921 section 7, kept in-process as the worked
//! example of an extension: a receive filter tees every stanza into a
//! manager task that folds roster iqs into a snapshot, and a send filter
//! lets the roster inject its own queries into the outgoing stream.

use std::collections::HashMap;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::extension::{Extension, Payload};
use crate::filter::STANZA_QUEUE;
use crate::id::next_id;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::{Header, Iq, Stanza};
use crate::xml::Element;

/// One roster entry. See RFC 3921, section 7.1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RosterItem {
    /// The contact's JID.
    pub jid: Jid,
    /// Optional display name.
    pub name: String,
    /// Subscription state: `none`, `to`, `from`, `both`, `remove`.
    pub subscription: String,
    /// Groups the contact is filed under.
    pub groups: Vec<String>,
}

impl RosterItem {
    fn from_element(el: &Element) -> RosterItem {
        RosterItem {
            jid: Jid::new(el.attr("jid").unwrap_or("")),
            name: el.attr("name").unwrap_or("").to_owned(),
            subscription: el.attr("subscription").unwrap_or("").to_owned(),
            groups: el
                .children_named(ns::ROSTER, "group")
                .map(|g| g.text.clone())
                .collect(),
        }
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new(ns::ROSTER, "item");
        if !self.jid.is_empty() {
            el.set_attr("jid", self.jid.as_str());
        }
        if !self.name.is_empty() {
            el.set_attr("name", &*self.name);
        }
        if !self.subscription.is_empty() {
            el.set_attr("subscription", &*self.subscription);
        }
        for group in &self.groups {
            el.children
                .push(Element::new(ns::ROSTER, "group").with_text(&**group));
        }
        el
    }
}

/// Roster query/result payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RosterQuery {
    /// The entries carried by this query.
    pub items: Vec<RosterItem>,
}

impl RosterQuery {
    pub(crate) fn to_element(&self) -> Element {
        let mut el = Element::new(ns::ROSTER, "query");
        for item in &self.items {
            el.children.push(item.to_element());
        }
        el
    }

    fn from_element(el: &Element) -> RosterQuery {
        RosterQuery {
            items: el
                .children_named(ns::ROSTER, "item")
                .map(RosterItem::from_element)
                .collect(),
        }
    }
}

/// Handle to the roster state kept by the manager task. Also known as the
/// buddy list: the set of contacts known to this JID.
pub struct Roster {
    get_tx: mpsc::Sender<oneshot::Sender<Vec<RosterItem>>>,
    to_server: mpsc::Sender<Stanza>,
}

impl Roster {
    /// The most recent snapshot of the roster. Updated automatically as
    /// roster pushes arrive from the server. Blocks until the initial
    /// roster result has been received.
    pub async fn get(&self) -> Result<Vec<RosterItem>, Error> {
        let (tx, rx) = oneshot::channel();
        self.get_tx.send(tx).await.map_err(|_| Error::Disconnected)?;
        rx.await.map_err(|_| Error::Disconnected)
    }

    /// Ask the server for the full roster. The result is folded into the
    /// snapshot when it arrives.
    pub async fn update(&self) -> Result<(), Error> {
        let iq = Stanza::Iq(Iq {
            header: Header {
                id: next_id(),
                type_: "get".to_owned(),
                nested: vec![Payload::Roster(RosterQuery::default())],
                ..Header::default()
            },
        });
        self.to_server
            .send(iq)
            .await
            .map_err(|_| Error::Disconnected)
    }
}

/// Fold roster traffic into a map keyed by JID, recomputing the snapshot
/// slice after each change. `get` requests that arrive before the first
/// snapshot are parked until it exists.
async fn roster_mgr(
    mut updates: mpsc::Receiver<Stanza>,
    mut gets: mpsc::Receiver<oneshot::Sender<Vec<RosterItem>>>,
) {
    let mut roster: HashMap<Jid, RosterItem> = HashMap::new();
    let mut snapshot: Option<Vec<RosterItem>> = None;
    let mut parked: Vec<oneshot::Sender<Vec<RosterItem>>> = Vec::new();
    let mut accepting = true;
    loop {
        tokio::select! {
            stanza = updates.recv() => {
                let Some(stanza) = stanza else { return };
                let Stanza::Iq(iq) = &stanza else { continue };
                if iq.header.type_ != "result" && iq.header.type_ != "set" {
                    continue;
                }
                let query = iq.header.nested.iter().find_map(|payload| match payload {
                    Payload::Roster(query) => Some(query),
                    _ => None,
                });
                let Some(query) = query else { continue };
                for item in &query.items {
                    roster.insert(item.jid.clone(), item.clone());
                }
                let snap: Vec<RosterItem> = roster.values().cloned().collect();
                for waiter in parked.drain(..) {
                    let _ = waiter.send(snap.clone());
                }
                snapshot = Some(snap);
            },
            request = gets.recv(), if accepting => match request {
                None => accepting = false,
                Some(reply) => match &snapshot {
                    Some(snap) => {
                        let _ = reply.send(snap.clone());
                    }
                    None => parked.push(reply),
                },
            },
        }
    }
}

/// Build the roster handle and its engine-side registration.
pub(crate) fn roster_extension() -> (Roster, Extension) {
    let (update_tx, update_rx) = mpsc::channel(STANZA_QUEUE);
    let (get_tx, get_rx) = mpsc::channel(STANZA_QUEUE);
    let (to_server_tx, mut to_server_rx) = mpsc::channel::<Stanza>(STANZA_QUEUE);
    tokio::spawn(roster_mgr(update_rx, get_rx));

    let recv_filter = Box::new(
        move |mut input: mpsc::Receiver<Stanza>, output: mpsc::Sender<Stanza>| {
            async move {
                while let Some(stanza) = input.recv().await {
                    // The manager gets its own copy; the original continues
                    // up the stack unchanged.
                    if update_tx.send(stanza.clone()).await.is_err() {
                        break;
                    }
                    if output.send(stanza).await.is_err() {
                        break;
                    }
                }
            }
            .boxed()
        },
    );

    let send_filter = Box::new(
        move |mut input: mpsc::Receiver<Stanza>, output: mpsc::Sender<Stanza>| {
            async move {
                let mut querying = true;
                loop {
                    tokio::select! {
                        stanza = input.recv() => match stanza {
                            None => return,
                            Some(stanza) => {
                                if output.send(stanza).await.is_err() {
                                    return;
                                }
                            }
                        },
                        stanza = to_server_rx.recv(), if querying => match stanza {
                            None => querying = false,
                            Some(stanza) => {
                                if output.send(stanza).await.is_err() {
                                    return;
                                }
                            }
                        },
                    }
                }
            }
            .boxed()
        },
    );

    let extension = Extension {
        payloads: Vec::new(),
        recv_filter: Some(recv_filter),
        send_filter: Some(send_filter),
    }
    .with_payload(ns::ROSTER, "query", |el| {
        Ok(Payload::Roster(RosterQuery::from_element(el)))
    });

    let roster = Roster {
        get_tx,
        to_server: to_server_tx,
    };
    (roster, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_iq(type_: &str, items: Vec<RosterItem>) -> Stanza {
        Stanza::Iq(Iq {
            header: Header {
                id: next_id(),
                type_: type_.to_owned(),
                nested: vec![Payload::Roster(RosterQuery { items })],
                ..Header::default()
            },
        })
    }

    fn item(jid: &str, name: &str) -> RosterItem {
        RosterItem {
            jid: Jid::new(jid),
            name: name.to_owned(),
            ..RosterItem::default()
        }
    }

    #[tokio::test]
    async fn get_blocks_until_first_result() {
        let (roster, mut ext) = roster_extension();

        // Wire the two filters together the way the engine would.
        let (net_in_tx, net_in_rx) = mpsc::channel(STANZA_QUEUE);
        let (app_out_tx, mut app_out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn((ext.recv_filter.take().unwrap())(net_in_rx, app_out_tx));
        let (app_in_tx, app_in_rx) = mpsc::channel(STANZA_QUEUE);
        let (net_out_tx, mut net_out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn((ext.send_filter.take().unwrap())(app_in_rx, net_out_tx));

        roster.update().await.unwrap();
        // The roster-get goes out through the send filter.
        let query = net_out_rx.recv().await.unwrap();
        assert_eq!(query.header().type_, "get");

        let pending = tokio::spawn(async move { roster.get().await });

        net_in_tx
            .send(roster_iq(
                "result",
                vec![item("juliet@example.com", "Juliet")],
            ))
            .await
            .unwrap();
        // The stanza still reaches the application.
        assert!(app_out_rx.recv().await.is_some());

        let items = pending.await.unwrap().unwrap();
        assert_eq!(items, vec![item("juliet@example.com", "Juliet")]);
        drop(app_in_tx);
    }

    #[tokio::test]
    async fn pushes_update_the_snapshot() {
        let (roster, mut ext) = roster_extension();
        let (net_in_tx, net_in_rx) = mpsc::channel(STANZA_QUEUE);
        let (app_out_tx, mut app_out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn((ext.recv_filter.take().unwrap())(net_in_rx, app_out_tx));

        net_in_tx
            .send(roster_iq("result", vec![item("a@x", "A")]))
            .await
            .unwrap();
        app_out_rx.recv().await.unwrap();
        assert_eq!(roster.get().await.unwrap().len(), 1);

        net_in_tx
            .send(roster_iq(
                "set",
                vec![item("a@x", "A renamed"), item("b@x", "B")],
            ))
            .await
            .unwrap();
        app_out_rx.recv().await.unwrap();

        // The manager may still be folding the push; poll until it lands.
        loop {
            let mut items = roster.get().await.unwrap();
            items.sort_by(|a, b| a.jid.as_str().cmp(b.jid.as_str()));
            if items.len() == 2 && items[0].name == "A renamed" {
                assert_eq!(items[1], item("b@x", "B"));
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn query_roundtrip() {
        let query = RosterQuery {
            items: vec![RosterItem {
                jid: Jid::new("juliet@example.com"),
                name: "Juliet".to_owned(),
                subscription: "both".to_owned(),
                groups: vec!["Friends".to_owned()],
            }],
        };
        let el = query.to_element();
        assert_eq!(
            el.to_string(),
            "<query xmlns=\"jabber:iq:roster\"><item jid=\"juliet@example.com\" \
             name=\"Juliet\" subscription=\"both\"><group>Friends</group></item></query>"
        );
        assert_eq!(RosterQuery::from_element(&el), query);
    }
}
