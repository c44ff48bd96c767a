// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stack of filters that can read and modify stanzas on their way
//! between the network and the application.

use core::mem;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::stanza::Stanza;

/// A filter task interposed in the pipeline. It is handed its input and
/// output channels when the manager launches it and must close its output
/// (by dropping the sender) when its input closes.
pub type Filter =
    Box<dyn FnOnce(mpsc::Receiver<Stanza>, mpsc::Sender<Stanza>) -> BoxFuture<'static, ()> + Send>;

/// Depth of the intermediate channels between stacked filters.
pub(crate) const STANZA_QUEUE: usize = 1;

/// Maintain a stack of filters between `input` and `output`.
///
/// New filters arriving on `add` are pushed on top of the stack: the
/// newcomer is spawned with the manager's current input and a fresh
/// intermediate channel, which then becomes the input the manager copies
/// from. When `input` closes, the closure travels up through every filter
/// and finally causes `output` to close.
pub(crate) async fn filter_mgr(
    mut add: mpsc::Receiver<Filter>,
    mut input: mpsc::Receiver<Stanza>,
    output: mpsc::Sender<Stanza>,
) {
    let mut accepting = true;
    loop {
        tokio::select! {
            stanza = input.recv() => match stanza {
                Some(stanza) => {
                    if output.send(stanza).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            filter = add.recv(), if accepting => match filter {
                Some(filter) => {
                    let (tx, rx) = mpsc::channel(STANZA_QUEUE);
                    let below = mem::replace(&mut input, rx);
                    tokio::spawn(filter(below, tx));
                }
                None => accepting = false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::stanza::{Header, Message};

    fn passthru() -> Filter {
        Box::new(|mut input, output| {
            async move {
                while let Some(stanza) = input.recv().await {
                    if output.send(stanza).await.is_err() {
                        break;
                    }
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn output_closes_when_input_closes() {
        let (add_tx, add_rx) = mpsc::channel(1);
        let (in_tx, in_rx) = mpsc::channel(STANZA_QUEUE);
        let (out_tx, mut out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(filter_mgr(add_rx, in_rx, out_tx));
        drop(in_tx);
        assert!(out_rx.recv().await.is_none());
        drop(add_tx);
    }

    #[tokio::test]
    async fn identity_filters_preserve_order() {
        for depth in 0..10 {
            let (add_tx, add_rx) = mpsc::channel(1);
            let (in_tx, in_rx) = mpsc::channel(STANZA_QUEUE);
            let (out_tx, mut out_rx) = mpsc::channel(STANZA_QUEUE);
            tokio::spawn(filter_mgr(add_rx, in_rx, out_tx));
            for _ in 0..depth {
                add_tx.send(passthru()).await.unwrap();
            }
            tokio::spawn(async move {
                for i in 0..100 {
                    let msg = Message {
                        header: Header {
                            id: format!("{}", i),
                            ..Header::default()
                        },
                        ..Message::default()
                    };
                    in_tx.send(Stanza::Message(msg)).await.unwrap();
                }
            });
            for i in 0..100 {
                let stanza = out_rx.recv().await.expect("stream ended early");
                let id: usize = stanza.header().id.parse().unwrap();
                assert_eq!(id, i, "depth {}: stanza out of order", depth);
            }
        }
    }

    #[tokio::test]
    async fn filters_added_mid_stream_keep_the_stream_flowing() {
        let (add_tx, add_rx) = mpsc::channel(1);
        let (in_tx, in_rx) = mpsc::channel(STANZA_QUEUE);
        let (out_tx, mut out_rx) = mpsc::channel(STANZA_QUEUE);
        tokio::spawn(filter_mgr(add_rx, in_rx, out_tx));

        in_tx
            .send(Stanza::Message(Message::default()))
            .await
            .unwrap();
        assert!(out_rx.recv().await.is_some());

        add_tx.send(passthru()).await.unwrap();
        in_tx
            .send(Stanza::Message(Message::default()))
            .await
            .unwrap();
        assert!(out_rx.recv().await.is_some());

        drop(in_tx);
        assert!(out_rx.recv().await.is_none());
    }
}
