// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A client-side [XMPP](https://xmpp.org/) (RFC 3920/3921) protocol engine
//! with asynchronous I/O using [tokio](https://tokio.rs/).
//!
//! The implementation is structured as a stack of layers, with TCP at the
//! bottom and the application at the top: a transport that owns the socket
//! and can upgrade it to TLS in place, an XML codec, a negotiation layer
//! that drives STARTTLS, SASL, resource binding and session setup, and a
//! pair of filter stacks through which every application stanza travels.
//! Each layer is a task; layers talk through channels and coordinate
//! through a shared connection-status broadcast.
//!
//! # Getting started
//!
//! Create a [`Client`] and read stanzas from it:
//!
//! ```no_run
//! use xmpp_stack::{Client, Jid, Presence, Stanza};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), xmpp_stack::Error> {
//!     let mut client = Client::new(
//!         Jid::new("alice@example.com/balcony"),
//!         "hunter2".to_owned(),
//!         xmpp_stack::default_tls_config(),
//!         vec![],
//!         Presence::default(),
//!         None,
//!     )
//!     .await?;
//!     while let Some(stanza) = client.recv().await {
//!         if let Stanza::Message(message) = stanza {
//!             println!("{:?}", message.body);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # What is not here
//!
//! Server mode, server-to-server federation, reconnection, and stream
//! management (XEP-0198) are out of scope. A disconnected engine is
//! terminal: the application observes a closed receive stream and a final
//! status value.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

mod client;
mod codec;
mod connect;
/// Detailed error types.
pub mod error;
mod extension;
mod filter;
mod id;
mod jid;
mod negotiation;
pub mod ns;
mod roster;
mod sasl;
mod stanza;
mod status;
mod transport;
mod xml;

pub use crate::client::Client;
#[doc(inline)]
pub use crate::error::Error;
pub use crate::extension::{Extension, Payload, PayloadParser};
pub use crate::filter::Filter;
pub use crate::id::next_id;
pub use crate::jid::Jid;
pub use crate::negotiation::{BindQuery, Callback};
pub use crate::roster::{Roster, RosterItem, RosterQuery};
pub use crate::stanza::{
    Auth, Features, Header, Iq, Message, Packet, Presence, Stanza, StanzaError, Starttls,
    StreamError, StreamOpen, Text, XMPP_VERSION,
};
pub use crate::status::Status;
pub use crate::transport::{default_tls_config, AsyncReadAndWrite, Socket};
pub use crate::xml::Element;
