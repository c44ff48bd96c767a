// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extension registration.
//!
//! An extension contributes up to two stanza filters and any number of
//! payload parsers. Parsers are keyed by the qualified name of the nested
//! element they understand; the codec runs them over every stanza's
//! children and appends the produced payloads to the stanza header.

use std::collections::HashMap;

use crate::error::{Error, ParseError, ProtocolError};
use crate::filter::Filter;
use crate::negotiation::BindQuery;
use crate::roster::RosterQuery;
use crate::stanza::Header;
use crate::xml::Element;

/// A typed extension payload carried in a stanza's `nested` list.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Resource binding, RFC 3920 section 7.
    Bind(BindQuery),
    /// Roster query, RFC 3921 section 7.
    Roster(RosterQuery),
    /// Any other registered payload, kept as a raw element.
    Generic(Element),
}

impl Payload {
    /// Encode the payload for transmission.
    pub fn to_element(&self) -> Element {
        match self {
            Payload::Bind(bind) => bind.to_element(),
            Payload::Roster(roster) => roster.to_element(),
            Payload::Generic(el) => el.clone(),
        }
    }
}

/// A parser producing a typed payload from a nested element.
pub type PayloadParser = Box<dyn Fn(&Element) -> Result<Payload, ParseError> + Send + Sync>;

/// What an extension registers with the engine at construction time.
#[derive(Default)]
pub struct Extension {
    /// Payload parsers, keyed by `(namespace, local name)`.
    pub payloads: Vec<((String, String), PayloadParser)>,
    /// Filter for incoming stanzas, on their way from the server to the
    /// application.
    pub recv_filter: Option<Filter>,
    /// Filter for outgoing stanzas, going the other direction.
    pub send_filter: Option<Filter>,
}

impl Extension {
    /// Register a payload parser for `{ns}name`.
    pub fn with_payload<F>(mut self, ns: &str, name: &str, parser: F) -> Extension
    where
        F: Fn(&Element) -> Result<Payload, ParseError> + Send + Sync + 'static,
    {
        self.payloads
            .push(((ns.to_owned(), name.to_owned()), Box::new(parser)));
        self
    }
}

/// The merged, read-only payload parser table built once at construction.
pub(crate) struct PayloadRegistry {
    parsers: HashMap<(String, String), PayloadParser>,
}

impl PayloadRegistry {
    /// Merge the payload tables of all extensions, rejecting duplicate
    /// registrations for the same qualified name.
    pub(crate) fn new(extensions: &mut [Extension]) -> Result<PayloadRegistry, Error> {
        let mut parsers = HashMap::new();
        for ext in extensions {
            for (qname, parser) in ext.payloads.drain(..) {
                if parsers.contains_key(&qname) {
                    return Err(ProtocolError::DuplicatePayload(format!(
                        "{{{}}}{}",
                        qname.0, qname.1
                    ))
                    .into());
                }
                parsers.insert(qname, parser);
            }
        }
        Ok(PayloadRegistry { parsers })
    }

    /// Run the registered parsers over a decoded stanza's children and
    /// append every produced payload to the header's `nested` list, in
    /// document order. A parser failure poisons the stream.
    pub(crate) fn parse_nested(
        &self,
        header: &mut Header,
        el: &Element,
    ) -> Result<(), ParseError> {
        for child in &el.children {
            let key = (child.ns.clone(), child.name.clone());
            if let Some(parser) = self.parsers.get(&key) {
                header.nested.push(parser(child)?);
            }
        }
        Ok(())
    }
}
