// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespaces used by RFC 3920 / RFC 3921 streams.

/// `jabber:client`, the default namespace of a client-to-server stream.
pub const CLIENT: &str = "jabber:client";

/// `http://etherx.jabber.org/streams`, bound to the `stream:` prefix.
pub const STREAM: &str = "http://etherx.jabber.org/streams";

/// `urn:ietf:params:xml:ns:xmpp-streams`, stream error conditions.
pub const STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

/// `urn:ietf:params:xml:ns:xmpp-tls`, STARTTLS negotiation.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

/// `urn:ietf:params:xml:ns:xmpp-sasl`, SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// `urn:ietf:params:xml:ns:xmpp-bind`, resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

/// `urn:ietf:params:xml:ns:xmpp-session`, session establishment.
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";

/// `jabber:iq:roster`, contact list management.
pub const ROSTER: &str = "jabber:iq:roster";

/// The XML 1.0 namespace, bound to the reserved `xml:` prefix.
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
