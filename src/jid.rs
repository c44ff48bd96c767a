// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Jabber identifiers.

use core::fmt;

/// A JID represents an entity that can communicate with other entities.
/// It looks like `node@domain/resource`, where node and resource are
/// sometimes optional.
///
/// Equality is plain string equality; no stringprep normalization is
/// applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Jid(String);

impl Jid {
    /// Wrap a raw JID string.
    pub fn new<S: Into<String>>(s: S) -> Jid {
        Jid(s.into())
    }

    /// The part before the `@`, or the empty string if there is none.
    pub fn node(&self) -> &str {
        match self.0.find('@') {
            Some(at) => &self.0[..at],
            None => "",
        }
    }

    /// The part between the `@` and the last `/`; the whole string if
    /// neither is present.
    pub fn domain(&self) -> &str {
        let start = self.0.find('@').map(|at| at + 1).unwrap_or(0);
        let end = self.0.rfind('/').unwrap_or(self.0.len());
        &self.0[start..end]
    }

    /// The part after the last `/`, or the empty string if there is none.
    pub fn resource(&self) -> &str {
        match self.0.rfind('/') {
            Some(slash) => &self.0[slash + 1..],
            None => "",
        }
    }

    /// The JID without its resource part.
    pub fn bare(&self) -> Jid {
        if self.node().is_empty() {
            Jid(self.domain().to_owned())
        } else {
            Jid(format!("{}@{}", self.node(), self.domain()))
        }
    }

    /// View the JID as a plain string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the JID is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(s: &str) -> Jid {
        Jid(s.to_owned())
    }
}

impl From<String> for Jid {
    fn from(s: String) -> Jid {
        Jid(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_jid() {
        let jid = Jid::new("user@domain/res");
        assert_eq!(jid.node(), "user");
        assert_eq!(jid.domain(), "domain");
        assert_eq!(jid.resource(), "res");
        assert_eq!(jid.bare(), Jid::new("user@domain"));
    }

    #[test]
    fn domain_only() {
        let jid = Jid::new("domain.tld");
        assert_eq!(jid.node(), "");
        assert_eq!(jid.domain(), "domain.tld");
        assert_eq!(jid.resource(), "");
        assert_eq!(jid.bare(), jid);
    }

    #[test]
    fn bare_plus_resource_roundtrip() {
        let jid = Jid::new("a@b.c/balcony");
        assert_eq!(
            Jid::new(format!("{}/{}", jid.bare(), jid.resource())),
            jid
        );
    }
}
