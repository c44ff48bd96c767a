// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Unique IDs for outgoing stanzas.

use core::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

/// Generate a process-wide unique id for an outgoing iq, message, or
/// presence stanza. Ids are of the form `id_<N>` with `N` increasing,
/// which makes traffic easy to follow in logs.
pub fn next_id() -> String {
    format!("id_{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_id();
        let b = next_id();
        assert_ne!(a, b);
        let na: u64 = a.strip_prefix("id_").unwrap().parse().unwrap();
        let nb: u64 = b.strip_prefix("id_").unwrap().parse().unwrap();
        assert!(nb > na);
    }
}
