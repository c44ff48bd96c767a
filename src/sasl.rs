// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SASL authentication: mechanism selection and the DIGEST-MD5
//! challenge-response computation of RFC 2831.

use base64::engine::{general_purpose::STANDARD as Base64, Engine as _};
use rand::{thread_rng, Rng};
use std::collections::HashMap;

use crate::error::{AuthError, Error};
use crate::negotiation::Negotiation;
use crate::ns;
use crate::stanza::{Auth, Features, Packet};
use crate::status::Status;
use crate::xml::Element;

impl Negotiation {
    /// The server is advertising the mechanisms it supports. Choose one
    /// and respond. DIGEST-MD5 is preferred over PLAIN; anything else is
    /// unsupported.
    pub(crate) async fn choose_sasl(&mut self, features: &Features) -> Result<(), Error> {
        let mut digest_md5 = false;
        let mut plain = false;
        for mechanism in &features.mechanisms {
            match mechanism.to_ascii_lowercase().as_str() {
                "digest-md5" => digest_md5 = true,
                "plain" => plain = true,
                _ => (),
            }
        }

        if digest_md5 {
            self.send_raw(Packet::Auth(Auth::Auth {
                mechanism: "DIGEST-MD5".to_owned(),
                data: String::new(),
            }))
            .await
        } else if plain {
            let raw = format!("\0{}\0{}", self.jid.node(), self.password);
            self.send_raw(Packet::Auth(Auth::Auth {
                mechanism: "PLAIN".to_owned(),
                data: Base64.encode(raw.as_bytes()),
            }))
            .await
        } else {
            Err(AuthError::NoMechanism(features.mechanisms.clone()).into())
        }
    }

    /// The server is responding to our auth request.
    pub(crate) async fn handle_sasl(&mut self, auth: Auth) -> Result<(), Error> {
        match auth {
            Auth::Challenge(data) => {
                let decoded = Base64
                    .decode(data.trim().as_bytes())
                    .map_err(|_| AuthError::BadChallenge)?;
                let text = String::from_utf8(decoded).map_err(|_| AuthError::BadChallenge)?;
                let challenge = parse_sasl(&text);
                if self.sasl_expected.is_empty() {
                    self.sasl_digest1(challenge).await
                } else {
                    self.sasl_digest2(challenge).await
                }
            }
            Auth::Failure(_) => Err(AuthError::Fail.into()),
            Auth::Success(_) => {
                self.password.clear();
                self.core.statmgr.set(Status::Authenticated);
                self.core.clear_features();
                self.send_opener().await
            }
            // `auth` and `response` only ever travel towards the server.
            Auth::Auth { .. } | Auth::Response(_) => Ok(()),
        }
    }

    /// First challenge: compute the digest response, remember the rspauth
    /// the server must echo back.
    async fn sasl_digest1(&mut self, challenge: HashMap<String, String>) -> Result<(), Error> {
        let has_auth = challenge
            .get("qop")
            .map(|qop| qop.split_whitespace().any(|q| q == "auth"))
            .unwrap_or(false);
        if !has_auth {
            return Err(AuthError::NoQopAuth.into());
        }

        let realm = challenge
            .get("realm")
            .and_then(|r| r.split_whitespace().next())
            .unwrap_or("")
            .to_owned();
        let nonce = challenge
            .get("nonce")
            .filter(|n| !n.is_empty())
            .cloned()
            .ok_or(AuthError::BadChallenge)?;
        let digest_uri = format!("xmpp/{}", self.jid.domain());
        let nc = format!("{:08x}", 1);
        let cnonce = format!("{:016x}", thread_rng().gen::<u64>());

        // Username is user@domain's node, or the domain for accounts
        // without one.
        let username = if self.jid.node().is_empty() {
            self.jid.domain()
        } else {
            self.jid.node()
        }
        .to_owned();

        let response = digest_response(
            &username,
            &realm,
            &self.password,
            &nonce,
            &cnonce,
            "AUTHENTICATE",
            &digest_uri,
            &nc,
        );
        self.sasl_expected = digest_response(
            &username, &realm, &self.password, &nonce, &cnonce, "", &digest_uri, &nc,
        );

        let quote = |s: &str| format!("\"{}\"", s);
        let charset = challenge
            .get("charset")
            .filter(|c| *c == "utf-8")
            .cloned()
            .unwrap_or_default();
        let reply = pack_sasl(&[
            ("username", quote(&username)),
            ("realm", quote(&realm)),
            ("nonce", quote(&nonce)),
            ("cnonce", quote(&cnonce)),
            ("nc", nc),
            ("qop", "auth".to_owned()),
            ("digest-uri", quote(&digest_uri)),
            ("response", response),
            ("charset", charset),
        ]);
        self.send_raw(Packet::Auth(Auth::Response(Base64.encode(reply.as_bytes()))))
            .await
    }

    /// Second challenge: the server proves knowledge of the shared secret
    /// by presenting the rspauth we computed ourselves.
    async fn sasl_digest2(&mut self, challenge: HashMap<String, String>) -> Result<(), Error> {
        let authentic = challenge
            .get("rspauth")
            .map(|rspauth| *rspauth == self.sasl_expected)
            .unwrap_or(false);
        if authentic {
            self.send_raw(Packet::Auth(Auth::Response(String::new()))).await
        } else {
            self.send_raw(Packet::Auth(Auth::Failure(Some(Element::new(
                ns::SASL, "abort",
            )))))
            .await?;
            Err(AuthError::RspauthMismatch.into())
        }
    }
}

/// Parse a challenge of the form `key1=value1,key2="value two",…` into a
/// key/value map. Keys are lowercased; empty pairs are dropped.
pub(crate) fn parse_sasl(input: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = input;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().trim_start_matches(',').to_ascii_lowercase();
        rest = &rest[eq + 1..];
        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_owned();
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].to_owned();
            rest = &rest[end..];
        }
        rest = rest.strip_prefix(',').unwrap_or(rest);
        if !key.is_empty() && !value.is_empty() {
            map.insert(key, value);
        }
    }
    map
}

/// Inverse of [`parse_sasl`]: join `key=value` pairs, skipping entries
/// whose value is empty (quoted or not).
pub(crate) fn pack_sasl(pairs: &[(&str, String)]) -> String {
    let mut terms = Vec::new();
    for (key, value) in pairs {
        if key.is_empty() || value.is_empty() || value == "\"\"" {
            continue;
        }
        terms.push(format!("{}={}", key, value));
    }
    terms.join(",")
}

fn md5_raw(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// The response string for digest authentication, RFC 2831 section 2.1.2.1:
///
/// ```text
/// A1       = H(user ":" realm ":" pass) ":" nonce ":" cnonce
/// A2       = authenticate ":" digest-uri
/// response = HEX(KD(HEX(H(A1)), nonce ":" nc ":" cnonce ":" "auth" ":" HEX(H(A2))))
/// ```
///
/// `authenticate` is `"AUTHENTICATE"` for the client's own response and
/// empty for the expected rspauth.
#[allow(clippy::too_many_arguments)]
pub(crate) fn digest_response(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    authenticate: &str,
    digest_uri: &str,
    nc: &str,
) -> String {
    // A1 concatenates the *raw* 16 MD5 bytes with text; it is not valid
    // UTF-8 and has to stay a byte vector.
    let mut a1 = Vec::new();
    a1.extend_from_slice(&md5_raw(
        format!("{}:{}:{}", username, realm, password).as_bytes(),
    ));
    a1.extend_from_slice(format!(":{}:{}", nonce, cnonce).as_bytes());
    let a2 = format!("{}:{}", authenticate, digest_uri);

    let secret = hex(&md5_raw(&a1));
    let data = format!("{}:{}:{}:auth:{}", nonce, nc, cnonce, hex(&md5_raw(a2.as_bytes())));
    hex(&md5_raw(format!("{}:{}", secret, data).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_rfc2831_example() {
        // These values are from RFC 2831, section 4.
        let observed = digest_response(
            "chris",
            "elwood.innosoft.com",
            "secret",
            "OA6MG9tEQGm2hh",
            "OA6MHXh6VqTrRk",
            "AUTHENTICATE",
            "imap/elwood.innosoft.com",
            "00000001",
        );
        assert_eq!(observed, "d388dad90d4bbd760a152321f2143af7");
    }

    #[test]
    fn rspauth_matches_rfc2831_example() {
        let observed = digest_response(
            "chris",
            "elwood.innosoft.com",
            "secret",
            "OA6MG9tEQGm2hh",
            "OA6MHXh6VqTrRk",
            "",
            "imap/elwood.innosoft.com",
            "00000001",
        );
        assert_eq!(observed, "ea40f60335c427b5527b84dbabcdfffd");
    }

    #[test]
    fn parse_mixed_quoting() {
        let map = parse_sasl(
            "realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",\
             algorithm=md5-sess,charset=utf-8",
        );
        assert_eq!(map["realm"], "elwood.innosoft.com");
        assert_eq!(map["nonce"], "OA6MG9tEQGm2hh");
        assert_eq!(map["qop"], "auth");
        assert_eq!(map["algorithm"], "md5-sess");
        assert_eq!(map["charset"], "utf-8");
    }

    #[test]
    fn pack_skips_empty_values() {
        let packed = pack_sasl(&[
            ("username", "\"chris\"".to_owned()),
            ("realm", "\"\"".to_owned()),
            ("qop", "auth".to_owned()),
            ("charset", String::new()),
        ]);
        assert_eq!(packed, "username=\"chris\",qop=auth");
    }
}
