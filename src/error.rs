// Copyright (c) 2026 xmpp-stack contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Detailed error types.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;

use crate::stanza::StreamError;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// I/O error on the underlying socket or pipe.
    Io(IoError),
    /// Protocol-level error.
    Protocol(ProtocolError),
    /// SASL authentication error.
    Auth(AuthError),
    /// `<stream:error>` received from the peer.
    Stream(StreamError),
    /// TLS error during the in-place upgrade.
    Tls(tokio_rustls::rustls::Error),
    /// The server name in the JID is not usable for TLS.
    DnsName(tokio_rustls::rustls::pki_types::InvalidDnsNameError),
    /// DNS resolution error.
    Resolve(hickory_resolver::error::ResolveError),
    /// Invalid IP/port address.
    Addr(AddrParseError),
    /// Connection closed.
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::Stream(e) => write!(fmt, "stream error: {}", e),
            Error::Tls(e) => write!(fmt, "TLS error: {}", e),
            Error::DnsName(e) => write!(fmt, "DNS name error: {}", e),
            Error::Resolve(e) => write!(fmt, "DNS resolution error: {}", e),
            Error::Addr(e) => write!(fmt, "wrong network address: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(e: tokio_rustls::rustls::Error) -> Self {
        Error::Tls(e)
    }
}

impl From<tokio_rustls::rustls::pki_types::InvalidDnsNameError> for Error {
    fn from(e: tokio_rustls::rustls::pki_types::InvalidDnsNameError) -> Self {
        Error::DnsName(e)
    }
}

impl From<hickory_resolver::error::ResolveError> for Error {
    fn from(e: hickory_resolver::error::ResolveError) -> Self {
        Error::Resolve(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Error::Addr(e)
    }
}

/// XMPP protocol-level error.
#[derive(Debug)]
pub enum ProtocolError {
    /// XML parser error.
    Xml(rxml::Error),
    /// An element did not match the structure required of it.
    Parse(ParseError),
    /// Two extensions registered a parser for the same qualified name.
    DuplicatePayload(String),
    /// Invalid response to resource binding.
    InvalidBindResponse,
    /// The bind reply carried an empty JID.
    EmptyBindJid,
    /// A non-iq stanza answered an iq request.
    NonIqResponse,
    /// The server refused our STARTTLS request.
    TlsRefused,
    /// Resource binding was refused by the server.
    BindFailed,
    /// Session establishment was refused by the server.
    SessionFailed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Xml(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::Parse(e) => write!(fmt, "element parse error: {}", e),
            ProtocolError::DuplicatePayload(name) => {
                write!(fmt, "duplicate payload parser for {}", name)
            }
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::EmptyBindJid => write!(fmt, "empty resource in bind reply"),
            ProtocolError::NonIqResponse => write!(fmt, "non-iq response to an iq request"),
            ProtocolError::TlsRefused => write!(fmt, "server refused STARTTLS"),
            ProtocolError::BindFailed => write!(fmt, "resource binding failed"),
            ProtocolError::SessionFailed => write!(fmt, "could not start session"),
        }
    }
}

impl StdError for ProtocolError {}

impl From<rxml::Error> for ProtocolError {
    fn from(e: rxml::Error) -> Self {
        ProtocolError::Xml(e)
    }
}

impl From<rxml::Error> for Error {
    fn from(e: rxml::Error) -> Self {
        ProtocolError::Xml(e).into()
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        ProtocolError::Parse(e).into()
    }
}

/// Error raised when a well-formed element does not carry the expected
/// structure, e.g. a `bind` payload without a `jid` child.
#[derive(Debug)]
pub struct ParseError(&'static str);

impl ParseError {
    /// Describe what was missing or malformed.
    pub fn new(what: &'static str) -> ParseError {
        ParseError(what)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl StdError for ParseError {}

/// SASL authentication error.
#[derive(Debug)]
pub enum AuthError {
    /// None of the advertised mechanisms is supported.
    NoMechanism(Vec<String>),
    /// The server does not offer the `auth` quality of protection.
    NoQopAuth,
    /// A challenge could not be decoded.
    BadChallenge,
    /// The server's `rspauth` did not match the expected value.
    RspauthMismatch,
    /// `<failure>` from the server.
    Fail,
}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism(mechs) => {
                write!(fmt, "no supported auth mechanism in {:?}", mechs)
            }
            AuthError::NoQopAuth => write!(fmt, "server doesn't support qop=auth"),
            AuthError::BadChallenge => write!(fmt, "malformed SASL challenge"),
            AuthError::RspauthMismatch => write!(fmt, "SASL rspauth mismatch"),
            AuthError::Fail => write!(fmt, "SASL authentication failed"),
        }
    }
}

impl StdError for AuthError {}
