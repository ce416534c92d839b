//! Unit identity and per-request routing.
//!
//! A [`Token`] splits into two parts with different lifetimes:
//!
//! - [`TokenId`] - the identity key. Two requests with the same id are the
//!   same logical job and are coalesced into one traversal.
//! - [`Routing`] - per-request metadata. It differs between requests sharing
//!   an id and must survive coalescing so every requester is answered on its
//!   own channel.

use std::fmt;

/// Identity key of a logical job, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(String);

impl TokenId {
    /// Creates an identity key from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TokenId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TokenId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Per-request routing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routing {
    /// Secondary correlation key chosen by the requester
    pub correlation_key: String,
    /// Address the result should be delivered to
    pub address: String,
    /// Destination identifier at that address
    pub destination_id: String,
}

impl Routing {
    /// Creates routing metadata from its three parts.
    pub fn new(
        correlation_key: impl Into<String>,
        address: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            address: address.into(),
            destination_id: destination_id.into(),
        }
    }
}

/// Identity key plus routing for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    id: TokenId,
    routing: Routing,
}

impl Token {
    /// Creates a token with empty routing.
    pub fn new(id: impl Into<TokenId>) -> Self {
        Self {
            id: id.into(),
            routing: Routing::default(),
        }
    }

    /// Sets the routing metadata.
    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    /// Returns the identity key.
    #[inline]
    pub fn id(&self) -> &TokenId {
        &self.id
    }

    /// Returns the routing metadata.
    #[inline]
    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Returns a token with this identity and another request's routing.
    pub fn readdressed(&self, routing: &Routing) -> Token {
        Token {
            id: self.id.clone(),
            routing: routing.clone(),
        }
    }
}
