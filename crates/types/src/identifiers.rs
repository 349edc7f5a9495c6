//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-process client identity.
///
/// Generated once when a lease manager is constructed and sent with every
/// broker call so the broker can correlate acquire/renew/release/switch
/// requests from the same process. 128 random bits, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Number of random bytes in a generated identity.
    pub const BYTES: usize = 16;

    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let bytes: [u8; Self::BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Wrap an existing identity string (e.g. one supplied by configuration).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker-assigned lease identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(pub String);

impl LeaseId {
    /// Create a lease id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_is_128_bit_hex() {
        let id = ClientId::generate();
        assert_eq!(id.as_str().len(), ClientId::BYTES * 2);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_client_ids_differ() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let lease_id = LeaseId::new("lease-1");
        assert_eq!(serde_json::to_string(&lease_id).unwrap(), "\"lease-1\"");

        let client_id = ClientId::from_string("abc");
        assert_eq!(serde_json::to_string(&client_id).unwrap(), "\"abc\"");
    }
}
