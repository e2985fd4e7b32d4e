//! Cluster member identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a cluster member.
///
/// Addresses are supplied by the transport and compared by identity only;
/// the name carries no meaning beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Creates an address from a member name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the member name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_equality() {
        assert_eq!(Address::new("node-a"), Address::from("node-a"));
        assert_ne!(Address::new("node-a"), Address::new("node-b"));
        assert_eq!(Address::new("node-a").to_string(), "node-a");
    }
}
