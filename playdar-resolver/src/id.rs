//! # Identifier Module
//!
//! Opaque, globally-unique identifiers for queries and sources. Both are
//! 128-bit UUIDs string-rendered on the wire, matching the original
//! C++ daemon's `query_uid`/`source_uid` typedefs (plain strings generated
//! from a uuid library) while giving callers a typed, non-interchangeable
//! handle in Rust.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uid_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new, unique identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uid_type!(QueryId, "Opaque identifier for a resolution query.");
uid_type!(SourceId, "Opaque identifier for a resolvable source.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(QueryId::new(), QueryId::new());
        assert_ne!(SourceId::new(), SourceId::new());
    }

    #[test]
    fn round_trips_through_string() {
        let qid = QueryId::new();
        let parsed: QueryId = qid.to_string().parse().unwrap();
        assert_eq!(qid, parsed);
    }

    #[test]
    fn serializes_as_plain_string() {
        let qid = QueryId::new();
        let json = serde_json::to_string(&qid).unwrap();
        assert_eq!(json, format!("\"{qid}\""));
    }
}
