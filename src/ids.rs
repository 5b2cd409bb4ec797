// SPDX-License-Identifier: AGPL-3.0-or-later

//! Opaque, lexicographically sortable identifiers used throughout the
//! dispatch pipeline.
//!
//! All three identifier kinds (player, session, character) are newtypes
//! over [`ulid::Ulid`]: 128-bit values that sort the same way whether
//! compared as bytes or as their canonical 26-character string form. A
//! zero-valued identifier is distinguished from any identifier actually
//! minted by [`Ulid::new`] and is used as an "absent" sentinel.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            pub const NIL: Self = Self(Ulid::nil());

            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub fn is_nil(&self) -> bool {
                self.0 == Ulid::nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NIL
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Ulid> for $name {
            fn from(u: Ulid) -> Self {
                Self(u)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Ulid::from_string(s)?))
            }
        }
    };
}

opaque_id!(PlayerId);
opaque_id!(SessionId);
opaque_id!(CharacterId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_absent() {
        assert!(PlayerId::NIL.is_nil());
        assert!(!PlayerId::new().is_nil());
    }

    #[test]
    fn round_trips_through_string() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().expect("valid ulid");
        assert_eq!(id, parsed);
    }
}
