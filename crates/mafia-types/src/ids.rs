//! Type-safe identifier wrappers around `i64`.
//!
//! Every persisted entity has a strongly-typed integer ID so identifiers
//! from different collections cannot be mixed at compile time. IDs are
//! assigned by the persistence backend (sequence, local counter, or the
//! block allocator) and never by the caller.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around `i64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw integer identifier.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Return the inner integer value.
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a registered user (a game host).
    UserId
}

define_id! {
    /// Unique identifier for a saved friend in a user's address book.
    FriendId
}

define_id! {
    /// Unique identifier for a game.
    GameId
}

define_id! {
    /// Unique identifier for a player seated in a game.
    PlayerId
}

define_id! {
    /// Unique identifier for a game log entry.
    LogId
}
