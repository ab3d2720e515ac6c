//! Strong type definitions for Veil.
//!
//! Identifiers handed to us by the surrounding application (creators, tiers,
//! content) or by the chain (transactions, addresses) are opaque strings.
//! They are still newtypes so a tier id can never be passed where a creator
//! id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consume and return the underlying string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifier of a creator (the payee).
    CreatorId
}

string_id! {
    /// Identifier of a subscription tier.
    TierId
}

string_id! {
    /// Identifier of a content item.
    ContentId
}

string_id! {
    /// On-chain transaction hash. Unique per transaction.
    TxHash
}

string_id! {
    /// A shielded receiving address.
    ShieldedAddress
}
