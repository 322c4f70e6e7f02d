//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the platform.
//! Each identifier is a distinct type — you cannot pass a [`DonorId`]
//! where a [`SubscriptionId`] is expected.
//!
//! UUID-based identifiers are always valid by construction. The string
//! [`TransactionId`] validates its format at construction time and at
//! deserialization time, so a malformed id is rejected at the wire
//! boundary rather than discovered deep inside the charge path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Implements the full UUID-identifier surface for a newtype:
/// random construction, conversion, `Display`, and `FromStr`.
macro_rules! uuid_id {
    ($(#[$doc:meta])* $ty:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }
    };
}

uuid_id! {
    /// A unique identifier for a donor.
    DonorId
}

uuid_id! {
    /// A unique identifier for a recurring subscription.
    SubscriptionId
}

uuid_id! {
    /// A unique identifier for a donation (charge-attempt) record.
    DonationId
}

uuid_id! {
    /// A unique identifier for a fundraising project.
    ProjectId
}

uuid_id! {
    /// A unique identifier for a long-running program.
    ProgramId
}

// ---------------------------------------------------------------------------
// Transaction identifiers (validated at construction)
// ---------------------------------------------------------------------------

/// Globally unique transaction identifier assigned to every charge attempt
/// **before** any gateway call is made.
///
/// Format: `TXN-<millis>-<12 hex>` where `<millis>` is the Unix timestamp in
/// milliseconds at generation time and the hex suffix is drawn from a v4
/// UUID. The timestamp component keeps ids roughly sortable; the random
/// suffix makes collisions across concurrent charge batches vanishingly
/// unlikely. A collision is still enforced as a uniqueness violation at the
/// store, never silently tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionId(String);

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl TransactionId {
    /// Generate a fresh transaction identifier for the given instant.
    pub fn generate(now: chrono::DateTime<chrono::Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("TXN-{}-{}", now.timestamp_millis(), &suffix[..12]))
    }

    /// Parse and validate an existing transaction identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransactionId`] if the string does
    /// not match the `TXN-<millis>-<hex>` format.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let mut parts = s.splitn(3, '-');
        let prefix = parts.next().unwrap_or_default();
        let millis = parts.next().unwrap_or_default();
        let suffix = parts.next().unwrap_or_default();

        let well_formed = prefix == "TXN"
            && !millis.is_empty()
            && millis.chars().all(|c| c.is_ascii_digit())
            && suffix.len() >= 8
            && suffix.chars().all(|c| c.is_ascii_hexdigit());

        if !well_formed {
            return Err(ValidationError::InvalidTransactionId(s));
        }
        Ok(Self(s))
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn donor_id_roundtrips_through_display_and_fromstr() {
        let id = DonorId::new();
        let parsed: DonorId = id.to_string().parse().expect("valid uuid");
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_id_types_are_distinct() {
        // Compile-time property; this just pins the construction surface.
        let uuid = Uuid::new_v4();
        let donor = DonorId::from_uuid(uuid);
        let sub = SubscriptionId::from_uuid(uuid);
        assert_eq!(donor.as_uuid(), sub.as_uuid());
    }

    #[test]
    fn transaction_id_generate_is_well_formed() {
        let id = TransactionId::generate(chrono::Utc::now());
        let reparsed = TransactionId::parse(id.as_str().to_string());
        assert!(reparsed.is_ok(), "generated id must validate: {id}");
    }

    #[test]
    fn transaction_id_rejects_malformed_strings() {
        for bad in ["", "TXN", "TXN-abc-deadbeef1234", "TX-1700000000000-deadbeef1234", "TXN-1700000000000-zzzz"] {
            assert!(
                TransactionId::parse(bad).is_err(),
                "should reject {bad:?}"
            );
        }
    }

    #[test]
    fn transaction_ids_are_pairwise_distinct_under_bulk_generation() {
        // Collision resistance across a batch: 10,000 ids at one instant.
        let now = chrono::Utc::now();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(
                seen.insert(TransactionId::generate(now)),
                "duplicate transaction id generated"
            );
        }
    }

    #[test]
    fn transaction_id_deserialize_validates() {
        let ok: Result<TransactionId, _> =
            serde_json::from_str("\"TXN-1700000000000-0123456789ab\"");
        assert!(ok.is_ok());
        let bad: Result<TransactionId, _> = serde_json::from_str("\"not-a-txn\"");
        assert!(bad.is_err());
    }
}
