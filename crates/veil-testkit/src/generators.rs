//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use veil_core::{Commitment, MemoEnvelope, Secret, TierId, Zatoshis};

/// Generate a random secret.
pub fn secret() -> impl Strategy<Value = Secret> {
    any::<[u8; 32]>().prop_map(Secret::from_bytes)
}

/// Generate a random commitment.
pub fn commitment() -> impl Strategy<Value = Commitment> {
    any::<[u8; 32]>().prop_map(Commitment::from_bytes)
}

/// Generate a plausible tier ID.
pub fn tier_id() -> impl Strategy<Value = TierId> {
    "[a-z][a-z0-9-]{0,23}".prop_map(TierId::from)
}

/// Generate an amount up to 1000 ZEC.
pub fn amount() -> impl Strategy<Value = Zatoshis> {
    (0u64..=100_000_000_000).prop_map(Zatoshis::new)
}

/// Generate a whole-second timestamp between 2020 and 2100.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..4_102_444_800).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_default()
    })
}

/// Generate a memo that fits the on-chain limit.
pub fn memo_envelope() -> impl Strategy<Value = MemoEnvelope> {
    (
        tier_id(),
        "[A-Za-z0-9+/]{0,88}",
        commitment(),
        timestamp(),
        proptest::option::of("[A-Za-z0-9+/=]{0,120}"),
    )
        .prop_map(|(tier_id, pub_key, commitment, timestamp, email)| {
            let memo = MemoEnvelope::new(tier_id, pub_key, commitment, timestamp);
            match email {
                Some(email) => memo.with_encrypted_email(email),
                None => memo,
            }
        })
}

/// Generate arbitrary memo field bytes, including NUL padding.
pub fn raw_memo() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=600),
        memo_envelope().prop_map(|m| {
            let mut bytes = m.encode().unwrap_or_default();
            bytes.resize(512, 0);
            bytes
        }),
    ]
}
