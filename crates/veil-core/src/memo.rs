//! Memo codec.
//!
//! A payment carries its commitment to the payee inside the shielded memo
//! field, as a compact UTF-8 JSON object:
//!
//! ```json
//! {"version":1,"tierId":"gold","supporterPubKey":"...","commitment":"<64 hex>",
//!  "timestamp":"2025-01-01T00:00:00Z","encryptedEmail":"..."}
//! ```
//!
//! The chain pads memos to a fixed width with NUL bytes, so [`decode`] strips
//! trailing NULs first. Decoding handles attacker-controlled bytes and is
//! total: every input yields either an envelope or a [`MemoError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::MemoError;
use crate::types::TierId;

/// On-chain memo field size.
pub const MAX_MEMO_SIZE: usize = 512;

/// The only memo version currently understood.
pub const MEMO_VERSION: u8 = 1;

/// The structured payload carried in a payment memo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoEnvelope {
    pub version: u8,
    pub tier_id: TierId,
    pub supporter_pub_key: String,
    pub commitment: Commitment,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_email: Option<String>,
}

impl MemoEnvelope {
    /// Build a version-1 envelope.
    pub fn new(
        tier_id: TierId,
        supporter_pub_key: impl Into<String>,
        commitment: Commitment,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version: MEMO_VERSION,
            tier_id,
            supporter_pub_key: supporter_pub_key.into(),
            commitment,
            timestamp,
            encrypted_email: None,
        }
    }

    /// Attach an encrypted contact address.
    pub fn with_encrypted_email(mut self, encrypted_email: impl Into<String>) -> Self {
        self.encrypted_email = Some(encrypted_email.into());
        self
    }

    /// Encode to memo bytes. See [`encode`].
    pub fn encode(&self) -> Result<Vec<u8>, MemoError> {
        encode(self)
    }
}

/// The unfinished memo handed to a supporter with a payment intent.
///
/// The supporter fills in their commitment and public key client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoTemplate {
    pub version: u8,
    pub tier_id: TierId,
    pub timestamp: DateTime<Utc>,
}

impl MemoTemplate {
    /// Create a template for `tier_id`.
    pub fn new(tier_id: TierId, timestamp: DateTime<Utc>) -> Self {
        Self {
            version: MEMO_VERSION,
            tier_id,
            timestamp,
        }
    }

    /// Complete the template into a full envelope.
    pub fn finalize(
        &self,
        commitment: Commitment,
        supporter_pub_key: impl Into<String>,
        encrypted_email: Option<String>,
    ) -> MemoEnvelope {
        MemoEnvelope {
            version: self.version,
            tier_id: self.tier_id.clone(),
            supporter_pub_key: supporter_pub_key.into(),
            commitment,
            timestamp: self.timestamp,
            encrypted_email,
        }
    }
}

/// Validate and serialize a memo.
///
/// Fails with [`MemoError::PayloadTooLarge`] if the serialized form exceeds
/// [`MAX_MEMO_SIZE`].
pub fn encode(memo: &MemoEnvelope) -> Result<Vec<u8>, MemoError> {
    if memo.version != MEMO_VERSION {
        return Err(MemoError::UnsupportedVersion(u64::from(memo.version)));
    }
    if memo.tier_id.is_empty() {
        return Err(MemoError::EmptyTierId);
    }

    let bytes = serde_json::to_vec(memo).map_err(|e| MemoError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_MEMO_SIZE {
        return Err(MemoError::PayloadTooLarge {
            size: bytes.len(),
            max: MAX_MEMO_SIZE,
        });
    }
    Ok(bytes)
}

/// Wire shape before validation. Unknown fields are ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMemo {
    version: u64,
    tier_id: String,
    supporter_pub_key: String,
    commitment: String,
    timestamp: String,
    #[serde(default)]
    encrypted_email: Option<String>,
}

/// Decode memo bytes as read from the chain.
pub fn decode(bytes: &[u8]) -> Result<MemoEnvelope, MemoError> {
    if bytes.len() > MAX_MEMO_SIZE {
        return Err(MemoError::PayloadTooLarge {
            size: bytes.len(),
            max: MAX_MEMO_SIZE,
        });
    }

    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let trimmed = &bytes[..end];
    if trimmed.is_empty() {
        return Err(MemoError::Malformed("empty memo".into()));
    }

    let text = std::str::from_utf8(trimmed).map_err(|_| MemoError::InvalidUtf8)?;
    let raw: RawMemo =
        serde_json::from_str(text).map_err(|e| MemoError::Malformed(e.to_string()))?;

    if raw.version != u64::from(MEMO_VERSION) {
        return Err(MemoError::UnsupportedVersion(raw.version));
    }
    if raw.tier_id.is_empty() {
        return Err(MemoError::EmptyTierId);
    }
    let commitment = Commitment::from_hex(&raw.commitment)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
        .map_err(|e| MemoError::Malformed(format!("timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(MemoEnvelope {
        version: MEMO_VERSION,
        tier_id: TierId::from(raw.tier_id),
        supporter_pub_key: raw.supporter_pub_key,
        commitment,
        timestamp,
        encrypted_email: raw.encrypted_email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{commit, Secret};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn sample() -> MemoEnvelope {
        MemoEnvelope::new(
            TierId::from("gold"),
            "zs1supporter",
            commit(&Secret::from_bytes([0x42; 32])),
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_roundtrip_with_padding() {
        let memo = sample().with_encrypted_email("ciphertext");
        let mut bytes = encode(&memo).unwrap();
        bytes.resize(MAX_MEMO_SIZE, 0);

        assert_eq!(decode(&bytes).unwrap(), memo);
    }

    #[test]
    fn test_wire_field_names() {
        let bytes = encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["tierId"], "gold");
        assert_eq!(value["supporterPubKey"], "zs1supporter");
        assert!(value.get("encryptedEmail").is_none());
    }

    #[test]
    fn test_accepts_foreign_client_memo() {
        let json = br#"{"version":1,"tierId":"t1","supporterPubKey":"pk",
            "commitment":"2D23B34A69EE132DA2F1ADE478741B06190067C4E249A71E7A2FE79EF959309E",
            "timestamp":"2025-03-01T12:00:00.000Z","client":"web"}"#;
        let memo = decode(json).unwrap();
        assert_eq!(memo.tier_id.as_str(), "t1");
        assert_eq!(memo.commitment, commit(&Secret::from_bytes([0x42; 32])));
    }

    #[test]
    fn test_encode_too_large() {
        let memo = sample().with_encrypted_email("x".repeat(MAX_MEMO_SIZE));
        assert!(matches!(
            encode(&memo),
            Err(MemoError::PayloadTooLarge { max: MAX_MEMO_SIZE, .. })
        ));
    }

    #[test]
    fn test_encode_validates() {
        let mut memo = sample();
        memo.tier_id = TierId::from("");
        assert_eq!(encode(&memo), Err(MemoError::EmptyTierId));

        let mut memo = sample();
        memo.version = 2;
        assert_eq!(encode(&memo), Err(MemoError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[0u8; 512]), Err(MemoError::Malformed(_))));
        assert_eq!(decode(&[0xf6, 0, 0]), Err(MemoError::InvalidUtf8));
        assert!(matches!(
            decode(&[b' '; 600]),
            Err(MemoError::PayloadTooLarge { size: 600, .. })
        ));
        assert!(matches!(decode(b"not json"), Err(MemoError::Malformed(_))));

        let bad_version = br#"{"version":7,"tierId":"t","supporterPubKey":"p","commitment":"00","timestamp":"x"}"#;
        assert_eq!(decode(bad_version), Err(MemoError::UnsupportedVersion(7)));

        let bad_commitment = br#"{"version":1,"tierId":"t","supporterPubKey":"p","commitment":"00","timestamp":"2025-01-01T00:00:00Z"}"#;
        assert!(matches!(
            decode(bad_commitment),
            Err(MemoError::InvalidCommitment(_))
        ));

        let empty_tier = br#"{"version":1,"tierId":"","supporterPubKey":"p","commitment":"00","timestamp":"x"}"#;
        assert_eq!(decode(empty_tier), Err(MemoError::EmptyTierId));
    }

    #[test]
    fn test_template_finalize() {
        let template = MemoTemplate::new(TierId::from("gold"), sample().timestamp);
        let memo = template.finalize(sample().commitment, "zs1supporter", None);
        assert_eq!(memo, sample());
    }

    proptest! {
        #[test]
        fn decode_is_total(bytes in prop::collection::vec(any::<u8>(), 0..700)) {
            let _ = decode(&bytes);
        }

        #[test]
        fn decode_inverts_encode(
            tier in "[a-zA-Z0-9_-]{1,32}",
            pubkey in "[a-z0-9]{0,78}",
            secret in any::<[u8; 32]>(),
            secs in 0i64..4_000_000_000,
            email in proptest::option::of("[A-Za-z0-9+/=]{0,120}"),
        ) {
            let memo = MemoEnvelope {
                version: MEMO_VERSION,
                tier_id: TierId::from(tier),
                supporter_pub_key: pubkey,
                commitment: commit(&Secret::from_bytes(secret)),
                timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
                encrypted_email: email,
            };
            let bytes = encode(&memo).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), memo);
        }
    }
}
