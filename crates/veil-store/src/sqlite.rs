//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Veil. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Timestamps are stored as Unix milliseconds. Times that end up in a row
//! are truncated to milliseconds before anything derived from them is
//! returned, so a record handed back by a write equals the one read later.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use veil_core::{Commitment, ContentId, CreatorId, ShieldedAddress, TierId, TxHash, Zatoshis};
use veil_perms::{AccessGrant, SealedKey, Tier};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{
    ClaimResult, ContentRecord, CreatorRecord, PaymentRecord, PaymentStatus, Resolution,
    StoragePointer,
};
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    ///
    /// The mutex is held for the whole closure, so each call is atomic with
    /// respect to every other store operation.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column encoding helpers
// ─────────────────────────────────────────────────────────────────────────────

fn invalid(idx: usize, msg: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Blob,
        Box::new(StoreError::InvalidData(msg.into())),
    )
}

fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn truncate_ms(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn from_ms(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| invalid(idx, format!("timestamp out of range: {}", ms)))
}

fn zat_to_sql(amount: Zatoshis) -> Result<i64> {
    i64::try_from(amount.as_u64())
        .map_err(|_| StoreError::InvalidData(format!("amount too large: {}", amount.as_u64())))
}

fn zat_from_sql(idx: usize, v: i64) -> rusqlite::Result<Zatoshis> {
    u64::try_from(v)
        .map(Zatoshis::new)
        .map_err(|_| invalid(idx, format!("negative amount: {}", v)))
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(idx: usize, bytes: &[u8]) -> rusqlite::Result<T> {
    ciborium::from_reader(bytes).map_err(|e| invalid(idx, e.to_string()))
}

fn sealed_to_sql(key: &SealedKey) -> Result<Vec<u8>> {
    key.to_bytes()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn sealed_from_sql(idx: usize, bytes: &[u8]) -> rusqlite::Result<SealedKey> {
    SealedKey::from_bytes(bytes).map_err(|e| invalid(idx, e.to_string()))
}

fn commitment_from_sql(idx: usize, bytes: &[u8]) -> rusqlite::Result<Commitment> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| invalid(idx, format!("commitment is {} bytes", bytes.len())))?;
    Ok(Commitment::from_bytes(arr))
}

// ─────────────────────────────────────────────────────────────────────────────
// Row readers
// ─────────────────────────────────────────────────────────────────────────────

const CREATOR_COLUMNS: &str =
    "creator_id, shielded_address, sealed_master_key, sealed_viewing_key, created_at";

fn row_to_creator(row: &Row<'_>) -> rusqlite::Result<CreatorRecord> {
    let master: Vec<u8> = row.get(2)?;
    let viewing: Option<Vec<u8>> = row.get(3)?;
    Ok(CreatorRecord {
        id: CreatorId::from(row.get::<_, String>(0)?),
        shielded_address: ShieldedAddress::from(row.get::<_, String>(1)?),
        sealed_master_key: sealed_from_sql(2, &master)?,
        sealed_viewing_key: viewing.map(|b| sealed_from_sql(3, &b)).transpose()?,
        created_at: from_ms(4, row.get(4)?)?,
    })
}

const TIER_COLUMNS: &str = "tier_id, creator_id, name, price_zat, tier_rank, active";

fn row_to_tier(row: &Row<'_>) -> rusqlite::Result<Tier> {
    Ok(Tier {
        id: TierId::from(row.get::<_, String>(0)?),
        creator_id: CreatorId::from(row.get::<_, String>(1)?),
        name: row.get(2)?,
        price: zat_from_sql(3, row.get(3)?)?,
        rank: row.get(4)?,
        active: row.get(5)?,
    })
}

const CONTENT_COLUMNS: &str =
    "content_id, creator_id, tier_id, sealed_key, storage_provider, storage_hash, created_at";

fn row_to_content(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    let sealed: Vec<u8> = row.get(3)?;
    let provider: String = row.get(4)?;
    Ok(ContentRecord {
        id: ContentId::from(row.get::<_, String>(0)?),
        creator_id: CreatorId::from(row.get::<_, String>(1)?),
        tier_id: row.get::<_, Option<String>>(2)?.map(TierId::from),
        sealed_key: sealed_from_sql(3, &sealed)?,
        storage: StoragePointer {
            provider: provider.parse().map_err(|e: StoreError| invalid(4, e.to_string()))?,
            hash: row.get(5)?,
        },
        created_at: from_ms(6, row.get(6)?)?,
    })
}

const PAYMENT_COLUMNS: &str =
    "tx_hash, creator_id, raw_memo, amount_zat, status, outcome, seen_at, processed_at";

fn row_to_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRecord> {
    let status: u8 = row.get(4)?;
    let outcome: Option<Vec<u8>> = row.get(5)?;
    let processed_at: Option<i64> = row.get(7)?;
    Ok(PaymentRecord {
        tx_hash: TxHash::from(row.get::<_, String>(0)?),
        creator_id: CreatorId::from(row.get::<_, String>(1)?),
        raw_memo: row.get(2)?,
        amount: zat_from_sql(3, row.get(3)?)?,
        status: PaymentStatus::from_u8(status)
            .ok_or_else(|| invalid(4, format!("unknown payment status: {}", status)))?,
        outcome: outcome.map(|b| from_cbor(5, &b)).transpose()?,
        seen_at: from_ms(6, row.get(6)?)?,
        processed_at: processed_at.map(|ms| from_ms(7, ms)).transpose()?,
    })
}

const GRANT_COLUMNS: &str = "commitment, creator_id, tier_id, valid_from, valid_until, revoked";

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    let commitment: Vec<u8> = row.get(0)?;
    Ok(AccessGrant {
        commitment: commitment_from_sql(0, &commitment)?,
        creator_id: CreatorId::from(row.get::<_, String>(1)?),
        tier_id: TierId::from(row.get::<_, String>(2)?),
        valid_from: from_ms(3, row.get(3)?)?,
        valid_until: from_ms(4, row.get(4)?)?,
        revoked: row.get(5)?,
    })
}

fn load_payment(conn: &Connection, tx_hash: &TxHash) -> Result<Option<PaymentRecord>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE tx_hash = ?1", PAYMENT_COLUMNS),
            params![tx_hash.as_str()],
            row_to_payment,
        )
        .optional()?)
}

fn load_grant(
    conn: &Connection,
    commitment: &Commitment,
    creator_id: &CreatorId,
) -> Result<Option<AccessGrant>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM grants WHERE commitment = ?1 AND creator_id = ?2",
                GRANT_COLUMNS
            ),
            params![commitment.as_bytes().as_slice(), creator_id.as_str()],
            row_to_grant,
        )
        .optional()?)
}

fn upsert_grant(conn: &Connection, grant: &AccessGrant) -> Result<()> {
    conn.execute(
        "INSERT INTO grants (commitment, creator_id, tier_id, valid_from, valid_until, revoked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(commitment, creator_id) DO UPDATE SET
            tier_id = excluded.tier_id,
            valid_from = excluded.valid_from,
            valid_until = excluded.valid_until,
            revoked = excluded.revoked",
        params![
            grant.commitment.as_bytes().as_slice(),
            grant.creator_id.as_str(),
            grant.tier_id.as_str(),
            to_ms(grant.valid_from),
            to_ms(grant.valid_until),
            grant.revoked,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_creator(&self, creator: &CreatorRecord) -> Result<InsertResult> {
        let master = sealed_to_sql(&creator.sealed_master_key)?;
        let viewing = creator
            .sealed_viewing_key
            .as_ref()
            .map(sealed_to_sql)
            .transpose()?;
        let creator = creator.clone();

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO creators (creator_id, shielded_address, sealed_master_key,
                    sealed_viewing_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(creator_id) DO NOTHING",
                params![
                    creator.id.as_str(),
                    creator.shielded_address.as_str(),
                    master,
                    viewing,
                    to_ms(creator.created_at),
                ],
            )?;
            Ok(if inserted == 1 {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn get_creator(&self, id: &CreatorId) -> Result<Option<CreatorRecord>> {
        let id = id.clone();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM creators WHERE creator_id = ?1", CREATOR_COLUMNS),
                    params![id.as_str()],
                    row_to_creator,
                )
                .optional()?)
        })
        .await
    }

    async fn upsert_tier(&self, tier: &Tier) -> Result<()> {
        let price = zat_to_sql(tier.price)?;
        let tier = tier.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO tiers (creator_id, tier_id, name, price_zat, tier_rank, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(creator_id, tier_id) DO UPDATE SET
                    name = excluded.name,
                    price_zat = excluded.price_zat,
                    tier_rank = excluded.tier_rank,
                    active = excluded.active",
                params![
                    tier.creator_id.as_str(),
                    tier.id.as_str(),
                    tier.name,
                    price,
                    tier.rank,
                    tier.active,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_tier(&self, creator_id: &CreatorId, tier_id: &TierId) -> Result<Option<Tier>> {
        let creator_id = creator_id.clone();
        let tier_id = tier_id.clone();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM tiers WHERE creator_id = ?1 AND tier_id = ?2",
                        TIER_COLUMNS
                    ),
                    params![creator_id.as_str(), tier_id.as_str()],
                    row_to_tier,
                )
                .optional()?)
        })
        .await
    }

    async fn list_tiers(&self, creator_id: &CreatorId) -> Result<Vec<Tier>> {
        let creator_id = creator_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tiers WHERE creator_id = ?1 ORDER BY tier_rank, tier_id",
                TIER_COLUMNS
            ))?;
            let tiers = stmt
                .query_map(params![creator_id.as_str()], row_to_tier)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tiers)
        })
        .await
    }

    async fn insert_content(&self, content: &ContentRecord) -> Result<InsertResult> {
        let sealed = sealed_to_sql(&content.sealed_key)?;
        let content = content.clone();
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO content (content_id, creator_id, tier_id, sealed_key,
                    storage_provider, storage_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(content_id) DO NOTHING",
                params![
                    content.id.as_str(),
                    content.creator_id.as_str(),
                    content.tier_id.as_ref().map(|t| t.as_str()),
                    sealed,
                    content.storage.provider.as_str(),
                    content.storage.hash,
                    to_ms(content.created_at),
                ],
            )?;
            Ok(if inserted == 1 {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentRecord>> {
        let id = id.clone();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM content WHERE content_id = ?1", CONTENT_COLUMNS),
                    params![id.as_str()],
                    row_to_content,
                )
                .optional()?)
        })
        .await
    }

    async fn list_content(&self, creator_id: &CreatorId) -> Result<Vec<ContentRecord>> {
        let creator_id = creator_id.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM content WHERE creator_id = ?1 ORDER BY content_id",
                CONTENT_COLUMNS
            ))?;
            let items = stmt
                .query_map(params![creator_id.as_str()], row_to_content)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn claim_payment(&self, record: &PaymentRecord) -> Result<ClaimResult> {
        let amount = zat_to_sql(record.amount)?;
        let mut record = record.clone();
        record.seen_at = truncate_ms(record.seen_at);
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO payments (tx_hash, creator_id, raw_memo, amount_zat, status,
                    outcome, seen_at, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL)
                 ON CONFLICT(tx_hash) DO NOTHING",
                params![
                    record.tx_hash.as_str(),
                    record.creator_id.as_str(),
                    record.raw_memo,
                    amount,
                    PaymentStatus::Seen as u8,
                    to_ms(record.seen_at),
                ],
            )?;

            if inserted == 1 {
                return Ok(ClaimResult::Claimed(record));
            }
            let existing = load_payment(conn, &record.tx_hash)?
                .ok_or_else(|| StoreError::NotFound(format!("payment {}", record.tx_hash)))?;
            Ok(ClaimResult::Existing(existing))
        })
        .await
    }

    async fn get_payment(&self, tx_hash: &TxHash) -> Result<Option<PaymentRecord>> {
        let tx_hash = tx_hash.clone();
        self.run(move |conn| load_payment(conn, &tx_hash)).await
    }

    async fn complete_payment(
        &self,
        tx_hash: &TxHash,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord> {
        let tx_hash = tx_hash.clone();
        let resolution = resolution.clone();
        let now = truncate_ms(now);
        self.run(move |conn| {
            let db_tx = conn.transaction()?;

            let mut record = load_payment(&db_tx, &tx_hash)?
                .ok_or_else(|| StoreError::NotFound(format!("payment {}", tx_hash)))?;
            if record.is_final() {
                return Ok(record);
            }

            let current = match &resolution {
                Resolution::Grant { commitment, .. } => {
                    load_grant(&db_tx, commitment, &record.creator_id)?
                }
                Resolution::Reject(_) => None,
            };
            if let Some(grant) = record.resolve(&resolution, current.as_ref(), now)? {
                upsert_grant(&db_tx, &grant)?;
            }

            let outcome = record.outcome.as_ref().map(to_cbor).transpose()?;
            let updated = db_tx.execute(
                "UPDATE payments SET status = ?1, outcome = ?2, processed_at = ?3
                 WHERE tx_hash = ?4 AND status = ?5",
                params![
                    record.status as u8,
                    outcome,
                    record.processed_at.map(to_ms),
                    tx_hash.as_str(),
                    PaymentStatus::Seen as u8,
                ],
            )?;
            if updated != 1 {
                return Err(StoreError::InvalidData(format!(
                    "payment {} changed during completion",
                    tx_hash
                )));
            }

            db_tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn get_grant(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
    ) -> Result<Option<AccessGrant>> {
        let commitment = *commitment;
        let creator_id = creator_id.clone();
        self.run(move |conn| load_grant(conn, &commitment, &creator_id))
            .await
    }

    async fn revoke_grant(&self, commitment: &Commitment, creator_id: &CreatorId) -> Result<bool> {
        let commitment = *commitment;
        let creator_id = creator_id.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE grants SET revoked = 1 WHERE commitment = ?1 AND creator_id = ?2",
                params![commitment.as_bytes().as_slice(), creator_id.as_str()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn count_grants(&self, creator_id: &CreatorId) -> Result<u64> {
        let creator_id = creator_id.clone();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM grants WHERE creator_id = ?1",
                params![creator_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}
