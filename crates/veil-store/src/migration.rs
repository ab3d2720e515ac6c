//! Versioned SQLite schema.

use chrono::Utc;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema batches in order; entry `i` upgrades version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[SCHEMA_V1];

/// Latest schema version.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to `CURRENT_VERSION`. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema v{applied}, newer than supported v{CURRENT_VERSION}"
        )));
    }

    let pending = &MIGRATIONS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, batch) in pending.iter().enumerate() {
        let version = applied + offset as u32 + 1;
        tx.execute_batch(batch)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, Utc::now().timestamp_millis()],
        )?;
        tracing::info!(version, "schema upgraded");
    }
    tx.commit()?;
    Ok(())
}

const SCHEMA_V1: &str = r#"
        -- Onboarded creators; keys are CBOR-encoded sealed envelopes
        CREATE TABLE creators (
            creator_id TEXT PRIMARY KEY,
            shielded_address TEXT NOT NULL,
            sealed_master_key BLOB NOT NULL,
            sealed_viewing_key BLOB,
            created_at INTEGER NOT NULL         -- Unix ms
        );

        CREATE TABLE tiers (
            creator_id TEXT NOT NULL,
            tier_id TEXT NOT NULL,
            name TEXT NOT NULL,
            price_zat INTEGER NOT NULL,
            tier_rank INTEGER NOT NULL,
            active INTEGER NOT NULL,
            PRIMARY KEY (creator_id, tier_id)
        );

        CREATE TABLE content (
            content_id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL,
            tier_id TEXT,                       -- NULL = any valid grant
            sealed_key BLOB NOT NULL,
            storage_provider TEXT NOT NULL,
            storage_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Payment ledger: one row per transaction, ever
        CREATE TABLE payments (
            tx_hash TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL,
            raw_memo BLOB NOT NULL,
            amount_zat INTEGER NOT NULL,
            status INTEGER NOT NULL,            -- 0=seen, 1=processed, 2=rejected
            outcome BLOB,                       -- CBOR PaymentOutcome, set when final
            seen_at INTEGER NOT NULL,
            processed_at INTEGER
        );

        CREATE TABLE grants (
            commitment BLOB NOT NULL,           -- 32 bytes
            creator_id TEXT NOT NULL,
            tier_id TEXT NOT NULL,
            valid_from INTEGER NOT NULL,
            valid_until INTEGER NOT NULL,
            revoked INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (commitment, creator_id)
        );

        CREATE INDEX idx_content_creator ON content(creator_id);
        CREATE INDEX idx_payments_creator ON payments(creator_id);
        CREATE INDEX idx_grants_creator ON grants(creator_id);
"#;
