//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;
use veriown_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(version = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,                    -- regular | manufacturer | repair_provider | administrator
            verification_status TEXT NOT NULL      -- pending | verified | rejected
        );

        CREATE TABLE products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            serial_number TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL            -- Unix ms
        );

        -- Append-only provenance ledger, one hash chain per product
        CREATE TABLE events (
            product_id INTEGER NOT NULL REFERENCES products(id),
            seq INTEGER NOT NULL,                  -- 0 for registration
            event_type TEXT NOT NULL,
            event_data TEXT NOT NULL,              -- JSON object
            created_by INTEGER NOT NULL,
            created_at INTEGER NOT NULL,           -- Unix ms, non-decreasing per product
            previous_event_hash BLOB NOT NULL,     -- 32 bytes, zeros for genesis
            event_hash BLOB NOT NULL UNIQUE,       -- 32 bytes

            PRIMARY KEY (product_id, seq)
        );

        -- At most one outstanding proposal per product
        CREATE TABLE pending_transfers (
            product_id INTEGER PRIMARY KEY REFERENCES products(id),
            new_owner_id INTEGER NOT NULL,
            initiated_at INTEGER NOT NULL
        );

        CREATE TABLE owner_contracts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL REFERENCES products(id),
            owner_id INTEGER NOT NULL,
            previous_owner_id INTEGER,             -- NULL for the first contract
            transfer_date INTEGER NOT NULL,
            contract_number TEXT NOT NULL UNIQUE,
            document_data TEXT NOT NULL,           -- canonical JSON
            contract_hash TEXT NOT NULL,           -- hex SHA-256 of document_data
            content_id TEXT NOT NULL,
            cache_path TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Local content-addressed blob storage
        CREATE TABLE blobs (
            content_id TEXT PRIMARY KEY,
            bytes BLOB NOT NULL,
            stored_at INTEGER NOT NULL
        );

        CREATE INDEX idx_events_created_by ON events(created_by);
        CREATE INDEX idx_pending_new_owner ON pending_transfers(new_owner_id);
        CREATE INDEX idx_contracts_product ON owner_contracts(product_id);
        CREATE INDEX idx_contracts_owner ON owner_contracts(owner_id);
        "#,
    )?;

    Ok(())
}
