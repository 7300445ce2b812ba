use std::time::Duration;

use tokio_rusqlite::{Connection, Result, rusqlite};
use tracing::{info, warn};

/// Current schema version.  Bump this whenever the schema changes and add a
/// corresponding migration arm in `run_migrations`.
const SCHEMA_VERSION: u32 = 2;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(conn: &Connection) -> Result<()> {
    create_schema(conn).await?;
    run_migrations(conn).await?;
    Ok(())
}

/// Create all tables for a brand-new database (version 2 schema).
async fn create_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn: &mut rusqlite::Connection| -> rusqlite::Result<()> {
        // Databases created before versioning have user_version = 0 and the
        // v1 table; leave those for `run_migrations`.
        let fresh: bool = conn.query_row(
            "SELECT COUNT(*) = 0 FROM sqlite_master WHERE type = 'table' AND name = 'qr_tokens'",
            [],
            |r| r.get(0),
        )?;

        // One row per issued QR token.  The raw token is never stored, only
        // the hex SHA-256 of the signed string.  All times are epoch millis.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS qr_tokens (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                token_hash  TEXT    NOT NULL UNIQUE,
                subject_id  TEXT    NOT NULL,
                created_at  INTEGER NOT NULL,
                expires_at  INTEGER NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0,
                used_at     INTEGER,
                CHECK (used IN (0, 1)),
                CHECK ((used = 0 AND used_at IS NULL) OR (used = 1 AND used_at IS NOT NULL))
            )",
            [],
        )?;

        // --- Indexes --------------------------------------------------------
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_qr_tokens_subject ON qr_tokens(subject_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_qr_tokens_expires ON qr_tokens(expires_at)",
            [],
        )?;

        if fresh {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(())
    })
    .await
}

/// Apply any schema migrations required to reach `SCHEMA_VERSION`.
///
/// Uses `PRAGMA user_version` as the migration counter.
/// Each migration arm is idempotent: safe to run on a DB that was created
/// at any earlier version.
async fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: u32 = conn
        .call(|conn: &mut rusqlite::Connection| -> rusqlite::Result<u32> {
            let v: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
            Ok(v)
        })
        .await?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Database schema at version {}; target version {}. Running migrations…",
        current_version, SCHEMA_VERSION
    );

    // ── v1 → v2: timestamps moved from seconds to milliseconds ───────────
    //
    // v1 wrote `created_at`/`expires_at`/`used_at` in Unix seconds.  Any value
    // below 10^11 cannot be a plausible millisecond timestamp (it would be
    // 1973), so it is scaled up in place.
    if current_version < 2 {
        warn!("Migrating qr_tokens from v1 to v2 (seconds → milliseconds)…");

        conn.call(|conn: &mut rusqlite::Connection| -> rusqlite::Result<()> {
            conn.execute_batch(
                "
                BEGIN;
                UPDATE qr_tokens SET created_at = created_at * 1000 WHERE created_at < 100000000000;
                UPDATE qr_tokens SET expires_at = expires_at * 1000 WHERE expires_at < 100000000000;
                UPDATE qr_tokens SET used_at    = used_at    * 1000 WHERE used_at    < 100000000000;
                PRAGMA user_version = 2;
                COMMIT;
            ",
            )?;
            Ok(())
        })
        .await?;

        info!("Schema version set to 2.");
    }

    // Add future migration arms here:
    // if current_version < 3 { ... }

    Ok(())
}

/// Per-connection settings.  WAL lets several server processes share the
/// same file; the busy timeout turns lock contention into a short wait
/// instead of an immediate `SQLITE_BUSY`.
async fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<()> {
        conn.busy_timeout(busy_timeout)?;
        // In-memory databases report "memory" here, which is fine.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    })
    .await
}

/// Open or create the database and ensure the schema is up to date.
pub async fn open_database(path: &str, busy_timeout: Duration) -> Result<Connection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory().await?
    } else {
        Connection::open(path).await?
    };
    configure(&conn, busy_timeout).await?;
    create_tables(&conn).await?;
    Ok(conn)
}

/// Fresh in-memory database with the current schema.  Used by tests.
pub async fn open_in_memory() -> Result<Connection> {
    open_database(":memory:", Duration::from_secs(5)).await
}
