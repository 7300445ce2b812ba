use tokio_rusqlite::{Connection, OptionalExtension, Result, params, rusqlite};

use shared::types::ReplayRecord;

/// Outcome of the conditional redeem update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemRow {
    Redeemed,
    NotFound,
    AlreadyUsed,
    Expired,
}

#[derive(Debug, Clone)]
pub struct NewQrToken {
    pub token_hash: String,
    pub subject_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Insert a replay record with `used = 0`.
///
/// Returns `false` when `token_hash` already exists.  The existing row is
/// left untouched.
pub async fn insert_qr_token(conn: &Connection, new_token: NewQrToken) -> Result<bool> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let inserted = conn.execute(
            "INSERT INTO qr_tokens (token_hash, subject_id, created_at, expires_at, used, used_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL)",
            params![
                new_token.token_hash,
                new_token.subject_id,
                new_token.created_at,
                new_token.expires_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Mark a token used if, and only if, it exists, is unused and `now` has not
/// passed its expiry.
///
/// The transition is a single conditional `UPDATE`, so of any number of
/// concurrent callers (in this process or another one sharing the file)
/// exactly one sees `Redeemed`.  The follow-up `SELECT` only classifies a
/// refusal and never writes.
pub async fn redeem_qr_token(conn: &Connection, token_hash: String, now: i64) -> Result<RedeemRow> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let changed = conn.execute(
            "UPDATE qr_tokens SET used = 1, used_at = ?2
             WHERE token_hash = ?1 AND used = 0 AND expires_at >= ?2",
            params![token_hash, now],
        )?;

        if changed == 1 {
            return Ok(RedeemRow::Redeemed);
        }

        let state = conn
            .query_row(
                "SELECT used FROM qr_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row: &rusqlite::Row| row.get::<_, i64>(0),
            )
            .optional()?;

        Ok(match state {
            None => RedeemRow::NotFound,
            Some(used) if used != 0 => RedeemRow::AlreadyUsed,
            Some(_) => RedeemRow::Expired,
        })
    })
    .await
}

/// Fetch a replay record by hash.
pub async fn get_qr_token(conn: &Connection, token_hash: String) -> Result<Option<ReplayRecord>> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let mut stmt = conn.prepare(
            "SELECT token_hash, subject_id, created_at, expires_at, used, used_at
             FROM qr_tokens WHERE token_hash = ?1",
        )?;

        let record = stmt
            .query_row(params![token_hash], |row: &rusqlite::Row| {
                Ok(ReplayRecord {
                    token_hash: row.get(0)?,
                    subject_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                    used: row.get::<_, i64>(4)? != 0,
                    used_at: row.get(5)?,
                })
            })
            .optional()?;

        Ok(record)
    })
    .await
}

/// Number of records stored for a subject.
#[cfg(test)]
pub(crate) async fn count_subject_tokens(conn: &Connection, subject_id: String) -> Result<i64> {
    conn.call(move |conn: &mut rusqlite::Connection| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM qr_tokens WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
    .await
}
