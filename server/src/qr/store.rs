use async_trait::async_trait;
use thiserror::Error;
use tokio_rusqlite::Connection;

use shared::types::{ReplayRecord, SubjectId};

use crate::database::qr_tokens::{
    NewQrToken, RedeemRow, get_qr_token, insert_qr_token, redeem_qr_token,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The hash is already recorded.  Only a nonce collision can cause this.
    #[error("token hash already recorded")]
    DuplicateHash,

    #[error("replay store unavailable: {0}")]
    Unavailable(#[from] tokio_rusqlite::Error),
}

/// Result of one atomic redeem attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemAttempt {
    Redeemed,
    NotFound,
    AlreadyUsed,
    Expired,
}

impl From<RedeemRow> for RedeemAttempt {
    fn from(row: RedeemRow) -> Self {
        match row {
            RedeemRow::Redeemed => Self::Redeemed,
            RedeemRow::NotFound => Self::NotFound,
            RedeemRow::AlreadyUsed => Self::AlreadyUsed,
            RedeemRow::Expired => Self::Expired,
        }
    }
}

/// Durable redemption state for issued QR tokens.
///
/// Implementations must make [`ReplayStore::try_redeem`] a single atomic
/// conditional update that is safe across processes, and must never
/// overwrite an existing record in [`ReplayStore::record`].
#[async_trait]
pub trait ReplayStore: Send + Sync {
    async fn record(
        &self,
        token_hash: &str,
        subject_id: &SubjectId,
        expires_at: i64,
        now: i64,
    ) -> Result<(), StoreError>;

    async fn try_redeem(&self, token_hash: &str, now: i64) -> Result<RedeemAttempt, StoreError>;

    async fn lookup(&self, token_hash: &str) -> Result<Option<ReplayRecord>, StoreError>;
}

/// [`ReplayStore`] backed by the `qr_tokens` SQLite table.
#[derive(Clone, Debug)]
pub struct SqliteReplayStore {
    conn: Connection,
}

impl SqliteReplayStore {
    /// Wrap a connection whose schema is already up to date
    /// (see [`crate::database::open_database`]).
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl ReplayStore for SqliteReplayStore {
    async fn record(
        &self,
        token_hash: &str,
        subject_id: &SubjectId,
        expires_at: i64,
        now: i64,
    ) -> Result<(), StoreError> {
        let inserted = insert_qr_token(
            &self.conn,
            NewQrToken {
                token_hash: token_hash.to_string(),
                subject_id: subject_id.to_string(),
                created_at: now,
                expires_at,
            },
        )
        .await?;

        if inserted {
            Ok(())
        } else {
            Err(StoreError::DuplicateHash)
        }
    }

    async fn try_redeem(&self, token_hash: &str, now: i64) -> Result<RedeemAttempt, StoreError> {
        let row = redeem_qr_token(&self.conn, token_hash.to_string(), now).await?;
        Ok(row.into())
    }

    async fn lookup(&self, token_hash: &str) -> Result<Option<ReplayRecord>, StoreError> {
        Ok(get_qr_token(&self.conn, token_hash.to_string()).await?)
    }
}
