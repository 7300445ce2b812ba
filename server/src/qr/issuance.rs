use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use shared::types::{IssueResponse, SubjectId};

use crate::database::utils::hash_prefix;
use crate::qr::codec::{CodecError, TokenCodec};
use crate::qr::store::{ReplayStore, StoreError};

/// A hash collision is retried once with a fresh nonce.  Two in a row means
/// the random source is broken, so there is no third attempt.
const MAX_ISSUE_ATTEMPTS: usize = 2;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("ttl must be greater than zero and at most {max_secs}s")]
    InvalidTtl { max_secs: u64 },

    #[error("nonce collided {} times in a row; refusing to issue", MAX_ISSUE_ATTEMPTS)]
    NonceCollision,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub signed_token: String,
    pub expires_at: i64,
}

impl From<IssuedToken> for IssueResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.signed_token,
            expires_at: issued.expires_at,
        }
    }
}

/// Mints QR tokens and persists their replay records.
pub struct IssuanceService {
    codec: Arc<TokenCodec>,
    store: Arc<dyn ReplayStore>,
    max_ttl: Duration,
}

impl IssuanceService {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn ReplayStore>, max_ttl: Duration) -> Self {
        Self {
            codec,
            store,
            max_ttl,
        }
    }

    /// Issue a token for `subject_id` valid for `ttl` from `now` (epoch ms).
    ///
    /// On success exactly one new replay record exists for the returned token.
    pub async fn issue_token(
        &self,
        subject_id: &SubjectId,
        ttl: Duration,
        now: i64,
    ) -> Result<IssuedToken, IssueError> {
        if ttl.is_zero() || ttl > self.max_ttl {
            return Err(IssueError::InvalidTtl {
                max_secs: self.max_ttl.as_secs(),
            });
        }

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let signed = self.codec.issue(subject_id, ttl, now)?;
            let token_hash = signed.hash();

            match self
                .store
                .record(&token_hash, subject_id, signed.claims.expires_at, now)
                .await
            {
                Ok(()) => {
                    info!(
                        "Issued QR token {} for {} (expires_at={})",
                        hash_prefix(&token_hash),
                        subject_id,
                        signed.claims.expires_at
                    );
                    return Ok(IssuedToken {
                        signed_token: signed.token,
                        expires_at: signed.claims.expires_at,
                    });
                }
                Err(StoreError::DuplicateHash) => {
                    warn!(
                        "QR token hash collision for {} on attempt {}/{}",
                        subject_id, attempt, MAX_ISSUE_ATTEMPTS
                    );
                }
                Err(e) => {
                    error!("Failed to record QR token for {}: {}", subject_id, e);
                    return Err(IssueError::Store(e));
                }
            }
        }

        error!(
            "Refusing to issue QR token for {}: repeated nonce collisions",
            subject_id
        );
        Err(IssueError::NonceCollision)
    }
}
