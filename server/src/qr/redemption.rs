use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use shared::types::{QrClaims, QrErrorCode, ReplayRecord};

use crate::database::utils::{hash_prefix, hash_token};
use crate::qr::codec::TokenCodec;
use crate::qr::store::{RedeemAttempt, ReplayStore, StoreError};

/// Why a redemption was refused.
///
/// The first three variants are the stable user-facing outcomes.
/// `StoreUnavailable` is transient infrastructure trouble: it carries no QR
/// code and the caller may retry.
#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("QR_INVALID")]
    Invalid,

    #[error("QR_EXPIRED")]
    Expired,

    #[error("QR_ALREADY_USED")]
    AlreadyUsed,

    #[error("replay store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl RedeemError {
    /// The stable code for this outcome, `None` for transient failures.
    pub fn code(&self) -> Option<QrErrorCode> {
        match self {
            Self::Invalid => Some(QrErrorCode::Invalid),
            Self::Expired => Some(QrErrorCode::Expired),
            Self::AlreadyUsed => Some(QrErrorCode::AlreadyUsed),
            Self::StoreUnavailable(_) => None,
        }
    }
}

/// Validates presented tokens and consumes them exactly once.
pub struct RedemptionService {
    codec: Arc<TokenCodec>,
    store: Arc<dyn ReplayStore>,
}

impl RedemptionService {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn ReplayStore>) -> Self {
        Self { codec, store }
    }

    /// Redeem `token` at `now` (epoch ms).
    ///
    /// Order: signature, then expiry from the payload, then the store's
    /// atomic transition.  Nothing is written unless the result is `Ok`.
    pub async fn redeem(&self, token: &str, now: i64) -> Result<QrClaims, RedeemError> {
        let claims = self.codec.verify(token).map_err(|e| {
            debug!("Rejecting QR token: {}", e);
            RedeemError::Invalid
        })?;

        if claims.is_expired_at(now) {
            info!(
                "QR token for {} expired at {} (now={})",
                claims.subject_id, claims.expires_at, now
            );
            return Err(RedeemError::Expired);
        }

        let token_hash = hash_token(token);
        let attempt = self.store.try_redeem(&token_hash, now).await.map_err(|e| {
            error!("Replay store failed during redemption: {}", e);
            RedeemError::StoreUnavailable(e)
        })?;

        match attempt {
            RedeemAttempt::Redeemed => {
                info!(
                    "Redeemed QR token {} for {}",
                    hash_prefix(&token_hash),
                    claims.subject_id
                );
                Ok(claims)
            }
            RedeemAttempt::AlreadyUsed => {
                warn!(
                    "Replay of QR token {} for {}",
                    hash_prefix(&token_hash),
                    claims.subject_id
                );
                Err(RedeemError::AlreadyUsed)
            }
            RedeemAttempt::Expired => Err(RedeemError::Expired),
            RedeemAttempt::NotFound => {
                warn!(
                    "Validly signed QR token {} for {} has no replay record",
                    hash_prefix(&token_hash),
                    claims.subject_id
                );
                Err(RedeemError::Invalid)
            }
        }
    }

    /// Verify `token` and return its claims with the current replay record,
    /// without changing anything.  A token with no record is `Invalid`.
    pub async fn inspect(&self, token: &str) -> Result<(QrClaims, ReplayRecord), RedeemError> {
        let claims = self.codec.verify(token).map_err(|_| RedeemError::Invalid)?;

        let record = self
            .store
            .lookup(&hash_token(token))
            .await
            .map_err(RedeemError::StoreUnavailable)?
            .ok_or(RedeemError::Invalid)?;

        Ok((claims, record))
    }
}
