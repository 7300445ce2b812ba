//! Signing and verification of QR tokens.
//!
//! A token is a compact HS256 JWS over [`QrClaims`].  The codec proves who
//! issued a token; whether it has been used is the replay store's business,
//! and whether it has expired is decided once, by the redemption service.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use shared::types::{QrClaims, SubjectId};

use crate::database::utils::{duration_millis, generate_nonce, hash_token};

/// Anything longer is rejected before any parsing.  Real tokens are well
/// under half of this.
pub const MAX_TOKEN_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("ttl must be a positive number of milliseconds that fits an i64")]
    InvalidTtl,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// A freshly signed token together with the claims inside it.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: QrClaims,
}

impl SignedToken {
    /// Replay-store key for this token.
    pub fn hash(&self) -> String {
        hash_token(&self.token)
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is in milliseconds under custom claim names and is judged
        // by the redemption service, never here.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a new token for `subject_id`, valid from `now` for `ttl`.
    pub fn issue(
        &self,
        subject_id: &SubjectId,
        ttl: Duration,
        now: i64,
    ) -> Result<SignedToken, CodecError> {
        let ttl_ms = duration_millis(ttl)
            .filter(|ms| *ms > 0)
            .ok_or(CodecError::InvalidTtl)?;
        let expires_at = now.checked_add(ttl_ms).ok_or(CodecError::InvalidTtl)?;

        let claims = QrClaims {
            subject_id: subject_id.clone(),
            issued_at: now,
            expires_at,
            nonce: generate_nonce(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(CodecError::Signing)?;

        Ok(SignedToken { token, claims })
    }

    /// Check the signature and decode the claims.
    ///
    /// Fails closed: on any error no claims are returned.
    pub fn verify(&self, token: &str) -> Result<QrClaims, CodecError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::Malformed);
        }

        let data = decode::<QrClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("QR token rejected by codec: {}", e);
            match e.kind() {
                ErrorKind::InvalidSignature => CodecError::InvalidSignature,
                _ => CodecError::Malformed,
            }
        })?;

        let claims = data.claims;
        if claims.expires_at <= claims.issued_at {
            debug!("QR token rejected by codec: expiry not after issuance");
            return Err(CodecError::Malformed);
        }

        Ok(claims)
    }
}
