use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Subject identifiers
// ---------------------------------------------------------------------------

/// Longest subject id accepted.  Keeps the signed token well inside QR
/// capacity once the header, timestamps and nonce are added.
pub const MAX_SUBJECT_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubjectIdError {
    #[error("subject id is empty")]
    Empty,

    #[error("subject id is longer than {} bytes", MAX_SUBJECT_ID_LEN)]
    TooLong,

    #[error("subject id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// The entity a QR token grants access for: a training session, or a
/// session + attendee pair.
///
/// Restricted to `[A-Za-z0-9_.:-]` so it can sit inside a URL or QR payload
/// without escaping, and so no names or free text ever end up in a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn parse(raw: &str) -> Result<Self, SubjectIdError> {
        if raw.is_empty() {
            return Err(SubjectIdError::Empty);
        }
        if raw.len() > MAX_SUBJECT_ID_LEN {
            return Err(SubjectIdError::TooLong);
        }
        if let Some(c) = raw.chars().find(|c| !is_subject_char(*c)) {
            return Err(SubjectIdError::InvalidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    /// `session-<id>` — the subject for a whole training session.
    pub fn session(session_id: &str) -> Result<Self, SubjectIdError> {
        Self::parse(&format!("session-{}", session_id))
    }

    /// `<session>:<attendee>` — the subject for one attendee's check-in.
    pub fn attendance(session: &SubjectId, attendee_id: &str) -> Result<Self, SubjectIdError> {
        Self::parse(&format!("{}:{}", session.0, attendee_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_subject_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

impl TryFrom<String> for SubjectId {
    type Error = SubjectIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Token classes
// ---------------------------------------------------------------------------

/// Kind of QR token being issued.  Each class has its own default TTL in
/// `[qr]` config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    /// Shown on the instructor's screen for the duration of a training session.
    #[default]
    Session,
    /// Per-attendee check-in code.
    Attendance,
}

impl TokenClass {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "session" => Some(Self::Session),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Token payload
// ---------------------------------------------------------------------------

/// Claims carried inside a signed QR token.
///
/// All timestamps are integer milliseconds since the Unix epoch, both when
/// the token is signed and when it is checked.  Claim names are kept short
/// because the whole token has to fit in a QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrClaims {
    #[serde(rename = "sub")]
    pub subject_id: SubjectId,

    #[serde(rename = "iat_ms")]
    pub issued_at: i64,

    #[serde(rename = "exp_ms")]
    pub expires_at: i64,

    /// Random per-issuance value (base64url, 128 bits).
    #[serde(rename = "jti")]
    pub nonce: String,
}

impl QrClaims {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Replay records
// ---------------------------------------------------------------------------

/// One row of the replay store.  Looked up by `token_hash` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayRecord {
    pub token_hash: String,
    pub subject_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub used: bool,
    pub used_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// The closed set of user-visible redemption failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QrErrorCode {
    #[serde(rename = "QR_INVALID")]
    Invalid,
    #[serde(rename = "QR_EXPIRED")]
    Expired,
    #[serde(rename = "QR_ALREADY_USED")]
    AlreadyUsed,
}

impl QrErrorCode {
    pub const ALL: [QrErrorCode; 3] = [Self::Invalid, Self::Expired, Self::AlreadyUsed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "QR_INVALID",
            Self::Expired => "QR_EXPIRED",
            Self::AlreadyUsed => "QR_ALREADY_USED",
        }
    }

    pub fn to_message(&self) -> &'static str {
        match self {
            Self::Invalid => "QR code is not valid",
            Self::Expired => "QR code has expired",
            Self::AlreadyUsed => "QR code has already been used",
        }
    }
}

impl fmt::Display for QrErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gateway wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub subject_id: String,
    #[serde(default)]
    pub class: TokenClass,
    /// Overrides the class TTL; still bounded by `max_ttl_secs`.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub token: String,
}

/// Returned to the gateway after a successful redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub subject_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl From<&QrClaims> for RedeemResponse {
    fn from(claims: &QrClaims) -> Self {
        Self {
            subject_id: claims.subject_id.to_string(),
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub subject_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub used: bool,
    pub used_at: Option<i64>,
}
