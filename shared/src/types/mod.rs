pub mod json_error;
pub mod qr;
pub mod server_config;

pub use self::json_error::ErrorResponse;
pub use self::qr::{
    IssueRequest, MAX_SUBJECT_ID_LEN, IssueResponse, QrClaims, QrErrorCode, RedeemRequest, RedeemResponse,
    ReplayRecord, StatusResponse, SubjectId, SubjectIdError, TokenClass,
};
pub use self::server_config::{AppConfig, ConfigError, MIN_SECRET_LEN, SECRET_ENV_VAR};
