use serde::{Deserialize, Serialize};

use crate::types::qr::QrErrorCode;

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<QrErrorCode> for ErrorResponse {
    fn from(code: QrErrorCode) -> Self {
        Self::new(code.as_str(), code.to_message())
    }
}
