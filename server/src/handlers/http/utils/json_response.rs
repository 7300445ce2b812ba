use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error, warn};

use shared::types::{ErrorResponse, QrErrorCode};

/// Wrap bytes in the boxed body type every handler returns.
pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// This is the primary helper all handlers should use instead of
/// writing their own one-off serialization + response-building blocks.
pub fn deliver_serialized_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))?;

    Ok(response)
}

/// Delivers a JSON error response with the specified error code, message, and status.
pub fn deliver_error_json(
    error_code: &str,
    message: &str,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    if status.is_server_error() {
        error!(
            "Delivering error JSON: {} - {} ({})",
            status.as_u16(),
            error_code,
            message
        );
    } else {
        warn!(
            "Delivering error JSON: {} - {} ({})",
            status.as_u16(),
            error_code,
            message
        );
    }

    deliver_serialized_json(&ErrorResponse::new(error_code, message), status)
}

/// Delivers a success JSON response with optional data.
pub fn deliver_success_json<T: Serialize>(
    data: Option<T>,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let response_body = match data {
        Some(d) => json!({
            "status": "success",
            "data": d
        }),
        None => json!({
            "status": "success"
        }),
    };

    deliver_serialized_json(&response_body, StatusCode::OK)
}

/// HTTP status for each stable QR error code.
pub fn qr_error_status(code: QrErrorCode) -> StatusCode {
    match code {
        QrErrorCode::Invalid => StatusCode::BAD_REQUEST,
        QrErrorCode::Expired => StatusCode::GONE,
        QrErrorCode::AlreadyUsed => StatusCode::CONFLICT,
    }
}

/// Deliver one of the three stable QR failures.
pub fn deliver_qr_error(code: QrErrorCode) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    deliver_error_json(code.as_str(), code.to_message(), qr_error_status(code))
}

/// Replay store outage.  Deliberately not one of the QR codes: the gateway
/// may retry.
pub fn deliver_store_unavailable() -> Result<Response<BoxBody<Bytes, Infallible>>> {
    deliver_error_json(
        "STORE_UNAVAILABLE",
        "Attendance store is temporarily unavailable, try again",
        StatusCode::SERVICE_UNAVAILABLE,
    )
}
