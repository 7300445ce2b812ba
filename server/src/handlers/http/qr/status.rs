use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};

use shared::types::{QrErrorCode, RedeemRequest, StatusResponse};

use crate::AppState;
use crate::handlers::http::qr::deliver_body_error;
use crate::handlers::http::utils::{
    deliver_qr_error, deliver_store_unavailable, deliver_success_json, parse_body,
};

/// `POST /api/qr/status`. Read-only, never consumes the token.
pub async fn status(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let limit = state.config.read().await.server.max_body_bytes;
    let mut fields = match parse_body(req, limit).await {
        Ok(fields) => fields,
        Err(e) => return deliver_body_error(e),
    };

    match fields.remove("token") {
        Some(token) => token_status(&state, RedeemRequest { token }).await,
        None => deliver_qr_error(QrErrorCode::Invalid),
    }
}

pub async fn token_status(
    state: &AppState,
    request: RedeemRequest,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    match state.redeemer.inspect(request.token.trim()).await {
        Ok((claims, record)) => deliver_success_json(Some(StatusResponse {
            subject_id: claims.subject_id.to_string(),
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
            used: record.used,
            used_at: record.used_at,
        })),
        Err(e) => match e.code() {
            Some(code) => deliver_qr_error(code),
            None => deliver_store_unavailable(),
        },
    }
}
