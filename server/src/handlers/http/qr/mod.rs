pub mod issue;
pub mod redeem;
pub mod status;

use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};

use crate::AppState;
use crate::handlers::http::utils::{BodyError, deliver_error_json, deliver_success_json};

/// `GET /health`
pub async fn health(
    _req: Request<hyper::body::Incoming>,
    _state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    deliver_success_json::<()>(None)
}

/// Map a body read failure to a 4xx response.
pub(crate) fn deliver_body_error(e: BodyError) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    match e {
        BodyError::TooLarge(_) => deliver_error_json(
            "PAYLOAD_TOO_LARGE",
            &e.to_string(),
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
        _ => deliver_error_json("INVALID_REQUEST", &e.to_string(), StatusCode::BAD_REQUEST),
    }
}
