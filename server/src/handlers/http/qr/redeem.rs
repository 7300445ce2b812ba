use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};

use shared::types::{QrErrorCode, RedeemRequest, RedeemResponse};

use crate::AppState;
use crate::database::utils::now_millis;
use crate::handlers::http::qr::deliver_body_error;
use crate::handlers::http::utils::{
    deliver_qr_error, deliver_store_unavailable, deliver_success_json, parse_body,
};

/// `POST /api/qr/redeem`
pub async fn redeem(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let limit = state.config.read().await.server.max_body_bytes;
    let mut fields = match parse_body(req, limit).await {
        Ok(fields) => fields,
        Err(e) => return deliver_body_error(e),
    };

    // A scan that carries no token is just another invalid QR code.
    match fields.remove("token") {
        Some(token) => redeem_token(&state, RedeemRequest { token }, now_millis()).await,
        None => deliver_qr_error(QrErrorCode::Invalid),
    }
}

/// Redeem a parsed request at `now` (epoch ms).
pub async fn redeem_token(
    state: &AppState,
    request: RedeemRequest,
    now: i64,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    match state.redeemer.redeem(request.token.trim(), now).await {
        Ok(claims) => deliver_success_json(Some(RedeemResponse::from(&claims))),
        Err(e) => match e.code() {
            Some(code) => deliver_qr_error(code),
            None => deliver_store_unavailable(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use shared::config::parse_config;
    use shared::types::{IssueRequest, TokenClass};

    use crate::handlers::http::qr::issue::issue_token;
    use crate::handlers::http::qr::status::token_status;

    const CONFIG: &str = r#"
        [server]
        bind = "127.0.0.1"

        [database]
        path = ":memory:"

        [qr]
        secret = "0123456789abcdef0123456789abcdef"
    "#;

    async fn state() -> AppState {
        AppState::from_config(parse_config(CONFIG).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(resp: Response<BoxBody<Bytes, std::convert::Infallible>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn issue(state: &AppState, now: i64) -> String {
        let request = IssueRequest {
            subject_id: "session-42".into(),
            class: TokenClass::Session,
            ttl_secs: Some(300),
        };
        let resp = issue_token(state, request, now).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        json["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn second_scan_is_a_conflict() {
        let state = state().await;
        let now = 1_700_000_000_000;
        let token = issue(&state, now).await;

        let first = redeem_token(&state, RedeemRequest { token: token.clone() }, now + 1_000)
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let json = body_json(first).await;
        assert_eq!(json["data"]["subject_id"], "session-42");
        assert_eq!(json["data"]["expires_at"], now + 300_000);

        let second = redeem_token(&state, RedeemRequest { token }, now + 2_000)
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["code"], "QR_ALREADY_USED");
    }

    #[tokio::test]
    async fn late_scan_is_gone() {
        let state = state().await;
        let now = 1_700_000_000_000;
        let token = issue(&state, now).await;

        let resp = redeem_token(&state, RedeemRequest { token }, now + 301_000)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GONE);
        assert_eq!(body_json(resp).await["code"], "QR_EXPIRED");
    }

    #[tokio::test]
    async fn garbage_is_a_bad_request() {
        let state = state().await;
        let resp = redeem_token(&state, RedeemRequest { token: "not-a-token".into() }, 0)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "QR_INVALID");
    }

    #[tokio::test]
    async fn status_reports_without_consuming() {
        let state = state().await;
        let now = 1_700_000_000_000;
        let token = issue(&state, now).await;

        let before = token_status(&state, RedeemRequest { token: token.clone() })
            .await
            .unwrap();
        assert_eq!(body_json(before).await["data"]["used"], false);

        let resp = redeem_token(&state, RedeemRequest { token: token.clone() }, now + 5)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let after = token_status(&state, RedeemRequest { token }).await.unwrap();
        let json = body_json(after).await;
        assert_eq!(json["data"]["used"], true);
        assert_eq!(json["data"]["used_at"], now + 5);
    }

    #[tokio::test]
    async fn oversized_ttl_is_refused_at_issue() {
        let state = state().await;
        let request = IssueRequest {
            subject_id: "session-42".into(),
            class: TokenClass::Session,
            ttl_secs: Some(7_200),
        };
        let resp = issue_token(&state, request, 0).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "INVALID_REQUEST");
    }
}
