use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use tracing::error;

use shared::types::{IssueRequest, IssueResponse, SubjectId, TokenClass};

use crate::AppState;
use crate::database::utils::now_millis;
use crate::handlers::http::qr::deliver_body_error;
use crate::handlers::http::utils::{
    deliver_error_json, deliver_store_unavailable, deliver_success_json, parse_body,
};
use crate::qr::IssueError;

const ISSUE_FAILED_MESSAGE: &str = "Could not issue a QR token, try again";

/// `POST /api/qr/issue`
pub async fn issue(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let limit = state.config.read().await.server.max_body_bytes;
    let fields = match parse_body(req, limit).await {
        Ok(fields) => fields,
        Err(e) => return deliver_body_error(e),
    };

    match issue_request_from_fields(&fields) {
        Ok(request) => issue_token(&state, request, now_millis()).await,
        Err(message) => invalid_request(&message),
    }
}

/// Build an [`IssueRequest`] from flat body fields.
pub fn issue_request_from_fields(fields: &HashMap<String, String>) -> Result<IssueRequest, String> {
    let subject_id = fields
        .get("subject_id")
        .cloned()
        .ok_or_else(|| "Missing required field: subject_id".to_string())?;

    let class = match fields.get("class") {
        None => TokenClass::default(),
        Some(raw) => TokenClass::parse(raw)
            .ok_or_else(|| format!("Unknown token class: {}", raw))?,
    };

    let ttl_secs = fields
        .get("ttl_secs")
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| format!("ttl_secs must be a whole number of seconds, got {}", raw))
        })
        .transpose()?;

    Ok(IssueRequest {
        subject_id,
        class,
        ttl_secs,
    })
}

/// Issue a token for a parsed request at `now` (epoch ms).
pub async fn issue_token(
    state: &AppState,
    request: IssueRequest,
    now: i64,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let subject_id = match SubjectId::parse(&request.subject_id) {
        Ok(s) => s,
        Err(e) => return invalid_request(&e.to_string()),
    };

    // Copy the TTL out; the guard must not live across the store call.
    let ttl = match request.ttl_secs {
        Some(secs) => Duration::from_secs(secs),
        None => state.config.read().await.qr.ttl_for(request.class),
    };

    match state.issuer.issue_token(&subject_id, ttl, now).await {
        Ok(issued) => deliver_success_json(Some(IssueResponse::from(issued))),
        Err(e @ IssueError::InvalidTtl { .. }) => invalid_request(&e.to_string()),
        Err(IssueError::Store(_)) => deliver_store_unavailable(),
        Err(e) => {
            error!("QR issuance failed for {}: {}", subject_id, e);
            deliver_error_json(
                "INTERNAL_ERROR",
                ISSUE_FAILED_MESSAGE,
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

fn invalid_request(message: &str) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    deliver_error_json("INVALID_REQUEST", message, StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use shared::config::{LiveConfig, parse_config};
    use shared::types::ReplayRecord;

    use crate::qr::{RedeemAttempt, ReplayStore, StoreError, build_services};

    const CONFIG: &str = r#"
        [server]
        bind = "127.0.0.1"

        [database]
        path = ":memory:"

        [qr]
        secret = "0123456789abcdef0123456789abcdef"
    "#;

    /// Every hash is reported as already recorded.
    struct CollidingStore;

    #[async_trait]
    impl ReplayStore for CollidingStore {
        async fn record(
            &self,
            _token_hash: &str,
            _subject_id: &SubjectId,
            _expires_at: i64,
            _now: i64,
        ) -> Result<(), StoreError> {
            Err(StoreError::DuplicateHash)
        }

        async fn try_redeem(&self, _token_hash: &str, _now: i64) -> Result<RedeemAttempt, StoreError> {
            Ok(RedeemAttempt::NotFound)
        }

        async fn lookup(&self, _token_hash: &str) -> Result<Option<ReplayRecord>, StoreError> {
            Ok(None)
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn class_defaults_to_session() {
        let req = issue_request_from_fields(&fields(&[("subject_id", "session-42")])).unwrap();
        assert_eq!(req.subject_id, "session-42");
        assert_eq!(req.class, TokenClass::Session);
        assert_eq!(req.ttl_secs, None);
    }

    #[test]
    fn explicit_class_and_ttl_are_parsed() {
        let req = issue_request_from_fields(&fields(&[
            ("subject_id", "session-42:ff-7"),
            ("class", "Attendance"),
            ("ttl_secs", "120"),
        ]))
        .unwrap();
        assert_eq!(req.class, TokenClass::Attendance);
        assert_eq!(req.ttl_secs, Some(120));
    }

    #[test]
    fn bad_fields_are_reported() {
        assert!(issue_request_from_fields(&fields(&[])).is_err());
        assert!(
            issue_request_from_fields(&fields(&[("subject_id", "s"), ("class", "drill")]))
                .is_err()
        );
        assert!(
            issue_request_from_fields(&fields(&[("subject_id", "s"), ("ttl_secs", "-5")]))
                .is_err()
        );
    }

    #[tokio::test]
    async fn internal_failures_do_not_leak_detail() {
        let config = parse_config(CONFIG).unwrap();
        let (issuer, redeemer) = build_services(
            b"0123456789abcdef0123456789abcdef",
            Arc::new(CollidingStore),
            config.qr.max_ttl(),
        );
        let state = AppState::new(LiveConfig::new(config), issuer, redeemer);

        let request = IssueRequest {
            subject_id: "session-42".into(),
            class: TokenClass::Session,
            ttl_secs: None,
        };
        let resp = issue_token(&state, request, 1_700_000_000_000).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["message"], ISSUE_FAILED_MESSAGE);
    }

    async fn status_and_expiry(state: &AppState, now: i64) -> (StatusCode, serde_json::Value) {
        let request = IssueRequest {
            subject_id: "session-42".into(),
            class: TokenClass::Session,
            ttl_secs: None,
        };
        let resp = issue_token(state, request, now).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn default_issuance_survives_reload_that_raises_max_ttl() {
        let state = AppState::from_config(parse_config(CONFIG).unwrap())
            .await
            .unwrap();
        let now = 1_700_000_000_000;

        let too_long = parse_config(&format!(
            "{}\nsession_ttl_secs = 5000\nmax_ttl_secs = 7200\n",
            CONFIG
        ))
        .unwrap();
        assert!(state.config.reload(too_long).await.is_err());

        let (status, _) = status_and_expiry(&state, now).await;
        assert_eq!(status, StatusCode::OK);

        let longer = parse_config(&format!(
            "{}\nsession_ttl_secs = 1200\nmax_ttl_secs = 7200\n",
            CONFIG
        ))
        .unwrap();
        state.config.reload(longer).await.unwrap();

        let (status, json) = status_and_expiry(&state, now).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["expires_at"], now + 1_200_000);
    }
}
