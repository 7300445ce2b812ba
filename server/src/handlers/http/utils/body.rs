use std::collections::HashMap;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::Request;
use hyper::body::Body;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read body: {0}")]
    Read(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a JSON or form-encoded body into flat string fields.
///
/// Form bodies let a plain HTML scan page post `token=...` without any
/// script.  JSON numbers are kept as their decimal text; nested values are
/// dropped.
pub async fn parse_body<B>(req: Request<B>, limit: usize) -> Result<HashMap<String, String>, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                BodyError::TooLarge(limit)
            } else {
                BodyError::Read(e.to_string())
            }
        })?
        .to_bytes();

    parse_fields(&content_type, &body)
}

fn parse_fields(content_type: &str, body: &[u8]) -> Result<HashMap<String, String>, BodyError> {
    if content_type.contains("application/json") {
        let map = serde_json::from_slice::<HashMap<String, serde_json::Value>>(body)?;
        Ok(map
            .into_iter()
            .filter_map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((k, s))
            })
            .collect())
    } else {
        Ok(form_urlencoded::parse(body)
            .into_owned()
            .collect::<HashMap<String, String>>())
    }
}
