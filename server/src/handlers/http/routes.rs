use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, error};

use crate::AppState;
use crate::handlers::http::qr;
use crate::handlers::http::utils::json_response::{self, full};

// ---------------------------------------------------------------------------
// Handler type alias
// ---------------------------------------------------------------------------
//
// No route carries its own authentication: the issuing listener is meant to
// be bound where only the gateway can reach it, and redemption is protected
// by the token itself.

type RouteHandler = Box<
    dyn Fn(
            Request<hyper::body::Incoming>,
            AppState,
        )
            -> Pin<Box<dyn Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send>>
        + Send
        + Sync,
>;

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

struct Route {
    method: Method,
    path: String,
    handler: RouteHandler,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn add<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: Box::new(move |req, state| Box::pin(handler(req, state))),
        });
        self
    }

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.add(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.add(Method::POST, path, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(
        &self,
        req: Request<hyper::body::Incoming>,
        state: AppState,
    ) -> Result<Response<BoxBody<Bytes, Infallible>>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("{} {}", method, path);

        if let Some(route) = self
            .routes
            .iter()
            .find(|r| r.method == method && Self::path_matches(&r.path, &path))
        {
            return (route.handler)(req, state).await;
        }

        if self.routes.iter().any(|r| Self::path_matches(&r.path, &path)) {
            return json_response::deliver_error_json(
                "METHOD_NOT_ALLOWED",
                "Method not allowed",
                StatusCode::METHOD_NOT_ALLOWED,
            );
        }

        json_response::deliver_error_json("NOT_FOUND", "Endpoint not found", StatusCode::NOT_FOUND)
            .context("Failed to deliver 404 response")
    }

    /// [`Router::route`], with handler failures turned into a bare 500 so the
    /// connection always gets an answer.
    pub async fn dispatch(
        &self,
        req: Request<hyper::body::Incoming>,
        state: AppState,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        match self.route(req, state).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("Handler failed: {:#}", e);
                internal_error()
            }
        }
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);
        route_path == clean.trim_end_matches('/') || route_path == clean
    }
}

fn internal_error() -> Response<BoxBody<Bytes, Infallible>> {
    let mut resp = Response::new(full(
        r#"{"status":"error","code":"INTERNAL_ERROR","message":"An internal error occurred"}"#,
    ));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

// ---------------------------------------------------------------------------
// Listener route tables
// ---------------------------------------------------------------------------

/// Gateway-facing listener: token issuance.
pub fn admin_router() -> Router {
    Router::new()
        .post("/api/qr/issue", qr::issue::issue)
        .get("/health", qr::health)
}

/// Scanner-facing listener: redemption and read-only status.
pub fn client_router() -> Router {
    Router::new()
        .post("/api/qr/redeem", qr::redeem::redeem)
        .post("/api/qr/status", qr::status::status)
        .get("/health", qr::health)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_matching_ignores_query_and_trailing_slash() {
        assert!(Router::path_matches("/api/qr/redeem", "/api/qr/redeem"));
        assert!(Router::path_matches("/api/qr/redeem", "/api/qr/redeem/"));
        assert!(Router::path_matches("/api/qr/redeem", "/api/qr/redeem?src=scan"));
        assert!(!Router::path_matches("/api/qr/redeem", "/api/qr/redeemx"));
        assert!(!Router::path_matches("/api/qr/redeem", "/api/qr"));
    }

    #[test]
    fn issuance_is_only_on_the_admin_listener() {
        let admin = format!("{:?}", admin_router());
        let client = format!("{:?}", client_router());
        assert!(admin.contains("routes_count: 2"));
        assert!(client.contains("routes_count: 3"));
        assert!(
            !client_router()
                .routes
                .iter()
                .any(|r| r.path == "/api/qr/issue")
        );
    }
}
