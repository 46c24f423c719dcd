//! HTTP endpoints for the users resource
//!
//! ## Endpoints
//!
//! - `GET /users/{login}` - Fetch a single record
//! - `POST /users` - Create a record
//! - `PUT /users/{login}` - Whole-document or operator-style update
//! - `DELETE /users/{login}` - Delete a record
//! - `SEARCH /users` (or `POST /users/search`) - Find records by filter
//!
//! ## Authentication
//!
//! Credentials are resolved by the trusted upstream router and forwarded in
//! `x-auth-login`, `x-auth-role` and `x-auth-methods` headers. A request
//! without any of them is a trusted internal call.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::{Credentials, RequestContext};
use crate::server::AppState;
use crate::service::HandlerResponse;
use crate::types::Error;

type FullBody = Full<Bytes>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Read caller credentials resolved by the upstream router.
///
/// Absence of all three headers is the trusted internal-call path.
fn credentials_from_headers(req: &Request<Incoming>) -> Option<Credentials> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let username = header("x-auth-login");
    let role = header("x-auth-role");
    let methods = header("x-auth-methods");

    if username.is_none() && role.is_none() && methods.is_none() {
        return None;
    }

    let authorized_methods = methods
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|method| !method.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Credentials {
        username,
        role,
        authorized_methods,
    })
}

/// Single path segment after `/users`, if the subpath has exactly one.
fn single_segment(subpath: &str) -> Option<&str> {
    let segment = subpath.strip_prefix('/')?;
    if segment.is_empty() || segment.contains('/') {
        None
    } else {
        Some(segment)
    }
}

async fn read_json_body(req: Request<Incoming>) -> Result<Value, Response<FullBody>> {
    let body_bytes = match req.into_body().collect().await {
        Ok(body) => body.to_bytes(),
        Err(_) => return Err(error_response(StatusCode::BAD_REQUEST, "Invalid body", None)),
    };

    serde_json::from_slice(&body_bytes)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid JSON", None))
}

fn service_response(result: Result<HandlerResponse, Error>) -> Response<FullBody> {
    match result {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &response.answer)
        }
        Err(err) => {
            match err {
                // Internal failures get logged here, at the transport
                // boundary; denials and misses are normal traffic.
                Error::Hashing(_) | Error::Database(_) => error!("Request failed: {}", err),
                _ => warn!("Request rejected: {}", err),
            }
            error_response(err.status(), &err.to_string(), Some(err.code()))
        }
    }
}

/// Main handler for /users/* routes
pub async fn handle_users_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/users").unwrap_or("").to_string();

    let ctx = RequestContext {
        credentials: credentials_from_headers(&req),
        target: single_segment(&subpath).map(str::to_string),
    };

    match (method, subpath.as_str()) {
        (Method::GET, _) if ctx.target.is_some() => {
            service_response(state.users.get(&ctx).await)
        }

        (Method::POST, "") | (Method::POST, "/") => {
            let payload = match read_json_body(req).await {
                Ok(payload) => payload,
                Err(response) => return response,
            };
            service_response(state.users.create(payload, &ctx).await)
        }

        (Method::PUT, _) if ctx.target.is_some() => {
            let payload = match read_json_body(req).await {
                Ok(payload) => payload,
                Err(response) => return response,
            };
            service_response(state.users.update(payload, &ctx).await)
        }

        (Method::DELETE, _) if ctx.target.is_some() => {
            service_response(state.users.delete(&ctx).await)
        }

        // SEARCH extension method, plus a POST alias for plain clients.
        (ref method, "") | (ref method, "/") if method.as_str() == "SEARCH" => {
            let filter = match read_json_body(req).await {
                Ok(filter) => filter,
                Err(response) => return response,
            };
            service_response(state.users.search(filter, &ctx).await)
        }

        (Method::POST, "/search") => {
            let filter = match read_json_body(req).await {
                Ok(filter) => filter,
                Err(response) => return response,
            };
            service_response(state.users.search(filter, &ctx).await)
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}
