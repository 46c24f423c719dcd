//! HTTP server implementation
//!
//! hyper http1 with TokioIo for async handling; one spawned task per
//! connection, one logical task per request.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::auth::GuardPolicy;
use crate::config::Args;
use crate::db::DocumentStore;
use crate::login::LoginPolicy;
use crate::routes;
use crate::service::UserService;

/// Shared application state, built once at startup and torn down at
/// shutdown. No ambient globals.
pub struct AppState {
    pub args: Args,
    pub users: UserService,
    pub started: Instant,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn DocumentStore>) -> Self {
        let users = UserService::new(
            store,
            GuardPolicy::from_args(&args),
            LoginPolicy::from_args(&args),
        );
        Self {
            args,
            users,
            started: Instant::now(),
        }
    }
}

async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<http_body_util::Full<bytes::Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    debug!("{} {}", req.method(), path);

    if path == "/users" || path.starts_with("/users/") {
        return Ok(routes::handle_users_request(req, state, &path).await);
    }

    let response = match (req.method(), path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::health_check(&state)
        }
        (&Method::GET, "/version") => routes::version_info(),
        _ => routes::error_response(StatusCode::NOT_FOUND, "Not found", None),
    };

    Ok(response)
}

/// Accept loop; runs until ctrl-c.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Listening on {}", state.args.listen);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| route(req, state.clone()));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!("Connection error from {}: {}", peer, err);
            }
        });
    }
}
