//! HTTP surface of the store.
//!
//! Every route under `/server/*/{uid}` passes through the password gate before the
//! handler runs. `/server/pubkey` and `/server/uids` are open.

pub mod envelope;
mod routes;

use crate::Engine;
use crate::auth::{KeyPair, PasswordStore};
use crate::Result;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use envelope::{ApiError, Envelope, ErrorBody, ErrorItem};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub passwords: PasswordStore,
    pub keys: Arc<KeyPair>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, passwords: PasswordStore) -> Self {
        let keys = Arc::clone(passwords.keys());
        Self {
            engine,
            passwords,
            keys,
        }
    }
}

/// Builds the router with all routes, the gate and request tracing.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/server/create/{uid}", post(routes::create))
        .route("/server/add/{uid}/{*path}", post(routes::add))
        .route("/server/fetch/{uid}", get(routes::fetch_root))
        .route("/server/fetch/{uid}/{*path}", get(routes::fetch))
        .route("/server/modify/{uid}/{*path}", patch(routes::modify))
        .route("/server/remove/{uid}/{*path}", delete(routes::remove))
        .route("/server/keys/{uid}", get(routes::key_paths))
        .route("/server/export/{uid}", get(routes::export))
        .route("/server/destroy/{uid}", delete(routes::destroy))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_password,
        ));

    Router::new()
        .route("/server/pubkey", get(routes::public_key))
        .route("/server/uids", get(routes::uids))
        .merge(gated)
        .with_state(state)
        // Enable tower-http tracing.
        .layer(TraceLayer::new_for_http())
}

/// Serves `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped");
    Ok(())
}
