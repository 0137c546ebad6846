use super::AppState;
use super::envelope::{ApiError, Envelope, JsonBody};
use crate::Error;
use crate::constants::PASSWORD_HEADER;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::warn;

type ApiResult = Result<Envelope<Value>, ApiError>;

/// Rejects requests for a protected uid that lack a matching credential.
pub(super) async fn require_password(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(uid) = params.get("uid") {
        let credential = credential(request.headers())?;
        state.passwords.verify(uid, credential.as_deref()).await?;
    }
    Ok(next.run(request).await)
}

fn credential(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(PASSWORD_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim().to_string()))
            .map_err(|_| Error::Decryption("credential header is not ASCII".to_string()).into()),
    }
}

pub(super) async fn public_key(State(state): State<AppState>) -> String {
    state.keys.public_pem().to_string()
}

pub(super) async fn uids(State(state): State<AppState>) -> Envelope<Value> {
    Envelope::new(json!({ "uids": state.engine.get_uids().await }))
}

#[derive(Debug, Default, Deserialize)]
struct CreateRequest {
    password: Option<String>,
}

pub(super) async fn create(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: CreateRequest = if body.is_empty() {
        CreateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, "INVALID_JSON", e.to_string())
        })?
    };

    // Store the password first so a bad credential leaves no unprotected database behind
    let protected = request.password.is_some();
    let had_password = state.passwords.is_protected(&uid).await?;
    if let Some(encrypted) = &request.password {
        state.passwords.store_password(encrypted, &uid).await?;
    }

    let uid = match state.engine.create_new(&uid).await {
        Ok(uid) => uid,
        Err(e) => {
            // No password may outlive a database that was never created
            if protected && !had_password {
                if let Err(cleanup) = state.passwords.remove(&uid).await {
                    warn!(uid = %uid, error = %cleanup, "Failed to remove password of uncreated database");
                }
            }
            return Err(e.into());
        }
    };

    Ok(Envelope::new(json!({ "uid": uid, "protected": protected })))
}

pub(super) async fn add(
    State(state): State<AppState>,
    Path((uid, path)): Path<(String, String)>,
    JsonBody(document): JsonBody,
) -> ApiResult {
    let document = state.engine.add(&path, document, &uid).await?;
    Ok(Envelope::new(
        json!({ "uid": uid, "path": path, "document": document }),
    ))
}

pub(super) async fn fetch_root(State(state): State<AppState>, Path(uid): Path<String>) -> ApiResult {
    fetch_value(&state, uid, String::new()).await
}

pub(super) async fn fetch(
    State(state): State<AppState>,
    Path((uid, path)): Path<(String, String)>,
) -> ApiResult {
    fetch_value(&state, uid, path).await
}

async fn fetch_value(state: &AppState, uid: String, path: String) -> ApiResult {
    let value = state
        .engine
        .fetch(&path, &uid)
        .await?
        .ok_or(Error::NotFound)?;
    Ok(Envelope::new(
        json!({ "uid": uid, "path": path, "value": value }),
    ))
}

pub(super) async fn modify(
    State(state): State<AppState>,
    Path((uid, path)): Path<(String, String)>,
    JsonBody(patch): JsonBody,
) -> ApiResult {
    let value = state.engine.modify(&path, patch, &uid).await?;
    Ok(Envelope::new(
        json!({ "uid": uid, "path": path, "value": value }),
    ))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Path((uid, path)): Path<(String, String)>,
) -> ApiResult {
    state.engine.remove(&path, &uid).await?;
    Ok(Envelope::new(json!({ "uid": uid, "path": path })))
}

pub(super) async fn key_paths(State(state): State<AppState>, Path(uid): Path<String>) -> ApiResult {
    let paths = state.engine.get_all_key_paths(&uid).await?;
    Ok(Envelope::new(json!({ "uid": uid, "paths": paths })))
}

pub(super) async fn export(State(state): State<AppState>, Path(uid): Path<String>) -> ApiResult {
    let document = state.engine.fetch_all(&uid).await?;
    Ok(Envelope::new(
        json!({ "uid": uid, "document": document.into_value() }),
    ))
}

pub(super) async fn destroy(State(state): State<AppState>, Path(uid): Path<String>) -> ApiResult {
    let existed = state.engine.destroy(&uid).await?;
    let had_password = state.passwords.remove(&uid).await?;
    Ok(Envelope::new(json!({
        "uid": uid,
        "existed": existed,
        "had_password": had_password,
    })))
}
