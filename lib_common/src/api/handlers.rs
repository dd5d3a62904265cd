//! # Records HTTP Handlers
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/create` | `POST` `{name, data}` | `201` + record |
//! | `/read?uid=` | `GET` | `200` + record, `404` if absent |
//! | `/delete?uid=` | `DELETE`, `POST` | `200` + ack, also for absent ids |
//! | `/search?q=` | `GET` | `200` + streamed JSON array |
//! | `/health` | `GET` | `200 OK`, no auth |
//!
//! Every route except `/health` sits behind HTTP Basic auth. Each request runs
//! under a child of the server-wide shutdown token, so shutting down cancels
//! in-flight searches.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::auth::{require_basic_auth, BasicCredentials};
use super::encoder::{encode_search, EncoderOptions};
use super::error::AppError;
use super::wire::{DeleteAck, WireRecord};
use crate::records::{NewRecord, RecordId, RecordStore, Records};

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct ApiState<S> {
    /// The service layer.
    pub records: Records<S>,
    /// Server-wide shutdown token; requests run under child tokens of it.
    pub shutdown: CancellationToken,
    /// Search response encoding switches.
    pub encoder: EncoderOptions,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            shutdown: self.shutdown.clone(),
            encoder: self.encoder,
        }
    }
}

impl<S> ApiState<S> {
    /// State with default encoder options.
    pub fn new(records: Records<S>, shutdown: CancellationToken) -> Self {
        Self {
            records,
            shutdown,
            encoder: EncoderOptions::default(),
        }
    }

    /// Overrides the encoder options.
    pub fn with_encoder(mut self, encoder: EncoderOptions) -> Self {
        self.encoder = encoder;
        self
    }

    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Builds the records router.
pub fn router<S: RecordStore>(state: ApiState<S>, credentials: BasicCredentials) -> Router {
    let protected = Router::new()
        .route("/create", post(create_record::<S>))
        .route("/read", get(read_record::<S>))
        .route("/delete", delete(delete_record::<S>).post(delete_record::<S>))
        .route("/search", get(search_records::<S>))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            require_basic_auth,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
}

#[derive(Debug, Deserialize)]
struct UidQuery {
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

fn parse_uid(raw: Option<String>) -> Result<RecordId, AppError> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing query parameter `uid`".to_string()))?;
    let id: RecordId = raw
        .parse()
        .map_err(|e| AppError::BadRequest(format!("invalid uid {:?}: {}", raw, e)))?;
    if id.is_nil() {
        return Err(AppError::BadRequest("nil uid".to_string()));
    }
    Ok(id)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn create_record<S: RecordStore>(
    State(state): State<ApiState<S>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let record: NewRecord = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid record body: {}", e)))?;

    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();
    let created = state.records.create(&cancel, record).await?;
    info!(id = %created.id, "record created");
    Ok((StatusCode::CREATED, Json(WireRecord::from(created))))
}

async fn read_record<S: RecordStore>(
    State(state): State<ApiState<S>>,
    Query(query): Query<UidQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_uid(query.uid)?;
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();
    let record = state.records.read(&cancel, id).await?;
    Ok(Json(WireRecord::from(record)))
}

async fn delete_record<S: RecordStore>(
    State(state): State<ApiState<S>>,
    Query(query): Query<UidQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_uid(query.uid)?;
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();
    state.records.delete(&cancel, id).await?;
    debug!(%id, "record deleted");
    Ok(Json(DeleteAck { id, deleted: true }))
}

async fn search_records<S: RecordStore>(
    State(state): State<ApiState<S>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let needle = query
        .q
        .ok_or_else(|| AppError::BadRequest("missing query parameter `q`".to_string()))?;

    // Ownership of the token moves into the body, which cancels it when dropped.
    let cancel = state.request_token();
    let stream = state.records.search(&cancel, &needle).await?;
    let body = Body::from_stream(encode_search(stream, cancel, state.encoder));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_validation() {
        assert!(matches!(parse_uid(None), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_uid(Some(String::new())), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_uid(Some("nope".into())), Err(AppError::BadRequest(_))));
        assert!(matches!(
            parse_uid(Some(RecordId::nil().to_string())),
            Err(AppError::BadRequest(_))
        ));

        let id = RecordId::generate();
        assert_eq!(parse_uid(Some(id.to_string())).expect("valid"), id);
    }
}
