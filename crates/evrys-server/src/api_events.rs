//! Event ingestion and retrieval handlers.
//!
//! Provides:
//! - `POST /v1/events`: append one event
//! - `GET /v1/events/{id}`: fetch one event by id
//! - `GET /v1/events`: stream a time-ordered slice as NDJSON

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use evrys_store::{Cursor, SliceRequest};
use evrys_types::{
    validate_event, AppendRequest, AppendResponse, Event, GetEventResponse, IterateParams,
};
use futures_util::stream;
use tracing::Span;

use crate::status::ApiError;
use crate::AppState;

/// Content type of the iterate response.
pub const NDJSON: &str = "application/x-ndjson";

/// Handler for `POST /v1/events`.
///
/// The body is decoded by hand so that a missing, a malformed and an
/// oversized event all surface as `INVALID_ARGUMENT` with the standard error
/// body.
pub async fn append_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AppendResponse>, ApiError> {
    let body = body.map_err(|rejection| {
        ApiError::InvalidArgument(format!("unreadable request body: {}", rejection.body_text()))
    })?;
    let request: AppendRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AppendRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidArgument(format!("malformed request body: {e}")))?
    };

    let wire = request
        .event
        .ok_or_else(|| ApiError::InvalidArgument("event is required".to_string()))?;
    let event = Event::try_from(wire).map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

    if let Err(e) = validate_event(&event) {
        tracing::warn!(
            parent: &state.span,
            event_id = %event.id,
            event_type = %event.event_type,
            event_source = %event.source,
            error = %e,
            "rejected invalid event"
        );
        return Err(ApiError::FailedPrecondition(e.to_string()));
    }

    if let Err(e) = state.append.append(&event).await {
        tracing::error!(
            parent: &state.span,
            event_id = %event.id,
            event_type = %event.event_type,
            event_source = %event.source,
            error = %e,
            "failed to append event"
        );
        return Err(e.into());
    }

    tracing::info!(
        parent: &state.span,
        event_id = %event.id,
        event_type = %event.event_type,
        event_source = %event.source,
        "appended event"
    );

    crate::notify_appended(&state, &event).await;

    Ok(Json(AppendResponse {}))
}

/// Handler for `GET /v1/events/{id}`.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GetEventResponse>, ApiError> {
    let Some(query) = state.query.as_ref() else {
        return Err(ApiError::NotFound(format!("event not found: {id}")));
    };

    let event = query.get_by_id(&id).await.map_err(|e| {
        tracing::debug!(parent: &state.span, event_id = %id, error = %e, "get event failed");
        ApiError::from(e)
    })?;

    Ok(Json(GetEventResponse { event }))
}

/// Handler for `GET /v1/events`.
///
/// Streams every event with `time <= before` (default: now) as one JSON
/// document per line, oldest first. The first page is read before the
/// response starts so that query failures become status codes. After that
/// the body is produced on demand: the next event is serialized only when
/// the connection asks for more data, and the next page is read only when
/// the current one is exhausted. A failure on a later page aborts the body.
pub async fn iterate_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<IterateParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidArgument(e.body_text()))?;

    let until = match params.before.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| ApiError::InvalidArgument(format!("before: {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let cursor = params
        .cursor
        .as_deref()
        .map(Cursor::decode)
        .transpose()?;
    let request = SliceRequest {
        cursor,
        limit: params.limit.unwrap_or(0),
        event_type: params.event_type,
        source: params.source,
    };

    let Some(query) = state.query.clone() else {
        return Ok(ndjson(Body::empty()));
    };

    let first = query.events_before(until, &request).await.map_err(|e| {
        tracing::warn!(parent: &state.span, error = %e, "slice query failed");
        ApiError::from(e)
    })?;

    let pager = Pager {
        query,
        until,
        request,
        buffer: first.events.into(),
        next: first.cursor,
        span: state.span.clone(),
    };

    Ok(ndjson(Body::from_stream(stream::unfold(pager, Pager::next_line))))
}

fn ndjson(body: Body) -> Response {
    ([(header::CONTENT_TYPE, NDJSON)], body).into_response()
}

/// Pull-driven walk over the pages of one slice.
struct Pager {
    query: Arc<dyn evrys_store::Query>,
    until: DateTime<Utc>,
    request: SliceRequest,
    buffer: VecDeque<Event>,
    next: Option<Cursor>,
    span: Span,
}

impl Pager {
    async fn next_line(mut self) -> Option<(Result<Bytes, std::io::Error>, Self)> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                let line = serde_json::to_vec(&event)
                    .map(|mut line| {
                        line.push(b'\n');
                        Bytes::from(line)
                    })
                    .map_err(std::io::Error::other);
                return Some((line, self));
            }

            self.request.cursor = Some(self.next.take()?);
            match self.query.events_before(self.until, &self.request).await {
                Ok(page) => {
                    self.buffer = page.events.into();
                    self.next = page.cursor;
                }
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, "slice continuation failed");
                    // Buffer and cursor are now empty, so the stream ends
                    // after this error.
                    return Some((Err(std::io::Error::other(e)), self));
                }
            }
        }
    }
}
