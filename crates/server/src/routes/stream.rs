//! The Stream Dispatcher's HTTP surface (§4.H, §6): SSE push for clients
//! that can hold a connection open, long-poll for clients that can't.
//!
//! Both authenticate via an `apiKey` query parameter rather than the
//! `X-API-Key` header `AuthenticatedProject` expects — `EventSource` and
//! plain long-poll `fetch` callers can't set custom request headers, so
//! this uses `authenticate_query_key` directly instead.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;

use faultline_db::{errors, network_events, session_events, sessions};
use faultline_stream::{spawn_heartbeat, RecvError};
use faultline_types::session::TimelineEntry;
use faultline_types::stream::POLL_MAX_EVENTS;
use faultline_types::{PollQuery, PollResponse, StreamMessageType};

use crate::auth::authenticate_query_key;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

fn event_name(message_type: StreamMessageType) -> &'static str {
    match message_type {
        StreamMessageType::SessionEvent => "session-event",
        StreamMessageType::ErrorEvent => "error-event",
        StreamMessageType::Heartbeat => "heartbeat",
        StreamMessageType::SessionEnded => "session-ended",
    }
}

/// `GET /api/stream/session/{session_id}/events` (§4.H, §6): subscribes to
/// the session's broadcast channel and relays every message as an SSE
/// event, alongside a heartbeat ticker that self-terminates once this is
/// the last subscriber to disconnect.
#[utoipa::path(get, path = "/api/stream/session/{session_id}/events", responses((status = 200)))]
pub async fn stream_session_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let project = authenticate_query_key(&state, query.api_key.as_deref()).await?;
    sessions::get_by_id(state.db.pool(), project.id, &session_id).await?;

    let mut rx = state.stream.registry.subscribe(&session_id).await;
    spawn_heartbeat(state.stream.registry.clone(), session_id.clone());

    let event_stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    if let Ok(data) = serde_json::to_string(&message) {
                        yield Ok(Event::default().event(event_name(message.message_type)).data(data));
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()))
}

/// `GET /api/session/{session_id}/events/poll` (§4.H, §6): the fallback
/// for clients that can't hold an SSE connection open. `since` is a real
/// row id from a previously returned `TimelineEntry`, not an in-process
/// cursor — reads go straight to the session/network/error tables so a
/// client can resume after a server restart just as it would after a
/// dropped SSE connection.
#[utoipa::path(get, path = "/api/session/{session_id}/events/poll", responses((status = 200, body = PollResponse)))]
pub async fn poll_session_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<PollResponse>> {
    let project = authenticate_query_key(&state, query.api_key.as_deref()).await?;
    sessions::get_by_id(state.db.pool(), project.id, &session_id).await?;

    let pool = state.db.pool();
    let since = query.since.unwrap_or(-1);
    let fetch_limit = (POLL_MAX_EVENTS + 1) as i64;

    let session_events = session_events::list_since(pool, &session_id, since, fetch_limit).await?;
    let network_events = network_events::list_since(pool, &session_id, since, fetch_limit).await?;
    let errors = errors::list_since(pool, project.id, &session_id, since, fetch_limit).await?;

    let mut merged: Vec<TimelineEntry> = Vec::with_capacity(session_events.len() + network_events.len() + errors.len());
    merged.extend(session_events.into_iter().map(TimelineEntry::from));
    merged.extend(network_events.into_iter().map(TimelineEntry::from));
    merged.extend(errors.into_iter().map(|e| TimelineEntry::Error {
        id: e.id,
        message: e.message,
        error_group_id: e.error_group_id,
        timestamp: e.timestamp,
    }));
    merged.sort_by_key(|entry| entry.timestamp());

    let has_more = merged.len() > POLL_MAX_EVENTS;
    merged.truncate(POLL_MAX_EVENTS);

    Ok(Json(PollResponse { events: merged, has_more }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stream/session/{session_id}/events", get(stream_session_events))
        .route("/session/{session_id}/events/poll", get(poll_session_events))
}
