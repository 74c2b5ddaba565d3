//! `POST /stream`: chat request in, Server-Sent Events out.
//!
//! Wire format, one event per line group:
//!
//! ```text
//! data: <fragment>                 (zero or more)
//!
//! event: error                     (at most one)
//! data: Sorry, an error occurred while processing your request.
//!
//! event: done                      (exactly one, last)
//! data: [DONE]
//! ```

use std::borrow::Cow;
use std::convert::Infallible;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use medchat_pipeline::{RequestError, StreamEvent, StreamRequest};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info_span, warn};
use uuid::Uuid;

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(err: RequestError) -> Response {
    warn!(reason = %err, "Rejected stream request");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Convert a pipeline event into its SSE frame.
///
/// Line breaks in the payload become `\n` so each line maps to exactly one
/// `data:` field; a bare `\r` would otherwise end the field early.
pub fn to_sse_event(event: &StreamEvent) -> SseEvent {
    let frame = match event.event_type() {
        Some(name) => SseEvent::default().event(name),
        None => SseEvent::default(),
    };
    frame.data(normalize_line_breaks(event.payload()))
}

fn normalize_line_breaks(payload: &str) -> Cow<'_, str> {
    if payload.contains('\r') {
        Cow::Owned(payload.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(payload)
    }
}

pub async fn stream_handler(
    State(state): State<SharedState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return bad_request(RequestError::NotJson);
    };

    let request = match StreamRequest::from_json(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };

    let span = info_span!("stream", request_id = %Uuid::new_v4());
    let rx = span.in_scope(|| state.controller.run(request));

    let events = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    (
        [
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}
