use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::Stream;
use rosterhub_core::events::{
    ChannelTransport, ConnectionHandle, EventFrame, EventKind, PublishReport,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, RequestContext, StreamingRoute},
    main_lib::AppState,
};

/// Frames buffered between a connection's delivery task and its response body.
const STREAM_BUFFER: usize = 16;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub kind: EventKind,
    pub target: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub broadcast: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub report: PublishReport,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub target: Option<String>,
}

/// Publish an event on behalf of a collaborator that changed shared state.
async fn publish_event(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> ApiResult<Json<NotifyResponse>> {
    let req = ctx.json(body)?;
    if req.target.trim().is_empty() && !req.broadcast {
        return Err(ctx.fail(ApiError::bad_request(
            "'target' is required unless broadcast is set",
        )));
    }
    let (id, report) = state.event_bus.notify(
        req.kind,
        req.target,
        req.user_id,
        req.payload,
        req.message,
        req.broadcast,
    );
    tracing::debug!("Published {} event {}: {:?}", req.kind, id, report);
    Ok(Json(NotifyResponse { id, report }))
}

/// Response body of one push connection. Dropping it (client went away)
/// closes the connection.
struct ConnectionStream {
    frames: ReceiverStream<EventFrame>,
    handle: ConnectionHandle,
}

impl Stream for ConnectionStream {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx).map(|frame| {
            frame.map(|frame| {
                Ok(SseEvent::default()
                    .id(frame.id)
                    .event(frame.event)
                    .data(frame.data))
            })
        })
    }
}

impl Drop for ConnectionStream {
    fn drop(&mut self) {
        tracing::debug!("Event stream for connection {} dropped", self.handle.id());
        self.handle.close();
    }
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let Query(query) =
        query.map_err(|rejection| ctx.fail(ApiError::bad_request(rejection.body_text())))?;
    let target = query.target.filter(|t| !t.trim().is_empty());

    let (transport, frames) = ChannelTransport::new(STREAM_BUFFER);
    let handle = state.dispatcher.accept(transport, target);
    tracing::info!(
        "Event stream opened for connection {} ({} open)",
        handle.id(),
        state.dispatcher.connection_count()
    );

    let stream = ConnectionStream {
        frames: ReceiverStream::new(frames),
        handle,
    };
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(publish_event)).route(
        "/events/stream",
        get(stream_events).layer(Extension(StreamingRoute)),
    )
}
