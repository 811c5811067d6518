//! SSE event streaming handler.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};

use fingraph_models::Event;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Interval of the comment pings that keep proxies from timing out.
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Stream events for a job via SSE.
///
/// The first event is a synthetic `connected` handshake; everything after
/// comes from the bus subscription (history replay, then live), and the
/// stream closes when the subscription ends on a terminal event.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    if state.jobs.get(&job_id).await?.is_none() {
        return Err(ApiError::not_found("Job not found"));
    }

    let subscription = state.bus.subscribe(&job_id).await?;
    metrics::record_sse_stream();

    let stream = async_stream::stream! {
        let connected = Event::connected(job_id.clone());
        let data = serde_json::to_string(&connected).unwrap_or_else(|_| "{}".to_string());
        yield Ok(SseEvent::default().event("connected").data(data));

        let mut subscription = subscription;
        while let Some(event) = subscription.next().await {
            let name = event.event_type().to_string();
            let Ok(data) = serde_json::to_string(&event) else {
                continue;
            };
            yield Ok(SseEvent::default().event(name).data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(PING_INTERVAL).text("ping")))
}
