//! Server-sent event stream of playback notifications.

use std::collections::VecDeque;
use std::time::Instant;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::{Stream, stream::unfold};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use utoipa::IntoParams;

use jukebox_types::PlaybackEvent;

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Only forward events of this room.
    pub room: Option<String>,
}

struct EventsStreamState {
    receiver: broadcast::Receiver<PlaybackEvent>,
    room: Option<String>,
    interval: Interval,
    pending: VecDeque<Bytes>,
    last_ping: Instant,
}

fn sse_event(event: &str, data: &str) -> Bytes {
    let mut payload = String::new();
    payload.push_str("event: ");
    payload.push_str(event);
    payload.push('\n');
    for line in data.lines() {
        payload.push_str("data: ");
        payload.push_str(line);
        payload.push('\n');
    }
    payload.push('\n');
    Bytes::from(payload)
}

fn push_ping_if_needed(pending: &mut VecDeque<Bytes>, last_ping: &mut Instant) {
    if pending.is_empty() && last_ping.elapsed() >= PING_INTERVAL {
        *last_ping = Instant::now();
        pending.push_back(Bytes::from(": ping\n\n"));
    }
}

fn event_name(event: &PlaybackEvent) -> &'static str {
    match event {
        PlaybackEvent::Enqueued { .. } => "enqueued",
        PlaybackEvent::NowPlaying { .. } => "now_playing",
        PlaybackEvent::QueueEmpty { .. } => "queue_empty",
        PlaybackEvent::ResolutionFailed { .. } => "resolution_failed",
        PlaybackEvent::AcquisitionFailed { .. } => "acquisition_failed",
        PlaybackEvent::TransportFailed { .. } => "transport_failed",
        PlaybackEvent::Stopped { .. } => "stopped",
    }
}

fn sse_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, Error>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

#[utoipa::path(
    get,
    path = "/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Playback event stream")
    )
)]
#[get("/events")]
/// Stream playback events via server-sent events.
pub async fn events_stream(
    state: web::Data<AppState>,
    query: web::Query<EventsQuery>,
) -> impl Responder {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctx = EventsStreamState {
        receiver: state.jukebox.events().subscribe(),
        room: query.into_inner().room,
        interval,
        pending: VecDeque::new(),
        last_ping: Instant::now(),
    };

    let stream = unfold(ctx, |mut ctx| async move {
        loop {
            if let Some(bytes) = ctx.pending.pop_front() {
                return Some((Ok::<Bytes, Error>(bytes), ctx));
            }
            tokio::select! {
                _ = ctx.interval.tick() => {}
                result = ctx.receiver.recv() => match result {
                    Ok(event) => {
                        let wanted = ctx
                            .room
                            .as_deref()
                            .is_none_or(|room| room == event.room_id());
                        if wanted {
                            let json = serde_json::to_string(&event)
                                .unwrap_or_else(|_| "null".to_string());
                            ctx.pending.push_back(sse_event(event_name(&event), &json));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event stream lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
            push_ping_if_needed(&mut ctx.pending, &mut ctx.last_ping);
        }
    });

    sse_response(stream)
}
