//! Room command handlers.

use actix_web::{HttpResponse, Responder, get, post, put, web};

use jukebox_types::{
    EnqueueRequest, EnqueueResponse, ErrorResponse, ListenersRequest, PlayResponse,
    SessionStatus, SkipResponse, StopResponse,
};

use crate::error::ResolveError;
use crate::state::AppState;

/// Map a resolution failure to an HTTP response.
fn resolve_error_response(err: ResolveError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        ResolveError::NotFound { .. } => HttpResponse::NotFound().json(body),
        ResolveError::Transport(_) => HttpResponse::BadGateway().json(body),
    }
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/queue",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Tracks added", body = EnqueueResponse),
        (status = 404, description = "Nothing matched the query", body = ErrorResponse),
        (status = 502, description = "Platform lookup failed", body = ErrorResponse)
    )
)]
#[post("/rooms/{room}/queue")]
/// Resolve a link or free text and append it to the room queue.
pub async fn queue_add(
    state: web::Data<AppState>,
    room: web::Path<String>,
    body: web::Json<EnqueueRequest>,
) -> impl Responder {
    let room_id = room.into_inner();
    let request = body.into_inner();
    let added = match state
        .jukebox
        .enqueue(&room_id, &request.user_id, &request.query)
        .await
    {
        Ok(added) => added,
        Err(err) => return resolve_error_response(err),
    };
    if request.autoplay.unwrap_or(true) {
        state.jukebox.play(&room_id);
    }
    HttpResponse::Ok().json(EnqueueResponse {
        added,
        status: state.jukebox.status(&room_id),
    })
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/play",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Play outcome", body = PlayResponse)
    )
)]
#[post("/rooms/{room}/play")]
/// Start playback; a running loop is left alone.
pub async fn play(state: web::Data<AppState>, room: web::Path<String>) -> impl Responder {
    let room_id = room.into_inner();
    let outcome = state.jukebox.play(&room_id);
    HttpResponse::Ok().json(PlayResponse {
        outcome,
        status: state.jukebox.status(&room_id),
    })
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/skip",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Skip outcome", body = SkipResponse)
    )
)]
#[post("/rooms/{room}/skip")]
/// Skip the current track.
pub async fn skip(state: web::Data<AppState>, room: web::Path<String>) -> impl Responder {
    let outcome = state.jukebox.skip(&room.into_inner());
    HttpResponse::Ok().json(SkipResponse { outcome })
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/stop",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Stop outcome", body = StopResponse)
    )
)]
#[post("/rooms/{room}/stop")]
/// Stop playback, clear the queue and drop the room's cache.
pub async fn stop(state: web::Data<AppState>, room: web::Path<String>) -> impl Responder {
    let outcome = state.jukebox.stop(&room.into_inner()).await;
    HttpResponse::Ok().json(StopResponse { outcome })
}

#[utoipa::path(
    get,
    path = "/rooms/{room}/status",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Room status", body = SessionStatus)
    )
)]
#[get("/rooms/{room}/status")]
pub async fn status(state: web::Data<AppState>, room: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(state.jukebox.status(&room.into_inner()))
}

#[utoipa::path(
    put,
    path = "/rooms/{room}/listeners",
    params(
        ("room" = String, Path, description = "Room id")
    ),
    request_body = ListenersRequest,
    responses(
        (status = 204, description = "Listener count recorded")
    )
)]
#[put("/rooms/{room}/listeners")]
/// Record how many people are listening in a room.
pub async fn listeners(
    state: web::Data<AppState>,
    room: web::Path<String>,
    body: web::Json<ListenersRequest>,
) -> impl Responder {
    state.presence.report(&room.into_inner(), body.count);
    HttpResponse::NoContent().finish()
}
