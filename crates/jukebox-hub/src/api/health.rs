use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Rooms with a live session.
    pub active_rooms: usize,
}

/// Basic liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Hub is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        active_rooms: state.jukebox.active_rooms().len(),
    })
}
