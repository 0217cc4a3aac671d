use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::rooms::queue_add,
        api::rooms::play,
        api::rooms::skip,
        api::rooms::stop,
        api::rooms::status,
        api::rooms::listeners,
        api::streams::events_stream,
        api::health::health,
    ),
    components(
        schemas(
            jukebox_types::Platform,
            jukebox_types::TrackSummary,
            jukebox_types::StopReason,
            jukebox_types::PlaybackEvent,
            jukebox_types::SessionStatus,
            jukebox_types::EnqueueRequest,
            jukebox_types::EnqueueResponse,
            jukebox_types::PlayOutcome,
            jukebox_types::PlayResponse,
            jukebox_types::SkipOutcome,
            jukebox_types::SkipResponse,
            jukebox_types::StopOutcome,
            jukebox_types::StopResponse,
            jukebox_types::ListenersRequest,
            jukebox_types::ErrorResponse,
            api::HealthResponse,
        )
    ),
    tags(
        (name = "jukebox-hub", description = "Multi-room playlist and playback control API")
    )
)]
pub struct ApiDoc;
