//! HTTP API handlers.
//!
//! Command surface standing in for the chat gateway: room queue control,
//! presence reports and a playback event stream.

pub mod health;
pub mod rooms;
pub mod streams;

pub use health::HealthResponse;
pub use rooms::{listeners, play, queue_add, skip, status, stop};
pub use streams::events_stream;

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{App, test, web};
    use serde_json::json;

    use jukebox_types::{
        EnqueueResponse, ErrorResponse, PlayOutcome, PlayResponse, PlaybackEvent, SessionStatus,
        SkipOutcome, SkipResponse, StopOutcome, StopResponse,
    };

    use crate::api;
    use crate::presence::RoomPresence;
    use crate::state::AppState;
    use crate::testing::{FakeVideos, Harness, video};

    fn harness(videos: impl FnOnce(FakeVideos) -> FakeVideos) -> Harness {
        Harness::builder().videos(videos).build()
    }

    fn known() -> impl FnOnce(FakeVideos) -> FakeVideos {
        |v| {
            v.with_search("abc123", video("abc123", "Song", 1))
                .with_video(video("abc123", "Song", 1))
        }
    }

    fn state(h: &Harness) -> web::Data<AppState> {
        web::Data::new(AppState::new(h.jukebox.clone(), h.presence.clone()))
    }

    #[actix_web::test]
    async fn queue_add_without_autoplay_only_enqueues() {
        let h = harness(known());
        let app = test::init_service(App::new().app_data(state(&h)).service(api::queue_add)).await;

        let req = test::TestRequest::post()
            .uri("/rooms/1/queue")
            .set_json(json!({ "user_id": "u", "query": "abc123", "autoplay": false }))
            .to_request();
        let resp: EnqueueResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.added.len(), 1);
        assert_eq!(resp.added[0].source_id, "abc123");
        assert_eq!(resp.status.queue_depth, 1);
        assert!(!resp.status.is_playing);
        assert_eq!(h.transport.connects(), 0);
    }

    #[actix_web::test]
    async fn queue_add_autoplays_by_default() {
        let mut h = harness(known());
        let app = test::init_service(App::new().app_data(state(&h)).service(api::queue_add)).await;

        let req = test::TestRequest::post()
            .uri("/rooms/1/queue")
            .set_json(json!({ "user_id": "u", "query": "abc123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        h.wait_for(|e| matches!(e, PlaybackEvent::NowPlaying { .. })).await;
    }

    #[actix_web::test]
    async fn unknown_query_is_404() {
        let h = harness(known());
        let app = test::init_service(App::new().app_data(state(&h)).service(api::queue_add)).await;

        let req = test::TestRequest::post()
            .uri("/rooms/1/queue")
            .set_json(json!({ "user_id": "u", "query": "no such song" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("no such song"));
    }

    #[actix_web::test]
    async fn platform_failure_is_502() {
        let h = harness(|v| v.failing());
        let app = test::init_service(App::new().app_data(state(&h)).service(api::queue_add)).await;

        let req = test::TestRequest::post()
            .uri("/rooms/1/queue")
            .set_json(json!({ "user_id": "u", "query": "anything" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn commands_on_an_empty_room_are_harmless() {
        let h = harness(known());
        let app = test::init_service(
            App::new()
                .app_data(state(&h))
                .service(api::play)
                .service(api::skip)
                .service(api::stop)
                .service(api::status),
        )
        .await;

        let req = test::TestRequest::post().uri("/rooms/9/play").to_request();
        let resp: PlayResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.outcome, PlayOutcome::NothingQueued);

        let req = test::TestRequest::post().uri("/rooms/9/skip").to_request();
        let resp: SkipResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.outcome, SkipOutcome::NothingPlaying);

        let req = test::TestRequest::post().uri("/rooms/9/stop").to_request();
        let resp: StopResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.outcome, StopOutcome::NotActive);

        let req = test::TestRequest::get().uri("/rooms/9/status").to_request();
        let resp: SessionStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.room_id, "9");
        assert_eq!(resp.queue_depth, 0);
    }

    #[actix_web::test]
    async fn listeners_report_reaches_presence() {
        let h = harness(known());
        let app = test::init_service(App::new().app_data(state(&h)).service(api::listeners)).await;

        let req = test::TestRequest::put()
            .uri("/rooms/1/listeners")
            .set_json(json!({ "count": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.presence.listeners("1"), Some(2));
    }

    #[actix_web::test]
    async fn health_and_event_stream_respond() {
        let h = harness(known());
        let app = test::init_service(
            App::new()
                .app_data(state(&h))
                .service(api::health::health)
                .service(api::events_stream),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/events?room=1").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get(actix_web::http::header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
