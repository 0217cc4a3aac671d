//! Actix server startup + engine wiring.
//!
//! Builds the engine from config, starts background tasks and serves the
//! command API until the server exits.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::acquisition::Acquirer;
use crate::api;
use crate::config::{self, HubConfig};
use crate::downloader::YtDlpDownloader;
use crate::events::EventBus;
use crate::housekeeping;
use crate::jukebox::{Jukebox, JukeboxParts};
use crate::openapi;
use crate::presence::ReportedPresence;
use crate::resolver::spotify::{SpotifyClient, TrackCatalogue};
use crate::resolver::youtube::{VideoPlatform, YoutubeClient};
use crate::resolver::{DescriptorCache, Resolver};
use crate::state::AppState;
use crate::transcode::FfmpegTranscoder;
use crate::transport::transport_from_settings;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Build the engine and run the HTTP server until it stops.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let bind = resolve_bind(args.bind, &cfg)?;
    let cache_root = args
        .cache_dir
        .unwrap_or_else(|| config::cache_dir_from_config(&cfg));
    let acquisition = config::acquisition_settings(&cfg)?;
    let playback = config::playback_settings(&cfg)?;
    let transport_settings = config::transport_settings(&cfg)?;
    tracing::info!(
        bind = %bind,
        cache_root = %cache_root.display(),
        max_concurrent = acquisition.max_concurrent,
        timeout_secs = acquisition.timeout.as_secs(),
        transport = ?transport_settings,
        "starting jukebox-hub"
    );

    std::fs::create_dir_all(&cache_root)
        .with_context(|| format!("create cache dir {:?}", cache_root))?;
    // Nothing is live yet, so whatever is left belongs to a previous run.
    let leftovers = housekeeping::sweep(&cache_root, &HashSet::new()).await;
    if leftovers.removed_dirs + leftovers.removed_files > 0 {
        tracing::info!(
            removed_dirs = leftovers.removed_dirs,
            removed_files = leftovers.removed_files,
            "cleared leftover cache"
        );
    }

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("jukebox-hub/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let videos: Arc<dyn VideoPlatform> = Arc::new(YoutubeClient::new(
        http.clone(),
        cfg.youtube.as_ref().and_then(|yt| yt.base_url.clone()),
        config::youtube_api_key_from_config(&cfg)?,
    ));
    let catalogue = config::spotify_settings(&cfg).map(|spotify| {
        Arc::new(SpotifyClient::new(
            http.clone(),
            spotify.client_id,
            spotify.client_secret,
            spotify.api_base_url,
            spotify.token_url,
        )) as Arc<dyn TrackCatalogue>
    });
    if catalogue.is_none() {
        tracing::info!("spotify credentials missing; catalogue links disabled");
    }

    let resolver = Arc::new(Resolver::new(
        videos.clone(),
        catalogue,
        Arc::new(DescriptorCache::default()),
        acquisition.max_concurrent,
    ));
    let downloader = Arc::new(YtDlpDownloader::new(
        acquisition.tool.clone(),
        acquisition.audio_format.clone(),
    ));
    let acquirer = Arc::new(Acquirer::new(
        cache_root.clone(),
        acquisition,
        videos,
        resolver.clone(),
        downloader,
    ));
    let presence = Arc::new(ReportedPresence::default());
    let shutdown = CancellationToken::new();
    let jukebox = Jukebox::new(
        JukeboxParts {
            resolver,
            acquirer,
            transcoder: Arc::new(FfmpegTranscoder::new(playback.clone())),
            transport: transport_from_settings(&transport_settings, &playback),
            presence: presence.clone(),
            events: EventBus::new(),
            chunk_bytes: playback.chunk_bytes,
            watchdog_interval: config::watchdog_interval(&cfg),
            runtime: tokio::runtime::Handle::current(),
        },
        shutdown.clone(),
    );

    let sweeper = config::housekeeping_interval(&cfg).map(|period| {
        housekeeping::spawn(jukebox.clone(), cache_root.clone(), period, shutdown.clone())
    });

    let state = web::Data::new(AppState::new(jukebox.clone(), presence));
    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::queue_add)
            .service(api::play)
            .service(api::skip)
            .service(api::stop)
            .service(api::status)
            .service(api::listeners)
            .service(api::events_stream)
            .service(api::health::health)
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await;

    tracing::info!("http server stopped; shutting down sessions");
    jukebox.shutdown().await;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    served.context("http server")?;
    Ok(())
}

/// Load the config from `--config`, or `config.toml` next to the executable.
fn load_config(path: Option<&PathBuf>) -> Result<HubConfig> {
    match path {
        Some(path) => HubConfig::load(path),
        None => {
            let auto_path = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
            match auto_path {
                Some(path) if path.exists() => HubConfig::load(&path),
                _ => Err(anyhow::anyhow!("config file is required; use --config")),
            }
        }
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(bind: Option<SocketAddr>, cfg: &HubConfig) -> Result<SocketAddr> {
    match bind {
        Some(addr) => Ok(addr),
        None => config::bind_from_config(cfg),
    }
}
