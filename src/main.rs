use std::{
    io::Write,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use ritual_cards::{
    application::{
        cards::{CardError, CardService},
        error::AppError,
        export::{GeneratedImage, ImageExporter},
        profile::ProfileResolver,
        relay::{AllowList, AvatarRelay},
        render::{CardRenderer, RelayImageLoader},
    },
    config,
    domain::role::RoleTier,
    infra::{
        error::InfraError,
        http::{self, ApiState, HttpState, RouterState},
        raster::ResvgRasterizer,
        telemetry,
        upstream::{self, HttpImageFetcher, HttpProfileSource},
    },
};
use tempfile::NamedTempFile;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

struct Services {
    cards: Arc<CardService>,
    relay: Arc<AvatarRelay>,
    resolver: Arc<ProfileResolver>,
}

fn build_services(settings: &config::Settings) -> Result<Services, AppError> {
    let allow_list = AllowList::new(&settings.relay.allowed_hosts);

    let source = Arc::new(HttpProfileSource::new(
        upstream::build_client(&settings.relay.user_agent)?,
        settings.profile.api_base_url.clone(),
    ));
    let fetcher = Arc::new(HttpImageFetcher::new(
        upstream::build_image_client(&settings.relay.user_agent, allow_list.clone())?,
        settings.relay.user_agent.clone(),
    ));

    let relay = Arc::new(AvatarRelay::new(allow_list, fetcher));
    let resolver = Arc::new(ProfileResolver::new(source));

    let loader = Arc::new(RelayImageLoader::new(
        Arc::clone(&relay),
        settings.relay.max_image_bytes,
    ));
    let renderer = Arc::new(CardRenderer::new(loader));

    let rasterizer = Arc::new(ResvgRasterizer::new(&settings.render.font_dirs));
    let exporter = Arc::new(ImageExporter::new(
        rasterizer,
        settings.render.export_settings(),
    ));

    let cards = Arc::new(CardService::new(
        Arc::clone(&resolver),
        renderer,
        exporter,
        settings.sessions.idle_ttl,
    ));

    Ok(Services {
        cards,
        relay,
        resolver,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let services = build_services(&settings)?;
    let sweeper = spawn_session_sweeper(Arc::clone(&services.cards), &settings.sessions);

    let router_state = RouterState {
        http: HttpState {
            cards: services.cards,
        },
        api: ApiState {
            relay: services.relay,
            resolver: services.resolver,
        },
    };

    let result = serve_http(&settings.server, router_state).await;

    sweeper.abort();
    let _ = sweeper.await;

    result
}

fn spawn_session_sweeper(
    cards: Arc<CardService>,
    sessions: &config::SessionSettings,
) -> JoinHandle<()> {
    let period = sessions.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            cards.sweep_idle();
        }
    })
}

async fn serve_http(
    server: &config::ServerSettings,
    router_state: RouterState,
) -> Result<(), AppError> {
    let app = http::build_app(router_state);

    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %server.addr, "listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut serving = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::select! {
        joined = &mut serving => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(
        grace_secs = server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = stop_tx.send(true);

    match tokio::time::timeout(server.graceful_shutdown, &mut serving).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!("graceful shutdown timed out; aborting open connections");
            serving.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let role = RoleTier::from_selection(Some(args.role.as_str()))?;
    let services = build_services(&settings)?;

    let image = services
        .cards
        .render_artifact(&args.handle, role)
        .await
        .map_err(|err| match err {
            CardError::Invalid(err) => AppError::from(err),
            other => AppError::unexpected(other.to_string()),
        })?;

    tokio::fs::create_dir_all(&args.output)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let output = args.output.clone();
    let path = tokio::task::spawn_blocking(move || write_artifact(&output, image))
        .await
        .map_err(|err| AppError::unexpected(format!("artifact writer panicked: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(path = %path.display(), role = role.slug(), "card written");
    Ok(())
}

/// Write through a temporary file in the target directory so a partial PNG is never observed.
fn write_artifact(dir: &Path, image: GeneratedImage) -> std::io::Result<PathBuf> {
    let (name, bytes) = image.into_parts();
    let path = dir.join(name.as_str());

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(&path).map_err(|err| err.error)?;

    Ok(path)
}
