use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the ritual-cards binary.
#[derive(Debug, Parser)]
#[command(name = "ritual-cards", version, about = "Ritual card generator")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RITUAL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the card generator HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a single card to a PNG file and exit.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Handle to look up, with or without a leading `@`.
    #[arg(long, value_name = "HANDLE")]
    pub handle: String,

    /// Role tier slug, e.g. `mage` or `radiant-ritualist`.
    #[arg(long, value_name = "ROLE")]
    pub role: String,

    /// Directory the artifact is written into.
    #[arg(long, default_value = ".", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the profile lookup API base URL.
    #[arg(long = "profile-api-base-url", value_name = "URL")]
    pub profile_api_base_url: Option<String>,

    /// Override the density of the first rasterization attempt.
    #[arg(long = "render-high-density", value_name = "SCALE")]
    pub render_high_density: Option<f32>,

    /// Override the density of the retry attempt.
    #[arg(long = "render-reduced-density", value_name = "SCALE")]
    pub render_reduced_density: Option<f32>,

    /// Override the card background colour (`#rrggbb`).
    #[arg(long = "render-background", value_name = "COLOR")]
    pub render_background: Option<String>,

    /// Extra font directory; may be repeated.
    #[arg(long = "render-font-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub render_font_dirs: Vec<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the relay user agent.
    #[arg(long = "relay-user-agent", value_name = "AGENT")]
    pub relay_user_agent: Option<String>,

    /// Override the largest avatar, in bytes, the renderer will inline.
    #[arg(long = "relay-max-image-bytes", value_name = "BYTES")]
    pub relay_max_image_bytes: Option<u64>,

    /// Override how long an untouched card session is kept.
    #[arg(long = "sessions-idle-ttl-seconds", value_name = "SECONDS")]
    pub sessions_idle_ttl_seconds: Option<u64>,

    /// Override how often idle sessions are swept.
    #[arg(long = "sessions-sweep-interval-seconds", value_name = "SECONDS")]
    pub sessions_sweep_interval_seconds: Option<u64>,
}
