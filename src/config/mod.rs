//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::{
        export::{DEFAULT_HIGH_DENSITY, DEFAULT_REDUCED_DENSITY, ExportSettings},
        relay::DEFAULT_ALLOWED_HOSTS,
    },
    domain::color::Rgb,
};

pub use cli::{CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ritual-cards";
const ENV_PREFIX: &str = "RITUAL";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_PROFILE_API_BASE_URL: &str = "https://api.fxtwitter.com";
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("ritual-cards/", env!("CARGO_PKG_VERSION"));
const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_BACKGROUND: &str = "#0b0b12";
const DEFAULT_IDLE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const MAX_DENSITY: f32 = 8.0;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub profile: ProfileSettings,
    pub relay: RelaySettings,
    pub render: RenderSettings,
    pub sessions: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub api_base_url: Url,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub allowed_hosts: Vec<String>,
    pub user_agent: String,
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub high_density: f32,
    pub reduced_density: f32,
    pub background: Rgb,
    pub font_dirs: Vec<PathBuf>,
}

impl RenderSettings {
    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            high_density: self.high_density,
            reduced_density: self.reduced_density,
            background: self.background,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("relay.allowed_hosts")
            .with_list_parse_key("render.font_dirs")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    profile: RawProfileSettings,
    relay: RawRelaySettings,
    render: RawRenderSettings,
    sessions: RawSessionSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(agent) = overrides.relay_user_agent.as_ref() {
            self.relay.user_agent = Some(agent.clone());
        }
        if let Some(limit) = overrides.relay_max_image_bytes {
            self.relay.max_image_bytes = Some(limit);
        }
        if let Some(seconds) = overrides.sessions_idle_ttl_seconds {
            self.sessions.idle_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.sessions_sweep_interval_seconds {
            self.sessions.sweep_interval_seconds = Some(seconds);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(url) = overrides.profile_api_base_url.as_ref() {
            self.profile.api_base_url = Some(url.clone());
        }
        if let Some(density) = overrides.render_high_density {
            self.render.high_density = Some(density);
        }
        if let Some(density) = overrides.render_reduced_density {
            self.render.reduced_density = Some(density);
        }
        if let Some(background) = overrides.render_background.as_ref() {
            self.render.background = Some(background.clone());
        }
        if !overrides.render_font_dirs.is_empty() {
            self.render
                .font_dirs
                .get_or_insert_with(Vec::new)
                .extend(overrides.render_font_dirs.iter().cloned());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            profile,
            relay,
            render,
            sessions,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let profile = build_profile_settings(profile)?;
        let relay = build_relay_settings(relay)?;
        let render = build_render_settings(render)?;
        let sessions = build_session_settings(sessions)?;

        Ok(Self {
            server,
            logging,
            profile,
            relay,
            render,
            sessions,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_profile_settings(profile: RawProfileSettings) -> Result<ProfileSettings, LoadError> {
    let raw = profile
        .api_base_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE_API_BASE_URL.to_string());

    let api_base_url = Url::parse(&raw)
        .map_err(|err| LoadError::invalid("profile.api_base_url", format!("`{raw}`: {err}")))?;
    if !matches!(api_base_url.scheme(), "http" | "https") || api_base_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "profile.api_base_url",
            "must be an absolute http(s) URL",
        ));
    }

    Ok(ProfileSettings { api_base_url })
}

fn build_relay_settings(relay: RawRelaySettings) -> Result<RelaySettings, LoadError> {
    let allowed_hosts: Vec<String> = match relay.allowed_hosts {
        Some(hosts) => hosts
            .into_iter()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect(),
        None => DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
    };
    if allowed_hosts.is_empty() {
        return Err(LoadError::invalid(
            "relay.allowed_hosts",
            "at least one host is required",
        ));
    }

    let user_agent = relay
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let max_image_bytes = relay.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES);
    if max_image_bytes == 0 {
        return Err(LoadError::invalid(
            "relay.max_image_bytes",
            "must be greater than zero",
        ));
    }
    let max_image_bytes = usize::try_from(max_image_bytes).map_err(|_| {
        LoadError::invalid(
            "relay.max_image_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(RelaySettings {
        allowed_hosts,
        user_agent,
        max_image_bytes,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let high_density = density(
        render.high_density.unwrap_or(DEFAULT_HIGH_DENSITY),
        "render.high_density",
    )?;
    let reduced_density = density(
        render.reduced_density.unwrap_or(DEFAULT_REDUCED_DENSITY),
        "render.reduced_density",
    )?;
    if reduced_density > high_density {
        return Err(LoadError::invalid(
            "render.reduced_density",
            "must not exceed render.high_density",
        ));
    }

    let background = render
        .background
        .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string());
    let background = Rgb::from_str(&background)
        .map_err(|err| LoadError::invalid("render.background", err.to_string()))?;

    Ok(RenderSettings {
        high_density,
        reduced_density,
        background,
        font_dirs: render.font_dirs.unwrap_or_default(),
    })
}

fn build_session_settings(sessions: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let idle_ttl = non_zero_secs(
        sessions.idle_ttl_seconds.unwrap_or(DEFAULT_IDLE_TTL_SECS),
        "sessions.idle_ttl_seconds",
    )?;
    let sweep_interval = non_zero_secs(
        sessions
            .sweep_interval_seconds
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        "sessions.sweep_interval_seconds",
    )?;

    Ok(SessionSettings {
        idle_ttl,
        sweep_interval,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProfileSettings {
    api_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRelaySettings {
    allowed_hosts: Option<Vec<String>>,
    user_agent: Option<String>,
    max_image_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    high_density: Option<f32>,
    reduced_density: Option<f32>,
    background: Option<String>,
    font_dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    idle_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn density(value: f32, key: &'static str) -> Result<f32, LoadError> {
    if !value.is_finite() || value <= 0.0 || value > MAX_DENSITY {
        return Err(LoadError::invalid(
            key,
            format!("must be within (0, {MAX_DENSITY}]"),
        ));
    }
    Ok(value)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
