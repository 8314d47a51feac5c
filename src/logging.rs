use tracing_subscriber::{fmt, EnvFilter};

/// Env var switching log output to JSON lines.
pub const LOG_JSON_ENV: &str = "DAPP_CONNECTOR_LOG_JSON";

/// Filter used when `RUST_LOG` is unset. Per-request HTTP spans stay quiet.
pub const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `1` or `true` selects JSON; anything else, or unset, is text.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("1") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("true") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

fn filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the stderr subscriber. Stdout carries command output only.
pub fn init_logging() {
    let format = LogFormat::from_env_value(std::env::var(LOG_JSON_ENV).ok().as_deref());
    let env_filter = filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    let installed = match format {
        LogFormat::Json => fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Text => fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
