use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the stdout log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened. For log shipping.
    #[default]
    Json,
    /// Single-line human readable output. For local runs.
    Compact,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything but `compact` means JSON.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("compact") => Self::Compact,
            _ => Self::Json,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`) and the
/// format chosen by `LOG_FORMAT`. Later calls are ignored.
pub fn init_tracing() {
    init_tracing_with(LogFormat::from_env(), "info");
}

pub fn init_tracing_with(format: LogFormat, default_directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let (json, compact) = match format {
        LogFormat::Json => (Some(fmt::layer().json().flatten_event(true)), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact())),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(compact)
        .try_init();
}
