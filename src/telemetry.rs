use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::{Level, Metadata};
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::{self, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::TelemetryError;

static TRACING: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

const FALLBACK_DIRECTIVE: &str = "warn";
/// Only command spans get a spinner; session spans stay in the log.
const PROGRESS_TARGET_PREFIX: &str = "saber_builder::cli::";
const SPINNER_TICK: Duration = Duration::from_millis(90);

/// Installs the global subscriber once per process.
///
/// Logs always go to stderr so stdout stays reserved for command output. On an
/// interactive terminal they are pretty-printed under a progress spinner,
/// otherwise they are emitted as JSON lines. An explicit `log_level` wins over
/// `RUST_LOG`. Later calls return the first call's result.
pub(crate) fn initialise_tracing(
    service_name: &str,
    interactive_terminal: bool,
    log_level: Option<LevelFilter>,
) -> Result<(), &'static TelemetryError> {
    TRACING
        .get_or_init(|| install(service_name, interactive_terminal, log_level))
        .as_ref()
        .copied()
}

fn install(
    service_name: &str,
    interactive_terminal: bool,
    log_level: Option<LevelFilter>,
) -> Result<(), TelemetryError> {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer(service_name.to_owned());
    global::set_tracer_provider(provider);

    if interactive_terminal && io::stderr().is_terminal() {
        let progress = IndicatifLayer::new()
            .with_progress_style(spinner_style())
            .with_tick_settings(TickSettings {
                default_tick_interval: Some(SPINNER_TICK),
                ..TickSettings::default()
            });
        let logs = fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(progress.get_stderr_writer())
            .with_filter(log_filter(log_level));

        tracing_subscriber::registry()
            .with(logs)
            .with(progress.with_filter(filter::filter_fn(is_command_span)))
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    } else {
        let logs = fmt::layer()
            .json()
            .with_target(false)
            .with_writer(io::stderr)
            .with_filter(log_filter(log_level));

        tracing_subscriber::registry()
            .with(logs)
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    }

    Ok(())
}

fn log_filter(log_level: Option<LevelFilter>) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE)),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

fn is_command_span(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with(PROGRESS_TARGET_PREFIX)
        && *metadata.level() <= Level::INFO
}
