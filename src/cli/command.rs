use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::classify::ClassifyArgs;
use crate::cli::modules::ModulesArgs;
use crate::cli::scan::ScanArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeRadioConfig, ScanFixture, ServiceAvailability, ServiceFixture};
use crate::module_names::ModuleNameTable;
use crate::permission::{Capability, CapabilityProbe, CapabilityProfile, CapabilitySet, StaticProbe};
use crate::session::SessionConfig;

/// Command-line options for the saber module browser.
#[derive(Debug, Parser)]
#[command(
    name = "saber-builder",
    about = "Discover sabers over BLE and list the modules they expose."
)]
pub struct Args {
    /// Overrides `RUST_LOG` for this run.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Wall-clock bound on a discovery scan (e.g. `90s`, `2m`).
    #[arg(long, global = true, value_parser = parse_duration)]
    scan_period: Option<Duration>,
    /// Wait between service-table polls after connecting.
    #[arg(long, global = true, value_parser = parse_duration)]
    poll_interval: Option<Duration>,
    /// Number of service-table polls before giving up.
    #[arg(long, global = true)]
    poll_attempts: Option<u32>,
    /// Platform API level used to select required capabilities.
    #[arg(long, global = true)]
    api_level: Option<u32>,
    /// Tab-separated `uuid<TAB>name` file extending the module-name table.
    #[arg(long, global = true)]
    module_names: Option<PathBuf>,
    /// Uses the fake BLE radio with fixture-driven discovery and services.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `address|name[|flag];...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake service table in the form `uuid[@instance];...`.
    #[arg(long, global = true, requires = "fake")]
    fake_services: Option<ServiceFixture>,
    /// When fake services appear: `immediate`, `never`, or a poll count.
    #[arg(long, global = true, requires = "fake")]
    fake_service_availability: Option<ServiceAvailability>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    /// Makes every fake connect attempt fail with this reason.
    #[arg(long, global = true, requires = "fake")]
    fake_connect_failure: Option<String>,
    /// Makes the fake host report no usable scanner.
    #[arg(long, global = true, requires = "fake")]
    fake_unsupported: bool,
    /// Capabilities the fake host denies (comma-separated).
    #[arg(long, global = true, requires = "fake", value_delimiter = ',')]
    fake_deny: Vec<Capability>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use saber_builder::{Args, Command};
    ///
    /// let permissions = Args::new(Command::Permissions);
    /// let _ = permissions;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            scan_period: None,
            poll_interval: None,
            poll_attempts: None,
            api_level: None,
            module_names: None,
            fake: false,
            fake_scan: None,
            fake_services: None,
            fake_service_availability: None,
            fake_discovery_delay: None,
            fake_connect_failure: None,
            fake_unsupported: false,
            fake_deny: Vec::new(),
            command,
        }
    }

    /// Enables fake radio mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            services,
            service_availability,
            discovery_delay,
            connect_failure,
            unsupported,
            denied,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_services = services;
        self.fake_service_availability = service_availability;
        self.fake_discovery_delay = Some(discovery_delay);
        self.fake_connect_failure = connect_failure;
        self.fake_unsupported = unsupported;
        self.fake_deny = denied.iter().collect();
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Builds session settings from the timing, capability, and naming flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the module-name overrides file cannot be loaded.
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let module_names = ModuleNameTable::load(self.module_names.as_deref())?;
        let capabilities = self
            .api_level
            .map(CapabilityProfile::for_api_level)
            .unwrap_or_default();

        Ok(SessionConfig::builder()
            .maybe_scan_period(self.scan_period)
            .maybe_poll_interval(self.poll_interval)
            .maybe_poll_attempts(self.poll_attempts)
            .capabilities(capabilities)
            .module_names(module_names)
            .build())
    }

    /// Splits parsed CLI arguments into command and optional fake-radio settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_services,
            fake_service_availability,
            fake_discovery_delay,
            fake_connect_failure,
            fake_unsupported,
            fake_deny,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                services: fake_services,
                service_availability: fake_service_availability,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                connect_failure: fake_connect_failure,
                unsupported: fake_unsupported,
                denied: fake_deny.into_iter().collect(),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake radio arguments for programmatic runs.
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    services: Option<ServiceFixture>,
    service_availability: Option<ServiceAvailability>,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(into)]
    connect_failure: Option<String>,
    #[builder(default)]
    unsupported: bool,
    #[builder(default)]
    denied: CapabilitySet,
}

impl FakeArgs {
    /// Builds the fake radio configuration.
    #[must_use]
    pub fn radio_config(&self) -> FakeRadioConfig {
        FakeRadioConfig::builder()
            .scan_fixture(self.scan_fixture.clone())
            .maybe_services(self.services.clone())
            .maybe_service_availability(self.service_availability)
            .discovery_delay(self.discovery_delay)
            .supported(!self.unsupported)
            .maybe_connect_failure(self.connect_failure.clone())
            .build()
    }

    /// Builds the capability probe for the fake host.
    #[must_use]
    pub fn probe(&self) -> Arc<dyn CapabilityProbe> {
        Arc::new(StaticProbe::denying(self.denied.clone()))
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for nearby sabers and print the de-duplicated device list.
    Scan(ScanArgs),
    /// Scan until a device appears, connect to it, and list its modules.
    Modules(ModulesArgs),
    /// Classify service UUIDs against the module namespace without a radio.
    Classify(ClassifyArgs),
    /// Show the capabilities scanning and connecting require, and which are missing.
    Permissions,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for people.
    Pretty,
    /// Pretty-printed JSON for scripts.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["saber-builder", "--fake", "permissions"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_scan_requires_fake_mode() {
        let result =
            Args::try_parse_from(["saber-builder", "--fake-scan", "AA:01|Saber", "permissions"]);

        let error = result.expect_err("--fake-scan should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "saber-builder",
            "--fake",
            "--fake-scan",
            "AA:01|Saber",
            "--fake-deny",
            "scan,connect",
            "permissions",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake_args) = cli
            .into_command_and_fake_args()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Permissions);
        let fake_args = fake_args.expect("fake settings should be present");
        assert!(!fake_args.probe().is_granted(Capability::Scan));
        assert!(fake_args.probe().is_granted(Capability::Bluetooth));
    }

    #[test]
    fn timing_flags_flow_into_session_config() {
        let cli = Args::try_parse_from([
            "saber-builder",
            "--scan-period",
            "5s",
            "--poll-interval",
            "250ms",
            "--poll-attempts",
            "4",
            "--api-level",
            "30",
            "--module-names",
            "/nonexistent/saber-builder/module-names.tsv",
            "permissions",
        ])
        .expect("timing flags should parse");

        let config = cli.session_config().expect("config should build");

        assert_eq!(Duration::from_secs(5), config.scan_period());
        assert_eq!(Duration::from_millis(250), config.poll_interval());
        assert_eq!(4, config.poll_attempts());
        assert_eq!(30, config.capabilities().api_level());
    }

    #[test]
    fn invalid_fake_service_fixture_is_rejected() {
        let result = Args::try_parse_from([
            "saber-builder",
            "--fake",
            "--fake-scan",
            "AA:01|Saber",
            "--fake-services",
            "not-a-uuid",
            "permissions",
        ]);

        let error = result.expect_err("invalid service fixture should fail");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }
}
