use thiserror::Error;

use crate::permission::CapabilitySet;

/// Errors returned by scan, enumeration, and coordinator operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("required platform capabilities are not granted: {missing}")]
    PermissionDenied { missing: CapabilitySet },
    #[error("device `{address}` has no connectable peripheral handle")]
    NotConnectable { address: String },
    #[error("module enumeration for `{address}` is still in progress")]
    Busy { address: String },
    #[error("device `{address}` has not been discovered by this scan session")]
    UnknownDevice { address: String },
    #[error("this platform does not expose a usable BLE scanner")]
    ScannerUnavailable,
    #[error("cannot {action} while the session is {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    #[error("the session task has shut down")]
    SessionClosed,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced by a radio adapter implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE operation failed: {0}")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("peripheral `{id}` is not known to the radio adapter")]
    UnknownPeripheral { id: String },
    #[error("the radio rejected the request: {reason}")]
    Rejected { reason: String },
}

/// Errors returned when parsing fake radio fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake scan fixture is empty")]
    EmptyFixture,
    #[error("scan fixture records must contain two or three pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("scan fixture records cannot contain an empty address")]
    EmptyAddress,
    #[error("unknown scan fixture flag `{flag}`")]
    UnknownRecordFlag { flag: String },
    #[error("invalid service UUID in fixture")]
    InvalidServiceUuid(#[from] uuid::Error),
    #[error("invalid service instance id in fixture")]
    InvalidInstanceId(#[from] std::num::ParseIntError),
    #[error("service availability must be `immediate`, `never`, or a poll count, got `{value}`")]
    InvalidServiceAvailability { value: String },
}

/// Errors returned while loading module-name overrides.
#[derive(Debug, Error)]
pub enum ModuleNameError {
    #[error("failed while reading module-name overrides")]
    Io { source: std::io::Error },
    #[error("invalid module-name record: `{record}`")]
    InvalidRecord { record: String },
    #[error("invalid service UUID in module-name record: `{record}`")]
    InvalidUuid { record: String, source: uuid::Error },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
