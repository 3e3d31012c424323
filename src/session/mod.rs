mod config;
mod coordinator;
mod enumeration;
mod scan;

pub use self::config::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_SCAN_PERIOD, SessionConfig,
};
pub use self::coordinator::{CoordinatorState, SessionCoordinator};
pub use self::enumeration::{
    EnumerationOutcome, EnumerationSession, EnumerationState, FailureReason,
};
pub use self::scan::{DeviceRegistry, DiscoveryCallback, ScanSession, ScanSnapshot, ScanState};
