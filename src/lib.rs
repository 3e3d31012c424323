mod app;
mod classifier;
mod cli;
mod error;
mod hw;
mod module_names;
mod permission;
mod session;
mod telemetry;
mod terminal;

pub use app::{
    RunSettings, fake_clients, host_capability_probe, real_radio_adapter, run, run_with_clients,
    run_with_settings,
};
pub use classifier::{MODULE_NAMESPACE_MAX, MODULE_NAMESPACE_MIN, ModuleClassifier, UNNAMED_MODULE};
pub use cli::{Args, ClassifyArgs, Command, FakeArgs, LogLevel, ModulesArgs, OutputFormat, ScanArgs};
pub use error::{FixtureError, ModuleNameError, SessionError, TransportError};
pub use hw::{
    DiscoveredDevice, FakeRadio, FakeRadioConfig, GattService, ModuleDescriptor, PeripheralHandle,
    RadioAdapter, RadioEvent, RadioEventStream, RawPeripheral, ScanFixture, ServiceAvailability,
    ServiceFixture, UNNAMED_DEVICE, fake_radio_adapter,
};
pub use module_names::ModuleNameTable;
pub use permission::{
    CAPABILITY_SPLIT_API_LEVEL, Capability, CapabilityProbe, CapabilityProfile, CapabilitySet,
    PermissionGate, StaticProbe,
};
pub use session::{
    CoordinatorState, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_SCAN_PERIOD,
    DeviceRegistry, DiscoveryCallback, EnumerationOutcome, EnumerationSession, EnumerationState,
    FailureReason, ScanSession, ScanSnapshot, ScanState, SessionConfig, SessionCoordinator,
};
pub use terminal::TerminalClient;
