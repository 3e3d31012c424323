mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;

pub use self::fake_backend::{
    FakeRadio, FakeRadioConfig, ScanFixture, ServiceAvailability, ServiceFixture,
};
pub use self::hardware::{RadioAdapter, RadioEventStream, fake_radio_adapter, real_radio_adapter};
pub(crate) use self::model::number_service_instances;
pub use self::model::{
    DiscoveredDevice, GattService, ModuleDescriptor, PeripheralHandle, RadioEvent, RawPeripheral,
    UNNAMED_DEVICE,
};
