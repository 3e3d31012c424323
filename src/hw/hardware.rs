use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::Stream;
use tracing::info;

use super::btleplug_backend::BtleplugRadio;
use super::fake_backend::{FakeRadio, FakeRadioConfig};
use super::model::{GattService, PeripheralHandle, RadioEvent, RawPeripheral};
use crate::error::TransportError;

/// Discovery events delivered by an active scan.
pub type RadioEventStream = Pin<Box<dyn Stream<Item = RadioEvent> + Send>>;

/// The BLE radio beneath the scan and enumeration sessions.
///
/// Event delivery is asynchronous; sessions serialise all state changes on
/// their own task, so implementations only need to be `Send + Sync`.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Returns whether a usable scanner exists on this host.
    fn is_supported(&self) -> bool;

    /// Starts discovery and returns the event stream for this scan.
    async fn start_scan(&self) -> Result<RadioEventStream, TransportError>;

    /// Stops discovery. Stopping an idle radio is not an error.
    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Lists peripherals the host is already connected to.
    async fn connected_peripherals(&self) -> Result<Vec<RawPeripheral>, TransportError>;

    /// Requests a connection and lets service discovery proceed in the background.
    async fn connect(&self, handle: &PeripheralHandle) -> Result<(), TransportError>;

    /// Returns the services discovered so far, in transport order.
    async fn current_services(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Vec<GattService>, TransportError>;

    async fn disconnect(&self, handle: &PeripheralHandle) -> Result<(), TransportError>;
}

/// Opens the host's first BLE adapter through `btleplug`.
///
/// A host without adapters yields a radio that reports itself unsupported.
///
/// # Errors
///
/// Returns an error if the platform BLE manager cannot be created.
pub async fn real_radio_adapter() -> Result<Arc<dyn RadioAdapter>, TransportError> {
    let radio = BtleplugRadio::new().await?;
    Ok(Arc::new(radio))
}

/// Builds a fixture-driven radio for tests and hardware-free runs.
#[must_use]
pub fn fake_radio_adapter(config: FakeRadioConfig) -> Arc<FakeRadio> {
    info!("using fake BLE radio");
    Arc::new(FakeRadio::new(config))
}
