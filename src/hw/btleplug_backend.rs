use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, trace, warn};

use super::hardware::{RadioAdapter, RadioEventStream};
use super::model::{
    GattService, PeripheralHandle, RadioEvent, RawPeripheral, number_service_instances,
};
use crate::error::TransportError;

type KnownPeripherals = Arc<RwLock<HashMap<PeripheralHandle, Peripheral>>>;
type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Radio backed by the host's first `btleplug` adapter.
#[derive(Debug)]
pub(crate) struct BtleplugRadio {
    adapter: Option<Adapter>,
    known: KnownPeripherals,
}

impl BtleplugRadio {
    /// Opens the platform manager and picks the first adapter, if any.
    pub(crate) async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?.into_iter().next();
        match &adapter {
            Some(adapter) => {
                let name = adapter.adapter_info().await?;
                info!(adapter = %name, "using BLE adapter");
            }
            None => warn!("no BLE adapters found; scanning is unavailable"),
        }

        Ok(Self {
            adapter,
            known: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn adapter(&self) -> Result<&Adapter, TransportError> {
        self.adapter.as_ref().ok_or(TransportError::NoAdapters)
    }

    async fn peripheral_for(&self, handle: &PeripheralHandle) -> Result<Peripheral, TransportError> {
        self.known
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral {
                id: handle.id().to_string(),
            })
    }
}

#[async_trait]
impl RadioAdapter for BtleplugRadio {
    fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&self) -> Result<RadioEventStream, TransportError> {
        let adapter = self.adapter()?.clone();
        let events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(pump_discovery_events(
            adapter,
            events,
            Arc::clone(&self.known),
            sender,
        ));
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.adapter()?.stop_scan().await?;
        Ok(())
    }

    async fn connected_peripherals(&self) -> Result<Vec<RawPeripheral>, TransportError> {
        let adapter = self.adapter()?;
        let mut connected = Vec::new();
        for peripheral in adapter.peripherals().await? {
            if !peripheral.is_connected().await? {
                continue;
            }
            connected.push(remember_peripheral(&self.known, peripheral).await?);
        }
        Ok(connected)
    }

    #[instrument(skip(self), level = "debug", fields(handle = %handle))]
    async fn connect(&self, handle: &PeripheralHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral_for(handle).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }

        let discovering = peripheral.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            match discovering.discover_services().await {
                Ok(()) => debug!(%handle, "service discovery finished"),
                Err(error) => warn!(%handle, ?error, "service discovery failed"),
            }
        });
        Ok(())
    }

    async fn current_services(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Vec<GattService>, TransportError> {
        let peripheral = self.peripheral_for(handle).await?;
        Ok(number_service_instances(
            peripheral.services().into_iter().map(|service| service.uuid),
        ))
    }

    #[instrument(skip(self), level = "debug", fields(handle = %handle))]
    async fn disconnect(&self, handle: &PeripheralHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral_for(handle).await?;
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}

async fn pump_discovery_events(
    adapter: Adapter,
    mut events: CentralEventStream,
    known: KnownPeripherals,
    sender: mpsc::UnboundedSender<RadioEvent>,
) {
    loop {
        let event = tokio::select! {
            () = sender.closed() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            break;
        };
        let CentralEvent::DeviceDiscovered(id) = event else {
            continue;
        };

        let radio_event = match describe_discovered(&adapter, &id, &known).await {
            Ok(raw) => RadioEvent::Discovered(raw),
            Err(error) => RadioEvent::Fault {
                address: Some(id.to_string()),
                reason: error.to_string(),
            },
        };
        if sender.send(radio_event).is_err() {
            break;
        }
    }
    trace!("discovery event pump finished");
}

async fn describe_discovered(
    adapter: &Adapter,
    id: &PeripheralId,
    known: &KnownPeripherals,
) -> Result<RawPeripheral, TransportError> {
    let peripheral = adapter.peripheral(id).await?;
    remember_peripheral(known, peripheral).await
}

async fn remember_peripheral(
    known: &KnownPeripherals,
    peripheral: Peripheral,
) -> Result<RawPeripheral, TransportError> {
    let handle = PeripheralHandle::new(peripheral.id().to_string());
    let properties = peripheral.properties().await?;
    let raw = raw_peripheral(&handle, peripheral.address(), properties.as_ref());
    known.write().await.insert(handle, peripheral);
    Ok(raw)
}

fn raw_peripheral(
    handle: &PeripheralHandle,
    fallback_address: BDAddr,
    properties: Option<&PeripheralProperties>,
) -> RawPeripheral {
    let address = properties.map_or(fallback_address, |properties| properties.address);
    // Some platforms hide the radio address; the peripheral id is stable instead.
    let address = if address.into_inner() == [0; 6] {
        handle.id().to_string()
    } else {
        address.to_string()
    };

    let name = properties.and_then(|properties| properties.local_name.clone());
    let raw = RawPeripheral::new(address, name).with_handle(handle.clone());
    match properties.and_then(manufacturer_hint) {
        Some(hint) => raw.with_manufacturer(hint),
        None => raw,
    }
}

fn manufacturer_hint(properties: &PeripheralProperties) -> Option<String> {
    properties
        .manufacturer_data
        .keys()
        .min()
        .map(|company_id| format!("0x{company_id:04X}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn properties(address: [u8; 6], name: Option<&str>, company_ids: &[u16]) -> PeripheralProperties {
        PeripheralProperties {
            address: BDAddr::from(address),
            local_name: name.map(String::from),
            manufacturer_data: company_ids
                .iter()
                .map(|company_id| (*company_id, vec![0x01]))
                .collect(),
            ..PeripheralProperties::default()
        }
    }

    #[test]
    fn raw_peripheral_prefers_advertised_address() {
        let handle = PeripheralHandle::new("hci0/dev_AA");
        let props = properties([0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22], Some("Saber"), &[0x0822]);

        let raw = raw_peripheral(&handle, BDAddr::from([0; 6]), Some(&props));
        let device = crate::hw::DiscoveredDevice::from(raw);

        assert_eq!("AA:BB:CC:00:11:22", device.address());
        assert_eq!("Saber", device.display_name());
        assert_eq!("0x0822", device.manufacturer_hint());
        assert_eq!(Some(&handle), device.native_handle());
    }

    #[test]
    fn raw_peripheral_falls_back_to_handle_for_hidden_address() {
        let handle = PeripheralHandle::new("5E1B5C9A-0000-4000-8000-00805F9B34FB");

        let raw = raw_peripheral(&handle, BDAddr::from([0; 6]), None);
        let device = crate::hw::DiscoveredDevice::from(raw);

        assert_eq!(handle.id(), device.address());
        assert_eq!(crate::hw::UNNAMED_DEVICE, device.display_name());
    }

    #[test]
    fn manufacturer_hint_uses_lowest_company_id() {
        let props = properties([1, 2, 3, 4, 5, 6], None, &[0x0822, 0x004C]);
        assert_eq!(Some("0x004C".to_string()), manufacturer_hint(&props));
    }
}
