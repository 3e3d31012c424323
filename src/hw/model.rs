use serde::Serialize;
use uuid::Uuid;

/// Display name used when the radio reports no advertised name.
pub const UNNAMED_DEVICE: &str = "(unnamed)";

/// Opaque reference to a peripheral held by the radio adapter.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, derive_more::Display)]
#[display("{id}")]
pub struct PeripheralHandle {
    id: String,
}

impl PeripheralHandle {
    /// Wraps an adapter-specific peripheral identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A peripheral as reported by one radio discovery event.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawPeripheral {
    address: String,
    name: Option<String>,
    manufacturer: Option<String>,
    handle: Option<PeripheralHandle>,
}

impl RawPeripheral {
    /// Creates a discovery record with no connectable handle.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            manufacturer: None,
            handle: None,
        }
    }

    #[must_use]
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn with_handle(mut self, handle: PeripheralHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn handle(&self) -> Option<&PeripheralHandle> {
        self.handle.as_ref()
    }
}

/// One event delivered by the radio while a scan is active.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RadioEvent {
    /// A peripheral was seen.
    Discovered(RawPeripheral),
    /// A single event could not be read, typically a permission fault.
    Fault {
        address: Option<String>,
        reason: String,
    },
    /// The adapter gave up on the scan as a whole.
    ScanFailed { reason: String },
}

/// A de-duplicated peripheral exposed to the device list.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    display_name: String,
    address: String,
    manufacturer_hint: String,
    #[serde(skip)]
    native_handle: Option<PeripheralHandle>,
}

impl DiscoveredDevice {
    /// Returns the advertised name, or [`UNNAMED_DEVICE`].
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the radio address used as the identity key.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the manufacturer hint, which may be empty.
    #[must_use]
    pub fn manufacturer_hint(&self) -> &str {
        &self.manufacturer_hint
    }

    #[must_use]
    pub fn native_handle(&self) -> Option<&PeripheralHandle> {
        self.native_handle.as_ref()
    }

    /// Returns whether the device can be handed to module enumeration.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.native_handle.is_some()
    }
}

impl From<RawPeripheral> for DiscoveredDevice {
    fn from(raw: RawPeripheral) -> Self {
        let RawPeripheral {
            address,
            name,
            manufacturer,
            handle,
        } = raw;

        Self {
            display_name: name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNNAMED_DEVICE.to_string()),
            address,
            manufacturer_hint: manufacturer.unwrap_or_default(),
            native_handle: handle,
        }
    }
}

/// A GATT service snapshot reported by service discovery.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct GattService {
    uuid: Uuid,
    instance_id: u32,
}

impl GattService {
    #[must_use]
    pub fn new(uuid: Uuid, instance_id: u32) -> Self {
        Self { uuid, instance_id }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Distinguishes repeated instances of one service UUID on a peripheral.
    #[must_use]
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }
}

/// A recognised saber module.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ModuleDescriptor {
    display_name: String,
    uuid: Uuid,
    instance_id: u32,
}

impl ModuleDescriptor {
    pub(crate) fn new(display_name: String, uuid: Uuid, instance_id: u32) -> Self {
        Self {
            display_name,
            uuid,
            instance_id,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }
}

/// Assigns per-UUID instance ordinals to services in reported order.
pub(crate) fn number_service_instances(uuids: impl IntoIterator<Item = Uuid>) -> Vec<GattService> {
    let mut seen: Vec<(Uuid, u32)> = Vec::new();
    uuids
        .into_iter()
        .map(|uuid| {
            let instance_id = match seen.iter_mut().find(|(known, _count)| *known == uuid) {
                Some((_known, count)) => {
                    *count += 1;
                    *count
                }
                None => {
                    seen.push((uuid, 0));
                    0
                }
            };
            GattService::new(uuid, instance_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::named(Some("Saber-1"), "Saber-1")]
    #[case::missing(None, UNNAMED_DEVICE)]
    #[case::blank(Some(""), UNNAMED_DEVICE)]
    fn discovered_device_falls_back_to_placeholder_name(
        #[case] name: Option<&str>,
        #[case] expected: &str,
    ) {
        let device = DiscoveredDevice::from(RawPeripheral::new("AA:BB", name.map(String::from)));

        assert_eq!(expected, device.display_name());
        assert_eq!("", device.manufacturer_hint());
        assert!(!device.is_connectable());
    }

    #[test]
    fn discovered_device_keeps_handle_and_manufacturer() {
        let raw = RawPeripheral::new("AA:BB", Some("Saber".into()))
            .with_manufacturer("0x0822")
            .with_handle(PeripheralHandle::new("hci0/AA:BB"));
        let device = DiscoveredDevice::from(raw);

        assert_eq!("0x0822", device.manufacturer_hint());
        assert_eq!(Some("hci0/AA:BB"), device.native_handle().map(PeripheralHandle::id));
    }

    #[test]
    fn service_instances_count_per_uuid() {
        let led = Uuid::from_u128(0x7d0a7103_7699_494e_b638_deadbeef0000);
        let mixer = Uuid::from_u128(0x7d0a309f_7699_494e_b638_deadbeef0000);

        let services = number_service_instances([led, mixer, led]);

        assert_eq!(
            vec![
                GattService::new(led, 0),
                GattService::new(mixer, 0),
                GattService::new(led, 1),
            ],
            services
        );
    }
}
