use std::fmt::{self, Display, Formatter};

use crate::hw::DiscoveredDevice;

use super::painter::Painter;
use super::table::Table;

/// Renders the de-duplicated device list in first-seen order.
pub(crate) struct DeviceListView<'a> {
    devices: &'a [DiscoveredDevice],
    painter: &'a Painter,
}

impl<'a> DeviceListView<'a> {
    pub(crate) fn new(devices: &'a [DiscoveredDevice], painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for DeviceListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.painter.heading("Devices"))?;
        if self.devices.is_empty() {
            return write!(f, "{}", self.painter.muted("No devices found."));
        }

        let rows = self
            .devices
            .iter()
            .map(|device| {
                let manufacturer = match device.manufacturer_hint() {
                    "" => self.painter.placeholder(),
                    hint => hint.to_string(),
                };
                vec![
                    self.painter.value(device.display_name()),
                    device.address().to_string(),
                    manufacturer,
                    self.painter.yes_no(device.is_connectable()),
                ]
            })
            .collect();
        let table = Table::grid(["name", "address", "manufacturer", "connectable"], rows);
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use crate::hw::{PeripheralHandle, RawPeripheral, UNNAMED_DEVICE};

    use super::*;

    #[test]
    fn lists_devices_with_placeholder_names() {
        let devices = vec![
            DiscoveredDevice::from(
                RawPeripheral::new("AA:01", Some("Saber".into()))
                    .with_manufacturer("0x0822")
                    .with_handle(PeripheralHandle::new("AA:01")),
            ),
            DiscoveredDevice::from(RawPeripheral::new("AA:02", None)),
        ];
        let painter = Painter::new(false);

        let rendered = DeviceListView::new(&devices, &painter).to_string();

        assert!(rendered.contains("Saber"));
        assert!(rendered.contains("0x0822"));
        assert!(rendered.contains(UNNAMED_DEVICE));
        assert!(rendered.find("AA:01") < rendered.find("AA:02"));
    }

    #[test]
    fn empty_list_says_so() {
        let painter = Painter::new(false);
        let rendered = DeviceListView::new(&[], &painter).to_string();

        assert!(rendered.ends_with("No devices found."));
    }
}
