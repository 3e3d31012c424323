use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::hw::{GattService, ModuleDescriptor};
use crate::module_names::ModuleNameTable;

/// Lowest most-significant UUID word in the saber module namespace.
pub const MODULE_NAMESPACE_MIN: u64 = 0x7d0a_0000_7699_494e;
/// Highest most-significant UUID word in the saber module namespace.
pub const MODULE_NAMESPACE_MAX: u64 = 0x7d0a_ffff_7699_494e;
/// Name given to in-namespace services missing from the name table.
pub const UNNAMED_MODULE: &str = "Unnamed Service";

/// Decides which GATT services are saber modules and names them.
#[derive(Debug, Clone, Default)]
pub struct ModuleClassifier {
    names: ModuleNameTable,
}

impl ModuleClassifier {
    #[must_use]
    pub fn new(names: ModuleNameTable) -> Self {
        Self { names }
    }

    /// Returns whether a service UUID lies inside the module namespace.
    ///
    /// Compares the most-significant 64 bits as an unsigned big-endian word
    /// against [`MODULE_NAMESPACE_MIN`]..=[`MODULE_NAMESPACE_MAX`].
    ///
    /// ```
    /// use saber_builder::{GattService, ModuleClassifier};
    /// use uuid::Uuid;
    ///
    /// let blade = Uuid::parse_str("7d0a7103-7699-494e-b638-deadbeef0000").unwrap();
    /// let battery = Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").unwrap();
    /// assert!(ModuleClassifier::is_module(&GattService::new(blade, 0)));
    /// assert!(!ModuleClassifier::is_module(&GattService::new(battery, 0)));
    /// ```
    #[must_use]
    pub fn is_module(service: &GattService) -> bool {
        let high = most_significant_bits(service.uuid());
        let in_namespace = (MODULE_NAMESPACE_MIN..=MODULE_NAMESPACE_MAX).contains(&high);
        trace!(
            uuid = %service.uuid(),
            high = %format_args!("{high:016x}"),
            in_namespace,
            "filtering service"
        );
        in_namespace
    }

    /// Maps one service to a module descriptor, keeping its instance id.
    #[must_use]
    pub fn classify(&self, service: &GattService) -> ModuleDescriptor {
        let uuid = service.uuid();
        let name = self.names.name_for(&uuid).unwrap_or(UNNAMED_MODULE);
        ModuleDescriptor::new(name.to_string(), uuid, service.instance_id())
    }

    /// Filters and names modules, preserving the transport's service order.
    #[instrument(skip(self, services), level = "debug", fields(service_count = services.len()))]
    pub fn classify_all(&self, services: &[GattService]) -> Vec<ModuleDescriptor> {
        let modules: Vec<ModuleDescriptor> = services
            .iter()
            .filter(|service| Self::is_module(service))
            .map(|service| self.classify(service))
            .collect();
        debug!(module_count = modules.len(), "classified services");
        modules
    }
}

fn most_significant_bits(uuid: Uuid) -> u64 {
    (uuid.as_u128() >> 64) as u64
}
