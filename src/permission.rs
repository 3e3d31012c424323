use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};
use tracing::debug;

use crate::error::SessionError;

/// Platform API level at which BLE permissions split into scan/connect grants.
pub const CAPABILITY_SPLIT_API_LEVEL: u32 = 31;

/// One platform permission gating a privileged radio operation.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    StrumDisplay,
    EnumIter,
    EnumString,
    Serialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Discover nearby peripherals (split-permission platforms).
    Scan,
    /// Connect to a peripheral (split-permission platforms).
    Connect,
    FineLocation,
    CoarseLocation,
    /// Legacy umbrella Bluetooth permission.
    Bluetooth,
    /// Legacy Bluetooth administration permission.
    BluetoothAdmin,
}

/// An ordered set of capabilities.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Creates a set from any iterator of capabilities.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    /// Every capability any profile can require.
    #[must_use]
    pub fn all() -> Self {
        Capability::iter().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl Display for CapabilitySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<none>");
        }
        for (index, capability) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{capability}")?;
        }
        Ok(())
    }
}

/// Reports whether the host process currently holds a capability.
///
/// Implementations must reflect the live grant state; callers re-probe before
/// every privileged operation.
pub trait CapabilityProbe: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

impl<F> CapabilityProbe for F
where
    F: Fn(Capability) -> bool + Send + Sync,
{
    fn is_granted(&self, capability: Capability) -> bool {
        self(capability)
    }
}

/// Probe for hosts with a fixed grant state, such as desktop BLE stacks.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    denied: CapabilitySet,
}

impl StaticProbe {
    /// Grants every capability.
    #[must_use]
    pub fn granting_all() -> Self {
        Self::default()
    }

    /// Grants every capability except the listed ones.
    #[must_use]
    pub fn denying(denied: CapabilitySet) -> Self {
        Self { denied }
    }
}

impl CapabilityProbe for StaticProbe {
    fn is_granted(&self, capability: Capability) -> bool {
        !self.denied.contains(capability)
    }
}

/// Computes which required capabilities are currently missing.
pub struct PermissionGate;

impl PermissionGate {
    /// Returns the subset of `required` for which `probe` reports no grant.
    ///
    /// The probe is invoked once per required capability. An empty result means
    /// every required capability is granted.
    ///
    /// ```
    /// use saber_builder::{Capability, CapabilitySet, PermissionGate};
    ///
    /// let required = CapabilitySet::new([Capability::Scan, Capability::Connect]);
    /// let probe = |capability: Capability| capability == Capability::Scan;
    /// let missing = PermissionGate::check(&required, &probe);
    /// assert_eq!(CapabilitySet::new([Capability::Connect]), missing);
    /// ```
    #[must_use]
    pub fn check(required: &CapabilitySet, probe: &dyn CapabilityProbe) -> CapabilitySet {
        required
            .iter()
            .filter(|capability| {
                let granted = probe.is_granted(*capability);
                debug!(%capability, granted, "checked platform capability");
                !granted
            })
            .collect()
    }

    /// Fails with [`SessionError::PermissionDenied`] when anything is missing.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` carrying the missing set.
    pub fn ensure(required: &CapabilitySet, probe: &dyn CapabilityProbe) -> Result<(), SessionError> {
        let missing = Self::check(required, probe);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::PermissionDenied { missing })
        }
    }
}

/// Required capability sets for scanning and connecting on one platform version.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CapabilityProfile {
    api_level: u32,
    scan: CapabilitySet,
    connect: CapabilitySet,
}

impl CapabilityProfile {
    /// Selects the fixed capability sets for a platform API level.
    #[must_use]
    pub fn for_api_level(api_level: u32) -> Self {
        if api_level >= CAPABILITY_SPLIT_API_LEVEL {
            Self {
                api_level,
                scan: CapabilitySet::new([Capability::Scan, Capability::Connect]),
                connect: CapabilitySet::new([Capability::Connect]),
            }
        } else {
            Self {
                api_level,
                scan: CapabilitySet::new([
                    Capability::FineLocation,
                    Capability::CoarseLocation,
                    Capability::Bluetooth,
                    Capability::BluetoothAdmin,
                ]),
                connect: CapabilitySet::new([Capability::Bluetooth, Capability::BluetoothAdmin]),
            }
        }
    }

    #[must_use]
    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    /// Capabilities required to start or stop a scan.
    #[must_use]
    pub fn scan(&self) -> &CapabilitySet {
        &self.scan
    }

    /// Capabilities required to connect to a chosen peripheral.
    #[must_use]
    pub fn connect(&self) -> &CapabilitySet {
        &self.connect
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::for_api_level(CAPABILITY_SPLIT_API_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn check_returns_only_denied_capabilities() {
        let required = CapabilitySet::new([
            Capability::FineLocation,
            Capability::CoarseLocation,
            Capability::Bluetooth,
        ]);
        let probe = StaticProbe::denying(CapabilitySet::new([
            Capability::CoarseLocation,
            Capability::Scan,
        ]));

        let missing = PermissionGate::check(&required, &probe);

        assert_eq!(CapabilitySet::new([Capability::CoarseLocation]), missing);
    }

    #[test]
    fn check_is_repeatable_for_the_same_probe_results() {
        let required = CapabilitySet::new([Capability::Scan, Capability::Connect]);
        let probe = |capability: Capability| capability != Capability::Connect;

        let first = PermissionGate::check(&required, &probe);
        let second = PermissionGate::check(&required, &probe);

        assert_eq!(first, second);
    }

    #[test]
    fn check_probes_each_required_capability_once() {
        let calls = AtomicUsize::new(0);
        let required = CapabilitySet::new([Capability::Scan, Capability::Connect]);
        let probe = |_capability: Capability| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };

        let missing = PermissionGate::check(&required, &probe);

        assert!(missing.is_empty());
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn ensure_reports_missing_set() {
        let required = CapabilitySet::new([Capability::Scan]);
        let result = PermissionGate::ensure(&required, &|_capability: Capability| false);

        assert_matches!(
            result,
            Err(SessionError::PermissionDenied { missing }) if missing.contains(Capability::Scan)
        );
    }

    #[rstest]
    #[case(30, 4, 2)]
    #[case(31, 2, 1)]
    #[case(34, 2, 1)]
    fn profile_selects_set_by_api_level(
        #[case] api_level: u32,
        #[case] scan_len: usize,
        #[case] connect_len: usize,
    ) {
        let profile = CapabilityProfile::for_api_level(api_level);

        assert_eq!(scan_len, profile.scan().len());
        assert_eq!(connect_len, profile.connect().len());
    }

    #[rstest]
    #[case("scan", Capability::Scan)]
    #[case("fine-location", Capability::FineLocation)]
    #[case("bluetooth-admin", Capability::BluetoothAdmin)]
    fn capability_parses_kebab_case(#[case] raw: &str, #[case] expected: Capability) {
        assert_eq!(Ok(expected), Capability::from_str(raw));
    }

    #[test]
    fn all_covers_both_profiles() {
        let all = CapabilitySet::all();

        for api_level in [30, 31] {
            let profile = CapabilityProfile::for_api_level(api_level);
            assert!(profile.scan().iter().all(|capability| all.contains(capability)));
            assert!(profile.connect().iter().all(|capability| all.contains(capability)));
        }
        assert_eq!(6, all.len());
    }

    #[test]
    fn capability_set_display_joins_names() {
        let set = CapabilitySet::new([Capability::Connect, Capability::Scan]);
        assert_eq!("scan, connect", set.to_string());
        assert_eq!("<none>", CapabilitySet::default().to_string());
    }
}
