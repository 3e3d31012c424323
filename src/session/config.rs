use std::time::Duration;

use bon::Builder;

use crate::module_names::ModuleNameTable;
use crate::permission::CapabilityProfile;

/// Default wall-clock bound on a single discovery scan.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(90);
/// Default wait between service-table polls after connecting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default number of service-table polls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Timing, capability, and naming settings shared by the sessions.
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    #[builder(default = DEFAULT_SCAN_PERIOD)]
    scan_period: Duration,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,
    #[builder(default = DEFAULT_POLL_ATTEMPTS)]
    poll_attempts: u32,
    #[builder(default)]
    capabilities: CapabilityProfile,
    #[builder(default)]
    module_names: ModuleNameTable,
}

impl SessionConfig {
    #[must_use]
    pub fn scan_period(&self) -> Duration {
        self.scan_period
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilityProfile {
        &self.capabilities
    }

    #[must_use]
    pub fn module_names(&self) -> &ModuleNameTable {
        &self.module_names
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let config = SessionConfig::default();

        assert_eq!(Duration::from_secs(90), config.scan_period());
        assert_eq!(Duration::from_millis(500), config.poll_interval());
        assert_eq!(20, config.poll_attempts());
        assert_eq!(31, config.capabilities().api_level());
    }

    #[test]
    fn builder_overrides_individual_settings() {
        let config = SessionConfig::builder()
            .scan_period(Duration::from_secs(5))
            .capabilities(CapabilityProfile::for_api_level(30))
            .build();

        assert_eq!(Duration::from_secs(5), config.scan_period());
        assert_eq!(20, config.poll_attempts());
        assert_eq!(30, config.capabilities().api_level());
    }
}
