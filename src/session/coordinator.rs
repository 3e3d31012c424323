use std::sync::Arc;

use serde::Serialize;
use strum_macros::IntoStaticStr;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use super::config::SessionConfig;
use super::enumeration::{EnumerationOutcome, EnumerationSession, EnumerationState};
use super::scan::ScanSession;
use crate::error::SessionError;
use crate::hw::{DiscoveredDevice, RadioAdapter};
use crate::permission::{CapabilityProbe, CapabilityProfile, CapabilitySet, PermissionGate};

/// Where the user is in the scan, pick, enumerate flow.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, IntoStaticStr)]
#[serde(tag = "state", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    Scanning,
    DeviceChosen {
        device: DiscoveredDevice,
    },
    Enumerating {
        device: DiscoveredDevice,
    },
    Done {
        device: DiscoveredDevice,
        outcome: EnumerationOutcome,
    },
}

impl CoordinatorState {
    fn name(&self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub fn device(&self) -> Option<&DiscoveredDevice> {
        match self {
            Self::Idle | Self::Scanning => None,
            Self::DeviceChosen { device }
            | Self::Enumerating { device }
            | Self::Done { device, .. } => Some(device),
        }
    }
}

/// Sequences one scan session and one enumeration session for a UI.
///
/// Always stops the scan before connecting to a chosen device.
pub struct SessionCoordinator {
    scan: ScanSession,
    enumeration: Arc<EnumerationSession>,
    probe: Arc<dyn CapabilityProbe>,
    capabilities: CapabilityProfile,
    state: Arc<watch::Sender<CoordinatorState>>,
    sequencing: Mutex<()>,
}

impl SessionCoordinator {
    /// Builds both sessions over one shared radio. Must be called within a Tokio runtime.
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        probe: Arc<dyn CapabilityProbe>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            scan: ScanSession::new(Arc::clone(&adapter), Arc::clone(&probe), config),
            enumeration: Arc::new(EnumerationSession::new(adapter, Arc::clone(&probe), config)),
            probe,
            capabilities: config.capabilities().clone(),
            state: Arc::new(watch::channel(CoordinatorState::Idle).0),
            sequencing: Mutex::new(()),
        }
    }

    /// Reports which scan capabilities are currently missing.
    #[must_use]
    pub fn missing_scan_capabilities(&self) -> CapabilitySet {
        PermissionGate::check(self.capabilities.scan(), self.probe.as_ref())
    }

    /// Reports which connect capabilities are currently missing.
    #[must_use]
    pub fn missing_connect_capabilities(&self) -> CapabilitySet {
        PermissionGate::check(self.capabilities.connect(), self.probe.as_ref())
    }

    /// Reports every capability the host currently denies, required or not.
    #[must_use]
    pub fn denied_capabilities(&self) -> CapabilitySet {
        PermissionGate::check(&CapabilitySet::all(), self.probe.as_ref())
    }

    /// Starts scanning, forwarding each newly seen device to `on_discovered`.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while an enumeration is running, or any scan start error.
    #[instrument(skip(self, on_discovered), level = "debug")]
    pub async fn start_scan<F>(&self, on_discovered: F) -> Result<(), SessionError>
    where
        F: FnMut(&DiscoveredDevice) + Send + 'static,
    {
        let _sequencing = self.sequencing.lock().await;
        self.ensure_not_enumerating()?;

        self.scan
            .start(self.capabilities.scan(), on_discovered)
            .await?;
        self.state.send_replace(CoordinatorState::Scanning);
        Ok(())
    }

    /// Stops scanning and returns to `Idle` unless a device is already chosen.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the scan capabilities are missing.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop_scan(&self) -> Result<(), SessionError> {
        let _sequencing = self.sequencing.lock().await;
        self.scan.stop(self.capabilities.scan()).await?;
        self.state.send_if_modified(|state| {
            if *state == CoordinatorState::Scanning {
                *state = CoordinatorState::Idle;
                return true;
            }
            false
        });
        Ok(())
    }

    /// Chooses a discovered device, stopping the scan first.
    ///
    /// # Errors
    ///
    /// - `Busy` while an enumeration is running.
    /// - `UnknownDevice` when the address is not in the registry.
    /// - `PermissionDenied` when the scan cannot be stopped.
    #[instrument(skip(self), level = "debug")]
    pub async fn pick_device(&self, address: &str) -> Result<DiscoveredDevice, SessionError> {
        let _sequencing = self.sequencing.lock().await;
        self.ensure_not_enumerating()?;

        let device = self
            .scan
            .device(address)
            .ok_or_else(|| SessionError::UnknownDevice {
                address: address.to_string(),
            })?;
        if self.scan.is_scanning() {
            self.scan.stop(self.capabilities.scan()).await?;
        }

        info!(address, name = device.display_name(), "device chosen");
        self.state.send_replace(CoordinatorState::DeviceChosen {
            device: device.clone(),
        });
        Ok(device)
    }

    /// Begins module enumeration for the chosen device.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless a device is chosen.
    /// - Any enumeration start error; `NotConnectable` also lands on `Done`.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_modules(&self) -> Result<(), SessionError> {
        let _sequencing = self.sequencing.lock().await;
        let device = match &*self.state.borrow() {
            CoordinatorState::DeviceChosen { device } | CoordinatorState::Done { device, .. } => {
                device.clone()
            }
            other => {
                return Err(SessionError::InvalidTransition {
                    state: other.name(),
                    action: "load modules",
                });
            }
        };

        if self.scan.is_scanning() {
            self.scan.stop(self.capabilities.scan()).await?;
        }

        if let Err(error) = self.enumeration.start(&device).await {
            if let SessionError::NotConnectable { .. } = error {
                self.state.send_replace(CoordinatorState::Done {
                    device,
                    outcome: self.enumeration.outcome(),
                });
            }
            return Err(error);
        }

        self.state.send_replace(CoordinatorState::Enumerating {
            device: device.clone(),
        });
        tokio::spawn(follow_enumeration(
            Arc::clone(&self.enumeration),
            Arc::clone(&self.state),
            device,
        ));
        Ok(())
    }

    /// Waits for the running enumeration and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when nothing was enumerated.
    pub async fn wait_for_modules(&self) -> Result<EnumerationOutcome, SessionError> {
        let mut receiver = self.state.subscribe();
        let state = receiver
            .wait_for(|state| !matches!(state, CoordinatorState::Enumerating { .. }))
            .await
            .map_err(|_| SessionError::SessionClosed)?
            .clone();

        match state {
            CoordinatorState::Done { outcome, .. } => Ok(outcome),
            other => Err(SessionError::InvalidTransition {
                state: other.name(),
                action: "wait for modules",
            }),
        }
    }

    /// Stops scanning, abandons enumeration, disconnects, and returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the disconnect fails; the state is still reset.
    #[instrument(skip(self), level = "debug")]
    pub async fn reset(&self) -> Result<(), SessionError> {
        let _sequencing = self.sequencing.lock().await;
        if self.scan.is_scanning()
            && let Err(error) = self.scan.stop(self.capabilities.scan()).await
        {
            warn!(?error, "could not stop scan during reset");
        }

        let disconnected = self.enumeration.disconnect().await;
        self.state.send_replace(CoordinatorState::Idle);
        disconnected
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// The scan session, for device-list snapshots.
    #[must_use]
    pub fn scan(&self) -> &ScanSession {
        &self.scan
    }

    #[must_use]
    pub fn enumeration(&self) -> &EnumerationSession {
        &self.enumeration
    }

    fn ensure_not_enumerating(&self) -> Result<(), SessionError> {
        match &*self.state.borrow() {
            CoordinatorState::Enumerating { device } => Err(SessionError::Busy {
                address: device.address().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

async fn follow_enumeration(
    enumeration: Arc<EnumerationSession>,
    state: Arc<watch::Sender<CoordinatorState>>,
    device: DiscoveredDevice,
) {
    let mut progress = enumeration.subscribe();
    let outcome = match progress
        .wait_for(|progress| matches!(progress, EnumerationState::Finished { .. }))
        .await
    {
        Ok(progress) => progress.outcome(),
        Err(_) => return,
    };

    debug!(address = device.address(), "enumeration reached a terminal outcome");
    state.send_if_modified(|state| {
        let still_ours = matches!(
            state,
            CoordinatorState::Enumerating { device: current } if current.address() == device.address()
        );
        if still_ours {
            *state = CoordinatorState::Done { device, outcome };
        }
        still_ours
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{PeripheralHandle, RawPeripheral};

    #[test]
    fn state_names_are_kebab_case() {
        let device = DiscoveredDevice::from(
            RawPeripheral::new("AA:01", None).with_handle(PeripheralHandle::new("AA:01")),
        );

        assert_eq!("idle", CoordinatorState::Idle.name());
        assert_eq!(
            "device-chosen",
            CoordinatorState::DeviceChosen {
                device: device.clone()
            }
            .name()
        );
        assert_eq!(
            Some("AA:01"),
            CoordinatorState::Enumerating { device }
                .device()
                .map(DiscoveredDevice::address)
        );
    }
}
