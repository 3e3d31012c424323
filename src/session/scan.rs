use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum_macros::Display as StrumDisplay;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, trace, warn};

use super::config::SessionConfig;
use crate::error::SessionError;
use crate::hw::{DiscoveredDevice, RadioAdapter, RadioEvent, RadioEventStream, RawPeripheral};
use crate::permission::{CapabilityProbe, CapabilitySet, PermissionGate};

/// Callback invoked once per newly seen address.
pub type DiscoveryCallback = Box<dyn FnMut(&DiscoveredDevice) + Send>;

/// Whether a discovery scan is running.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, StrumDisplay)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ScanState {
    #[default]
    NotScanning,
    Scanning,
}

/// Devices seen by a scan session, keyed by address, in first-seen order.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeviceRegistry {
    devices: Vec<DiscoveredDevice>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Inserts the device unless its address is already present. First seen wins.
    pub(crate) fn insert_if_absent(&mut self, device: DiscoveredDevice) -> bool {
        if self.index.contains_key(device.address()) {
            return false;
        }
        self.index
            .insert(device.address().to_string(), self.devices.len());
        self.devices.push(device);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.index.get(address).map(|position| &self.devices[*position])
    }

    #[must_use]
    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Immutable view of a scan session published to readers.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ScanSnapshot {
    state: ScanState,
    devices: DeviceRegistry,
}

impl ScanSnapshot {
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.devices
    }
}

enum ScanCommand {
    Start {
        required: CapabilitySet,
        fresh: bool,
        on_discovered: DiscoveryCallback,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        required: CapabilitySet,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Radio {
        generation: Option<u64>,
        event: RadioEvent,
    },
    AutoStop {
        generation: u64,
    },
}

/// Owns one discovery scan and its de-duplicated device registry.
///
/// All state changes happen on a dedicated task; this handle only sends
/// commands to it and reads published snapshots. Dropping the handle shuts the
/// task down and stops any running scan.
pub struct ScanSession {
    commands: mpsc::UnboundedSender<ScanCommand>,
    snapshot: watch::Receiver<ScanSnapshot>,
    supported: bool,
    _shutdown: DropGuard,
}

impl ScanSession {
    /// Spawns the session task. Must be called within a Tokio runtime.
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        probe: Arc<dyn CapabilityProbe>,
        config: &SessionConfig,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (snapshot_sender, snapshot) = watch::channel(ScanSnapshot::default());
        let shutdown = CancellationToken::new();
        let supported = adapter.is_supported();

        let actor = ScanActor {
            adapter,
            probe,
            scan_period: config.scan_period(),
            commands: commands.clone(),
            snapshot: snapshot_sender,
            on_discovered: None,
            generation: 0,
            active_scan: None,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(actor.run(receiver));

        Self {
            commands,
            snapshot,
            supported,
            _shutdown: shutdown.drop_guard(),
        }
    }

    /// Starts scanning, keeping devices already in the registry.
    ///
    /// A no-op when already scanning; the original callback stays in place.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when a required capability is missing,
    /// `ScannerUnavailable` on hosts without a scanner, or a transport error
    /// when the adapter refuses to scan.
    pub async fn start<F>(&self, required: &CapabilitySet, on_discovered: F) -> Result<(), SessionError>
    where
        F: FnMut(&DiscoveredDevice) + Send + 'static,
    {
        self.send_start(required, false, Box::new(on_discovered)).await
    }

    /// Clears the registry, then starts scanning.
    ///
    /// # Errors
    ///
    /// Same as [`ScanSession::start`]. The registry is left untouched on error.
    pub async fn restart<F>(
        &self,
        required: &CapabilitySet,
        on_discovered: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&DiscoveredDevice) + Send + 'static,
    {
        self.send_start(required, true, Box::new(on_discovered)).await
    }

    /// Stops scanning. The registry is kept.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when a required capability is missing.
    pub async fn stop(&self, required: &CapabilitySet) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(ScanCommand::Stop {
            required: required.clone(),
            reply,
        })?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Feeds one radio event into the session, as the platform callback would.
    ///
    /// Events arriving while no scan is running are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session task has stopped.
    pub fn on_radio_event(&self, event: RadioEvent) -> Result<(), SessionError> {
        self.send(ScanCommand::Radio {
            generation: None,
            event,
        })
    }

    /// Returns whether this host exposes a usable scanner at all.
    #[must_use]
    pub fn supported(&self) -> bool {
        self.supported
    }

    #[must_use]
    pub fn state(&self) -> ScanState {
        self.snapshot.borrow().state
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Scanning
    }

    /// Returns a snapshot of every device seen so far, in first-seen order.
    #[must_use]
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.snapshot.borrow().devices.devices().to_vec()
    }

    #[must_use]
    pub fn device(&self, address: &str) -> Option<DiscoveredDevice> {
        self.snapshot.borrow().devices.get(address).cloned()
    }

    /// Subscribes to state and registry changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot.clone()
    }

    async fn send_start(
        &self,
        required: &CapabilitySet,
        fresh: bool,
        on_discovered: DiscoveryCallback,
    ) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(ScanCommand::Start {
            required: required.clone(),
            fresh,
            on_discovered,
            reply,
        })?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    fn send(&self, command: ScanCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}

struct ScanActor {
    adapter: Arc<dyn RadioAdapter>,
    probe: Arc<dyn CapabilityProbe>,
    scan_period: Duration,
    commands: mpsc::UnboundedSender<ScanCommand>,
    snapshot: watch::Sender<ScanSnapshot>,
    on_discovered: Option<DiscoveryCallback>,
    generation: u64,
    active_scan: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl ScanActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<ScanCommand>) {
        loop {
            let command = tokio::select! {
                () = self.shutdown.cancelled() => break,
                command = receiver.recv() => command,
            };
            let Some(command) = command else {
                break;
            };
            self.handle(command).await;
        }

        if self.active_scan.is_some() {
            self.halt("session dropped").await;
        }
        trace!("scan session task finished");
    }

    async fn handle(&mut self, command: ScanCommand) {
        match command {
            ScanCommand::Start {
                required,
                fresh,
                on_discovered,
                reply,
            } => {
                let result = self.start(&required, fresh, on_discovered).await;
                if reply.send(result).is_err() {
                    trace!("start caller went away");
                }
            }
            ScanCommand::Stop { required, reply } => {
                let result = self.stop(&required).await;
                if reply.send(result).is_err() {
                    trace!("stop caller went away");
                }
            }
            ScanCommand::Radio { generation, event } => {
                self.on_radio_event(generation, event).await;
            }
            ScanCommand::AutoStop { generation } => {
                if generation == self.generation && self.active_scan.is_some() {
                    info!(period = ?self.scan_period, "scan period elapsed");
                    self.halt("scan period elapsed").await;
                } else {
                    trace!(generation, current = self.generation, "ignoring stale auto-stop");
                }
            }
        }
    }

    #[instrument(skip(self, required, on_discovered), level = "debug", fields(%required))]
    async fn start(
        &mut self,
        required: &CapabilitySet,
        fresh: bool,
        on_discovered: DiscoveryCallback,
    ) -> Result<(), SessionError> {
        if !self.adapter.is_supported() {
            return Err(SessionError::ScannerUnavailable);
        }
        PermissionGate::ensure(required, self.probe.as_ref())?;

        if fresh {
            self.snapshot.send_modify(|snapshot| snapshot.devices.clear());
        }
        if self.active_scan.is_some() {
            debug!("scan already running");
            return Ok(());
        }

        let events = self.adapter.start_scan().await?;
        self.generation += 1;
        let generation = self.generation;
        let scan_token = self.shutdown.child_token();
        self.active_scan = Some(scan_token.clone());
        self.on_discovered = Some(on_discovered);
        self.snapshot
            .send_modify(|snapshot| snapshot.state = ScanState::Scanning);
        info!(generation, "scan started");

        match self.adapter.connected_peripherals().await {
            Ok(connected) => {
                for raw in connected {
                    self.record(raw);
                }
            }
            Err(error) => warn!(?error, "could not list already-connected peripherals"),
        }

        tokio::spawn(forward_radio_events(
            events,
            self.commands.clone(),
            generation,
            scan_token.clone(),
        ));
        tokio::spawn(auto_stop_after(
            self.scan_period,
            self.commands.clone(),
            generation,
            scan_token,
        ));
        Ok(())
    }

    #[instrument(skip(self, required), level = "debug", fields(%required))]
    async fn stop(&mut self, required: &CapabilitySet) -> Result<(), SessionError> {
        PermissionGate::ensure(required, self.probe.as_ref())?;
        self.halt("stop requested").await;
        Ok(())
    }

    async fn halt(&mut self, reason: &'static str) {
        if let Some(scan_token) = self.active_scan.take() {
            scan_token.cancel();
        }
        if let Err(error) = self.adapter.stop_scan().await {
            debug!(?error, "adapter stop failed; treating scan as stopped");
        }
        self.snapshot.send_if_modified(|snapshot| {
            let was_scanning = snapshot.state == ScanState::Scanning;
            snapshot.state = ScanState::NotScanning;
            was_scanning
        });
        info!(reason, "scan stopped");
    }

    async fn on_radio_event(&mut self, generation: Option<u64>, event: RadioEvent) {
        let current = self.active_scan.is_some()
            && generation.is_none_or(|generation| generation == self.generation);
        if !current {
            trace!(?generation, "dropping radio event outside the active scan");
            return;
        }

        match event {
            RadioEvent::Discovered(raw) => self.record(raw),
            RadioEvent::Fault { address, reason } => {
                warn!(?address, %reason, "dropping unreadable scan result");
            }
            RadioEvent::ScanFailed { reason } => {
                warn!(%reason, "adapter reported scan failure");
                self.halt("scan failed").await;
            }
        }
    }

    fn record(&mut self, raw: RawPeripheral) {
        let device = DiscoveredDevice::from(raw);
        if self.snapshot.borrow().devices.contains(device.address()) {
            trace!(address = device.address(), "duplicate discovery dropped");
            return;
        }

        debug!(
            address = device.address(),
            name = device.display_name(),
            "discovered device"
        );
        if let Some(on_discovered) = self.on_discovered.as_mut() {
            on_discovered(&device);
        }
        self.snapshot.send_modify(|snapshot| {
            snapshot.devices.insert_if_absent(device);
        });
    }
}

async fn forward_radio_events(
    mut events: RadioEventStream,
    commands: mpsc::UnboundedSender<ScanCommand>,
    generation: u64,
    scan_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = scan_token.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            break;
        };
        let command = ScanCommand::Radio {
            generation: Some(generation),
            event,
        };
        if commands.send(command).is_err() {
            break;
        }
    }
    trace!(generation, "radio event forwarder finished");
}

async fn auto_stop_after(
    period: Duration,
    commands: mpsc::UnboundedSender<ScanCommand>,
    generation: u64,
    scan_token: CancellationToken,
) {
    tokio::select! {
        () = scan_token.cancelled() => {
            trace!(generation, "auto-stop timer disarmed");
        }
        () = sleep(period) => {
            if commands.send(ScanCommand::AutoStop { generation }).is_err() {
                trace!(generation, "session gone before auto-stop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{FakeRadioConfig, PeripheralHandle, fake_radio_adapter};
    use crate::permission::{Capability, StaticProbe};

    fn device(address: &str, name: &str) -> DiscoveredDevice {
        DiscoveredDevice::from(
            RawPeripheral::new(address, Some(name.to_string()))
                .with_handle(PeripheralHandle::new(address)),
        )
    }

    #[test]
    fn registry_keeps_first_seen_entry() {
        let mut registry = DeviceRegistry::default();

        assert!(registry.insert_if_absent(device("AA:01", "Saber")));
        assert!(registry.insert_if_absent(device("AA:02", "Other")));
        assert!(!registry.insert_if_absent(device("AA:01", "Renamed")));

        assert_eq!(2, registry.len());
        assert_eq!(
            Some("Saber"),
            registry.get("AA:01").map(DiscoveredDevice::display_name)
        );
        let addresses: Vec<&str> = registry
            .devices()
            .iter()
            .map(DiscoveredDevice::address)
            .collect();
        assert_eq!(vec!["AA:01", "AA:02"], addresses);
    }

    #[test]
    fn registry_clear_forgets_addresses() {
        let mut registry = DeviceRegistry::default();
        registry.insert_if_absent(device("AA:01", "Saber"));

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.insert_if_absent(device("AA:01", "Saber")));
    }

    #[tokio::test]
    async fn start_without_scanner_is_unavailable() {
        let radio = fake_radio_adapter(
            FakeRadioConfig::builder()
                .scan_fixture("AA:01|Saber".parse().expect("fixture should parse"))
                .supported(false)
                .build(),
        );
        let session = ScanSession::new(
            radio.clone(),
            Arc::new(StaticProbe::granting_all()),
            &SessionConfig::default(),
        );

        let result = session
            .start(&CapabilitySet::new([Capability::Scan]), |_device: &DiscoveredDevice| {})
            .await;

        assert!(!session.supported());
        assert_matches!(result, Err(SessionError::ScannerUnavailable));
        assert_eq!(0, radio.scan_starts());
    }
}
