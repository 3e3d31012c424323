use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

use super::hardware::{RadioAdapter, RadioEventStream};
use super::model::{
    GattService, PeripheralHandle, RadioEvent, RawPeripheral, number_service_instances,
};
use crate::error::{FixtureError, TransportError};

const FAULT_REASON: &str = "permission denied while reading scan result";

/// One fixture peripheral and how the fake radio reports it.
#[derive(Debug, Clone, Eq, PartialEq)]
struct FixtureRecord {
    peripheral: RawPeripheral,
    connected: bool,
    fault: bool,
}

/// Parsed fake scan fixture records.
///
/// Records are `;`-separated `address|name[|flag]` entries. A name of `-`
/// means the radio reports no name. Flags: `connected` (already connected to
/// the host), `no-handle` (no connectable handle), `fault` (the event is
/// reported as a per-event permission fault).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScanFixture {
    records: Vec<FixtureRecord>,
}

impl ScanFixture {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }
        let records = value
            .split(';')
            .map(parse_scan_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

/// Parsed fake GATT service table.
///
/// Entries are `;`-separated `uuid[@instance]`. Entries without an explicit
/// instance are numbered per UUID in listed order.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct ServiceFixture {
    services: Vec<GattService>,
}

impl FromStr for ServiceFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let entries = value
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_service_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let numbered = number_service_instances(entries.iter().map(|(uuid, _)| *uuid));
        let services = entries
            .iter()
            .zip(numbered)
            .map(|((uuid, explicit), ordinal)| {
                GattService::new(*uuid, explicit.unwrap_or(ordinal.instance_id()))
            })
            .collect();
        Ok(Self { services })
    }
}

/// When the fake peripheral's service table becomes visible to polling.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ServiceAvailability {
    /// Visible on the first poll.
    #[default]
    Immediate,
    /// Visible from the given 1-based poll onward.
    AfterPolls(usize),
    /// Never visible; polling exhausts its budget.
    Never,
}

impl FromStr for ServiceAvailability {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "immediate" => Ok(Self::Immediate),
            "never" => Ok(Self::Never),
            other => other.parse::<usize>().map(Self::AfterPolls).map_err(|_| {
                FixtureError::InvalidServiceAvailability {
                    value: other.to_string(),
                }
            }),
        }
    }
}

impl ServiceAvailability {
    fn visible_on(self, poll: usize) -> bool {
        match self {
            Self::Immediate => true,
            Self::AfterPolls(threshold) => poll >= threshold,
            Self::Never => false,
        }
    }
}

/// Settings for constructing a fake radio.
#[derive(Debug, Clone, Builder)]
pub struct FakeRadioConfig {
    scan_fixture: ScanFixture,
    #[builder(default)]
    services: ServiceFixture,
    #[builder(default)]
    service_availability: ServiceAvailability,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default = true)]
    supported: bool,
    #[builder(into)]
    connect_failure: Option<String>,
}

/// Fixture-driven radio used in tests and hardware-free runs.
///
/// Counts every call the sessions make so tests can assert on polling and
/// connection behaviour.
#[derive(Debug)]
pub struct FakeRadio {
    records: Vec<FixtureRecord>,
    services: Vec<GattService>,
    service_availability: ServiceAvailability,
    discovery_delay: Duration,
    supported: bool,
    connect_failure: Option<String>,
    live_scan: Mutex<Option<mpsc::UnboundedSender<RadioEvent>>>,
    connected: Mutex<BTreeSet<PeripheralHandle>>,
    scan_starts: AtomicUsize,
    scan_stops: AtomicUsize,
    connect_calls: AtomicUsize,
    service_polls: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeRadio {
    #[must_use]
    pub fn new(config: FakeRadioConfig) -> Self {
        let connected = config
            .scan_fixture
            .records
            .iter()
            .filter(|record| record.connected)
            .filter_map(|record| record.peripheral.handle().cloned())
            .collect();

        Self {
            records: config.scan_fixture.records,
            services: config.services.into(),
            service_availability: config.service_availability,
            discovery_delay: config.discovery_delay,
            supported: config.supported,
            connect_failure: config.connect_failure,
            live_scan: Mutex::new(None),
            connected: Mutex::new(connected),
            scan_starts: AtomicUsize::new(0),
            scan_stops: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            service_polls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Injects an event into the active scan. Returns `false` when no scan is live.
    pub async fn emit(&self, event: RadioEvent) -> bool {
        match self.live_scan.lock().await.as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Returns whether the handle is currently connected.
    pub async fn is_connected(&self, handle: &PeripheralHandle) -> bool {
        self.connected.lock().await.contains(handle)
    }

    #[must_use]
    pub fn scan_starts(&self) -> usize {
        self.scan_starts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn scan_stops(&self) -> usize {
        self.scan_stops.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn service_polls(&self) -> usize {
        self.service_polls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn knows(&self, handle: &PeripheralHandle) -> bool {
        self.records
            .iter()
            .any(|record| record.peripheral.handle() == Some(handle))
    }
}

#[async_trait]
impl RadioAdapter for FakeRadio {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn start_scan(&self) -> Result<RadioEventStream, TransportError> {
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();

        let fixture_sender = sender.clone();
        let events: Vec<RadioEvent> = self.records.iter().map(fixture_event).collect();
        let delay = self.discovery_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            for event in events {
                if fixture_sender.send(event).is_err() {
                    break;
                }
            }
        });

        *self.live_scan.lock().await = Some(sender);
        debug!(records = self.records.len(), "fake scan started");
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        self.live_scan.lock().await.take();
        Ok(())
    }

    async fn connected_peripherals(&self) -> Result<Vec<RawPeripheral>, TransportError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.connected)
            .map(|record| record.peripheral.clone())
            .collect())
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.connect_failure {
            return Err(TransportError::Rejected {
                reason: reason.clone(),
            });
        }
        if !self.knows(handle) {
            return Err(TransportError::UnknownPeripheral {
                id: handle.id().to_string(),
            });
        }

        self.connected.lock().await.insert(handle.clone());
        Ok(())
    }

    async fn current_services(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Vec<GattService>, TransportError> {
        let poll = self.service_polls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.is_connected(handle).await || !self.service_availability.visible_on(poll) {
            return Ok(Vec::new());
        }
        Ok(self.services.clone())
    }

    async fn disconnect(&self, handle: &PeripheralHandle) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.lock().await.remove(handle);
        Ok(())
    }
}

fn fixture_event(record: &FixtureRecord) -> RadioEvent {
    if record.fault {
        RadioEvent::Fault {
            address: Some(record.peripheral.address().to_string()),
            reason: FAULT_REASON.to_string(),
        }
    } else {
        RadioEvent::Discovered(record.peripheral.clone())
    }
}

fn parse_scan_record(raw_record: &str) -> Result<FixtureRecord, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    let address = fields[0];
    if address.is_empty() {
        return Err(FixtureError::EmptyAddress);
    }

    let name = match fields[1] {
        "-" => None,
        name => Some(name.to_string()),
    };
    let mut record = FixtureRecord {
        peripheral: RawPeripheral::new(address, name)
            .with_handle(PeripheralHandle::new(address)),
        connected: false,
        fault: false,
    };

    match fields.get(2).copied() {
        None => {}
        Some("connected") => record.connected = true,
        Some("no-handle") => {
            let name = record.peripheral.name().map(String::from);
            record.peripheral = RawPeripheral::new(address, name);
        }
        Some("fault") => record.fault = true,
        Some(flag) => {
            return Err(FixtureError::UnknownRecordFlag {
                flag: flag.to_string(),
            });
        }
    }
    Ok(record)
}

fn parse_service_entry(entry: &str) -> Result<(Uuid, Option<u32>), FixtureError> {
    match entry.split_once('@') {
        Some((raw_uuid, raw_instance)) => Ok((
            Uuid::parse_str(raw_uuid.trim())?,
            Some(raw_instance.trim().parse::<u32>()?),
        )),
        None => Ok((Uuid::parse_str(entry)?, None)),
    }
}
