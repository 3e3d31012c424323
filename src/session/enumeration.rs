use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum_macros::IntoStaticStr;
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, trace, warn};

use super::config::SessionConfig;
use crate::classifier::ModuleClassifier;
use crate::error::SessionError;
use crate::hw::{DiscoveredDevice, ModuleDescriptor, PeripheralHandle, RadioAdapter};
use crate::permission::{CapabilityProbe, CapabilitySet, PermissionGate};

/// Why an enumeration ended in failure.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    #[display("the device has no connectable peripheral handle")]
    NotConnectable,
    #[display("transport failure: {_0}")]
    Transport(String),
    #[display("enumeration was cancelled")]
    Cancelled,
}

/// Result of enumerating one device's modules.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, IntoStaticStr)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EnumerationOutcome {
    Pending,
    /// The device answered; the list may be empty when nothing matched.
    Ready(Vec<ModuleDescriptor>),
    /// The service table never appeared within the poll budget.
    TimedOut,
    Failed(FailureReason),
}

impl EnumerationOutcome {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns the modules of a `Ready` outcome, and nothing otherwise.
    #[must_use]
    pub fn modules(&self) -> &[ModuleDescriptor] {
        match self {
            Self::Ready(modules) => modules,
            _ => &[],
        }
    }
}

/// Progress of the connect-and-enumerate workflow.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, IntoStaticStr)]
#[serde(tag = "state", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EnumerationState {
    #[default]
    Idle,
    Connecting {
        address: String,
    },
    AwaitingServices {
        address: String,
        attempt: u32,
    },
    Finished {
        address: String,
        outcome: EnumerationOutcome,
    },
}

impl EnumerationState {
    /// Returns whether a new enumeration may start from this state.
    #[must_use]
    pub fn accepts_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Finished { .. })
    }

    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Connecting { address }
            | Self::AwaitingServices { address, .. }
            | Self::Finished { address, .. } => Some(address),
        }
    }

    /// Returns the outcome so far; anything short of `Finished` is `Pending`.
    #[must_use]
    pub fn outcome(&self) -> EnumerationOutcome {
        match self {
            Self::Finished { outcome, .. } => outcome.clone(),
            _ => EnumerationOutcome::Pending,
        }
    }
}

#[derive(Debug)]
struct ActiveRun {
    handle: PeripheralHandle,
    cancel: CancellationToken,
}

/// Connects to one chosen device, waits for its service table, and classifies it.
///
/// Only one enumeration runs at a time; a second `start` while one is in flight
/// is rejected with [`SessionError::Busy`].
pub struct EnumerationSession {
    adapter: Arc<dyn RadioAdapter>,
    probe: Arc<dyn CapabilityProbe>,
    required: CapabilitySet,
    classifier: ModuleClassifier,
    poll_interval: Duration,
    poll_attempts: u32,
    state: Arc<watch::Sender<EnumerationState>>,
    active: Mutex<Option<ActiveRun>>,
}

impl EnumerationSession {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        probe: Arc<dyn CapabilityProbe>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            adapter,
            probe,
            required: config.capabilities().connect().clone(),
            classifier: ModuleClassifier::new(config.module_names().clone()),
            poll_interval: config.poll_interval(),
            poll_attempts: config.poll_attempts(),
            state: Arc::new(watch::channel(EnumerationState::Idle).0),
            active: Mutex::new(None),
        }
    }

    /// Starts enumerating `device` in the background.
    ///
    /// A link left up by an earlier run on a different device is dropped first.
    ///
    /// # Errors
    ///
    /// - `Busy` while another enumeration is in flight; its state is untouched.
    /// - `PermissionDenied` when the connect capabilities are missing.
    /// - `NotConnectable` when the device has no native handle; the session
    ///   also lands on `Failed(NotConnectable)`.
    #[instrument(skip(self, device), level = "debug", fields(address = device.address()))]
    pub async fn start(&self, device: &DiscoveredDevice) -> Result<(), SessionError> {
        let mut active = self.active.lock().await;
        self.ensure_idle()?;
        PermissionGate::ensure(&self.required, self.probe.as_ref())?;
        if let Some(previous) = active.take_if(|run| Some(&run.handle) != device.native_handle()) {
            self.release(previous).await;
        }

        let address = device.address().to_string();
        let Some(handle) = device.native_handle().cloned() else {
            self.claim(EnumerationState::Finished {
                address: address.clone(),
                outcome: EnumerationOutcome::Failed(FailureReason::NotConnectable),
            })?;
            warn!("device has no connectable handle");
            return Err(SessionError::NotConnectable { address });
        };

        self.claim(EnumerationState::Connecting {
            address: address.clone(),
        })?;
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            handle: handle.clone(),
            cancel: cancel.clone(),
        });

        let run = EnumerationRun {
            adapter: Arc::clone(&self.adapter),
            classifier: self.classifier.clone(),
            poll_interval: self.poll_interval,
            poll_attempts: self.poll_attempts,
            state: Arc::clone(&self.state),
            address: address.clone(),
            handle,
            cancel,
        };
        tokio::spawn(run.run().instrument(info_span!("enumerate", %address)));
        Ok(())
    }

    /// Abandons the in-flight enumeration, disconnecting from the device.
    ///
    /// Returns `false` when nothing was in flight.
    pub async fn cancel(&self) -> bool {
        let mut active = self.active.lock().await;
        if self.state.borrow().accepts_start() {
            return false;
        }
        match active.take() {
            Some(run) => {
                self.release(run).await;
                true
            }
            None => false,
        }
    }

    /// Waits until the current enumeration reaches a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when no enumeration was ever started.
    pub async fn wait_for_outcome(&self) -> Result<EnumerationOutcome, SessionError> {
        let mut receiver = self.state.subscribe();
        let state = receiver
            .wait_for(|state| state.accepts_start())
            .await
            .map_err(|_| SessionError::SessionClosed)?
            .clone();

        match state {
            EnumerationState::Idle => Err(SessionError::InvalidTransition {
                state: "idle",
                action: "wait for modules",
            }),
            finished => Ok(finished.outcome()),
        }
    }

    /// Cancels any in-flight run and disconnects the last enumerated device.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the adapter fails to disconnect.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let Some(run) = self.active.lock().await.take() else {
            return Ok(());
        };
        self.stop_run(&run).await;
        self.adapter.disconnect(&run.handle).await?;
        debug!(handle = %run.handle, "disconnected enumerated device");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> EnumerationState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn outcome(&self) -> EnumerationOutcome {
        self.state.borrow().outcome()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EnumerationState> {
        self.state.subscribe()
    }

    /// Stops `run` if it is still in flight and drops its link, logging failures.
    async fn release(&self, run: ActiveRun) {
        self.stop_run(&run).await;
        match self.adapter.disconnect(&run.handle).await {
            Ok(()) => debug!(handle = %run.handle, "disconnected enumerated device"),
            Err(error) => warn!(handle = %run.handle, ?error, "disconnect failed"),
        }
    }

    /// Cancels `run` and waits for it to publish its terminal state.
    async fn stop_run(&self, run: &ActiveRun) {
        run.cancel.cancel();
        let mut receiver = self.state.subscribe();
        if receiver.wait_for(EnumerationState::accepts_start).await.is_err() {
            debug!("enumeration state closed while stopping");
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        let state = self.state.borrow();
        if state.accepts_start() {
            return Ok(());
        }
        Err(SessionError::Busy {
            address: state.address().unwrap_or_default().to_string(),
        })
    }

    fn claim(&self, next: EnumerationState) -> Result<(), SessionError> {
        let mut busy_with = None;
        self.state.send_if_modified(|state| {
            if !state.accepts_start() {
                busy_with = state.address().map(str::to_string);
                return false;
            }
            *state = next;
            true
        });
        match busy_with {
            Some(address) => Err(SessionError::Busy { address }),
            None => Ok(()),
        }
    }
}

struct EnumerationRun {
    adapter: Arc<dyn RadioAdapter>,
    classifier: ModuleClassifier,
    poll_interval: Duration,
    poll_attempts: u32,
    state: Arc<watch::Sender<EnumerationState>>,
    address: String,
    handle: PeripheralHandle,
    cancel: CancellationToken,
}

impl EnumerationRun {
    async fn run(self) {
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => EnumerationOutcome::Failed(FailureReason::Cancelled),
            outcome = self.enumerate() => outcome,
        };

        let label: &'static str = (&outcome).into();
        info!(outcome = label, modules = outcome.modules().len(), "enumeration finished");
        self.state.send_replace(EnumerationState::Finished {
            address: self.address.clone(),
            outcome,
        });
    }

    async fn enumerate(&self) -> EnumerationOutcome {
        if let Err(error) = self.adapter.connect(&self.handle).await {
            warn!(?error, "connect failed");
            return EnumerationOutcome::Failed(FailureReason::Transport(error.to_string()));
        }

        for attempt in 1..=self.poll_attempts {
            self.state.send_replace(EnumerationState::AwaitingServices {
                address: self.address.clone(),
                attempt,
            });

            if let Some(modules) = self.poll(attempt).await {
                return EnumerationOutcome::Ready(modules);
            }
            sleep(self.poll_interval).await;
        }

        // The table may have landed during the last sleep.
        if let Some(modules) = self.poll(self.poll_attempts).await {
            return EnumerationOutcome::Ready(modules);
        }
        warn!(attempts = self.poll_attempts, "service discovery timed out");
        EnumerationOutcome::TimedOut
    }

    async fn poll(&self, attempt: u32) -> Option<Vec<ModuleDescriptor>> {
        match self.adapter.current_services(&self.handle).await {
            Ok(services) if !services.is_empty() => {
                debug!(attempt, service_count = services.len(), "services available");
                Some(self.classifier.classify_all(&services))
            }
            Ok(_) => {
                trace!(attempt, "service table still empty");
                None
            }
            Err(error) => {
                debug!(attempt, ?error, "service poll failed");
                None
            }
        }
    }
}
