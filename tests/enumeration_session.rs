use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use saber_builder::{
    Capability, CapabilitySet, DiscoveredDevice, EnumerationOutcome, EnumerationSession,
    EnumerationState, FailureReason, FakeRadio, FakeRadioConfig, PeripheralHandle, RawPeripheral,
    ServiceAvailability, SessionConfig, SessionError, StaticProbe,
};
use tokio::time::Instant;

const BLADE_AND_MIXER: &str = "0000180f-0000-1000-8000-00805f9b34fb;\
                               7d0a7103-7699-494e-b638-deadbeef0000;\
                               7d0a309f-7699-494e-b638-deadbeef0000";

fn fake_radio(services: &str, availability: ServiceAvailability) -> Arc<FakeRadio> {
    saber_builder::fake_radio_adapter(
        FakeRadioConfig::builder()
            .scan_fixture("AA:01|Saber;BB:02|Hilt".parse().expect("scan fixture should parse"))
            .services(services.parse().expect("service fixture should parse"))
            .service_availability(availability)
            .build(),
    )
}

fn session(radio: &Arc<FakeRadio>) -> EnumerationSession {
    EnumerationSession::new(
        radio.clone(),
        Arc::new(StaticProbe::granting_all()),
        &SessionConfig::default(),
    )
}

fn device(address: &str) -> DiscoveredDevice {
    DiscoveredDevice::from(
        RawPeripheral::new(address, Some("Saber".into())).with_handle(PeripheralHandle::new(address)),
    )
}

async fn wait_until_awaiting_services(session: &EnumerationSession) {
    let mut progress = session.subscribe();
    progress
        .wait_for(|state| matches!(state, EnumerationState::AwaitingServices { .. }))
        .await
        .expect("enumeration session should still be alive");
}

#[tokio::test(start_paused = true)]
async fn modules_are_listed_once_services_appear() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::AfterPolls(3));
    let session = session(&radio);
    let started = Instant::now();

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    let names: Vec<&str> = outcome
        .modules()
        .iter()
        .map(|module| module.display_name())
        .collect();
    assert_eq!(vec!["Blade LED", "Mixer Service"], names);
    assert_eq!(3, radio.service_polls());
    assert_eq!(1, radio.connect_calls());
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(started.elapsed() < Duration::from_millis(1500));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_service_table_times_out_after_the_poll_budget() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Never);
    let session = session(&radio);
    let started = Instant::now();

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    assert_eq!(EnumerationOutcome::TimedOut, outcome);
    assert_eq!(21, radio.service_polls());
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(radio.is_connected(&PeripheralHandle::new("AA:01")).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn services_landing_during_the_last_sleep_are_still_listed() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::AfterPolls(21));
    let session = session(&radio);
    let started = Instant::now();

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    assert_eq!(2, outcome.modules().len());
    assert_eq!(21, radio.service_polls());
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_millis(10_500));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn services_without_modules_are_ready_and_empty() -> anyhow::Result<()> {
    let radio = fake_radio(
        "0000180f-0000-1000-8000-00805f9b34fb",
        ServiceAvailability::Immediate,
    );
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    assert_eq!(EnumerationOutcome::Ready(Vec::new()), outcome);
    assert_eq!(1, radio.service_polls());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_start_while_in_flight_is_busy() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Never);
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    wait_until_awaiting_services(&session).await;
    let result = session.start(&device("BB:02")).await;

    assert_matches!(result, Err(SessionError::Busy { address }) if address == "AA:01");
    assert_eq!(Some("AA:01"), session.state().address());
    assert_eq!(1, radio.connect_calls());
    Ok(())
}

#[tokio::test]
async fn device_without_handle_fails_without_connecting() {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Immediate);
    let session = session(&radio);
    let unreachable = DiscoveredDevice::from(RawPeripheral::new("CC:03", None));

    let result = session.start(&unreachable).await;

    assert_matches!(result, Err(SessionError::NotConnectable { address }) if address == "CC:03");
    assert_eq!(
        EnumerationOutcome::Failed(FailureReason::NotConnectable),
        session.outcome()
    );
    assert_eq!(0, radio.connect_calls());
}

#[tokio::test]
async fn connect_failure_is_reported_as_transport_failure() -> anyhow::Result<()> {
    let radio = saber_builder::fake_radio_adapter(
        FakeRadioConfig::builder()
            .scan_fixture("AA:01|Saber".parse()?)
            .connect_failure("link lost")
            .build(),
    );
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    assert_matches!(
        outcome,
        EnumerationOutcome::Failed(FailureReason::Transport(reason)) if reason.contains("link lost")
    );
    assert_eq!(0, radio.service_polls());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_disconnects_and_reports_cancelled() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Never);
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    wait_until_awaiting_services(&session).await;
    assert!(session.cancel().await);
    let outcome = session.wait_for_outcome().await?;

    assert_eq!(EnumerationOutcome::Failed(FailureReason::Cancelled), outcome);
    assert_eq!(1, radio.disconnects());
    assert!(!session.cancel().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_finished_session_can_enumerate_again() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::AfterPolls(25));
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    assert_eq!(EnumerationOutcome::TimedOut, session.wait_for_outcome().await?);

    session.start(&device("AA:01")).await?;
    let outcome = session.wait_for_outcome().await?;

    assert_eq!(2, outcome.modules().len());
    assert_eq!(25, radio.service_polls());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn switching_devices_drops_the_previous_link() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::AfterPolls(25));
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    assert_eq!(EnumerationOutcome::TimedOut, session.wait_for_outcome().await?);
    assert!(radio.is_connected(&PeripheralHandle::new("AA:01")).await);

    session.start(&device("BB:02")).await?;
    assert_eq!(2, session.wait_for_outcome().await?.modules().len());
    assert!(!radio.is_connected(&PeripheralHandle::new("AA:01")).await);

    session.disconnect().await?;
    assert!(!radio.is_connected(&PeripheralHandle::new("BB:02")).await);
    assert_eq!(2, radio.disconnects());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_a_run_disconnects_once() -> anyhow::Result<()> {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Never);
    let session = session(&radio);

    session.start(&device("AA:01")).await?;
    wait_until_awaiting_services(&session).await;
    session.disconnect().await?;

    assert_eq!(EnumerationOutcome::Failed(FailureReason::Cancelled), session.outcome());
    assert_eq!(1, radio.disconnects());
    assert!(!radio.is_connected(&PeripheralHandle::new("AA:01")).await);

    session.disconnect().await?;
    assert_eq!(1, radio.disconnects());
    Ok(())
}

#[tokio::test]
async fn missing_connect_capability_blocks_start() {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Immediate);
    let config = SessionConfig::default();
    let denied = CapabilitySet::new([Capability::Connect]);
    let session = EnumerationSession::new(
        radio.clone(),
        Arc::new(StaticProbe::denying(denied)),
        &config,
    );

    let result = session.start(&device("AA:01")).await;

    assert_matches!(result, Err(SessionError::PermissionDenied { missing }) if missing.contains(Capability::Connect));
    assert_eq!(EnumerationState::Idle, session.state());
    assert_eq!(0, radio.connect_calls());
}

#[tokio::test]
async fn waiting_without_a_start_is_rejected() {
    let radio = fake_radio(BLADE_AND_MIXER, ServiceAvailability::Immediate);
    let session = session(&radio);

    let result = session.wait_for_outcome().await;

    assert_matches!(result, Err(SessionError::InvalidTransition { .. }));
}
