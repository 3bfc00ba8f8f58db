//! Full pour cycles through `PourStation` with mock adapters.

use pourlogic::app::events::{DenyReason, PourEvent};
use pourlogic::app::service::{PourOutcome, PourStation};
use pourlogic::client::ExchangeError;
use pourlogic::config::SystemConfig;
use pourlogic::sensors::flow::{FlowCalibration, FlowMeter, StopReason};

use crate::mock_hw::{
    Eeprom, MockIrq, MockServer, MockTagReader, MockValve, RecordingSink, SimClock, client_with,
    slot_lock,
};

type Station = PourStation<Eeprom, MockServer, MockIrq, MockValve, MockTagReader>;

fn station(server: MockServer, tags: &[&str]) -> Station {
    PourStation::new(
        client_with(server),
        FlowMeter::new(MockIrq::default(), FlowCalibration::default()),
        MockValve::default(),
        MockTagReader::with(tags),
        &SystemConfig::default(),
    )
}

#[test]
fn granted_pour_is_measured_and_reported() {
    let _g = slot_lock();
    let mut s = station(MockServer::granting(&[200]), &["0415AB12CD"]);
    let mut clock = SimClock::steady(10);
    let mut sink = RecordingSink::default();

    let cycle = s.run_cycle(&mut clock, &mut sink).unwrap();
    let PourOutcome::Poured {
        max_volume_ml,
        reading,
        report,
    } = &cycle.outcome
    else {
        panic!("expected a pour: {:?}", cycle.outcome);
    };
    assert_eq!(*max_volume_ml, 200);
    assert_eq!(reading.stop, StopReason::VolumeReached);
    assert_eq!(*report, Ok(()));
    assert!(!s.valve().open);

    let server = s.client().transport();
    assert_eq!(server.received.len(), 2);
    assert_eq!(
        server.received[1].body,
        format!("u=0415AB12CD&v={:.2}", reading.volume_ml)
    );

    let kinds: Vec<&str> = sink
        .events
        .iter()
        .map(|e| match e {
            PourEvent::TagRead(_) => "tag",
            PourEvent::Authorized { .. } => "auth",
            PourEvent::PourFinished { .. } => "pour",
            PourEvent::ReportAccepted { .. } => "report",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, ["tag", "auth", "pour", "report"]);
}

#[test]
fn user_without_credit_never_opens_the_valve() {
    let _g = slot_lock();
    let mut s = station(MockServer::granting(&[0]), &["0415AB12CD"]);
    let mut clock = SimClock::steady(10);
    let mut sink = RecordingSink::default();

    let cycle = s.run_cycle(&mut clock, &mut sink).unwrap();
    assert_eq!(cycle.outcome, PourOutcome::Denied(DenyReason::ZeroGrant));
    assert_eq!(s.valve().opens, 0);
    // Only the pour request went out.
    assert_eq!(s.client().transport().received.len(), 1);
}

#[test]
fn unreachable_server_denies_pour() {
    let _g = slot_lock();
    let mut server = MockServer::granting(&[200]);
    server.refuse_connect = true;
    let mut s = station(server, &["0415AB12CD"]);
    let mut clock = SimClock::steady(10);
    let mut sink = RecordingSink::default();

    let cycle = s.run_cycle(&mut clock, &mut sink).unwrap();
    assert_eq!(
        cycle.outcome,
        PourOutcome::Denied(DenyReason::Exchange(ExchangeError::Connect))
    );
    assert_eq!(s.valve().opens, 0);
    assert_eq!(s.client().counter(), 0);
}

#[test]
fn consecutive_pours_use_fresh_counters() {
    let _g = slot_lock();
    let mut s = station(
        MockServer::granting(&[50, 60]),
        &["AAAAAAAAAA", "BBBBBBBBBB"],
    );
    let mut sink = RecordingSink::default();

    for _ in 0..2 {
        let mut clock = SimClock::steady(4);
        let cycle = s.run_cycle(&mut clock, &mut sink).unwrap();
        assert!(matches!(cycle.outcome, PourOutcome::Poured { report: Ok(()), .. }));
    }
    assert!(s.run_cycle(&mut SimClock::steady(0), &mut sink).is_none());

    let counters: Vec<u32> = s
        .client()
        .transport()
        .received
        .iter()
        .map(|r| r.counter)
        .collect();
    assert_eq!(counters, vec![1, 2, 3, 4]);
    assert_eq!(s.valve().opens, 2);
}

#[test]
fn tap_left_open_without_flow_closes_on_timeout() {
    let _g = slot_lock();
    let mut s = station(MockServer::granting(&[500]), &["0415AB12CD"]);
    let mut clock = SimClock::scripted(&[3]);
    let mut sink = RecordingSink::default();

    let cycle = s.run_cycle(&mut clock, &mut sink).unwrap();
    let PourOutcome::Poured { reading, .. } = cycle.outcome else {
        panic!("expected a pour");
    };
    assert_eq!(reading.stop, StopReason::FlowStopped);
    assert_eq!(reading.pulses, 3);
    assert!(!s.valve().open);
}
