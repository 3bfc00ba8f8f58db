//! Flow meter sessions driven by a virtual clock.

use pourlogic::sensors::flow::{
    self, FlowCalibration, FlowMeter, SessionTimeouts, StopReason,
};

use crate::mock_hw::{MockIrq, SimClock, slot_lock};

fn meter() -> FlowMeter<MockIrq> {
    FlowMeter::new(MockIrq::default(), FlowCalibration::default())
}

#[test]
fn pour_stops_at_granted_volume() {
    let _g = slot_lock();
    let mut m = meter();
    let mut clock = SimClock::steady(8);

    let r = m.read_volume(250, SessionTimeouts::default(), &mut clock);
    assert_eq!(r.stop, StopReason::VolumeReached);
    // 250 / 2.16 truncates to 115 pulses; the last poll may overshoot by
    // less than one poll's worth.
    assert!(r.pulses >= 115 && r.pulses < 115 + 8);
    assert!(!m.is_reading());
}

#[test]
fn pour_stops_when_flow_dries_up() {
    let _g = slot_lock();
    let mut m = meter();
    let mut clock = SimClock::scripted(&[5, 5, 5]);
    let timeouts = SessionTimeouts::default();

    let r = m.read_volume(10_000, timeouts, &mut clock);
    assert_eq!(r.stop, StopReason::FlowStopped);
    assert_eq!(r.pulses, 15);
    assert!((r.volume_ml - 15.0 * 2.16).abs() < 1e-3);
    // Last pulse at 750 ms; stopped once more than 2 s passed after it.
    assert!(r.elapsed_ms > 750 + u64::from(timeouts.last_pulse_timeout_ms));
}

#[test]
fn unlimited_pour_runs_to_total_timeout() {
    let _g = slot_lock();
    let mut m = meter();
    let mut clock = SimClock::steady(1);
    let timeouts = SessionTimeouts {
        total_timeout_ms: 5_000,
        ..SessionTimeouts::default()
    };

    let r = m.read_volume(0, timeouts, &mut clock);
    assert_eq!(r.stop, StopReason::TotalTimeout);
    assert!(r.elapsed_ms >= 5_000);
}

#[test]
fn calibration_then_measured_volume_sets_constant() {
    let _g = slot_lock();
    let mut m = meter();
    let mut clock = SimClock::steady(20);

    let run = m.calibrate(200, SessionTimeouts::default(), &mut clock);
    assert!(run.success);
    assert_eq!(run.pulses, 200);

    // 450 mL collected in the jug over 200 pulses.
    let cal = run.calibration_for(450.0).unwrap();
    assert!((cal.ml_per_pulse() - 2.25).abs() < 1e-6);
    m.set_calibration(cal);
    assert_eq!(m.calibration().volume_to_pulses(450.0), 200);
}

#[test]
fn newer_meter_preempts_older_one() {
    let _g = slot_lock();
    let mut a = meter();
    let mut b = meter();

    a.start_reading();
    flow::pulse_isr();
    b.start_reading();
    flow::pulse_isr();
    flow::pulse_isr();

    assert_eq!(flow::active_meter(), Some(b.id()));
    a.stop_reading();
    assert_eq!(flow::active_meter(), Some(b.id()), "stale stop must not release");
    assert_eq!(b.pulse_count(), 2);
    b.stop_reading();
    assert_eq!(flow::active_meter(), None);
}

#[test]
fn dropping_a_reading_meter_releases_the_slot() {
    let _g = slot_lock();
    {
        let mut m = meter();
        m.start_reading();
        assert!(flow::active_meter().is_some());
    }
    assert_eq!(flow::active_meter(), None);
    flow::pulse_isr();
}
