//! Hall-effect flow meter: interrupt-driven pulse accumulator and the
//! bounded volume measurement loop.
//!
//! The sensor emits one rising edge per `ml_per_pulse` millilitres
//! (2.16 mL for the stock tap sensor).  The GPIO ISR calls [`pulse_isr`],
//! which bumps the count held in a single process-wide slot.  Exactly one
//! [`FlowMeter`] owns that slot at a time; it claims it in
//! [`FlowMeter::start_reading`] and releases it in
//! [`FlowMeter::stop_reading`].
//!
//! The slot lives behind a `critical_section::Mutex` rather than an
//! atomic because the owner tag and the count must change together: a
//! meter that was preempted by a newer one must never see (or clear) the
//! newer meter's count.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use log::{debug, info, warn};

use crate::app::ports::{Clock, PulseInterrupt};

// ── Defaults ─────────────────────────────────────────────────

/// Calibration of the stock tap sensor.
pub const DEFAULT_ML_PER_PULSE: f32 = 2.16;
/// Flow is considered stopped after this long without a new pulse.
pub const DEFAULT_LAST_PULSE_TIMEOUT_MS: u32 = 2_000;
/// Hard cap on a single measurement session.
pub const DEFAULT_TOTAL_TIMEOUT_MS: u32 = 30_000;
/// Delay between snapshots of the pulse count.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 250;
/// Pulses a calibration run must observe to succeed.
pub const DEFAULT_CALIBRATION_PULSES: u32 = 200;

// ── Process-wide active slot ─────────────────────────────────

/// Opaque identity of a [`FlowMeter`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterId(u32);

#[derive(Debug, Clone, Copy)]
struct ActiveSlot {
    owner: MeterId,
    pulses: u32,
}

static ACTIVE: Mutex<Cell<Option<ActiveSlot>>> = Mutex::new(Cell::new(None));
static NEXT_METER_ID: AtomicU32 = AtomicU32::new(1);

/// Rising-edge handler.  Registered on the flow GPIO interrupt.
///
/// Increments the active meter's count; a no-op when no meter is reading.
/// Never allocates and holds the critical section only for the update.
pub fn pulse_isr() {
    critical_section::with(|cs| {
        let cell = ACTIVE.borrow(cs);
        if let Some(mut slot) = cell.get() {
            slot.pulses = slot.pulses.saturating_add(1);
            cell.set(Some(slot));
        }
    });
}

/// The meter currently receiving pulses, if any.
pub fn active_meter() -> Option<MeterId> {
    critical_section::with(|cs| ACTIVE.borrow(cs).get().map(|slot| slot.owner))
}

// ── Calibration ──────────────────────────────────────────────

/// Conversion between pulses and millilitres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowCalibration {
    ml_per_pulse: f32,
}

impl FlowCalibration {
    /// `None` unless `ml_per_pulse` is finite and strictly positive.
    pub fn new(ml_per_pulse: f32) -> Option<Self> {
        (ml_per_pulse.is_finite() && ml_per_pulse > 0.0).then_some(Self { ml_per_pulse })
    }

    /// Derive the constant from a calibration pour: `volume_ml` was
    /// dispensed while `pulses` edges were counted.
    pub fn from_measurement(volume_ml: f32, pulses: u32) -> Option<Self> {
        if pulses == 0 {
            return None;
        }
        Self::new(volume_ml / pulses as f32)
    }

    pub fn ml_per_pulse(&self) -> f32 {
        self.ml_per_pulse
    }

    /// Pulses needed to reach `volume_ml`, truncated so that converting
    /// back never exceeds the requested volume.
    pub fn volume_to_pulses(&self, volume_ml: f32) -> u32 {
        if volume_ml.is_nan() || volume_ml <= 0.0 {
            return 0;
        }
        // `as` saturates at u32::MAX and truncates toward zero.
        let mut pulses = (volume_ml / self.ml_per_pulse) as u32;
        // The division can round up across an integer boundary.
        while pulses > 0 && self.pulses_to_volume(pulses) > volume_ml {
            pulses -= 1;
        }
        pulses
    }

    pub fn pulses_to_volume(&self, pulses: u32) -> f32 {
        pulses as f32 * self.ml_per_pulse
    }
}

impl Default for FlowCalibration {
    fn default() -> Self {
        Self {
            ml_per_pulse: DEFAULT_ML_PER_PULSE,
        }
    }
}

// ── Measurement results ──────────────────────────────────────

/// Why a measurement session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The pulse target (maximum volume or calibration count) was reached.
    VolumeReached,
    /// No new pulse arrived within the last-pulse timeout.
    FlowStopped,
    /// The session ran for the full total timeout.
    TotalTimeout,
}

/// Outcome of [`FlowMeter::read_volume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeReading {
    pub pulses: u32,
    pub volume_ml: f32,
    pub stop: StopReason,
    pub elapsed_ms: u64,
}

/// Outcome of [`FlowMeter::calibrate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRun {
    pub target_pulses: u32,
    pub pulses: u32,
    pub stop: StopReason,
    pub elapsed_ms: u64,
    /// Only set when the target was reached.
    pub success: bool,
}

impl CalibrationRun {
    /// Calibration constant implied by measuring `volume_ml` in a jug
    /// after this run.  `None` for failed or empty runs.
    pub fn calibration_for(&self, volume_ml: f32) -> Option<FlowCalibration> {
        if !self.success {
            return None;
        }
        FlowCalibration::from_measurement(volume_ml, self.pulses)
    }
}

/// Thresholds shared by volume reads and calibration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub last_pulse_timeout_ms: u32,
    pub total_timeout_ms: u32,
    pub poll_interval_ms: u32,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            last_pulse_timeout_ms: DEFAULT_LAST_PULSE_TIMEOUT_MS,
            total_timeout_ms: DEFAULT_TOTAL_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

// ── FlowMeter ────────────────────────────────────────────────

/// Pulse accumulator bound to one flow sensor interrupt.
pub struct FlowMeter<I: PulseInterrupt> {
    id: MeterId,
    irq: I,
    calibration: FlowCalibration,
    /// Final count of the last finished session.
    pulses: u32,
}

impl<I: PulseInterrupt> FlowMeter<I> {
    pub fn new(irq: I, calibration: FlowCalibration) -> Self {
        Self {
            id: MeterId(NEXT_METER_ID.fetch_add(1, Ordering::Relaxed)),
            irq,
            calibration,
            pulses: 0,
        }
    }

    pub fn id(&self) -> MeterId {
        self.id
    }

    pub fn calibration(&self) -> FlowCalibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: FlowCalibration) {
        self.calibration = calibration;
    }

    /// Zero the count, claim the active slot and enable the interrupt.
    ///
    /// A meter that was still active loses the slot; its own count stays
    /// at whatever it had stored before.
    pub fn start_reading(&mut self) {
        self.pulses = 0;
        let previous = critical_section::with(|cs| {
            ACTIVE.borrow(cs).replace(Some(ActiveSlot {
                owner: self.id,
                pulses: 0,
            }))
        });
        if let Some(prev) = previous.filter(|slot| slot.owner != self.id) {
            warn!("flow: meter {:?} preempted meter {:?}", self.id, prev.owner);
        }
        self.irq.attach();
    }

    /// Disable the interrupt and release the slot if this meter owns it.
    ///
    /// Safe to call twice; a stale stop never clears a newer owner.
    pub fn stop_reading(&mut self) {
        self.irq.detach();
        let released = critical_section::with(|cs| {
            let cell = ACTIVE.borrow(cs);
            match cell.get() {
                Some(slot) if slot.owner == self.id => {
                    cell.set(None);
                    Some(slot.pulses)
                }
                _ => None,
            }
        });
        if let Some(pulses) = released {
            self.pulses = pulses;
        }
    }

    /// Whether this meter currently owns the active slot.
    pub fn is_reading(&self) -> bool {
        active_meter() == Some(self.id)
    }

    /// Consistent snapshot of the count: live while reading, otherwise
    /// the final count of the last session.
    pub fn pulse_count(&self) -> u32 {
        critical_section::with(|cs| match ACTIVE.borrow(cs).get() {
            Some(slot) if slot.owner == self.id => slot.pulses,
            _ => self.pulses,
        })
    }

    pub fn volume_ml(&self) -> f32 {
        self.calibration.pulses_to_volume(self.pulse_count())
    }

    /// Run one bounded pour measurement.
    ///
    /// Ends on the first of: `max_volume_ml` reached (ignored when 0), no
    /// pulse for longer than the last-pulse timeout, or the total timeout.
    /// The checks run in that order each poll, so a volume target reached
    /// in the same poll as a timeout reports `VolumeReached`.
    pub fn read_volume(
        &mut self,
        max_volume_ml: u32,
        timeouts: SessionTimeouts,
        clock: &mut impl Clock,
    ) -> VolumeReading {
        let target = (max_volume_ml > 0)
            .then(|| self.calibration.volume_to_pulses(max_volume_ml as f32));
        debug!("flow: read_volume max={}mL target={:?} pulses", max_volume_ml, target);

        let (pulses, stop, elapsed_ms) = self.run_session(target, timeouts, clock);
        let volume_ml = self.calibration.pulses_to_volume(pulses);
        info!(
            "flow: {:.2}mL ({} pulses) in {}ms, {:?}",
            volume_ml, pulses, elapsed_ms, stop
        );

        VolumeReading {
            pulses,
            volume_ml,
            stop,
            elapsed_ms,
        }
    }

    /// Count pulses until `target_pulses` is reached or flow stops.
    pub fn calibrate(
        &mut self,
        target_pulses: u32,
        timeouts: SessionTimeouts,
        clock: &mut impl Clock,
    ) -> CalibrationRun {
        let (pulses, stop, elapsed_ms) = self.run_session(Some(target_pulses), timeouts, clock);
        let success = stop == StopReason::VolumeReached;
        if success {
            info!("flow: calibration reached {} pulses in {}ms", pulses, elapsed_ms);
        } else {
            warn!(
                "flow: calibration ended at {}/{} pulses ({:?})",
                pulses, target_pulses, stop
            );
        }

        CalibrationRun {
            target_pulses,
            pulses,
            stop,
            elapsed_ms,
            success,
        }
    }

    fn run_session(
        &mut self,
        target: Option<u32>,
        timeouts: SessionTimeouts,
        clock: &mut impl Clock,
    ) -> (u32, StopReason, u64) {
        self.start_reading();

        let start_ms = clock.now_ms();
        let mut last_pulse_ms = start_ms;
        let mut previous = 0;

        let stop = loop {
            let now = clock.now_ms();
            let count = self.pulse_count();
            if count > previous {
                last_pulse_ms = now;
                previous = count;
            }

            if target.is_some_and(|t| count >= t) {
                break StopReason::VolumeReached;
            }
            if now.saturating_sub(last_pulse_ms) > u64::from(timeouts.last_pulse_timeout_ms) {
                break StopReason::FlowStopped;
            }
            if now.saturating_sub(start_ms) >= u64::from(timeouts.total_timeout_ms) {
                break StopReason::TotalTimeout;
            }

            clock.sleep_ms(timeouts.poll_interval_ms);
        };

        self.stop_reading();
        let elapsed_ms = clock.now_ms().saturating_sub(start_ms);
        (self.pulses, stop, elapsed_ms)
    }
}

impl<I: PulseInterrupt> Drop for FlowMeter<I> {
    fn drop(&mut self) {
        self.stop_reading();
    }
}

/// Serialises unit tests that touch the process-wide slot.
#[cfg(test)]
pub(crate) fn slot_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────
