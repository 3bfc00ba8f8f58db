//! Application service: the pour station.
//!
//! [`PourStation`] sequences one pour: tag → authorised grant → valve open
//! → bounded measurement → valve closed → signed report.  It owns the
//! client, the flow meter, the valve and the tag reader; the clock and the
//! event sink are injected at call sites so the whole cycle runs against
//! mock adapters in tests.
//!
//! ```text
//!  TagReader ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                │       PourStation        │
//!  ValvePort ◀── │ client · meter · timeouts│ ◀─▶ Transport
//!                └──────────────────────────┘
//! ```

use log::{info, warn};

use crate::app::ports::{ByteStore, Clock, EventSink, PulseInterrupt, RfidTag, TagReader, ValvePort};
use crate::client::transport::Transport;
use crate::client::{ExchangeError, PourLogicClient};
use crate::config::SystemConfig;
use crate::error::{Error, Result};
use crate::sensors::flow::{CalibrationRun, FlowCalibration, FlowMeter, SessionTimeouts, VolumeReading};

use super::events::{DenyReason, PourEvent};

/// What happened to a tag presented at the tap.
#[derive(Debug, Clone, PartialEq)]
pub enum PourOutcome {
    /// Refused before the valve opened.
    Denied(DenyReason),
    /// The valve opened; `report` is the result of the pour-result exchange.
    Poured {
        max_volume_ml: u32,
        reading: VolumeReading,
        report: core::result::Result<(), ExchangeError>,
    },
}

/// Summary of one [`PourStation::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct PourCycle {
    pub tag: RfidTag,
    pub outcome: PourOutcome,
}

impl PourCycle {
    /// Volume dispensed, 0 when denied.
    pub fn volume_ml(&self) -> f32 {
        match &self.outcome {
            PourOutcome::Denied(_) => 0.0,
            PourOutcome::Poured { reading, .. } => reading.volume_ml,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PourStation
// ───────────────────────────────────────────────────────────────

pub struct PourStation<S, T, I, V, R>
where
    S: ByteStore,
    T: Transport,
    I: PulseInterrupt,
    V: ValvePort,
    R: TagReader,
{
    client: PourLogicClient<S, T>,
    meter: FlowMeter<I>,
    valve: V,
    reader: R,
    timeouts: SessionTimeouts,
    rfid_timeout_ms: u32,
    calibration_pulses: u32,
}

impl<S, T, I, V, R> PourStation<S, T, I, V, R>
where
    S: ByteStore,
    T: Transport,
    I: PulseInterrupt,
    V: ValvePort,
    R: TagReader,
{
    /// Timeouts and the calibration target are taken from `config`; the
    /// meter keeps the calibration it was built with.
    pub fn new(
        client: PourLogicClient<S, T>,
        meter: FlowMeter<I>,
        mut valve: V,
        reader: R,
        config: &SystemConfig,
    ) -> Self {
        valve.close();
        Self {
            client,
            meter,
            valve,
            reader,
            timeouts: config.session_timeouts(),
            rfid_timeout_ms: config.rfid_timeout_ms,
            calibration_pulses: config.calibration_pulses,
        }
    }

    pub fn client(&self) -> &PourLogicClient<S, T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut PourLogicClient<S, T> {
        &mut self.client
    }

    pub fn meter(&self) -> &FlowMeter<I> {
        &self.meter
    }

    pub fn valve(&self) -> &V {
        &self.valve
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce that the station is waiting for tags.
    pub fn announce_ready(&self, sink: &mut impl EventSink) {
        sink.emit(&PourEvent::Ready {
            client_id: self.client.client_id(),
            counter: self.client.counter(),
        });
    }

    // ── Pour cycle ────────────────────────────────────────────

    /// Wait for a tag and run one pour for it.
    ///
    /// Returns `None` when no tag was read before the RFID timeout.  The
    /// valve is closed on every path out of this function.
    pub fn run_cycle(&mut self, clock: &mut impl Clock, sink: &mut impl EventSink) -> Option<PourCycle> {
        let tag = self.reader.read_tag(self.rfid_timeout_ms)?;
        info!("station: tag {}", tag);
        sink.emit(&PourEvent::TagRead(tag.clone()));
        Some(self.pour_for(tag, clock, sink))
    }

    /// Run one pour for an already-read tag.
    pub fn pour_for(&mut self, tag: RfidTag, clock: &mut impl Clock, sink: &mut impl EventSink) -> PourCycle {
        let max_volume_ml = match self.client.request_max_volume(&tag) {
            Ok(0) => return self.deny(tag, DenyReason::ZeroGrant, sink),
            Ok(ml) => ml,
            Err(e) => return self.deny(tag, DenyReason::Exchange(e), sink),
        };
        sink.emit(&PourEvent::Authorized {
            tag: tag.clone(),
            max_volume_ml,
        });

        self.valve.open();
        let reading = self.meter.read_volume(max_volume_ml, self.timeouts, clock);
        self.valve.close();

        sink.emit(&PourEvent::PourFinished {
            tag: tag.clone(),
            volume_ml: reading.volume_ml,
            pulses: reading.pulses,
            stop: reading.stop,
        });

        let report = self.client.report_poured_volume(&tag, reading.volume_ml);
        match report {
            Ok(()) => sink.emit(&PourEvent::ReportAccepted {
                tag: tag.clone(),
                volume_ml: reading.volume_ml,
            }),
            Err(error) => {
                warn!("station: report for {} failed: {}", tag, error);
                sink.emit(&PourEvent::ReportFailed {
                    tag: tag.clone(),
                    volume_ml: reading.volume_ml,
                    error,
                });
            }
        }

        PourCycle {
            tag,
            outcome: PourOutcome::Poured {
                max_volume_ml,
                reading,
                report,
            },
        }
    }

    fn deny(&mut self, tag: RfidTag, reason: DenyReason, sink: &mut impl EventSink) -> PourCycle {
        warn!("station: denied {} ({:?})", tag, reason);
        self.valve.close();
        sink.emit(&PourEvent::Denied {
            tag: tag.clone(),
            reason,
        });
        PourCycle {
            tag,
            outcome: PourOutcome::Denied(reason),
        }
    }

    // ── Calibration ───────────────────────────────────────────

    /// Open the valve and count pulses until the configured calibration
    /// target is reached or the flow stops.
    pub fn calibrate(&mut self, clock: &mut impl Clock, sink: &mut impl EventSink) -> CalibrationRun {
        info!("station: calibration run, target {} pulses", self.calibration_pulses);
        self.valve.open();
        let run = self.meter.calibrate(self.calibration_pulses, self.timeouts, clock);
        self.valve.close();
        sink.emit(&PourEvent::CalibrationFinished(run));
        run
    }

    /// Adopt the calibration implied by `measured_volume_ml` collected
    /// during `run`.
    pub fn apply_calibration(&mut self, run: &CalibrationRun, measured_volume_ml: f32) -> Result<FlowCalibration> {
        let calibration = run
            .calibration_for(measured_volume_ml)
            .ok_or(Error::Calibration)?;
        info!(
            "station: calibration {:.4} mL/pulse ({} mL over {} pulses)",
            calibration.ml_per_pulse(),
            measured_volume_ml,
            run.pulses
        );
        self.meter.set_calibration(calibration);
        Ok(calibration)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
