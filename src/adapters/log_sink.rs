//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured pour events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::{DenyReason, PourEvent};
use crate::app::ports::EventSink;

/// Adapter that logs every [`PourEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &PourEvent) {
        match event {
            PourEvent::Ready { client_id, counter } => {
                info!("READY | client={} counter={}", client_id, counter);
            }
            PourEvent::TagRead(tag) => {
                info!("TAG   | {}", tag);
            }
            PourEvent::Authorized { tag, max_volume_ml } => {
                info!("AUTH  | tag={} max={}mL", tag, max_volume_ml);
            }
            PourEvent::Denied { tag, reason } => match reason {
                DenyReason::Exchange(e) => warn!("DENY  | tag={} exchange: {}", tag, e),
                DenyReason::ZeroGrant => warn!("DENY  | tag={} granted 0 mL", tag),
            },
            PourEvent::PourFinished {
                tag,
                volume_ml,
                pulses,
                stop,
            } => {
                info!(
                    "POUR  | tag={} volume={:.2}mL pulses={} stop={:?}",
                    tag, volume_ml, pulses, stop
                );
            }
            PourEvent::ReportAccepted { tag, volume_ml } => {
                info!("REPORT| tag={} volume={:.2}mL accepted", tag, volume_ml);
            }
            PourEvent::ReportFailed {
                tag,
                volume_ml,
                error,
            } => {
                warn!(
                    "REPORT| tag={} volume={:.2}mL failed: {}",
                    tag, volume_ml, error
                );
            }
            PourEvent::CalibrationFinished(run) => {
                info!(
                    "CALIB | success={} pulses={}/{} elapsed={}ms stop={:?}",
                    run.success, run.pulses, run.target_pulses, run.elapsed_ms, run.stop
                );
            }
        }
    }
}
