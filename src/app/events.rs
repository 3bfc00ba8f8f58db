//! Outbound application events.
//!
//! The [`PourStation`](super::service::PourStation) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, drive a display, etc.

use crate::client::ExchangeError;
use crate::sensors::flow::{CalibrationRun, StopReason};

use super::ports::RfidTag;

/// Why a pour was refused before the valve opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The pour-request exchange failed or could not be authenticated.
    Exchange(ExchangeError),
    /// The server authenticated the request but granted 0 mL.
    ZeroGrant,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum PourEvent {
    /// The station finished booting and is waiting for a tag.
    Ready { client_id: u32, counter: u32 },

    /// A tag was read and a pour request is about to be sent.
    TagRead(RfidTag),

    /// The server granted a pour of up to `max_volume_ml`.
    Authorized { tag: RfidTag, max_volume_ml: u32 },

    /// The pour was refused; the valve stayed closed.
    Denied { tag: RfidTag, reason: DenyReason },

    /// The valve closed after a measurement session.
    PourFinished {
        tag: RfidTag,
        volume_ml: f32,
        pulses: u32,
        stop: StopReason,
    },

    /// The pour result was acknowledged with a valid signature.
    ReportAccepted { tag: RfidTag, volume_ml: f32 },

    /// The pour result could not be delivered or was not acknowledged.
    ReportFailed {
        tag: RfidTag,
        volume_ml: f32,
        error: ExchangeError,
    },

    /// A calibration run completed (successfully or not).
    CalibrationFinished(CalibrationRun),
}
