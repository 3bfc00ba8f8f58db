//! EM4100 125 kHz RFID reader (serial output module).
//!
//! The module streams each tag as a 12-byte frame at 2400 baud:
//!
//! ```text
//! 0x0A  <10 ASCII hex digits>  0x0D
//! ```
//!
//! The reader is enabled by pulling /ENABLE low.  It keeps repeating the
//! frame while a tag is in the field, so the driver disables it as soon as
//! one complete frame is buffered and then drains whatever is still queued
//! in the UART, otherwise the next read would return a stale tag.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::{Clock, RfidTag, TagReader};

/// Characters in a tag identifier.
pub const TAG_LEN: usize = 10;
/// First byte of a frame.
pub const FRAME_START: u8 = 0x0A;
/// Last byte of a frame.
pub const FRAME_END: u8 = 0x0D;

/// Per-byte wait while a read is in progress.
const BYTE_WAIT_MS: u32 = 20;
/// Quiet period that ends the post-read drain.
const DRAIN_QUIET_MS: u32 = 50;
/// Upper bound on bytes discarded by one drain.
const DRAIN_MAX_BYTES: usize = 256;

/// Byte-at-a-time serial input.
pub trait SerialRx {
    /// Next byte, or `None` if nothing arrived within `timeout_ms`.
    fn read_byte(&mut self, timeout_ms: u32) -> Option<u8>;
}

#[cfg(target_os = "espidf")]
impl SerialRx for esp_idf_svc::hal::uart::UartDriver<'_> {
    fn read_byte(&mut self, timeout_ms: u32) -> Option<u8> {
        let mut buf = [0u8; 1];
        let ticks = esp_idf_svc::hal::delay::TickType::new_millis(u64::from(timeout_ms)).ticks();
        match self.read(&mut buf, ticks) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }
}

// ── Frame parser ─────────────────────────────────────────────

/// Incremental frame parser.  Feed it bytes; it yields a tag when a
/// well-formed frame ends.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: RfidTag,
    in_frame: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the payload holds a full tag and only the end byte is
    /// outstanding.
    pub fn payload_complete(&self) -> bool {
        self.in_frame && self.buf.len() == TAG_LEN
    }

    pub fn push(&mut self, byte: u8) -> Option<RfidTag> {
        match byte {
            FRAME_START => {
                self.buf.clear();
                self.in_frame = true;
                None
            }
            FRAME_END if self.in_frame => {
                let complete = self.buf.len() == TAG_LEN;
                self.in_frame = false;
                let tag = core::mem::take(&mut self.buf);
                complete.then_some(tag)
            }
            b if self.in_frame && b.is_ascii_alphanumeric() => {
                if self.buf.push(char::from(b)).is_err() {
                    // Payload longer than a tag: not a frame.
                    self.reset();
                }
                None
            }
            _ => {
                self.reset();
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
    }
}

// ── Reader ───────────────────────────────────────────────────

pub struct Em4100Reader<P: OutputPin, U: SerialRx, C: Clock> {
    enable: P,
    uart: U,
    clock: C,
}

impl<P: OutputPin, U: SerialRx, C: Clock> Em4100Reader<P, U, C> {
    /// Takes the /ENABLE pin and the UART; the reader starts disabled.
    pub fn new(enable: P, uart: U, clock: C) -> Self {
        let mut reader = Self {
            enable,
            uart,
            clock,
        };
        reader.disable();
        reader
    }

    pub fn enable(&mut self) {
        if let Err(e) = self.enable.set_low() {
            warn!("rfid: enable failed: {:?}", e);
        }
    }

    pub fn disable(&mut self) {
        if let Err(e) = self.enable.set_high() {
            warn!("rfid: disable failed: {:?}", e);
        }
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    fn drain(&mut self) {
        let mut dropped = 0usize;
        while dropped < DRAIN_MAX_BYTES && self.uart.read_byte(DRAIN_QUIET_MS).is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("rfid: drained {} trailing bytes", dropped);
        }
    }
}

impl<P: OutputPin, U: SerialRx, C: Clock> TagReader for Em4100Reader<P, U, C> {
    /// `timeout_ms == 0` waits indefinitely.
    fn read_tag(&mut self, timeout_ms: u32) -> Option<RfidTag> {
        let start = self.clock.now_ms();
        let mut parser = FrameParser::new();
        let mut tag = None;

        self.enable();
        while timeout_ms == 0 || self.clock.now_ms().saturating_sub(start) < u64::from(timeout_ms) {
            let Some(byte) = self.uart.read_byte(BYTE_WAIT_MS) else {
                continue;
            };
            tag = parser.push(byte);
            if parser.payload_complete() {
                self.disable();
            }
            if tag.is_some() {
                break;
            }
        }
        self.disable();
        self.drain();

        if let Some(t) = &tag {
            debug!("rfid: read tag {}", t);
        }
        tag
    }
}
