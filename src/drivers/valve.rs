//! Solenoid valve driver.
//!
//! Dumb actuator over any `embedded_hal` output pin.  A normally-closed
//! valve opens on HIGH, a normally-open one on LOW.  A pin error leaves the
//! tracked state unchanged and is logged; the next `close()` retries.

use embedded_hal::digital::OutputPin;
use log::{error, info};

use crate::app::ports::ValvePort;

pub struct SolenoidValve<P: OutputPin> {
    pin: P,
    normally_closed: bool,
    open: bool,
}

impl<P: OutputPin> SolenoidValve<P> {
    /// Normally-closed valve.  Takes ownership of the pin and drives it to
    /// the closed level.
    pub fn new(pin: P) -> Self {
        Self::with_polarity(pin, true)
    }

    pub fn normally_open(pin: P) -> Self {
        Self::with_polarity(pin, false)
    }

    fn with_polarity(pin: P, normally_closed: bool) -> Self {
        let mut valve = Self {
            pin,
            normally_closed,
            open: true,
        };
        valve.close();
        valve
    }

    fn drive(&mut self, open: bool) -> Result<(), P::Error> {
        if open == self.normally_closed {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

impl<P: OutputPin> ValvePort for SolenoidValve<P> {
    fn open(&mut self) {
        match self.drive(true) {
            Ok(()) => {
                self.open = true;
                info!("valve: open");
            }
            Err(e) => error!("valve: open failed: {:?}", e),
        }
    }

    fn close(&mut self) {
        match self.drive(false) {
            Ok(()) => {
                if self.open {
                    info!("valve: closed");
                }
                self.open = false;
            }
            Err(e) => error!("valve: close failed: {:?}", e),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl<P: OutputPin> Drop for SolenoidValve<P> {
    fn drop(&mut self) {
        self.close();
    }
}
