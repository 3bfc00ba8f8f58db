//! Application core: pour sequencing, no direct I/O.
//!
//! All interaction with hardware and the network happens through the
//! **port traits** defined in [`ports`] (and the client's `Transport`),
//! keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
