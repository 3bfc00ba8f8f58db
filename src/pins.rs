//! GPIO / peripheral pin assignments for the PourLogic tap board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Flow sensor
// ---------------------------------------------------------------------------

/// Hall-effect flow sensor pulse output, rising-edge interrupt.
pub const FLOW_PULSE_GPIO: i32 = 6;

// ---------------------------------------------------------------------------
// Solenoid valve (MOSFET low-side switch)
// ---------------------------------------------------------------------------

/// Digital output: HIGH = valve open.
pub const VALVE_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// RFID reader (EM4100 serial module)
// ---------------------------------------------------------------------------

/// Digital output: reader enable, active LOW.
pub const RFID_ENABLE_GPIO: i32 = 2;
/// UART RX from the reader's serial output.
pub const RFID_RX_GPIO: i32 = 18;
/// UART TX (unused by the reader, routed for the driver).
pub const RFID_TX_GPIO: i32 = 17;
/// Reader serial rate.
pub const RFID_BAUD: u32 = 2_400;
