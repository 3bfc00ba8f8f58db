//! Actuator and reader drivers plus one-shot hardware initialisation.

pub mod hw_init;
pub mod rfid;
pub mod valve;
