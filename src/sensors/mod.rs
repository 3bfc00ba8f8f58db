//! Sensor subsystem.
//!
//! The tap has a single sensor: the hall-effect flow meter in [`flow`].

pub mod flow;
