//! Desktop simulator for the stpms tire pressure beacon.
//!
//! Runs the stpms-core duty cycle against host stand-ins for the beacon's
//! hardware: an ILPS22QS register model behind an I2C bus, a battery that
//! drains, a radio that "transmits" into a shared list of frames and timers
//! backed by threads. Faults can be injected to exercise the failure paths,
//! the retained block can be kept in a file across runs and the readings
//! of a run can be captured with postcard.

pub mod capture;
pub mod chip;
pub mod peripherals;
pub mod retained_file;
pub mod simulation;

pub use simulation::{Faults, SimulationOptions, SimulationReport, run};
