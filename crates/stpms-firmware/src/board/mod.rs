//! Concrete collaborators on ESP32-S3 peripherals.

mod battery;
mod hardware;
mod power;
mod radio;

pub use battery::*;
pub use hardware::*;
pub use power::*;
pub use radio::*;
