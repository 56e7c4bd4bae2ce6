//! Retained block kept in a file between simulator runs.
//!
//! A missing or truncated file stands for RAM that lost power: the block
//! reads back as erased flash would, all `0xFF`, and fails validation on
//! the next boot.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use log::{debug, info};

use stpms_core::retained::{RETAINED_SIZE, RetainedState};

/// Contents of retained RAM after a power cycle.
pub fn power_cycled() -> RetainedState {
    RetainedState::from_bytes(&[0xFF; RETAINED_SIZE])
}

pub fn load(path: &Path) -> io::Result<RetainedState> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No retained block at {}, starting cold", path.display());
            return Ok(power_cycled());
        }
        Err(e) => return Err(e),
    };

    match <[u8; RETAINED_SIZE]>::try_from(bytes.as_slice()) {
        Ok(block) => {
            debug!("Retained block loaded from {}", path.display());
            Ok(RetainedState::from_bytes(&block))
        }
        Err(_) => {
            info!(
                "Retained block at {} is {} bytes, expected {}; starting cold",
                path.display(),
                bytes.len(),
                RETAINED_SIZE
            );
            Ok(power_cycled())
        }
    }
}

pub fn save(path: &Path, state: &RetainedState) -> io::Result<()> {
    fs::write(path, state.to_bytes())?;
    debug!("Retained block saved to {}", path.display());
    Ok(())
}
