//! The retained block's home at the top of RTC slow memory.
//!
//! RTC slow memory keeps its contents through software resets, watchdog
//! resets and light sleep, and is garbage after power-on. The block is
//! accessed through a raw pointer so the panic handler can still record a
//! reset reason while the duty cycle holds the block.

use core::sync::atomic::{AtomicBool, Ordering};

use stpms_core::retained::{RETAINED_SIZE, ResetReason, RetainedState};

/// Last `RETAINED_SIZE` bytes of RTC slow memory, rounded down to 32 bytes.
const RETAINED_ADDRESS: usize = 0x5000_1FE0;

const _: () = assert!(RETAINED_ADDRESS + RETAINED_SIZE <= 0x5000_2000);

static TAKEN: AtomicBool = AtomicBool::new(false);

fn block() -> *mut RetainedState {
    RETAINED_ADDRESS as *mut RetainedState
}

/// Hands out the block once per boot.
pub fn take() -> Option<&'static mut RetainedState> {
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: the address is reserved for the block, aligned, and only one
    // reference is ever handed out.
    Some(unsafe { &mut *block() })
}

/// Records `reason` for the next boot from a fault or panic handler.
pub fn record_reset_reason(reason: ResetReason) {
    // SAFETY: volatile write of a single byte inside the reserved block.
    unsafe { RetainedState::record_reset_reason(block(), reason) }
}
