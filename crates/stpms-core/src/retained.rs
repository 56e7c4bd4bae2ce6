//! State that survives a processor reset.
//!
//! The block lives in memory the platform does not clear on reset (RTC slow
//! memory on the ESP32-S3, a file in the simulator). After a power-up its
//! contents are garbage, so every field is a plain integer: any bit pattern
//! is a valid `RetainedState`, and validity is decided by the init marker.
//!
//! Binary format (little-endian, 20 bytes):
//! - init_marker: 4 bytes (u32)
//! - last_pressure: 2 bytes (u16, mbar)
//! - last_temperature: 2 bytes (i16, centi-degrees)
//! - last_voltage: 2 bytes (u16, mV)
//! - uptime_hours: 2 bytes (u16)
//! - reset_count: 1 byte
//! - padding: 1 byte
//! - measure_count: 2 bytes (u16)
//! - pending_reset_reason: 1 byte
//! - padding: 1 byte
//! - working_seconds: 2 bytes (u16)

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Marks a retained block written by this firmware.
pub const INIT_MARKER: u32 = 0x3105_3105;

/// Size of [`RetainedState`] in bytes.
pub const RETAINED_SIZE: usize = 20;

const SECONDS_PER_HOUR: u16 = 3600;

/// Why the processor last started, as carried in the payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResetReason {
    #[default]
    Unknown = 0,
    Powerup = 1,
    Watchdog = 2,
    SoftReset = 3,
    Brownout = 4,
    HardFault = 5,
    BusFault = 6,
    UsageFault = 7,
    MemManage = 8,
    Nmi = 9,
    Panic = 10,
    AdvFail = 11,
    RadioInit = 12,
    BusInit = 13,
    SensorInit = 14,
    SystemInit = 15,
}

impl ResetReason {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Unrecognised codes decode as [`ResetReason::Unknown`].
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ResetReason::Powerup,
            2 => ResetReason::Watchdog,
            3 => ResetReason::SoftReset,
            4 => ResetReason::Brownout,
            5 => ResetReason::HardFault,
            6 => ResetReason::BusFault,
            7 => ResetReason::UsageFault,
            8 => ResetReason::MemManage,
            9 => ResetReason::Nmi,
            10 => ResetReason::Panic,
            11 => ResetReason::AdvFail,
            12 => ResetReason::RadioInit,
            13 => ResetReason::BusInit,
            14 => ResetReason::SensorInit,
            15 => ResetReason::SystemInit,
            _ => ResetReason::Unknown,
        }
    }
}

impl From<u8> for ResetReason {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

/// Raw layout of the retained block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetainedState {
    init_marker: u32,
    pub last_pressure: u16,
    pub last_temperature: i16,
    pub last_voltage: u16,
    pub uptime_hours: u16,
    pub reset_count: u8,
    _padding0: u8,
    pub measure_count: u16,
    pending_reset_reason: u8,
    _padding1: u8,
    pub working_seconds: u16,
}

const _: () = assert!(core::mem::size_of::<RetainedState>() == RETAINED_SIZE);

impl RetainedState {
    pub const ZEROED: Self = Self {
        init_marker: 0,
        last_pressure: 0,
        last_temperature: 0,
        last_voltage: 0,
        uptime_hours: 0,
        reset_count: 0,
        _padding0: 0,
        measure_count: 0,
        pending_reset_reason: 0,
        _padding1: 0,
        working_seconds: 0,
    };

    pub const fn is_initialized(&self) -> bool {
        self.init_marker == INIT_MARKER
    }

    pub const fn pending_reset_reason(&self) -> ResetReason {
        ResetReason::from_u8(self.pending_reset_reason)
    }

    /// Records `reason` through a raw pointer.
    ///
    /// Used from fault and panic handlers that cannot borrow the block
    /// while the duty cycle holds it.
    ///
    /// # Safety
    /// `state` must point to a live, aligned `RetainedState`.
    pub unsafe fn record_reset_reason(state: *mut RetainedState, reason: ResetReason) {
        unsafe {
            core::ptr::addr_of_mut!((*state).pending_reset_reason).write_volatile(reason.as_u8());
        }
    }

    /// Converts the block to its byte layout.
    pub fn to_bytes(&self) -> [u8; RETAINED_SIZE] {
        let mut bytes = [0u8; RETAINED_SIZE];
        bytes[0..4].copy_from_slice(&self.init_marker.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.last_pressure.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.last_temperature.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.last_voltage.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.uptime_hours.to_le_bytes());
        bytes[12] = self.reset_count;
        bytes[14..16].copy_from_slice(&self.measure_count.to_le_bytes());
        bytes[16] = self.pending_reset_reason;
        bytes[18..20].copy_from_slice(&self.working_seconds.to_le_bytes());
        bytes
    }

    /// Creates a block from its byte layout. Any input is accepted.
    pub fn from_bytes(bytes: &[u8; RETAINED_SIZE]) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        Self {
            init_marker: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            last_pressure: u16_at(4),
            last_temperature: i16::from_le_bytes([bytes[6], bytes[7]]),
            last_voltage: u16_at(8),
            uptime_hours: u16_at(10),
            reset_count: bytes[12],
            _padding0: 0,
            measure_count: u16_at(14),
            pending_reset_reason: bytes[16],
            _padding1: 0,
            working_seconds: u16_at(18),
        }
    }
}

/// Outcome of boot-time validation of the retained block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// Recorded reason if one was pending, otherwise the hardware cause.
    pub reason: ResetReason,
    pub reset_count: u8,
    /// The block was invalid and has been reinitialized.
    pub fresh: bool,
}

/// Exclusive handle to the retained block.
pub struct RetainedStore<'a> {
    state: &'a mut RetainedState,
}

impl<'a> RetainedStore<'a> {
    pub fn new(state: &'a mut RetainedState) -> Self {
        Self { state }
    }

    /// Validates the block, counts the reset and resolves why we started.
    ///
    /// An invalid block is treated as a power-up: it is zeroed, marked valid
    /// and its pending reason set to [`ResetReason::Powerup`]. A valid block
    /// has its reset counter bumped. The pending reason is consumed either way.
    pub fn on_boot(&mut self, hardware_cause: ResetReason) -> BootReport {
        let fresh = !self.state.is_initialized();
        if fresh {
            info!("Retained state invalid, initializing");
            *self.state = RetainedState::ZEROED;
            self.state.init_marker = INIT_MARKER;
            self.state.pending_reset_reason = ResetReason::Powerup.as_u8();
        } else {
            self.state.reset_count = self.state.reset_count.wrapping_add(1);
        }

        let pending = self.take_pending_reset_reason();
        let reason = if pending == ResetReason::Unknown {
            hardware_cause
        } else {
            pending
        };

        if !fresh && reason != ResetReason::Powerup {
            warn!(
                "Restarted after {:?}, reset count {}",
                reason, self.state.reset_count
            );
        }

        BootReport {
            reason,
            reset_count: self.state.reset_count,
            fresh,
        }
    }

    pub fn state(&self) -> &RetainedState {
        self.state
    }

    pub fn snapshot(&self) -> RetainedState {
        *self.state
    }

    pub fn set_pending_reset_reason(&mut self, reason: ResetReason) {
        self.state.pending_reset_reason = reason.as_u8();
    }

    /// Returns the pending reason and clears it.
    pub fn take_pending_reset_reason(&mut self) -> ResetReason {
        let reason = self.state.pending_reset_reason();
        self.state.pending_reset_reason = ResetReason::Unknown.as_u8();
        reason
    }

    pub fn set_last_pressure(&mut self, mbar: u16) {
        self.state.last_pressure = mbar;
    }

    pub fn set_last_temperature(&mut self, centi: i16) {
        self.state.last_temperature = centi;
    }

    pub fn set_last_voltage(&mut self, millivolts: u16) {
        self.state.last_voltage = millivolts;
    }

    pub fn increment_uptime_hours(&mut self) -> u16 {
        self.state.uptime_hours = self.state.uptime_hours.wrapping_add(1);
        self.state.uptime_hours
    }

    pub fn increment_measure_count(&mut self) {
        self.state.measure_count = self.state.measure_count.wrapping_add(1);
    }

    /// Adds `seconds` of working time. Returns `true` when a full hour rolled over.
    pub fn add_working_seconds(&mut self, seconds: u16) -> bool {
        let total = self.state.working_seconds.saturating_add(seconds);
        if total >= SECONDS_PER_HOUR {
            self.state.working_seconds = total - SECONDS_PER_HOUR;
            true
        } else {
            self.state.working_seconds = total;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retained_state_size() {
        assert_eq!(core::mem::size_of::<RetainedState>(), 20);
    }

    #[test]
    fn test_field_offsets() {
        assert_eq!(core::mem::offset_of!(RetainedState, last_pressure), 4);
        assert_eq!(core::mem::offset_of!(RetainedState, reset_count), 12);
        assert_eq!(core::mem::offset_of!(RetainedState, measure_count), 14);
        assert_eq!(core::mem::offset_of!(RetainedState, working_seconds), 18);
    }

    #[test]
    fn test_serialization_matches_layout() {
        let mut state = RetainedState::ZEROED;
        let mut store = RetainedStore::new(&mut state);
        store.on_boot(ResetReason::Unknown);
        store.set_last_pressure(1013);
        store.set_last_temperature(-250);
        store.set_pending_reset_reason(ResetReason::AdvFail);

        let bytes = state.to_bytes();
        assert_eq!(&bytes[0..4], &INIT_MARKER.to_le_bytes());
        assert_eq!(&bytes[4..6], &1013u16.to_le_bytes());
        assert_eq!(&bytes[6..8], &(-250i16).to_le_bytes());
        assert_eq!(bytes[16], ResetReason::AdvFail.as_u8());
        assert_eq!(RetainedState::from_bytes(&bytes), state);
    }

    #[test]
    fn test_garbage_block_is_powerup() {
        let mut state = RetainedState::from_bytes(&[0xA5; RETAINED_SIZE]);
        let report = RetainedStore::new(&mut state).on_boot(ResetReason::Watchdog);

        assert_eq!(
            report,
            BootReport {
                reason: ResetReason::Powerup,
                reset_count: 0,
                fresh: true
            }
        );
        assert!(state.is_initialized());
        assert_eq!(state.last_pressure, 0);
        assert_eq!(state.pending_reset_reason(), ResetReason::Unknown);
    }

    #[test]
    fn test_pending_reason_wins_over_hardware_cause() {
        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state).on_boot(ResetReason::Unknown);
        RetainedStore::new(&mut state).set_pending_reset_reason(ResetReason::AdvFail);

        let report = RetainedStore::new(&mut state).on_boot(ResetReason::SoftReset);
        assert_eq!(report.reason, ResetReason::AdvFail);
        assert_eq!(report.reset_count, 1);
        assert!(!report.fresh);
    }

    #[test]
    fn test_hardware_cause_used_without_pending_reason() {
        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state).on_boot(ResetReason::Unknown);

        let report = RetainedStore::new(&mut state).on_boot(ResetReason::Watchdog);
        assert_eq!(report.reason, ResetReason::Watchdog);
    }

    #[test]
    fn test_reset_count_strictly_increases() {
        let mut state = RetainedState::ZEROED;
        let mut previous = RetainedStore::new(&mut state)
            .on_boot(ResetReason::Unknown)
            .reset_count;
        for _ in 0..5 {
            let count = RetainedStore::new(&mut state)
                .on_boot(ResetReason::SoftReset)
                .reset_count;
            assert_eq!(count, previous + 1);
            previous = count;
        }
    }

    #[test]
    fn test_working_seconds_roll_into_hours() {
        let mut state = RetainedState::ZEROED;
        let mut store = RetainedStore::new(&mut state);
        let mut rolled = 0;
        for _ in 0..(3600 / 30) {
            if store.add_working_seconds(30) {
                rolled += 1;
            }
        }
        assert_eq!(rolled, 1);
        assert_eq!(store.state().working_seconds, 0);
    }

    #[test]
    fn test_raw_pointer_record() {
        let mut state = RetainedState::ZEROED;
        unsafe { RetainedState::record_reset_reason(&mut state, ResetReason::Panic) };
        assert_eq!(state.pending_reset_reason(), ResetReason::Panic);
    }

    #[test]
    fn test_reset_reason_codes() {
        for code in 0..=15u8 {
            assert_eq!(ResetReason::from_u8(code).as_u8(), code);
        }
        assert_eq!(ResetReason::from(200), ResetReason::Unknown);
    }
}
