//! Unrecoverable failures and the reset they turn into.

use log::error;
use thiserror_no_std::Error;

use crate::collaborators::SystemReset;
use crate::retained::{ResetReason, RetainedStore};

/// Subsystems whose initialization failure ends the boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Radio,
    Bus,
    Sensor,
    System,
}

/// Processor faults caught by the platform's exception and panic handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorFault {
    HardFault,
    BusFault,
    UsageFault,
    MemManage,
    Nmi,
    Panic,
}

impl ProcessorFault {
    pub const fn reset_reason(self) -> ResetReason {
        match self {
            ProcessorFault::HardFault => ResetReason::HardFault,
            ProcessorFault::BusFault => ResetReason::BusFault,
            ProcessorFault::UsageFault => ResetReason::UsageFault,
            ProcessorFault::MemManage => ResetReason::MemManage,
            ProcessorFault::Nmi => ResetReason::Nmi,
            ProcessorFault::Panic => ResetReason::Panic,
        }
    }

    /// Classifies an Xtensa `EXCCAUSE` code.
    pub const fn from_xtensa_cause(exccause: u32) -> Self {
        match exccause {
            // Illegal instruction, syscall, divide by zero, privileged, unaligned,
            // coprocessor disabled
            0 | 1 | 6 | 8 | 9 | 32..=39 => ProcessorFault::UsageFault,
            // Instruction fetch and load/store errors on the bus
            2 | 3 | 12..=15 => ProcessorFault::BusFault,
            // TLB misses, ring privilege and prohibited accesses
            16..=18 | 20 | 24..=26 | 28 | 29 => ProcessorFault::MemManage,
            _ => ProcessorFault::HardFault,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    #[error("{0:?} initialization failed")]
    SubsystemInit(Subsystem),
    #[error("advertising failed {attempts} times in a row")]
    RepeatedAdvertiseFailure { attempts: u8 },
    #[error("processor fault: {0:?}")]
    ProcessorFault(ProcessorFault),
}

impl Fatal {
    pub const fn reset_reason(self) -> ResetReason {
        match self {
            Fatal::SubsystemInit(Subsystem::Radio) => ResetReason::RadioInit,
            Fatal::SubsystemInit(Subsystem::Bus) => ResetReason::BusInit,
            Fatal::SubsystemInit(Subsystem::Sensor) => ResetReason::SensorInit,
            Fatal::SubsystemInit(Subsystem::System) => ResetReason::SystemInit,
            Fatal::RepeatedAdvertiseFailure { .. } => ResetReason::AdvFail,
            Fatal::ProcessorFault(fault) => fault.reset_reason(),
        }
    }
}

/// Stores the reset reason for `fatal` so the next boot reports it.
pub fn record_fatal(retained: &mut RetainedStore<'_>, fatal: Fatal) -> ResetReason {
    let reason = fatal.reset_reason();
    error!("Fatal: {}, next reset reason {:?}", fatal, reason);
    retained.set_pending_reset_reason(reason);
    reason
}

/// Records why we are about to reset, then resets.
pub fn fail_fast(retained: &mut RetainedStore<'_>, reset: &mut impl SystemReset, fatal: Fatal) -> ! {
    let reason = record_fatal(retained, fatal);
    reset.reboot(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retained::RetainedState;

    #[test]
    fn every_fatal_maps_to_its_own_reason() {
        let cases = [
            (Fatal::SubsystemInit(Subsystem::Radio), ResetReason::RadioInit),
            (Fatal::SubsystemInit(Subsystem::Bus), ResetReason::BusInit),
            (Fatal::SubsystemInit(Subsystem::Sensor), ResetReason::SensorInit),
            (Fatal::SubsystemInit(Subsystem::System), ResetReason::SystemInit),
            (Fatal::RepeatedAdvertiseFailure { attempts: 4 }, ResetReason::AdvFail),
            (Fatal::ProcessorFault(ProcessorFault::Nmi), ResetReason::Nmi),
            (Fatal::ProcessorFault(ProcessorFault::Panic), ResetReason::Panic),
        ];
        for (fatal, reason) in cases {
            assert_eq!(fatal.reset_reason(), reason);
        }
    }

    #[test]
    fn xtensa_causes_map_to_distinct_reasons() {
        let cases = [
            (0, ResetReason::UsageFault),
            (6, ResetReason::UsageFault),
            (9, ResetReason::UsageFault),
            (3, ResetReason::BusFault),
            (13, ResetReason::BusFault),
            (28, ResetReason::MemManage),
            (29, ResetReason::MemManage),
            (20, ResetReason::MemManage),
            (4, ResetReason::HardFault),
            (63, ResetReason::HardFault),
        ];
        for (cause, reason) in cases {
            let fault = ProcessorFault::from_xtensa_cause(cause);
            assert_eq!(Fatal::ProcessorFault(fault).reset_reason(), reason, "cause {}", cause);
        }
    }

    #[test]
    fn processor_fault_reaches_the_next_boot() {
        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state).on_boot(ResetReason::Unknown);

        // Fault handlers only have the raw block
        let fault = ProcessorFault::from_xtensa_cause(28);
        unsafe {
            RetainedState::record_reset_reason(&raw mut state, fault.reset_reason());
        }

        let report = RetainedStore::new(&mut state).on_boot(ResetReason::SoftReset);
        assert_eq!(report.reason, ResetReason::MemManage);
    }

    #[test]
    fn recorded_fatal_is_reported_on_next_boot() {
        let mut state = RetainedState::ZEROED;
        RetainedStore::new(&mut state).on_boot(ResetReason::Unknown);

        let fatal = Fatal::SubsystemInit(Subsystem::Sensor);
        let reason = record_fatal(&mut RetainedStore::new(&mut state), fatal);
        assert_eq!(reason, ResetReason::SensorInit);

        let report = RetainedStore::new(&mut state).on_boot(ResetReason::SoftReset);
        assert_eq!(report.reason, ResetReason::SensorInit);
    }
}
