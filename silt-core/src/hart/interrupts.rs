use bitvec::{array::BitArray, field::BitField, order::Lsb0};
use log::trace;

use super::Interrupt;

const SUPERVISOR_SOFTWARE_INTERRUPT: usize = Interrupt::SupervisorSoftwareInterrupt as usize;
const MACHINE_SOFTWARE_INTERRUPT: usize = Interrupt::MachineSoftwareInterrupt as usize;
const SUPERVISOR_TIMER_INTERRUPT: usize = Interrupt::SupervisorTimerInterrupt as usize;
const MACHINE_TIMER_INTERRUPT: usize = Interrupt::MachineTimerInterrupt as usize;
const SUPERVISOR_EXTERNAL_INTERRUPT: usize = Interrupt::SupervisorExternalInterrupt as usize;
const MACHINE_EXTERNAL_INTERRUPT: usize = Interrupt::MachineExternalInterrupt as usize;

/// The interrupt bits writable from guest code on this Machine-mode-only hart. The S-mode bits
/// (SSIE/STIE/SEIE and SSIP/STIP/SEIP) are forced clear on every write.
#[allow(clippy::identity_op)]
const MACHINE_INTERRUPTS_MASK: u16 = 0
    | (1 << MACHINE_SOFTWARE_INTERRUPT)
    | (1 << MACHINE_TIMER_INTERRUPT)
    | (1 << MACHINE_EXTERNAL_INTERRUPT);

/// The mip and mie registers.
#[derive(Debug, Clone)]
pub(super) struct Interrupts {
    /// The mip register: which interrupts are pending.
    mip: BitArray<[u16; 1], Lsb0>,
    /// The mie register: which interrupts are enabled.
    mie: BitArray<[u16; 1], Lsb0>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self {
            mip: BitArray::new([0x0000]),
            mie: BitArray::new([0x0000]),
        }
    }

    pub fn read_mip(&self) -> u32 {
        self.mip.load_le::<u16>() as u32
    }

    /// Handles a CSR write to mip. S-mode bits are cleared; the machine bits take the written
    /// value (MTIP is also driven by the timer comparator at the start of every cycle).
    pub fn write_mip(&mut self, value: u32) {
        self.mip.store_le(value as u16 & MACHINE_INTERRUPTS_MASK);
    }

    pub fn read_mie(&self) -> u32 {
        self.mie.load_le::<u16>() as u32
    }

    /// Handles a CSR write to mie. S-mode bits are cleared.
    pub fn write_mie(&mut self, value: u32) {
        self.mie.store_le(value as u16 & MACHINE_INTERRUPTS_MASK);
    }

    /// Returns `true` if any interrupt is pending, enabled or not.
    pub fn any_pending(&self) -> bool {
        self.mip.load_le::<u16>() != 0
    }

    /// Drives the M-level timer interrupt pending line (MTIP).
    ///
    /// Controlled by the memory-mapped mtime/mtimecmp comparator, not by the mip setter.
    pub fn set_m_timer(&mut self, value: bool) {
        if self.mip[MACHINE_TIMER_INTERRUPT] != value {
            trace!("setting mip.MTIP to {value}");
        }
        self.mip.set(MACHINE_TIMER_INTERRUPT, value);
    }

    /// Returns `Some(interrupt)` if there is an interrupt both pending and enabled. If there are
    /// multiple, `interrupt` is the one with the highest priority.
    ///
    /// Priority order is MEI > MSI > MTI > SEI > SSI > STI; only the machine-level three can
    /// actually become pending on this platform.
    pub fn highest_priority_ready(&self) -> Option<Interrupt> {
        let ready = self.mip & self.mie;
        [
            Interrupt::MachineExternalInterrupt,
            Interrupt::MachineSoftwareInterrupt,
            Interrupt::MachineTimerInterrupt,
            Interrupt::SupervisorExternalInterrupt,
            Interrupt::SupervisorSoftwareInterrupt,
            Interrupt::SupervisorTimerInterrupt,
        ]
        .into_iter()
        .find(|&i| ready[i as usize])
    }
}
