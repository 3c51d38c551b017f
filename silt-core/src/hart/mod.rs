//! The single-hart RV32IMA_Zicsr_Zifencei execution core.

mod counters;
pub mod csr;
mod execute;
mod interrupts;
mod status;
mod trap;

use crate::bus::{self, BusError, SystemBus};
use crate::instruction::{
    AmoOp, BranchCondition, CsrOp, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp,
    StoreWidth,
};
use crate::registers::Registers;
use crate::{Alignment, PrivilegeLevel, RawPrivilegeLevel};
use counters::Counters;
use execute::Executor;
use interrupts::Interrupts;
use log::debug;
use thiserror::Error;
use trap::TrapCsrs;

pub use csr::CsrSpecifier;
pub use status::Status;
pub use trap::{Tvec, VectorMode};

/// The high bit of mcause, set for asynchronous causes (interrupts).
pub const INTERRUPT_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone)]
pub struct Config {
    /// > The mhartid CSR is an MXLEN-bit read-only register containing the integer ID of the
    /// > hardware thread running the code. [...] at least one hart must have a hart ID of zero.
    pub hart_id: u32,
    /// Address to which the hart's pc register is reset. Normally the page offset, where the
    /// executable image is loaded.
    pub reset_vector: u32,
}

/// A single RISC-V hart implementing RV32IMA_Zicsr_Zifencei, running in Machine mode.
///
/// The hart owns the system bus and with it the whole platform: registers, CSR state, RAM, and
/// the devices. It is driven by calling [`step`](Hart::step) once per cycle; each cycle checks
/// the timer, evaluates interrupts, and fetches, decodes and executes exactly one instruction.
#[derive(Debug)]
pub struct Hart {
    config: Config,
    bus: SystemBus,
    registers: Registers,
    privilege_mode: PrivilegeLevel,
    status: Status,
    interrupts: Interrupts,
    trap: TrapCsrs,
    counters: Counters,
    /// CSRs without dedicated behavior read and write these cells.
    plain_csrs: csr::PlainStorage,
    /// The LR/SC reservation. One flag covers the whole address space: it is set by `lr.w` and
    /// consumed by the first succeeding `sc.w`. Intervening stores do not invalidate it, which
    /// is sufficient for a uniprocessor.
    reservation: bool,
}

impl Hart {
    /// The misa value: MXL=32, extensions I, M, and A.
    pub const MISA: u32 = 0x4040_1101;

    pub fn new(bus: SystemBus, config: Config) -> Self {
        let mut plain_csrs = csr::PlainStorage::new();
        plain_csrs.write(csr::MISA, Self::MISA);
        plain_csrs.write(csr::MHARTID, config.hart_id);
        Self {
            registers: Registers::new(config.reset_vector),
            config,
            bus,
            privilege_mode: PrivilegeLevel::Machine,
            status: Status::new(),
            interrupts: Interrupts::new(),
            trap: TrapCsrs::new(),
            counters: Counters::new(),
            plain_csrs,
            reservation: false,
        }
    }

    /// Provide a read-only view of this hart's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    /// Returns the current privilege mode the hart is in.
    pub fn privilege_mode(&self) -> PrivilegeLevel {
        self.privilege_mode
    }

    /// Runs a single cycle: timer check, interrupt evaluation, then fetch, decode, execute.
    ///
    /// Exceptions raised along the way are handled by redirecting the guest into its trap
    /// handler; only errors the guest cannot handle (see [`FatalError`]) surface to the caller.
    /// The cycle counter advances exactly once per call, whether or not the cycle trapped.
    pub fn step(&mut self) -> Result<(), FatalError> {
        let result = self.step_inner();
        self.counters.increment_cycle();
        result
    }

    fn step_inner(&mut self) -> Result<(), FatalError> {
        let pc = self.registers.pc();
        if !Alignment::WORD.is_aligned(pc) {
            return self.raise_exception(&Exception::InstructionAddressMisaligned { target: pc });
        }

        // The timer comparator drives the MTIP line in mip storage directly, bypassing the CSR
        // setter.
        if self.bus.clint().timer_expired() {
            self.interrupts.set_m_timer(true);
        }

        // If an interrupt is taken, pc now points at the trap vector and the fetch below starts
        // the handler within the same cycle.
        self.check_interrupt()?;

        let pc = self.registers.pc();
        let raw_instruction = match self.load_word(pc) {
            Ok(word) => word,
            Err(BusError::NullRead) => return Err(FatalError::NullRead { pc }),
            Err(BusError::AccessFault(address)) => {
                return self.raise_exception(&Exception::LoadAccessFault { address });
            }
        };

        let instruction = match Instruction::decode(raw_instruction) {
            Ok(instruction) => instruction,
            Err(_) => {
                return self.raise_exception(&Exception::IllegalInstruction {
                    instruction: raw_instruction,
                });
            }
        };

        match self.execute_instruction(instruction, raw_instruction) {
            Ok(()) => Ok(()),
            Err(ExecutionError::Exception(exception)) => self.raise_exception(&exception),
            Err(ExecutionError::Fatal(fatal)) => Err(fatal),
        }
    }

    /// Decodes and executes `raw_instruction`, without the per-cycle timer/interrupt work.
    ///
    /// This is the entry point for the per-instruction test harness: it performs only the
    /// instruction-specific state updates (registers, memory, CSRs, pc).
    pub fn execute_raw_instruction(&mut self, raw_instruction: u32) -> ExecutionResult {
        let instruction = Instruction::decode(raw_instruction).map_err(|_| {
            ExecutionError::Exception(Exception::IllegalInstruction {
                instruction: raw_instruction,
            })
        })?;
        self.execute_instruction(instruction, raw_instruction)
    }

    /// Executes a single decoded instruction on this hart.
    pub fn execute_instruction(
        &mut self,
        instruction: Instruction,
        raw_instruction: u32,
    ) -> ExecutionResult {
        let mut executor = Executor {
            hart: self,
            instruction: raw_instruction,
        };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Executor::addi,
                    RegImmOp::Slti => Executor::slti,
                    RegImmOp::Sltiu => Executor::sltiu,
                    RegImmOp::Xori => Executor::xori,
                    RegImmOp::Ori => Executor::ori,
                    RegImmOp::Andi => Executor::andi,
                };
                op(&mut executor, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Executor::slli,
                    RegShiftImmOp::Srli => Executor::srli,
                    RegShiftImmOp::Srai => Executor::srai,
                };
                op(&mut executor, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Executor::add,
                    RegRegOp::Slt => Executor::slt,
                    RegRegOp::Sltu => Executor::sltu,
                    RegRegOp::And => Executor::and,
                    RegRegOp::Or => Executor::or,
                    RegRegOp::Xor => Executor::xor,
                    RegRegOp::Sll => Executor::sll,
                    RegRegOp::Srl => Executor::srl,
                    RegRegOp::Sub => Executor::sub,
                    RegRegOp::Sra => Executor::sra,
                    RegRegOp::Mul => Executor::mul,
                    RegRegOp::Mulh => Executor::mulh,
                    RegRegOp::Mulhsu => Executor::mulhsu,
                    RegRegOp::Mulhu => Executor::mulhu,
                    RegRegOp::Div => Executor::div,
                    RegRegOp::Divu => Executor::divu,
                    RegRegOp::Rem => Executor::rem,
                    RegRegOp::Remu => Executor::remu,
                };
                op(&mut executor, dest, src1, src2)
            }
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Executor::beq,
                    BranchCondition::Bne => Executor::bne,
                    BranchCondition::Blt => Executor::blt,
                    BranchCondition::Bltu => Executor::bltu,
                    BranchCondition::Bge => Executor::bge,
                    BranchCondition::Bgeu => Executor::bgeu,
                };
                op(&mut executor, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Executor::lb,
                    LoadWidth::Lh => Executor::lh,
                    LoadWidth::Lw => Executor::lw,
                    LoadWidth::Lbu => Executor::lbu,
                    LoadWidth::Lhu => Executor::lhu,
                };
                op(&mut executor, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Executor::sb,
                    StoreWidth::Sh => Executor::sh,
                    StoreWidth::Sw => Executor::sw,
                };
                op(&mut executor, src, base, offset)
            }
            Instruction::Fence => executor.fence(),
            Instruction::FenceI => executor.fence_i(),
            Instruction::Ecall => executor.ecall(),
            Instruction::Ebreak => executor.ebreak(),
            Instruction::Mret => executor.mret(),
            Instruction::Wfi => executor.wfi(),
            Instruction::Csr { op, dest, csr, src } => {
                let op = match op {
                    CsrOp::ReadWrite => Executor::csrrw,
                    CsrOp::ReadSet => Executor::csrrs,
                    CsrOp::ReadClear => Executor::csrrc,
                };
                op(&mut executor, dest, csr, src)
            }
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => {
                let op = match op {
                    CsrOp::ReadWrite => Executor::csrrwi,
                    CsrOp::ReadSet => Executor::csrrsi,
                    CsrOp::ReadClear => Executor::csrrci,
                };
                op(&mut executor, dest, csr, immediate)
            }
            Instruction::LoadReserved { dest, addr } => executor.lr_w(dest, addr),
            Instruction::StoreConditional { dest, addr, src } => executor.sc_w(dest, addr, src),
            Instruction::Amo {
                op,
                dest,
                addr,
                src,
            } => {
                let op = match op {
                    AmoOp::Swap => Executor::amoswap_w,
                    AmoOp::Add => Executor::amoadd_w,
                    AmoOp::Xor => Executor::amoxor_w,
                    AmoOp::And => Executor::amoand_w,
                    AmoOp::Or => Executor::amoor_w,
                    AmoOp::Min => Executor::amomin_w,
                    AmoOp::Max => Executor::amomax_w,
                    AmoOp::MinU => Executor::amominu_w,
                    AmoOp::MaxU => Executor::amomaxu_w,
                };
                op(&mut executor, dest, addr, src)
            }
        }
    }

    /// Takes the highest-priority pending-and-enabled interrupt, if any.
    ///
    /// Interrupts are only taken with something pending in mip, the hart in Machine mode, and
    /// mstatus.MIE set. Entry follows the same path as a synchronous exception with the
    /// asynchronous bit set in mcause and a zero mtval.
    fn check_interrupt(&mut self) -> Result<(), FatalError> {
        if !self.interrupts.any_pending() {
            return Ok(());
        }
        if self.privilege_mode != PrivilegeLevel::Machine || !self.status.mie() {
            return Ok(());
        }
        if let Some(interrupt) = self.interrupts.highest_priority_ready() {
            debug!("taking interrupt {interrupt:?}");
            self.enter_trap(INTERRUPT_BIT | interrupt.code(), 0)?;
        }
        Ok(())
    }

    fn raise_exception(&mut self, exception: &Exception) -> Result<(), FatalError> {
        debug!(
            "exception {exception:?} at pc {:#010x}",
            self.registers.pc()
        );
        self.enter_trap(exception.code(), exception.tval())
    }

    /// Redirects the hart into its trap handler.
    ///
    /// Saves `cause` and `tval` into mcause/mtval, records the interrupted context in mstatus
    /// (MPP, MPIE←MIE, MIE←0) and mepc, and installs the trap vector as the next pc. Only the
    /// direct vector mode is supported; a trap with mtvec.MODE=Vectored stops the machine.
    fn enter_trap(&mut self, cause: u32, tval: u32) -> Result<(), FatalError> {
        if self.trap.mtvec().mode() != VectorMode::Direct {
            return Err(FatalError::UnhandledTrapVectorMode {
                mtvec: self.trap.mtvec().read(),
            });
        }
        self.trap.write_mcause(cause);
        self.trap.write_mtval(tval);
        self.status.enter_trap(self.privilege_mode);
        self.trap.write_mepc(self.registers.pc());
        *self.registers.pc_mut() = self.trap.mtvec().base();
        Ok(())
    }

    /// Read the value of a CSR by its specifier.
    ///
    /// `privilege_level` indicates at what privilege level the read is performed. If the CSR
    /// that is being read requires a higher privilege level, a [`CsrAccessError::Privileged`] is
    /// returned.
    pub fn read_csr(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, CsrAccessError> {
        self.check_csr_access(specifier, privilege_level)?;
        Ok(match specifier {
            csr::MSTATUS => self.status.read(),
            csr::MIE => self.interrupts.read_mie(),
            csr::MIP => self.interrupts.read_mip(),
            // Nothing is delegatable without lower privilege modes; mideleg has no storage.
            csr::MIDELEG => 0,
            csr::MTVEC => self.trap.mtvec().read(),
            csr::MSCRATCH => self.trap.read_mscratch(),
            csr::MEPC => self.trap.read_mepc(),
            csr::MCAUSE => self.trap.read_mcause(),
            csr::MTVAL => self.trap.read_mtval(),
            // The unprivileged counter shadows read the live machine counters.
            csr::CYCLE | csr::MCYCLE => self.counters.mcycle(),
            csr::CYCLEH | csr::MCYCLEH => self.counters.mcycleh(),
            csr::INSTRET | csr::MINSTRET => self.counters.minstret(),
            csr::INSTRETH | csr::MINSTRETH => self.counters.minstreth(),
            _ => self.plain_csrs.read(specifier),
        })
    }

    /// Write `value` to a CSR by its specifier.
    ///
    /// Writes to read-only CSRs are silent no-ops; this matches the CSR instructions' contract
    /// where suppressed writes must not fault. Setters with side effects (mstatus, mie, mip,
    /// mideleg) re-evaluate pending interrupts after the write, which may redirect the hart into
    /// its trap handler right away.
    pub fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
        value: u32,
    ) -> Result<(), CsrWriteError> {
        self.check_csr_access(specifier, privilege_level)
            .map_err(CsrWriteError::AccessError)?;
        if csr::is_read_only(specifier) {
            return Ok(());
        }
        match specifier {
            csr::MSTATUS => {
                self.status.write(value);
                self.check_interrupt()?;
            }
            csr::MIE => {
                self.interrupts.write_mie(value);
                self.check_interrupt()?;
            }
            csr::MIP => {
                self.interrupts.write_mip(value);
                self.check_interrupt()?;
            }
            csr::MIDELEG => {
                // No storage, but the write still re-evaluates interrupts.
                self.check_interrupt()?;
            }
            csr::MTVEC => self.trap.mtvec_mut().write(value),
            csr::MSCRATCH => self.trap.write_mscratch(value),
            csr::MEPC => self.trap.write_mepc(value),
            csr::MCAUSE => self.trap.write_mcause(value),
            csr::MTVAL => self.trap.write_mtval(value),
            // misa is WARL; this implementation keeps the reported ISA fixed.
            csr::MISA => {}
            // PMP is not implemented; the registers read their reset values and ignore writes.
            csr::PMPCFG0..=csr::PMPADDR63 => {}
            // The machine counters ignore instruction-initiated writes; they are advanced by the
            // cycle loop only.
            csr::MCYCLE | csr::MCYCLEH | csr::MINSTRET | csr::MINSTRETH => {}
            _ => self.plain_csrs.write(specifier, value),
        }
        Ok(())
    }

    fn check_csr_access(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<(), CsrAccessError> {
        debug_assert!(csr::is_valid(specifier));
        let required_level = csr::required_privilege_level(specifier);
        if privilege_level < required_level {
            return Err(CsrAccessError::Privileged {
                specifier,
                required_level,
                actual_level: privilege_level,
            });
        }
        Ok(())
    }

    // Memory access wrappers around the bus, from this hart's point of view.

    pub(crate) fn load_byte(&self, address: u32) -> Result<u8, BusError> {
        self.bus.read8(address)
    }

    pub(crate) fn load_halfword(&self, address: u32) -> Result<u16, BusError> {
        self.bus.read16(address)
    }

    pub(crate) fn load_word(&self, address: u32) -> Result<u32, BusError> {
        self.bus.read32(address)
    }

    pub(crate) fn store_byte(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        self.bus.write8(address, value)
    }

    pub(crate) fn store_halfword(&mut self, address: u32, value: u16) -> Result<(), BusError> {
        self.bus.write16(address, value)
    }

    pub(crate) fn store_word(&mut self, address: u32, value: u32) -> Result<(), BusError> {
        self.bus.write32(address, value)?;
        // Reprogramming the comparator above the current mtime acknowledges the timer
        // interrupt.
        if (address == bus::MTIMECMP_LO_ADDR || address == bus::MTIMECMP_HI_ADDR)
            && !self.bus.clint().timer_expired()
        {
            self.interrupts.set_m_timer(false);
        }
        Ok(())
    }
}

/// Errors that can occur when attempting to access a CSR.
#[derive(Error, Debug)]
pub enum CsrAccessError {
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access CSR {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level}"
    )]
    Privileged {
        /// The CSR for which access was requested.
        specifier: CsrSpecifier,
        /// The minimum required privilege level to access that CSR.
        required_level: RawPrivilegeLevel,
        /// The actual privilege level from which the access was performed.
        actual_level: PrivilegeLevel,
    },
}

/// Errors that can occur when attempting to write to a CSR.
#[derive(Error, Debug)]
pub enum CsrWriteError {
    /// A non-write specific access error. See [`CsrAccessError`].
    #[error("{0}")]
    AccessError(CsrAccessError),
    /// The interrupt re-evaluation triggered by the write could not complete.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Result of executing a single instruction. [`Ok`] if execution went normally, [`Err`] if an
/// exception occurred or the machine must stop.
pub type ExecutionResult = Result<(), ExecutionError>;

#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A synchronous exception the guest handles through its trap vector.
    #[error(transparent)]
    Exception(#[from] Exception),
    /// An error the guest cannot handle; the machine stops.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Synchronous exceptions, carrying the value that belongs in mtval.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Exception {
    /// Instruction address is not on a four-byte aligned boundary in memory.
    #[error("instruction address misaligned ({target:#010x})")]
    InstructionAddressMisaligned { target: u32 },
    /// Decoder miss or CSR privilege violation; mtval holds the instruction word.
    #[error("illegal instruction ({instruction:#010x})")]
    IllegalInstruction { instruction: u32 },
    #[error("breakpoint at {pc:#010x}")]
    Breakpoint { pc: u32 },
    #[error("load access fault at {address:#010x}")]
    LoadAccessFault { address: u32 },
    #[error("store access fault at {address:#010x}")]
    StoreAccessFault { address: u32 },
    #[error("environment call from M-mode")]
    EnvironmentCallFromMMode,
}

impl Exception {
    /// Returns the exception code (cause) for this exception.
    pub fn code(&self) -> u32 {
        match self {
            Self::InstructionAddressMisaligned { .. } => 0,
            Self::IllegalInstruction { .. } => 2,
            Self::Breakpoint { .. } => 3,
            Self::LoadAccessFault { .. } => 5,
            Self::StoreAccessFault { .. } => 7,
            Self::EnvironmentCallFromMMode => 11,
        }
    }

    /// Returns the value stored into mtval when this exception is taken.
    pub fn tval(&self) -> u32 {
        match *self {
            Self::InstructionAddressMisaligned { target } => target,
            Self::IllegalInstruction { instruction } => instruction,
            Self::Breakpoint { pc } => pc,
            Self::LoadAccessFault { address } => address,
            Self::StoreAccessFault { address } => address,
            Self::EnvironmentCallFromMMode => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Interrupt {
    SupervisorSoftwareInterrupt = 1,
    MachineSoftwareInterrupt = 3,
    SupervisorTimerInterrupt = 5,
    MachineTimerInterrupt = 7,
    SupervisorExternalInterrupt = 9,
    MachineExternalInterrupt = 11,
}

impl Interrupt {
    /// Returns the exception code (cause) for this interrupt, without the asynchronous bit.
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Errors the guest cannot recover from. The machine stops and the process exits with the
/// matching diagnostic code.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum FatalError {
    /// The decoder was exhausted without a match. In practice decode misses become
    /// [`Exception::IllegalInstruction`] and are handled by the guest; this variant is kept for
    /// the frontends' exit-code contract.
    #[error("unknown instruction at {pc:#010x}")]
    UnknownInstruction { pc: u32 },
    /// A decoded instruction has no handler.
    #[error("instruction not implemented at {pc:#010x}")]
    InstructionNotImplemented { pc: u32 },
    /// A privileged operation (outside the CSR path) was attempted from a lower privilege
    /// level.
    #[error("insufficient privilege (executing in {privilege}-mode)")]
    InsufficientPrivilege { privilege: PrivilegeLevel },
    /// A trap was taken while mtvec selects a vector mode other than direct.
    #[error("unhandled trap vector mode (mtvec = {mtvec:#010x})")]
    UnhandledTrapVectorMode { mtvec: u32 },
    /// The guest read from address zero.
    #[error("read from guest address zero (pc = {pc:#010x})")]
    NullRead { pc: u32 },
}

impl FatalError {
    /// The process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownInstruction { .. } => 1,
            Self::InstructionNotImplemented { .. } => 2,
            Self::InsufficientPrivilege { .. } => 3,
            Self::UnhandledTrapVectorMode { .. } => 4,
            // No dedicated code; reported as a generic unrecoverable diagnostic.
            Self::NullRead { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DEFAULT_PAGE_OFFSET;
    use crate::registers::Specifier;
    use crate::resources::PowerEvent;

    fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn hart() -> Hart {
        let bus = SystemBus::new(0x8000, DEFAULT_PAGE_OFFSET).unwrap();
        let mut hart = Hart::new(
            bus,
            Config {
                hart_id: 0,
                reset_vector: DEFAULT_PAGE_OFFSET,
            },
        );
        // Park the timer far in the future so cycles don't raise MTIP unless a test asks for
        // it.
        hart.store_word(bus::MTIMECMP_HI_ADDR, u32::MAX).unwrap();
        hart
    }

    fn load_program(hart: &mut Hart, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            hart.bus_mut()
                .write32(DEFAULT_PAGE_OFFSET + 4 * i as u32, *word)
                .unwrap();
        }
    }

    fn read_csr(hart: &Hart, specifier: CsrSpecifier) -> u32 {
        hart.read_csr(specifier, PrivilegeLevel::Machine).unwrap()
    }

    fn write_csr(hart: &mut Hart, specifier: CsrSpecifier, value: u32) {
        hart.write_csr(specifier, PrivilegeLevel::Machine, value)
            .unwrap()
    }

    #[test]
    fn test_lui() {
        let mut hart = hart();
        // lui x5, 0xABCDE
        load_program(&mut hart, &[0xABCD_E2B7]);
        hart.step().unwrap();
        assert_eq!(0xABCD_E000, hart.registers().x(x(5)));
        assert_eq!(0x8000_0004, hart.registers().pc());
        assert_eq!(1, read_csr(&hart, csr::MCYCLE));
        assert_eq!(1, read_csr(&hart, csr::MINSTRET));
    }

    #[test]
    fn test_addi_round_trip() {
        let mut hart = hart();
        // addi x1, x0, 1 ; addi x1, x1, -1
        load_program(&mut hart, &[0x0010_0093, 0xFFF0_8093]);
        hart.step().unwrap();
        assert_eq!(1, hart.registers().x(x(1)));
        hart.step().unwrap();
        assert_eq!(0, hart.registers().x(x(1)));
        assert_eq!(0x8000_0008, hart.registers().pc());
        assert_eq!(2, read_csr(&hart, csr::CYCLE));
    }

    #[test]
    fn test_jal() {
        let mut hart = hart();
        // jal x1, 8
        load_program(&mut hart, &[0x0080_00EF]);
        hart.step().unwrap();
        assert_eq!(0x8000_0004, hart.registers().x(x(1)));
        assert_eq!(0x8000_0008, hart.registers().pc());
    }

    #[test]
    fn test_branch_backward() {
        let mut hart = hart();
        // beq x0, x0, -4 placed at 0x80000100
        hart.bus_mut().write32(0x8000_0100, 0xFE00_0EE3).unwrap();
        *hart.registers_mut().pc_mut() = 0x8000_0100;
        hart.step().unwrap();
        assert_eq!(0x8000_00FC, hart.registers().pc());
    }

    #[test]
    fn test_branch_not_taken() {
        let mut hart = hart();
        // bne x0, x0, -4
        load_program(&mut hart, &[0xFE00_1EE3]);
        hart.step().unwrap();
        assert_eq!(0x8000_0004, hart.registers().pc());
    }

    #[test]
    fn test_syscon_poweroff() {
        let mut hart = hart();
        hart.registers_mut().set_x(x(1), 0x1110_0000);
        hart.registers_mut().set_x(x(2), 0x5555);
        // sw x2, 0(x1)
        hart.execute_raw_instruction(0x0020_A023).unwrap();
        assert_eq!(Some(PowerEvent::Poweroff), hart.bus().power_event());
    }

    #[test]
    fn test_timer_interrupt() {
        let mut hart = hart();
        // nop at the reset vector, nop at the trap vector
        load_program(&mut hart, &[0x0000_0013]);
        hart.bus_mut().write32(0x8000_0200, 0x0000_0013).unwrap();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0200);
        write_csr(&mut hart, csr::MIE, 1 << 7);
        // Make the comparator expire immediately.
        hart.bus_mut().write32(bus::MTIMECMP_HI_ADDR, 0).unwrap();
        hart.bus_mut().write32(bus::MTIMECMP_LO_ADDR, 0).unwrap();

        hart.step().unwrap();
        assert_eq!(0x8000_0007, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0x8000_0000, read_csr(&hart, csr::MEPC));
        assert_eq!(0, read_csr(&hart, csr::MTVAL));
        // MIE was saved into MPIE and cleared.
        assert_eq!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
        assert_ne!(0, read_csr(&hart, csr::MSTATUS) & 0x80);
        // The handler's first instruction already ran in the same cycle.
        assert_eq!(0x8000_0204, hart.registers().pc());
    }

    #[test]
    fn test_interrupt_gated_on_mstatus_mie() {
        let mut hart = hart();
        load_program(&mut hart, &[0x0000_0013]);
        write_csr(&mut hart, csr::MTVEC, 0x8000_0200);
        write_csr(&mut hart, csr::MIE, 1 << 7);
        write_csr(&mut hart, csr::MSTATUS, 0); // MIE off
        hart.bus_mut().write32(bus::MTIMECMP_HI_ADDR, 0).unwrap();

        hart.step().unwrap();
        // No trap: the nop at the reset vector executed normally.
        assert_eq!(0x8000_0004, hart.registers().pc());
        assert_eq!(0, read_csr(&hart, csr::MCAUSE));
    }

    #[test]
    fn test_lr_sc() {
        let mut hart = hart();
        hart.registers_mut().set_x(x(6), 0x8000_1000);
        hart.registers_mut().set_x(x(8), 0xDEAD_BEEF);
        // lr.w x5, (x6)
        hart.execute_raw_instruction(0x1003_22AF).unwrap();
        assert_eq!(0, hart.registers().x(x(5)));
        // sc.w x7, x8, (x6)
        hart.execute_raw_instruction(0x1883_23AF).unwrap();
        assert_eq!(0, hart.registers().x(x(7)));
        assert_eq!(Ok(0xDEAD_BEEF), hart.bus().read32(0x8000_1000));
        // The reservation was consumed: a second sc.w fails and leaves memory alone.
        hart.registers_mut().set_x(x(8), 0x1111_1111);
        hart.execute_raw_instruction(0x1883_23AF).unwrap();
        assert_ne!(0, hart.registers().x(x(7)));
        assert_eq!(Ok(0xDEAD_BEEF), hart.bus().read32(0x8000_1000));
    }

    #[test]
    fn test_sc_without_reservation_fails() {
        let mut hart = hart();
        hart.registers_mut().set_x(x(6), 0x8000_1000);
        hart.registers_mut().set_x(x(8), 0xDEAD_BEEF);
        hart.execute_raw_instruction(0x1883_23AF).unwrap();
        assert_ne!(0, hart.registers().x(x(7)));
        assert_eq!(Ok(0), hart.bus().read32(0x8000_1000));
    }

    #[test]
    fn test_rwsem_style_acquire_release() {
        // The AMO/LR/SC sequence the kernel issues around a write-locked rwsem: cmpxchg-style
        // acquire via lr/sc, release via a negative fetch-add.
        let mut hart = hart();
        let count_addr = 0x8000_1000;
        hart.registers_mut().set_x(x(6), count_addr);

        // Acquire: lr.w observes 0, sc.w installs WRITER_LOCKED (1).
        hart.execute_raw_instruction(0x1003_22AF).unwrap(); // lr.w x5, (x6)
        assert_eq!(0, hart.registers().x(x(5)));
        hart.registers_mut().set_x(x(8), 1);
        hart.execute_raw_instruction(0x1883_23AF).unwrap(); // sc.w x7, x8, (x6)
        assert_eq!(0, hart.registers().x(x(7)));
        assert_eq!(Ok(1), hart.bus().read32(count_addr));

        // Release: amoadd.w of -1 returns the old count and zeroes it.
        hart.registers_mut().set_x(x(7), 1u32.wrapping_neg());
        hart.execute_raw_instruction(0x0073_22AF).unwrap(); // amoadd.w x5, x7, (x6)
        assert_eq!(1, hart.registers().x(x(5)));
        assert_eq!(Ok(0), hart.bus().read32(count_addr));

        // An intervening plain store does not invalidate the reservation on this uniprocessor.
        hart.execute_raw_instruction(0x1003_22AF).unwrap(); // lr.w x5, (x6)
        hart.registers_mut().set_x(x(2), count_addr);
        hart.registers_mut().set_x(x(8), 7);
        hart.execute_raw_instruction(0x0081_2023).unwrap(); // sw x8, 0(x2)
        hart.execute_raw_instruction(0x1883_23AF).unwrap(); // sc.w x7, x8, (x6)
        assert_eq!(0, hart.registers().x(x(7)));
    }

    #[test]
    fn test_amo_misaligned() {
        let mut hart = hart();
        hart.registers_mut().set_x(x(6), 0x8000_1002);
        let result = hart.execute_raw_instruction(0x0073_22AF); // amoadd.w x5, x7, (x6)
        assert!(matches!(
            result,
            Err(ExecutionError::Exception(
                Exception::InstructionAddressMisaligned { target: 0x8000_1002 }
            ))
        ));
    }

    #[test]
    fn test_amo_min_max() {
        let mut hart = hart();
        let addr = 0x8000_1000;
        hart.registers_mut().set_x(x(6), addr);
        hart.bus_mut().write32(addr, (-5i32) as u32).unwrap();
        hart.registers_mut().set_x(x(7), 3);
        // amomax.w x5, x7, (x6): signed max(-5, 3) = 3
        hart.execute_raw_instruction(0xA073_22AF).unwrap();
        assert_eq!((-5i32) as u32, hart.registers().x(x(5)));
        assert_eq!(Ok(3), hart.bus().read32(addr));
        // amominu.w x5, x7, (x6) with memory = 3, rs2 = 0xFFFFFFFB: unsigned min is 3
        hart.registers_mut().set_x(x(7), (-5i32) as u32);
        hart.execute_raw_instruction(0xC073_22AF).unwrap();
        assert_eq!(3, hart.registers().x(x(5)));
        assert_eq!(Ok(3), hart.bus().read32(addr));
    }

    #[test]
    fn test_div_rem_edge_cases() {
        let mut hart = hart();
        let div = |hart: &mut Hart, op, a: u32, b: u32| {
            hart.registers_mut().set_x(x(6), a);
            hart.registers_mut().set_x(x(7), b);
            hart.execute_instruction(
                Instruction::Op {
                    op,
                    dest: x(5),
                    src1: x(6),
                    src2: x(7),
                },
                0,
            )
            .unwrap();
            hart.registers().x(x(5))
        };
        assert_eq!(0xFFFF_FFFF, div(&mut hart, RegRegOp::Div, 42, 0));
        assert_eq!(0xFFFF_FFFF, div(&mut hart, RegRegOp::Divu, 42, 0));
        assert_eq!(42, div(&mut hart, RegRegOp::Rem, 42, 0));
        assert_eq!(42, div(&mut hart, RegRegOp::Remu, 42, 0));
        // Signed overflow: INT_MIN / -1
        let int_min = i32::MIN as u32;
        assert_eq!(int_min, div(&mut hart, RegRegOp::Div, int_min, u32::MAX));
        assert_eq!(0, div(&mut hart, RegRegOp::Rem, int_min, u32::MAX));
        // Plain signed division
        assert_eq!((-3i32) as u32, div(&mut hart, RegRegOp::Div, (-7i32) as u32, 2));
        assert_eq!((-1i32) as u32, div(&mut hart, RegRegOp::Rem, (-7i32) as u32, 2));
    }

    #[test]
    fn test_high_multiplies() {
        let mut hart = hart();
        let mul = |hart: &mut Hart, op, a: u32, b: u32| {
            hart.registers_mut().set_x(x(6), a);
            hart.registers_mut().set_x(x(7), b);
            hart.execute_instruction(
                Instruction::Op {
                    op,
                    dest: x(5),
                    src1: x(6),
                    src2: x(7),
                },
                0,
            )
            .unwrap();
            hart.registers().x(x(5))
        };
        let int_min = i32::MIN as u32;
        assert_eq!(0x4000_0000, mul(&mut hart, RegRegOp::Mulh, int_min, int_min));
        assert_eq!(0xFFFF_FFFE, mul(&mut hart, RegRegOp::Mulhu, u32::MAX, u32::MAX));
        // (-1) * 0xFFFFFFFF (unsigned) = -(2^32 - 1); high word is 0xFFFFFFFF.
        assert_eq!(
            0xFFFF_FFFF,
            mul(&mut hart, RegRegOp::Mulhsu, u32::MAX, u32::MAX)
        );
        assert_eq!(0, mul(&mut hart, RegRegOp::Mul, 0, u32::MAX));
    }

    #[test]
    fn test_csr_reads_old_value() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MSCRATCH, 5);
        hart.registers_mut().set_x(x(6), 9);
        hart.execute_instruction(
            Instruction::Csr {
                op: CsrOp::ReadWrite,
                dest: x(5),
                csr: csr::MSCRATCH,
                src: x(6),
            },
            0,
        )
        .unwrap();
        assert_eq!(5, hart.registers().x(x(5)));
        assert_eq!(9, read_csr(&hart, csr::MSCRATCH));
    }

    #[test]
    fn test_read_only_csr_write_is_silent() {
        let mut hart = hart();
        hart.registers_mut().set_x(x(6), 0x1234);
        // csrrw to the read-only mvendorid must not fault and must not change storage.
        hart.execute_instruction(
            Instruction::Csr {
                op: CsrOp::ReadWrite,
                dest: x(5),
                csr: csr::MVENDORID,
                src: x(6),
            },
            0,
        )
        .unwrap();
        assert_eq!(0, hart.registers().x(x(5)));
        assert_eq!(0, read_csr(&hart, csr::MVENDORID));
    }

    #[test]
    fn test_csrrs_x0_suppresses_write_side_effects() {
        let mut hart = hart();
        // Raise MTIP through the mip setter, enable MTIE, but keep MIE off for now.
        write_csr(&mut hart, csr::MSTATUS, 0);
        write_csr(&mut hart, csr::MIP, 1 << 7);
        write_csr(&mut hart, csr::MIE, 1 << 7);
        write_csr(&mut hart, csr::MTVEC, 0x8000_0200);
        // csrrs x5, mstatus, x0 reads but must not write, so no interrupt re-check fires even
        // though one would not be taken anyway with MIE clear.
        hart.execute_instruction(
            Instruction::Csr {
                op: CsrOp::ReadSet,
                dest: x(5),
                csr: csr::MSTATUS,
                src: Specifier::X0,
            },
            0,
        )
        .unwrap();
        assert_eq!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
    }

    #[test]
    fn test_csr_write_takes_pending_interrupt() {
        let mut hart = hart();
        load_program(&mut hart, &[0x0000_0013]);
        write_csr(&mut hart, csr::MTVEC, 0x8000_0200);
        write_csr(&mut hart, csr::MIP, 1 << 7);
        // mstatus.MIE is set from reset; unmasking MTIE in mie takes the interrupt from inside
        // the CSR write, after pc has already moved past the csrrs.
        hart.registers_mut().set_x(x(6), 1 << 7);
        hart.execute_instruction(
            Instruction::Csr {
                op: CsrOp::ReadSet,
                dest: Specifier::X0,
                csr: csr::MIE,
                src: x(6),
            },
            0,
        )
        .unwrap();
        assert_eq!(0x8000_0007, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0x8000_0004, read_csr(&hart, csr::MEPC));
        assert_eq!(0x8000_0200, hart.registers().pc());
    }

    #[test]
    fn test_illegal_instruction_trap() {
        let mut hart = hart();
        load_program(&mut hart, &[0xFFFF_FFFF]);
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        hart.step().unwrap();
        assert_eq!(2, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0xFFFF_FFFF, read_csr(&hart, csr::MTVAL));
        assert_eq!(0x8000_0000, read_csr(&hart, csr::MEPC));
        assert_eq!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
        assert_ne!(0, read_csr(&hart, csr::MSTATUS) & 0x80);
        // The next cycle will fetch from the handler.
        assert_eq!(0x8000_0100, hart.registers().pc());
    }

    #[test]
    fn test_ecall_and_ebreak_causes() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        load_program(&mut hart, &[0x0000_0073]); // ecall
        hart.step().unwrap();
        assert_eq!(11, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0, read_csr(&hart, csr::MTVAL));

        let mut hart2 = self::hart();
        write_csr(&mut hart2, csr::MTVEC, 0x8000_0100);
        load_program(&mut hart2, &[0x0010_0073]); // ebreak
        hart2.step().unwrap();
        assert_eq!(3, read_csr(&hart2, csr::MCAUSE));
    }

    #[test]
    fn test_mret_restores_context() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        load_program(&mut hart, &[0x0000_0073]); // ecall traps, mepc = 0x80000000
        hart.step().unwrap();
        assert_eq!(0, read_csr(&hart, csr::MSTATUS) & 0x8);

        hart.execute_instruction(Instruction::Mret, 0x3020_0073).unwrap();
        assert_eq!(0x8000_0000, hart.registers().pc());
        assert_ne!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
        assert_eq!(PrivilegeLevel::Machine, hart.privilege_mode());
    }

    #[test]
    fn test_misaligned_jalr_target() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        hart.registers_mut().set_x(x(1), 0x8000_0003);
        // jalr x0, 0(x1): the low bit is cleared first, leaving 0x80000002, still misaligned.
        load_program(&mut hart, &[0x0000_8067]);
        hart.step().unwrap();
        assert_eq!(0, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0x8000_0002, read_csr(&hart, csr::MTVAL));
        assert_eq!(0x8000_0000, read_csr(&hart, csr::MEPC));
    }

    #[test]
    fn test_misaligned_pc_traps() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        *hart.registers_mut().pc_mut() = 0x8000_0002;
        hart.step().unwrap();
        assert_eq!(0, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0x8000_0002, read_csr(&hart, csr::MTVAL));
        assert_eq!(0x8000_0100, hart.registers().pc());
    }

    #[test]
    fn test_fetch_fault() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0100);
        *hart.registers_mut().pc_mut() = 0x9000_0000;
        hart.step().unwrap();
        assert_eq!(5, read_csr(&hart, csr::MCAUSE));
        assert_eq!(0x9000_0000, read_csr(&hart, csr::MTVAL));
    }

    #[test]
    fn test_null_read_is_fatal() {
        let mut hart = hart();
        // lw x5, 0(x0): loads from address zero.
        load_program(&mut hart, &[0x0000_2283]);
        let result = hart.step();
        assert!(matches!(result, Err(FatalError::NullRead { .. })));
        assert_eq!(1, FatalError::NullRead { pc: 0 }.exit_code());
    }

    #[test]
    fn test_vectored_mtvec_is_fatal() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MTVEC, 0x8000_0101); // MODE=Vectored
        load_program(&mut hart, &[0xFFFF_FFFF]);
        let result = hart.step();
        assert!(matches!(
            result,
            Err(FatalError::UnhandledTrapVectorMode { mtvec: 0x8000_0101 })
        ));
        assert_eq!(4, FatalError::UnhandledTrapVectorMode { mtvec: 0 }.exit_code());
    }

    #[test]
    fn test_mtimecmp_write_clears_mtip() {
        let mut hart = hart();
        load_program(&mut hart, &[0x0000_0013, 0x0000_0013]);
        // Expire the comparator and run one cycle so MTIP latches (mie is empty, so no trap).
        hart.bus_mut().write32(bus::MTIMECMP_HI_ADDR, 0).unwrap();
        hart.bus_mut().write32(bus::MTIMECMP_LO_ADDR, 0).unwrap();
        hart.step().unwrap();
        assert_ne!(0, read_csr(&hart, csr::MIP) & (1 << 7));
        // Reprogramming the comparator above mtime acknowledges the interrupt.
        hart.store_word(bus::MTIMECMP_HI_ADDR, u32::MAX).unwrap();
        assert_eq!(0, read_csr(&hart, csr::MIP) & (1 << 7));
    }

    #[test]
    fn test_wfi_enables_interrupts() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MSTATUS, 0);
        assert_eq!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
        hart.execute_instruction(Instruction::Wfi, 0x1050_0073).unwrap();
        assert_ne!(0, read_csr(&hart, csr::MSTATUS) & 0x8);
        assert_eq!(0x8000_0004, hart.registers().pc());
    }

    #[test]
    fn test_x0_stays_zero() {
        let mut hart = hart();
        // addi x0, x0, 5
        load_program(&mut hart, &[0x0050_0013]);
        hart.step().unwrap();
        assert_eq!(0, hart.registers().x(Specifier::X0));
    }

    #[test]
    fn test_misa_and_mhartid() {
        let hart = hart();
        assert_eq!(Hart::MISA, read_csr(&hart, csr::MISA));
        assert_eq!(0, read_csr(&hart, csr::MHARTID));
        assert_eq!(0, read_csr(&hart, csr::MVENDORID));
    }

    #[test]
    fn test_misa_write_ignored() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MISA, 0);
        assert_eq!(Hart::MISA, read_csr(&hart, csr::MISA));
    }

    #[test]
    fn test_counter_writes_ignored() {
        let mut hart = hart();
        load_program(&mut hart, &[0x0000_0013]);
        hart.step().unwrap();
        write_csr(&mut hart, csr::MCYCLE, 1000);
        assert_eq!(1, read_csr(&hart, csr::MCYCLE));
        // The read-only shadow mirrors the machine counter; writing it is also silent.
        write_csr(&mut hart, csr::CYCLE, 1000);
        assert_eq!(1, read_csr(&hart, csr::CYCLE));
    }

    #[test]
    fn test_pmp_reads_zero_ignores_writes() {
        let mut hart = hart();
        write_csr(&mut hart, csr::PMPCFG0, 0xFFFF_FFFF);
        write_csr(&mut hart, csr::PMPADDR0, 0xFFFF_FFFF);
        assert_eq!(0, read_csr(&hart, csr::PMPCFG0));
        assert_eq!(0, read_csr(&hart, csr::PMPADDR0));
    }

    #[test]
    fn test_mideleg_reads_zero() {
        let mut hart = hart();
        write_csr(&mut hart, csr::MIDELEG, 0xFFFF_FFFF);
        assert_eq!(0, read_csr(&hart, csr::MIDELEG));
    }

    #[test]
    fn test_unnamed_csr_is_plain_storage() {
        let mut hart = hart();
        // A machine-level read/write number with no dedicated behavior.
        write_csr(&mut hart, 0x7C0, 0xCAFE_F00D);
        assert_eq!(0xCAFE_F00D, read_csr(&hart, 0x7C0));
    }

    #[test]
    fn test_csr_privilege_violation() {
        let hart = hart();
        let result = hart.read_csr(csr::MSTATUS, PrivilegeLevel::User);
        assert!(matches!(
            result,
            Err(CsrAccessError::Privileged { .. })
        ));
    }

    #[test]
    fn test_loads_sign_extend() {
        let mut hart = hart();
        hart.bus_mut().write32(0x8000_1000, 0x8000_00FF).unwrap();
        hart.registers_mut().set_x(x(6), 0x8000_1000);
        let load = |hart: &mut Hart, width, offset| {
            hart.execute_instruction(
                Instruction::Load {
                    width,
                    dest: x(5),
                    base: x(6),
                    offset,
                },
                0,
            )
            .unwrap();
            hart.registers().x(x(5))
        };
        assert_eq!(0xFFFF_FFFF, load(&mut hart, LoadWidth::Lb, 0));
        assert_eq!(0x0000_00FF, load(&mut hart, LoadWidth::Lbu, 0));
        assert_eq!(0xFFFF_8000, load(&mut hart, LoadWidth::Lh, 2));
        assert_eq!(0x0000_8000, load(&mut hart, LoadWidth::Lhu, 2));
        assert_eq!(0x8000_00FF, load(&mut hart, LoadWidth::Lw, 0));
    }

    #[test]
    fn test_store_widths() {
        let mut hart = hart();
        hart.bus_mut().write32(0x8000_1000, 0xFFFF_FFFF).unwrap();
        hart.registers_mut().set_x(x(6), 0x8000_1000);
        hart.registers_mut().set_x(x(7), 0x1234_5678);
        let store = |hart: &mut Hart, width, offset| {
            hart.execute_instruction(
                Instruction::Store {
                    width,
                    src: x(7),
                    base: x(6),
                    offset,
                },
                0,
            )
            .unwrap();
        };
        store(&mut hart, StoreWidth::Sb, 0);
        assert_eq!(Ok(0xFFFF_FF78), hart.bus().read32(0x8000_1000));
        store(&mut hart, StoreWidth::Sh, 0);
        assert_eq!(Ok(0xFFFF_5678), hart.bus().read32(0x8000_1000));
        store(&mut hart, StoreWidth::Sw, 0);
        assert_eq!(Ok(0x1234_5678), hart.bus().read32(0x8000_1000));
    }
}
