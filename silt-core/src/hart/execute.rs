use super::{CsrWriteError, Exception, ExecutionError, ExecutionResult, FatalError, Hart};
use crate::bus::BusError;
use crate::hart::csr::CsrSpecifier;
use crate::instruction::CsrOp;
use crate::registers::{Registers, Specifier};
use crate::{Alignment, PrivilegeLevel};
use log::debug;

/// Executes single decoded instructions against a hart.
///
/// Every handler computes its result, writes `rd` (writes to `x0` are ignored by the register
/// file), and advances `pc` by 4 unless it installs a new `pc` itself.
#[derive(Debug)]
pub(super) struct Executor<'h> {
    pub hart: &'h mut Hart,
    /// The raw instruction word, reported in `mtval` on illegal-instruction exceptions.
    pub instruction: u32,
}

impl<'h> Executor<'h> {
    /// Executes an `addi` instruction.
    ///
    /// > ADDI adds the sign-extended 12-bit immediate to register rs1. Arithmetic overflow is
    /// > ignored and the result is simply the low XLEN bits of the result.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// Executes a `slti` instruction.
    ///
    /// > SLTI (set less than immediate) places the value 1 in register rd if register rs1 is less
    /// > than the sign-extended immediate when both are treated as signed numbers, else 0 is
    /// > written to rd.
    pub fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// Executes a `sltiu` instruction, the unsigned counterpart of `slti`. The immediate is
    /// sign-extended first and then treated as an unsigned number.
    pub fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < (imm as u32)) as u32)
    }

    /// Executes an `andi` instruction.
    pub fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & (imm as u32))
    }

    /// Executes an `ori` instruction.
    pub fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | (imm as u32))
    }

    /// Executes a `xori` instruction.
    pub fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ (imm as u32))
    }

    /// Executes a `slli` instruction (logical left shift).
    ///
    /// # Panics
    ///
    /// `shift_amount_u5` must fit in a u5 (`0..=31`), otherwise this will panic.
    pub fn slli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s << shamt)
    }

    /// Executes a `srli` instruction (logical right shift).
    ///
    /// # Panics
    ///
    /// `shift_amount_u5` must fit in a u5 (`0..=31`), otherwise this will panic.
    pub fn srli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s >> shamt)
    }

    /// Executes a `srai` instruction (arithmetic right shift; the sign bit is copied into the
    /// vacated upper bits).
    ///
    /// # Panics
    ///
    /// `shift_amount_u5` must fit in a u5 (`0..=31`), otherwise this will panic.
    pub fn srai(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| {
            ((s as i32) >> shamt) as u32
        })
    }

    /// Executes a `lui` instruction.
    ///
    /// > LUI (load upper immediate) is used to build 32-bit constants and uses the U-type format.
    /// > LUI places the U-immediate value in the top 20 bits of the destination register rd,
    /// > filling in the lowest 12 bits with zeros.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let result = immediate as u32 & !0xFFF;
        let registers = &mut self.hart.registers;
        registers.set_x(dest, result);
        increment_pc(registers);
        Ok(())
    }

    /// Executes an `auipc` instruction.
    ///
    /// > AUIPC (add upper immediate to pc) forms a 32-bit offset from the 20-bit U-immediate,
    /// > filling in the lowest 12 bits with zeros, adds this offset to the address of the AUIPC
    /// > instruction, then places the result in register rd.
    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.hart.registers;
        let result = registers.pc().wrapping_add_signed(immediate & !0xFFF);
        registers.set_x(dest, result);
        increment_pc(registers);
        Ok(())
    }

    /// Executes an `add` instruction (wrapping addition).
    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    /// Executes a `sub` instruction (wrapping subtraction of rs2 from rs1).
    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    /// Executes a `slt` instruction (signed compare).
    pub fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) < (s2 as i32)) as u32
        })
    }

    /// Executes a `sltu` instruction (unsigned compare).
    pub fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u32)
    }

    /// Executes an `and` instruction.
    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    /// Executes an `or` instruction.
    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    /// Executes a `xor` instruction.
    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    /// Executes a `sll` instruction. The shift amount is the low 5 bits of rs2.
    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    /// Executes a `srl` instruction. The shift amount is the low 5 bits of rs2.
    pub fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 >> (s2 & 0x1F))
    }

    /// Executes a `sra` instruction. The shift amount is the low 5 bits of rs2.
    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes a `mul` instruction (low 32 bits of the product).
    pub fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_mul(s2))
    }

    /// Executes a `mulh` instruction: the high 32 bits of the signed×signed 64-bit product.
    pub fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            (((s1 as i32 as i64).wrapping_mul(s2 as i32 as i64)) >> 32) as u32
        })
    }

    /// Executes a `mulhsu` instruction: the high 32 bits of the signed×unsigned 64-bit product.
    pub fn mulhsu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            (((s1 as i32 as i64).wrapping_mul(s2 as u64 as i64)) >> 32) as u32
        })
    }

    /// Executes a `mulhu` instruction: the high 32 bits of the unsigned×unsigned 64-bit product.
    pub fn mulhu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            (((s1 as u64) * (s2 as u64)) >> 32) as u32
        })
    }

    /// Executes a `div` instruction (signed).
    ///
    /// Division by zero yields all-ones; overflow (`INT_MIN / -1`) yields `INT_MIN`.
    pub fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            let (s1, s2) = (s1 as i32, s2 as i32);
            if s2 == 0 {
                0xFFFF_FFFF
            } else if s1 == i32::MIN && s2 == -1 {
                s1 as u32
            } else {
                (s1 / s2) as u32
            }
        })
    }

    /// Executes a `divu` instruction (unsigned). Division by zero yields all-ones.
    pub fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(
            dest,
            src1,
            src2,
            |s1, s2| if s2 == 0 { 0xFFFF_FFFF } else { s1 / s2 },
        )
    }

    /// Executes a `rem` instruction (signed).
    ///
    /// Remainder of division by zero is the dividend; remainder on overflow is zero.
    pub fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            let (a, b) = (s1 as i32, s2 as i32);
            if b == 0 {
                s1
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                (a % b) as u32
            }
        })
    }

    /// Executes a `remu` instruction (unsigned). Remainder of division by zero is the dividend.
    pub fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| if s2 == 0 { s1 } else { s1 % s2 })
    }

    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| registers.pc().wrapping_add_signed(offset))
    }

    /// The target of `jalr` has its lowest bit cleared before the alignment check.
    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| {
            registers.x(base).wrapping_add_signed(offset) & !1
        })
    }

    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 == s2)
    }

    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 != s2)
    }

    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    pub fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 < s2)
    }

    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    pub fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 >= s2)
    }

    pub fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |hart, address| {
            hart.load_byte(address).map(|value| value as i8 as u32)
        })
    }

    pub fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |hart, address| {
            hart.load_byte(address).map(|value| value as u32)
        })
    }

    pub fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |hart, address| {
            hart.load_halfword(address).map(|value| value as i16 as u32)
        })
    }

    pub fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |hart, address| {
            hart.load_halfword(address).map(|value| value as u32)
        })
    }

    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |hart, address| hart.load_word(address))
    }

    pub fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |hart, address, value| {
            hart.store_byte(address, value as u8)
        })
    }

    pub fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |hart, address, value| {
            hart.store_halfword(address, value as u16)
        })
    }

    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |hart, address, value| {
            hart.store_word(address, value)
        })
    }

    /// With a single hart and strictly program-ordered memory, `fence` is a nop.
    pub fn fence(&mut self) -> ExecutionResult {
        increment_pc(&mut self.hart.registers);
        Ok(())
    }

    /// Instruction fetches always observe the latest stores, so `fence.i` is a nop.
    pub fn fence_i(&mut self) -> ExecutionResult {
        increment_pc(&mut self.hart.registers);
        Ok(())
    }

    pub fn ecall(&mut self) -> ExecutionResult {
        // The hart only ever runs in Machine mode.
        Err(Exception::EnvironmentCallFromMMode.into())
    }

    pub fn ebreak(&mut self) -> ExecutionResult {
        Err(Exception::Breakpoint {
            pc: self.hart.registers.pc(),
        }
        .into())
    }

    /// Executes an `mret` instruction, returning from the current trap handler.
    pub fn mret(&mut self) -> ExecutionResult {
        let hart = &mut *self.hart;
        if hart.privilege_mode < PrivilegeLevel::Machine {
            return Err(FatalError::InsufficientPrivilege {
                privilege: hart.privilege_mode,
            }
            .into());
        }
        // Until lower privilege modes are supported, the restored mode is pinned to Machine
        // regardless of MPP.
        hart.privilege_mode = PrivilegeLevel::Machine;
        hart.status.apply_mret();
        let mepc = hart.trap.read_mepc();
        debug!("mret to {mepc:#010x}");
        *hart.registers.pc_mut() = mepc;
        Ok(())
    }

    /// Executes a `wfi` instruction.
    ///
    /// The cycle loop does not actually idle; enabling MIE and moving on lets the pending timer
    /// interrupt (driven by the host clock) be taken on a later cycle.
    pub fn wfi(&mut self) -> ExecutionResult {
        self.hart.status.set_mie(true);
        increment_pc(&mut self.hart.registers);
        Ok(())
    }

    /// Executes a `csrrw` instruction.
    ///
    /// > The CSRRW (Atomic Read/Write CSR) instruction atomically swaps values in the CSRs and
    /// > integer registers. CSRRW reads the old value of the CSR, zero-extends the value to XLEN
    /// > bits, then writes it to integer register rd. The initial value in rs1 is written to the
    /// > CSR.
    pub fn csrrw(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        self.csr_reg_op(CsrOp::ReadWrite, dest, csr, src)
    }

    /// Executes a `csrrs` instruction.
    ///
    /// > The CSRRS (Atomic Read and Set Bits in CSR) instruction reads the value of the CSR,
    /// > zero-extends the value to XLEN bits, and writes it to integer register rd. The initial
    /// > value in integer register rs1 is treated as a bit mask that specifies bit positions to
    /// > be set in the CSR.
    ///
    /// With `rs1 == x0` the write (and its side effects) is suppressed entirely.
    pub fn csrrs(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        self.csr_reg_op(CsrOp::ReadSet, dest, csr, src)
    }

    /// Executes a `csrrc` instruction, clearing the mask in rs1. With `rs1 == x0` the write (and
    /// its side effects) is suppressed entirely.
    pub fn csrrc(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        self.csr_reg_op(CsrOp::ReadClear, dest, csr, src)
    }

    /// Executes a `csrrwi` instruction; the 5-bit immediate replaces rs1 as the source.
    pub fn csrrwi(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_imm_op(CsrOp::ReadWrite, dest, csr, immediate)
    }

    /// Executes a `csrrsi` instruction. With a zero immediate the write is suppressed.
    pub fn csrrsi(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_imm_op(CsrOp::ReadSet, dest, csr, immediate)
    }

    /// Executes a `csrrci` instruction. With a zero immediate the write is suppressed.
    pub fn csrrci(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_imm_op(CsrOp::ReadClear, dest, csr, immediate)
    }

    /// Executes a `lr.w` instruction: load the word and set the reservation.
    pub fn lr_w(&mut self, dest: Specifier, addr: Specifier) -> ExecutionResult {
        let address = self.hart.registers.x(addr);
        self.check_amo_alignment(address)?;
        let value = self
            .hart
            .load_word(address)
            .map_err(|error| self.load_error(error))?;
        self.hart.reservation = true;
        let registers = &mut self.hart.registers;
        registers.set_x(dest, value);
        increment_pc(registers);
        Ok(())
    }

    /// Executes a `sc.w` instruction.
    ///
    /// Succeeds (stores, and writes 0 to rd) exactly when the reservation is held; the
    /// reservation is consumed by a successful store. Fails with a non-zero rd otherwise. Either
    /// way the instruction completes and `pc` advances.
    pub fn sc_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        let address = self.hart.registers.x(addr);
        self.check_amo_alignment(address)?;
        let result = if self.hart.reservation {
            let value = self.hart.registers.x(src);
            self.hart
                .store_word(address, value)
                .map_err(|error| self.store_error(error))?;
            self.hart.reservation = false;
            0
        } else {
            1
        };
        let registers = &mut self.hart.registers;
        registers.set_x(dest, result);
        increment_pc(registers);
        Ok(())
    }

    pub fn amoswap_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |_, s| s)
    }

    pub fn amoadd_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m.wrapping_add(s))
    }

    pub fn amoxor_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m ^ s)
    }

    pub fn amoand_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m & s)
    }

    pub fn amoor_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m | s)
    }

    pub fn amomin_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| (m as i32).min(s as i32) as u32)
    }

    pub fn amomax_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| (m as i32).max(s as i32) as u32)
    }

    pub fn amominu_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m.min(s))
    }

    pub fn amomaxu_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        self.amo_op(dest, addr, src, |m, s| m.max(s))
    }

    // Private generic implementations

    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, i32) -> u32,
    {
        let registers = &mut self.hart.registers;
        registers.set_x(dest, op(registers.x(src), immediate));
        increment_pc(registers);
        Ok(())
    }

    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        if shift_amount_u5 > 31 {
            panic!("out of range u5 used");
        }
        let registers = &mut self.hart.registers;
        registers.set_x(dest, op(registers.x(src), shift_amount_u5));
        increment_pc(registers);
        Ok(())
    }

    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &mut self.hart.registers;
        registers.set_x(dest, op(registers.x(src1), registers.x(src2)));
        increment_pc(registers);
        Ok(())
    }

    fn jump_op<F>(&mut self, dest: Specifier, compute_target: F) -> ExecutionResult
    where
        F: FnOnce(&Registers) -> u32,
    {
        let registers = &mut self.hart.registers;
        let new_pc = compute_target(registers);
        if !Alignment::WORD.is_aligned(new_pc) {
            return Err(Exception::InstructionAddressMisaligned { target: new_pc }.into());
        }
        let old_pc = std::mem::replace(registers.pc_mut(), new_pc);
        // Write incremented old pc to `dest` register
        registers.set_x(dest, old_pc.wrapping_add(4));
        Ok(())
    }

    // Takes the branch if `predicate` returns `true`.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u32, u32) -> bool,
    {
        let registers = &mut self.hart.registers;
        if predicate(registers.x(src1), registers.x(src2)) {
            let new_pc = registers.pc().wrapping_add_signed(offset);
            if !Alignment::WORD.is_aligned(new_pc) {
                return Err(Exception::InstructionAddressMisaligned { target: new_pc }.into());
            }
            *registers.pc_mut() = new_pc;
        } else {
            increment_pc(registers);
        }
        Ok(())
    }

    fn load_op<F>(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(&Hart, u32) -> Result<u32, BusError>,
    {
        let address = self.hart.registers.x(base).wrapping_add_signed(offset);
        match op(self.hart, address) {
            Ok(value) => {
                let registers = &mut self.hart.registers;
                registers.set_x(dest, value);
                increment_pc(registers);
                Ok(())
            }
            Err(error) => Err(self.load_error(error)),
        }
    }

    fn store_op<F>(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(&mut Hart, u32, u32) -> Result<(), BusError>,
    {
        let value = self.hart.registers.x(src);
        let address = self.hart.registers.x(base).wrapping_add_signed(offset);
        match op(self.hart, address, value) {
            Ok(()) => {
                increment_pc(&mut self.hart.registers);
                Ok(())
            }
            Err(error) => Err(self.store_error(error)),
        }
    }

    /// The common body of the AMO read-modify-write instructions: the loaded word goes to rd,
    /// `op(loaded, rs2)` goes back to memory.
    fn amo_op<F>(
        &mut self,
        dest: Specifier,
        addr: Specifier,
        src: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let address = self.hart.registers.x(addr);
        self.check_amo_alignment(address)?;
        let loaded = self
            .hart
            .load_word(address)
            .map_err(|error| self.load_error(error))?;
        let result = op(loaded, self.hart.registers.x(src));
        self.hart
            .store_word(address, result)
            .map_err(|error| self.store_error(error))?;
        let registers = &mut self.hart.registers;
        registers.set_x(dest, loaded);
        increment_pc(registers);
        Ok(())
    }

    /// Reservation and read-modify-write targets must be word-aligned; the offending address is
    /// reported in `mtval`.
    fn check_amo_alignment(&self, address: u32) -> Result<(), ExecutionError> {
        if Alignment::WORD.is_aligned(address) {
            Ok(())
        } else {
            Err(Exception::InstructionAddressMisaligned { target: address }.into())
        }
    }

    fn csr_reg_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src: Specifier,
    ) -> ExecutionResult {
        let src_value = (op == CsrOp::ReadWrite || src != Specifier::X0)
            .then(|| self.hart.registers.x(src));
        self.csr_op(op, dest, csr, src_value)
    }

    fn csr_imm_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_op(
            op,
            dest,
            csr,
            (op == CsrOp::ReadWrite || immediate != 0).then_some(immediate),
        )
    }

    /// The common body of the Zicsr instructions.
    ///
    /// The order matters: the old value is read first, `pc` advances *before* the write is
    /// carried out (so side effects raised from a setter, such as a newly unmasked interrupt,
    /// observe the post-instruction `pc`), and the old value lands in rd last. `src_value` is
    /// `None` when the write (and its side effects) must be suppressed.
    fn csr_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src_value: Option<u32>,
    ) -> ExecutionResult {
        let privilege = self.hart.privilege_mode;
        let old_value = self
            .hart
            .read_csr(csr, privilege)
            .map_err(|_| Exception::IllegalInstruction {
                instruction: self.instruction,
            })?;
        increment_pc(&mut self.hart.registers);
        if let Some(source) = src_value {
            let new_value = match op {
                CsrOp::ReadWrite => source,
                CsrOp::ReadSet => old_value | source,
                CsrOp::ReadClear => old_value & !source,
            };
            self.hart
                .write_csr(csr, privilege, new_value)
                .map_err(|error| match error {
                    CsrWriteError::AccessError(_) => {
                        ExecutionError::Exception(Exception::IllegalInstruction {
                            instruction: self.instruction,
                        })
                    }
                    CsrWriteError::Fatal(fatal) => ExecutionError::Fatal(fatal),
                })?;
        }
        self.hart.registers.set_x(dest, old_value);
        Ok(())
    }

    fn load_error(&self, error: BusError) -> ExecutionError {
        match error {
            BusError::AccessFault(address) => Exception::LoadAccessFault { address }.into(),
            BusError::NullRead => FatalError::NullRead {
                pc: self.hart.registers.pc(),
            }
            .into(),
        }
    }

    fn store_error(&self, error: BusError) -> ExecutionError {
        match error {
            BusError::AccessFault(address) => Exception::StoreAccessFault { address }.into(),
            // The bus only reports the null-read stop for loads; a store to address zero is an
            // ordinary access fault.
            BusError::NullRead => FatalError::NullRead {
                pc: self.hart.registers.pc(),
            }
            .into(),
        }
    }
}

fn increment_pc(registers: &mut Registers) {
    let pc = registers.pc_mut();
    *pc = pc.wrapping_add(4);
}
