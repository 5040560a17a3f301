//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Every fetch reads the opcode plus the next two bytes, whether or not the
//! instruction uses them. Handlers move the PC themselves.

use std::io::Write;

use log::{info, trace};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::alu::{self, AluError, AluOp, Flag};
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::memory::MemoryError;
use crate::cpu::{Memory, Registers};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
}

/// The LS-8 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Address of the next instruction.
    pub pc: u8,
    /// Result of the last comparison, `None` until one has run.
    pub flag: Option<Flag>,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU in its power-on state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            pc: 0,
            flag: None,
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset the CPU to its power-on state, clearing memory.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Load a program into memory at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)
    }

    /// Execute a single instruction, writing any `PRN` output to `out`.
    ///
    /// Returns the instruction that was executed.
    pub fn step<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch
        let pc = self.pc;
        let opcode = self.mem.read(pc);
        let operand_a = self.mem.read(pc.wrapping_add(1));
        let operand_b = self.mem.read(pc.wrapping_add(2));

        // Decode
        let instr = decode::decode(opcode, operand_a, operand_b).map_err(|e| match e {
            DecodeError::UnknownOpcode(opcode) => CpuError::UnknownInstruction { opcode, address: pc },
            other => CpuError::Decode { address: pc, source: other },
        })?;
        trace!("{:02X}: {:?}", pc, instr);

        // Execute
        self.execute(instr, out)?;

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions, calling `before_step` with
    /// the CPU ahead of each one.
    ///
    /// Returns the number of instructions executed. The CPU is still running
    /// afterwards if the limit was reached first.
    pub fn run_limited<W, F>(&mut self, out: &mut W, max_cycles: u64, mut before_step: F) -> Result<u64, CpuError>
    where
        W: Write + ?Sized,
        F: FnMut(&Cpu),
    {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            before_step(self);
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run an ALU operation over two registers.
    pub fn alu(&mut self, op: AluOp, reg_a: u8, reg_b: u8) -> Result<(), CpuError> {
        alu::apply(op, &mut self.regs, &mut self.flag, reg_a, reg_b)?;
        Ok(())
    }

    /// Execute a decoded instruction.
    fn execute<W: Write + ?Sized>(&mut self, instr: Instruction, out: &mut W) -> Result<(), CpuError> {
        match instr {
            Instruction::Halt => {
                self.state = CpuState::Halted;
                info!("halted at {:#04x} after {} cycles", self.pc, self.cycles + 1);
            }

            // ==================== Registers & Output ====================

            Instruction::LoadImmediate { reg, value } => {
                self.assign(reg, value)?;
                self.advance(3);
            }

            Instruction::Print { reg } => {
                writeln!(out, "{}", self.regs.get(reg))
                    .map_err(|e| CpuError::Output(e.to_string()))?;
                self.advance(2);
            }

            // ==================== Arithmetic ====================

            Instruction::Multiply { reg_a, reg_b } => {
                Self::check_assignable(reg_a)?;
                let product = self.regs.get(reg_a).wrapping_mul(self.regs.get(reg_b));
                self.regs.set(reg_a, product);
                self.advance(3);
            }

            Instruction::Add { reg_a, reg_b } => {
                Self::check_assignable(reg_a)?;
                self.alu(AluOp::Add, reg_a, reg_b)?;
                self.advance(3);
            }

            Instruction::Compare { reg_a, reg_b } => {
                self.alu(AluOp::Compare, reg_a, reg_b)?;
                self.advance(3);
            }

            // ==================== Stack ====================

            Instruction::Push { reg } => {
                self.push(self.regs.get(reg));
                self.advance(2);
            }

            Instruction::Pop { reg } => {
                Self::check_assignable(reg)?;
                let value = self.pop();
                self.regs.set(reg, value);
                self.advance(2);
            }

            Instruction::Call { reg } => {
                let target = self.regs.get(reg);
                self.push(self.pc.wrapping_add(2));
                self.pc = target;
            }

            Instruction::Return => {
                self.pc = self.pop();
            }

            // ==================== Control Flow ====================

            Instruction::Jump { reg } => {
                self.pc = self.regs.get(reg);
            }

            Instruction::JumpIfEqual { reg } => {
                self.branch_if(self.flag == Some(Flag::Equal), reg);
            }

            Instruction::JumpIfNotEqual { reg } => {
                self.branch_if(self.flag != Some(Flag::Equal), reg);
            }
        }

        Ok(())
    }

    fn check_assignable(reg: u8) -> Result<(), CpuError> {
        if Registers::is_general_purpose(reg) {
            Ok(())
        } else {
            Err(CpuError::ReservedRegisterWrite(reg))
        }
    }

    /// Write a general purpose register, refusing the reserved ones.
    fn assign(&mut self, reg: u8, value: u8) -> Result<(), CpuError> {
        Self::check_assignable(reg)?;
        self.regs.set(reg, value);
        Ok(())
    }

    #[inline]
    fn advance(&mut self, width: u8) {
        self.pc = self.pc.wrapping_add(width);
    }

    fn branch_if(&mut self, taken: bool, reg: u8) {
        if taken {
            self.pc = self.regs.get(reg);
        } else {
            self.advance(2);
        }
    }

    fn push(&mut self, value: u8) {
        let sp = self.regs.sp().wrapping_sub(1);
        self.regs.set_sp(sp);
        self.mem.write(sp, value);
    }

    fn pop(&mut self) -> u8 {
        let sp = self.regs.sp();
        let value = self.mem.read(sp);
        self.regs.set_sp(sp.wrapping_add(1));
        value
    }

    /// One-line dump of the PC, the three fetch bytes and all registers.
    pub fn trace(&self) -> String {
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            self.pc,
            self.mem.read(self.pc),
            self.mem.read(self.pc.wrapping_add(1)),
            self.mem.read(self.pc.wrapping_add(2)),
        );

        for value in self.regs.as_array() {
            line.push_str(&format!(" {:02X}", value));
        }

        line.push_str(&format!(" | {}", alu::flag_symbol(self.flag)));
        line
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("flag", &self.flag)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("unknown instruction {opcode:#010b} ({opcode}) at address {address}")]
    UnknownInstruction { opcode: u8, address: u8 },

    #[error("decode error at address {address}: {source}")]
    Decode { address: u8, source: DecodeError },

    #[error("register {0} is reserved, use a register below 5")]
    ReservedRegisterWrite(u8),

    #[error(transparent)]
    Alu(#[from] AluError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("output error: {0}")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode_all, Opcode};
    use crate::cpu::registers::SP_INIT;
    use proptest::prelude::*;

    use Instruction::*;

    fn boot(program: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(&encode_all(program)).unwrap();
        cpu
    }

    fn run_output(program: &[Instruction]) -> (Cpu, String) {
        let mut cpu = boot(program);
        let mut out = Vec::new();
        cpu.run(&mut out).unwrap();
        (cpu, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_print8() {
        let (cpu, out) = run_output(&[
            LoadImmediate { reg: 0, value: 8 },
            Print { reg: 0 },
            Halt,
        ]);
        assert_eq!(out, "8\n");
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles, 3);
    }

    #[test]
    fn test_multiply() {
        let (_, out) = run_output(&[
            LoadImmediate { reg: 0, value: 3 },
            LoadImmediate { reg: 1, value: 4 },
            Multiply { reg_a: 0, reg_b: 1 },
            Print { reg: 0 },
            Halt,
        ]);
        assert_eq!(out, "12\n");
    }

    #[test]
    fn test_multiply_wraps() {
        let (cpu, _) = run_output(&[
            LoadImmediate { reg: 0, value: 16 },
            LoadImmediate { reg: 1, value: 17 },
            Multiply { reg_a: 0, reg_b: 1 },
            Halt,
        ]);
        assert_eq!(cpu.regs.get(0), (16u16 * 17 % 256) as u8);
    }

    #[test]
    fn test_add() {
        let (cpu, _) = run_output(&[
            LoadImmediate { reg: 0, value: 10 },
            LoadImmediate { reg: 1, value: 20 },
            Add { reg_a: 0, reg_b: 1 },
            Halt,
        ]);
        assert_eq!(cpu.regs.get(0), 30);
        assert_eq!(cpu.regs.get(1), 20);
    }

    #[test]
    fn test_pc_advances_by_width() {
        let mut cpu = boot(&[
            LoadImmediate { reg: 0, value: 1 },
            Print { reg: 0 },
            Halt,
        ]);
        let mut out = Vec::new();

        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.pc, 3);
        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.pc, 5);
        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.pc, 5);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_step_after_halt() {
        let (mut cpu, _) = run_output(&[Halt]);
        let err = cpu.step(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::NotRunning(CpuState::Halted));
    }

    #[test]
    fn test_reserved_register_write() {
        let mut cpu = boot(&[LoadImmediate { reg: 5, value: 1 }, Halt]);
        let err = cpu.run(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::ReservedRegisterWrite(5));
        assert_eq!(cpu.regs.get(5), 0);
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_ldi_register_8_is_reserved() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[Opcode::LDI, 8, 1, Opcode::HLT]).unwrap();
        let err = cpu.run(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::ReservedRegisterWrite(8));
        assert!(cpu.is_running());
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_out_of_range_destinations_are_reserved() {
        for (opcode, reg) in [(Opcode::LDI, 255), (Opcode::MUL, 9), (Opcode::ADD, 8), (Opcode::POP, 12)] {
            let mut cpu = Cpu::new();
            cpu.load_program(&[opcode, reg, 0, Opcode::HLT]).unwrap();
            let err = cpu.run(&mut Vec::new()).unwrap_err();
            assert_eq!(err, CpuError::ReservedRegisterWrite(reg), "opcode {:#010b}", opcode);
        }
    }

    #[test]
    fn test_pop_into_stack_pointer_refused() {
        let mut cpu = boot(&[Push { reg: 0 }, Pop { reg: 7 }, Halt]);
        let err = cpu.run(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::ReservedRegisterWrite(7));
    }

    #[test]
    fn test_unknown_instruction() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0b1000_0010, 0, 1, 0b1111_1111]).unwrap();
        let err = cpu.run(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::UnknownInstruction { opcode: 0xFF, address: 3 });
        assert!(err.to_string().contains("255"));
        assert!(err.to_string().contains("address 3"));
    }

    #[test]
    fn test_zeroed_memory_is_unknown() {
        let mut cpu = Cpu::new();
        let err = cpu.step(&mut Vec::new()).unwrap_err();
        assert_eq!(err, CpuError::UnknownInstruction { opcode: 0, address: 0 });
    }

    #[test]
    fn test_push_pop() {
        let (cpu, _) = run_output(&[
            LoadImmediate { reg: 0, value: 99 },
            Push { reg: 0 },
            Pop { reg: 3 },
            Halt,
        ]);
        assert_eq!(cpu.regs.get(3), 99);
        assert_eq!(cpu.regs.sp(), SP_INIT);
        assert_eq!(cpu.mem.read(SP_INIT - 1), 99);
    }

    #[test]
    fn test_stack_pointer_wraps() {
        let mut cpu = boot(&[
            LoadImmediate { reg: 0, value: 5 },
            Push { reg: 0 },
            Pop { reg: 1 },
            Halt,
        ]);
        cpu.regs.set_sp(0);
        let mut out = Vec::new();

        cpu.step(&mut out).unwrap();
        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.regs.sp(), 0xFF);
        assert_eq!(cpu.mem.read(0xFF), 5);

        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.regs.sp(), 0);
        assert_eq!(cpu.regs.get(1), 5);
    }

    #[test]
    fn test_jeq_taken_when_equal() {
        // 0: LDI R0,4  3: LDI R1,4  6: LDI R2,16  9: CMP R0,R1  12: JEQ R2
        // 14: PRN R0 (skipped)  16: PRN R1  18: HLT
        let (_, out) = run_output(&[
            LoadImmediate { reg: 0, value: 4 },
            LoadImmediate { reg: 1, value: 4 },
            LoadImmediate { reg: 2, value: 16 },
            Compare { reg_a: 0, reg_b: 1 },
            JumpIfEqual { reg: 2 },
            Print { reg: 2 },
            Print { reg: 1 },
            Halt,
        ]);
        assert_eq!(out, "4\n");
    }

    #[test]
    fn test_jeq_falls_through_when_unequal() {
        let (cpu, out) = run_output(&[
            LoadImmediate { reg: 0, value: 4 },
            LoadImmediate { reg: 1, value: 5 },
            LoadImmediate { reg: 2, value: 16 },
            Compare { reg_a: 0, reg_b: 1 },
            JumpIfEqual { reg: 2 },
            Print { reg: 2 },
            Print { reg: 1 },
            Halt,
        ]);
        assert_eq!(out, "16\n5\n");
        assert_eq!(cpu.flag, Some(Flag::Less));
    }

    #[test]
    fn test_jne_taken_when_unequal() {
        let (_, out) = run_output(&[
            LoadImmediate { reg: 0, value: 4 },
            LoadImmediate { reg: 1, value: 5 },
            LoadImmediate { reg: 2, value: 16 },
            Compare { reg_a: 0, reg_b: 1 },
            JumpIfNotEqual { reg: 2 },
            Print { reg: 2 },
            Print { reg: 1 },
            Halt,
        ]);
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_jne_without_compare_branches() {
        // 0: LDI R0,7  3: JNE R0  5: HLT  7: PRN R0  9: HLT
        let mut cpu = Cpu::new();
        cpu.load_program(&encode_all(&[
            LoadImmediate { reg: 0, value: 7 },
            JumpIfNotEqual { reg: 0 },
            Halt,
            Halt,
            Print { reg: 0 },
            Halt,
        ])).unwrap();
        let mut out = Vec::new();
        cpu.run(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "7\n");
    }

    #[test]
    fn test_jmp() {
        // 0: LDI R1,7  3: JMP R1  5: PRN R1  7: HLT
        let (cpu, out) = run_output(&[
            LoadImmediate { reg: 1, value: 7 },
            Jump { reg: 1 },
            Print { reg: 1 },
            Halt,
        ]);
        assert_eq!(out, "");
        assert_eq!(cpu.pc, 7);
    }

    #[test]
    fn test_call_and_return() {
        // 0: LDI R1,9  3: CALL R1  5: PRN R0  7: HLT
        // 8: HLT (padding)  9: LDI R0,42  12: RET
        let (cpu, out) = run_output(&[
            LoadImmediate { reg: 1, value: 9 },
            Call { reg: 1 },
            Print { reg: 0 },
            Halt,
            Halt,
            LoadImmediate { reg: 0, value: 42 },
            Return,
        ]);
        assert_eq!(out, "42\n");
        assert_eq!(cpu.pc, 7);
        assert_eq!(cpu.regs.sp(), SP_INIT);
        assert_eq!(cpu.mem.read(SP_INIT - 1), 5);
    }

    #[test]
    fn test_run_limited() {
        // 0: LDI R0,3  3: JMP R0 loops forever
        let mut cpu = boot(&[LoadImmediate { reg: 0, value: 3 }, Jump { reg: 0 }]);
        let mut seen = Vec::new();
        let executed = cpu.run_limited(&mut Vec::new(), 10, |cpu| seen.push(cpu.pc)).unwrap();
        assert_eq!(executed, 10);
        assert!(cpu.is_running());
        assert_eq!(seen.len(), 10);
        assert_eq!(&seen[..3], &[0, 3, 3]);
    }

    #[test]
    fn test_run_limited_stops_at_halt() {
        let mut cpu = boot(&[LoadImmediate { reg: 0, value: 8 }, Print { reg: 0 }, Halt]);
        let mut out = Vec::new();
        let mut traces = Vec::new();
        let executed = cpu.run_limited(&mut out, u64::MAX, |cpu| traces.push(cpu.trace())).unwrap();
        assert_eq!(executed, 3);
        assert!(cpu.is_halted());
        assert_eq!(out, b"8\n");
        assert_eq!(traces[0], "TRACE: 00 | 82 00 08 | 00 00 00 00 00 00 00 F4 | -");
    }

    #[test]
    fn test_unsupported_alu_op() {
        let mut cpu = Cpu::new();
        let err = cpu.alu(AluOp::Div, 0, 1).unwrap_err();
        assert_eq!(err, CpuError::Alu(AluError::Unsupported(AluOp::Div)));
    }

    #[test]
    fn test_trace_line() {
        let mut cpu = boot(&[LoadImmediate { reg: 0, value: 8 }, Halt]);
        assert_eq!(
            cpu.trace(),
            "TRACE: 00 | 82 00 08 | 00 00 00 00 00 00 00 F4 | -"
        );
        cpu.step(&mut Vec::new()).unwrap();
        assert!(cpu.trace().starts_with("TRACE: 03 | 01 00 00 | 08"));
    }

    #[test]
    fn test_reset() {
        let (mut cpu, _) = run_output(&[LoadImmediate { reg: 0, value: 1 }, Halt]);
        cpu.reset();
        assert!(cpu.is_running());
        assert_eq!(cpu.pc, 0);
        assert_eq!(cpu.regs.get(0), 0);
        assert_eq!(cpu.mem.read(0), 0);
        assert_eq!(cpu.last_instruction(), None);
    }

    proptest! {
        #[test]
        fn prop_push_pop_restores(value: u8, src in 0u8..5, dst in 0u8..5, sp: u8) {
            let mut cpu = Cpu::new();
            cpu.load_program(&encode_all(&[Push { reg: src }, Pop { reg: dst }])).unwrap();
            cpu.regs.set(src, value);
            // Keep the stack away from the program bytes
            let sp = sp.max(8);
            cpu.regs.set_sp(sp);

            let mut out = Vec::new();
            cpu.step(&mut out).unwrap();
            cpu.step(&mut out).unwrap();

            prop_assert_eq!(cpu.regs.get(dst), value);
            prop_assert_eq!(cpu.regs.sp(), sp);
        }
    }
}
