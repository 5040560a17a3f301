//! Instruction decoder for the LS-8.
//!
//! Opcode bytes are laid out as `AABCDDDD`:
//! - `AA`: number of operand bytes that follow (0-2)
//! - `B`: set for ALU operations
//! - `C`: set for instructions that write the PC themselves
//! - `DDDD`: instruction identifier
//!
//! [`decode`] is the dispatch table: a fixed `match` from opcode byte to
//! [`Instruction`] variant.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::registers::REGISTER_COUNT;

/// Opcode byte values.
pub struct Opcode;

impl Opcode {
    pub const HLT: u8 = 0b0000_0001;
    pub const LDI: u8 = 0b1000_0010;
    pub const PRN: u8 = 0b0100_0111;
    pub const MUL: u8 = 0b1010_0010;
    pub const ADD: u8 = 0b1010_0000;
    pub const CMP: u8 = 0b1010_0111;
    pub const PUSH: u8 = 0b0100_0101;
    pub const POP: u8 = 0b0100_0110;
    pub const CALL: u8 = 0b0101_0000;
    pub const RET: u8 = 0b0001_0001;
    pub const JMP: u8 = 0b0101_0100;
    pub const JEQ: u8 = 0b0101_0101;
    pub const JNE: u8 = 0b0101_0110;
}

/// Width in bytes of the instruction starting with `opcode`, as encoded in
/// its top two bits.
#[inline]
pub fn opcode_width(opcode: u8) -> u8 {
    (opcode >> 6) + 1
}

/// Decoded LS-8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Stop the machine
    Halt,

    /// `reg := value`
    LoadImmediate { reg: u8, value: u8 },

    /// Write `reg` in decimal to the output
    Print { reg: u8 },

    /// `reg_a := reg_a * reg_b`
    Multiply { reg_a: u8, reg_b: u8 },

    /// `reg_a := reg_a + reg_b` through the ALU
    Add { reg_a: u8, reg_b: u8 },

    /// Compare `reg_a` with `reg_b` and set the flag
    Compare { reg_a: u8, reg_b: u8 },

    /// Push `reg` onto the stack
    Push { reg: u8 },

    /// Pop the top of the stack into `reg`
    Pop { reg: u8 },

    /// Push the return address and jump to the address in `reg`
    Call { reg: u8 },

    /// Pop the return address into the PC
    Return,

    /// Jump to the address in `reg`
    Jump { reg: u8 },

    /// Jump to the address in `reg` if the last comparison was equal
    JumpIfEqual { reg: u8 },

    /// Jump to the address in `reg` unless the last comparison was equal
    JumpIfNotEqual { reg: u8 },
}

impl Instruction {
    /// The opcode byte for this instruction.
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Halt => Opcode::HLT,
            Instruction::LoadImmediate { .. } => Opcode::LDI,
            Instruction::Print { .. } => Opcode::PRN,
            Instruction::Multiply { .. } => Opcode::MUL,
            Instruction::Add { .. } => Opcode::ADD,
            Instruction::Compare { .. } => Opcode::CMP,
            Instruction::Push { .. } => Opcode::PUSH,
            Instruction::Pop { .. } => Opcode::POP,
            Instruction::Call { .. } => Opcode::CALL,
            Instruction::Return => Opcode::RET,
            Instruction::Jump { .. } => Opcode::JMP,
            Instruction::JumpIfEqual { .. } => Opcode::JEQ,
            Instruction::JumpIfNotEqual { .. } => Opcode::JNE,
        }
    }

    /// Assembly mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Halt => "HLT",
            Instruction::LoadImmediate { .. } => "LDI",
            Instruction::Print { .. } => "PRN",
            Instruction::Multiply { .. } => "MUL",
            Instruction::Add { .. } => "ADD",
            Instruction::Compare { .. } => "CMP",
            Instruction::Push { .. } => "PUSH",
            Instruction::Pop { .. } => "POP",
            Instruction::Call { .. } => "CALL",
            Instruction::Return => "RET",
            Instruction::Jump { .. } => "JMP",
            Instruction::JumpIfEqual { .. } => "JEQ",
            Instruction::JumpIfNotEqual { .. } => "JNE",
        }
    }

    /// Encoded size in bytes.
    pub fn width(&self) -> u8 {
        opcode_width(self.opcode())
    }
}

/// Decode the instruction `opcode` with its two trailing bytes.
///
/// Operand bytes an instruction does not use are ignored. Destination
/// registers of LDI, POP, ADD and MUL are passed through unchecked; the
/// handlers reject anything outside R0-R4 as a reserved register write.
pub fn decode(opcode: u8, operand_a: u8, operand_b: u8) -> Result<Instruction, DecodeError> {
    let reg = |byte: u8| {
        if (byte as usize) < REGISTER_COUNT {
            Ok(byte)
        } else {
            Err(DecodeError::InvalidRegister { opcode, register: byte })
        }
    };

    let instruction = match opcode {
        Opcode::HLT => Instruction::Halt,
        Opcode::LDI => Instruction::LoadImmediate { reg: operand_a, value: operand_b },
        Opcode::PRN => Instruction::Print { reg: reg(operand_a)? },
        Opcode::MUL => Instruction::Multiply { reg_a: operand_a, reg_b: reg(operand_b)? },
        Opcode::ADD => Instruction::Add { reg_a: operand_a, reg_b: reg(operand_b)? },
        Opcode::CMP => Instruction::Compare { reg_a: reg(operand_a)?, reg_b: reg(operand_b)? },
        Opcode::PUSH => Instruction::Push { reg: reg(operand_a)? },
        Opcode::POP => Instruction::Pop { reg: operand_a },
        Opcode::CALL => Instruction::Call { reg: reg(operand_a)? },
        Opcode::RET => Instruction::Return,
        Opcode::JMP => Instruction::Jump { reg: reg(operand_a)? },
        Opcode::JEQ => Instruction::JumpIfEqual { reg: reg(operand_a)? },
        Opcode::JNE => Instruction::JumpIfNotEqual { reg: reg(operand_a)? },
        _ => return Err(DecodeError::UnknownOpcode(opcode)),
    };

    Ok(instruction)
}

/// Encode an instruction to its 1-3 bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let opcode = instr.opcode();
    match *instr {
        Instruction::Halt | Instruction::Return => vec![opcode],
        Instruction::LoadImmediate { reg, value } => vec![opcode, reg, value],
        Instruction::Multiply { reg_a, reg_b }
        | Instruction::Add { reg_a, reg_b }
        | Instruction::Compare { reg_a, reg_b } => vec![opcode, reg_a, reg_b],
        Instruction::Print { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Call { reg }
        | Instruction::Jump { reg }
        | Instruction::JumpIfEqual { reg }
        | Instruction::JumpIfNotEqual { reg } => vec![opcode, reg],
    }
}

/// Encode a sequence of instructions back to back.
pub fn encode_all(instructions: &[Instruction]) -> Vec<u8> {
    instructions.iter().flat_map(encode).collect()
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {0:#010b}")]
    UnknownOpcode(u8),

    #[error("opcode {opcode:#010b} names register {register}, which does not exist")]
    InvalidRegister { opcode: u8, register: u8 },
}
