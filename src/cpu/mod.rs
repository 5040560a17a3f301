//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 core:
//! - 256 bytes of RAM
//! - 8 registers: R0-R4 general purpose, IM, IS and the stack pointer
//! - an ALU with a single comparison flag
//! - a fetch-decode-execute engine over a fixed opcode table

pub mod memory;
pub mod registers;
pub mod alu;
pub mod decode;
pub mod execute;

pub use memory::Memory;
pub use registers::Registers;
pub use alu::{AluOp, Flag};
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{Cpu, CpuError, CpuState};
