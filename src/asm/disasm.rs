//! Disassembler for LS-8 programs.
//!
//! Converts program bytes back to readable assembly.

use crate::cpu::decode::{decode, opcode_width, Instruction};

/// Disassemble the instruction at `addr` in `bytes`.
///
/// Returns the text and the number of bytes it covers. Operand bytes past
/// the end of `bytes` read as zero. Bytes that do not decode render as `DB`.
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let byte_at = |offset: usize| bytes.get(addr + offset).copied().unwrap_or(0);
    let opcode = byte_at(0);

    match decode(opcode, byte_at(1), byte_at(2)) {
        Ok(instr) => (format_instruction(&instr), opcode_width(opcode) as usize),
        Err(_) => (format!("DB {:#04x}", opcode), 1),
    }
}

/// Disassemble a whole program.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; -----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, width) = disassemble_at(bytes, addr);
        let end = (addr + width).min(bytes.len());
        let raw: Vec<String> = bytes[addr..end].iter().map(|b| format!("{:08b}", b)).collect();
        output.push_str(&format!("{:03}: {:<14} ; {}\n", addr, text, raw.join(" ")));
        addr += width;
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    let mnemonic = instr.mnemonic();
    match *instr {
        Instruction::Halt | Instruction::Return => mnemonic.to_string(),

        Instruction::LoadImmediate { reg, value } => format!("{} R{}, {}", mnemonic, reg, value),

        Instruction::Multiply { reg_a, reg_b }
        | Instruction::Add { reg_a, reg_b }
        | Instruction::Compare { reg_a, reg_b } => format!("{} R{}, R{}", mnemonic, reg_a, reg_b),

        Instruction::Print { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Call { reg }
        | Instruction::Jump { reg }
        | Instruction::JumpIfEqual { reg }
        | Instruction::JumpIfNotEqual { reg } => format!("{} R{}", mnemonic, reg),
    }
}
