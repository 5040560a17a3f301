//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment (`#` works too)
//! LOOP:               ; Define a label
//!     LDI R0, 8       ; Load an immediate value
//!     LDI R1, LOOP    ; Load the address of a label
//!     ADD R0, R1      ; Two register operands
//!     JMP R1          ; One register operand
//!     HLT
//!
//!     ORG 0x40        ; Pad with zeros up to an address
//!     DB 0b1010       ; Emit a raw byte
//! ```

use std::collections::HashMap;

use thiserror::Error;

use crate::cpu::decode::{encode, Instruction};
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::REGISTER_COUNT;

/// Assemble source code to program bytes.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, u8>,
    /// Label operands waiting for pass 2: (output_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes. The next byte lands at `output.len()`.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find([';', '#']) {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label `{}`", label),
                });
            }
            let addr = self.current_addr(line_num)?;
            if self.symbols.insert(label.clone(), addr).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_uppercase();
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [target] = expect_operands::<1>(&mnemonic, &operands, line_num)?;
                let target = self.parse_number(target, line_num)?;
                let target = usize::from(target);
                if target < self.output.len() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("ORG {} moves backwards from {}", target, self.output.len()),
                    });
                }
                while self.output.len() < target {
                    self.emit(0, line_num)?;
                }
            }

            "DB" => {
                if operands.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DB requires at least one value".into(),
                    });
                }
                for operand in operands {
                    let value = self.parse_value(operand, line_num)?;
                    self.emit(value, line_num)?;
                }
            }

            // Instructions
            _ => {
                let instr = self.parse_instruction(&mnemonic, &operands, line_num)?;
                for byte in encode(&instr) {
                    self.emit(byte, line_num)?;
                }
            }
        }

        Ok(())
    }

    fn parse_instruction(&mut self, mnemonic: &str, operands: &[&str], line_num: usize)
        -> Result<Instruction, AssemblerError>
    {
        let instr = match mnemonic {
            "HLT" | "HALT" => {
                expect_operands::<0>(mnemonic, operands, line_num)?;
                Instruction::Halt
            }
            "RET" => {
                expect_operands::<0>(mnemonic, operands, line_num)?;
                Instruction::Return
            }
            "LDI" => {
                let [reg, value] = expect_operands::<2>(mnemonic, operands, line_num)?;
                let reg = self.parse_register(reg, line_num)?;
                // The value byte sits two bytes past the opcode
                let value = self.parse_value_at(value, self.output.len() + 2, line_num)?;
                Instruction::LoadImmediate { reg, value }
            }
            "PRN" => Instruction::Print { reg: self.one_reg(mnemonic, operands, line_num)? },
            "PUSH" => Instruction::Push { reg: self.one_reg(mnemonic, operands, line_num)? },
            "POP" => Instruction::Pop { reg: self.one_reg(mnemonic, operands, line_num)? },
            "CALL" => Instruction::Call { reg: self.one_reg(mnemonic, operands, line_num)? },
            "JMP" => Instruction::Jump { reg: self.one_reg(mnemonic, operands, line_num)? },
            "JEQ" => Instruction::JumpIfEqual { reg: self.one_reg(mnemonic, operands, line_num)? },
            "JNE" => Instruction::JumpIfNotEqual { reg: self.one_reg(mnemonic, operands, line_num)? },
            "MUL" => {
                let (reg_a, reg_b) = self.two_regs(mnemonic, operands, line_num)?;
                Instruction::Multiply { reg_a, reg_b }
            }
            "ADD" => {
                let (reg_a, reg_b) = self.two_regs(mnemonic, operands, line_num)?;
                Instruction::Add { reg_a, reg_b }
            }
            "CMP" => {
                let (reg_a, reg_b) = self.two_regs(mnemonic, operands, line_num)?;
                Instruction::Compare { reg_a, reg_b }
            }

            _ => return Err(AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_string(),
            }),
        };

        Ok(instr)
    }

    fn one_reg(&self, mnemonic: &str, operands: &[&str], line_num: usize) -> Result<u8, AssemblerError> {
        let [reg] = expect_operands::<1>(mnemonic, operands, line_num)?;
        self.parse_register(reg, line_num)
    }

    fn two_regs(&self, mnemonic: &str, operands: &[&str], line_num: usize) -> Result<(u8, u8), AssemblerError> {
        let [a, b] = expect_operands::<2>(mnemonic, operands, line_num)?;
        Ok((self.parse_register(a, line_num)?, self.parse_register(b, line_num)?))
    }

    fn parse_register(&self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let index = operand
            .strip_prefix(['R', 'r'])
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|&n| (n as usize) < REGISTER_COUNT);

        index.ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("expected a register R0-R7, found `{}`", operand),
        })
    }

    /// Parse a byte value for the next emitted byte.
    fn parse_value(&mut self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        self.parse_value_at(operand, self.output.len(), line_num)
    }

    /// Parse a number or label. Labels are recorded against `out_idx` and
    /// patched in pass 2.
    fn parse_value_at(&mut self, operand: &str, out_idx: usize, line_num: usize) -> Result<u8, AssemblerError> {
        let starts_numeric = operand.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-');
        if starts_numeric {
            return self.parse_number(operand, line_num);
        }

        self.pending.push((out_idx, operand.to_uppercase(), line_num));
        Ok(0) // Placeholder, will be resolved in pass 2
    }

    fn parse_number(&self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let syntax = |kind: &str| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid {} literal `{}`", kind, operand),
        };

        let value = if let Some(hex) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).map_err(|_| syntax("hex"))?
        } else if let Some(bin) = operand.strip_prefix("0b").or_else(|| operand.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2).map_err(|_| syntax("binary"))?
        } else {
            operand.parse::<i64>().map_err(|_| syntax("decimal"))?
        };

        u8::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value })
    }

    fn current_addr(&self, line_num: usize) -> Result<u8, AssemblerError> {
        u8::try_from(self.output.len()).map_err(|_| AssemblerError::ProgramTooLarge { line: line_num })
    }

    fn emit(&mut self, byte: u8, line_num: usize) -> Result<(), AssemblerError> {
        if self.output.len() >= MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { line: line_num });
        }
        self.output.push(byte);
        Ok(())
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = self.symbols.get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;
            self.output[*out_idx] = *addr;
        }
        Ok(())
    }
}

/// Split off exactly `N` operands or report how many were expected.
fn expect_operands<'a, const N: usize>(mnemonic: &str, operands: &[&'a str], line_num: usize)
    -> Result<[&'a str; N], AssemblerError>
{
    <[&str; N]>::try_from(operands).map_err(|_| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("{} takes {} operand(s), found {}", mnemonic, N, operands.len()),
    })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program does not fit in memory (line {line})")]
    ProgramTooLarge { line: usize },
}
