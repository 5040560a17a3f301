//! Arithmetic logic unit and comparison flags.
//!
//! The LS-8 instruction encoding reserves a whole family of ALU operations,
//! but this core wires up only `ADD` and `CMP`. Asking the ALU for anything
//! else is a fatal error rather than a silent no-op.

use std::cmp::Ordering;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::Registers;

/// Result of the most recent `CMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Equal,
    Greater,
    Less,
}

impl From<Ordering> for Flag {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Equal => Flag::Equal,
            Ordering::Greater => Flag::Greater,
            Ordering::Less => Flag::Less,
        }
    }
}

/// Single-letter rendering of the flag, `-` when unset.
pub fn flag_symbol(flag: Option<Flag>) -> &'static str {
    match flag {
        Some(Flag::Equal) => "E",
        Some(Flag::Greater) => "G",
        Some(Flag::Less) => "L",
        None => "-",
    }
}

/// ALU operation kinds of the LS-8 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    Compare,
    And,
    Not,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Apply `op` to registers `reg_a` and `reg_b`.
///
/// `Add` writes back into `reg_a` with wrapping arithmetic. `Compare` only
/// updates `flag`.
pub fn apply(
    op: AluOp,
    regs: &mut Registers,
    flag: &mut Option<Flag>,
    reg_a: u8,
    reg_b: u8,
) -> Result<(), AluError> {
    let a = regs.get(reg_a);
    let b = regs.get(reg_b);

    match op {
        AluOp::Add => regs.set(reg_a, a.wrapping_add(b)),
        AluOp::Compare => *flag = Some(a.cmp(&b).into()),
        other => return Err(AluError::Unsupported(other)),
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("unsupported ALU operation: {0:?}")]
    Unsupported(AluOp),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn regs_with(a: u8, b: u8) -> Registers {
        let mut regs = Registers::new();
        regs.set(0, a);
        regs.set(1, b);
        regs
    }

    #[test]
    fn test_add_wraps() {
        let mut regs = regs_with(250, 10);
        let mut flag = None;
        apply(AluOp::Add, &mut regs, &mut flag, 0, 1).unwrap();
        assert_eq!(regs.get(0), 4);
        assert_eq!(regs.get(1), 10);
        assert_eq!(flag, None);
    }

    #[test]
    fn test_compare_sets_flag_only() {
        let mut regs = regs_with(3, 9);
        let mut flag = None;

        apply(AluOp::Compare, &mut regs, &mut flag, 0, 1).unwrap();
        assert_eq!(flag, Some(Flag::Less));
        apply(AluOp::Compare, &mut regs, &mut flag, 1, 0).unwrap();
        assert_eq!(flag, Some(Flag::Greater));
        apply(AluOp::Compare, &mut regs, &mut flag, 1, 1).unwrap();
        assert_eq!(flag, Some(Flag::Equal));

        assert_eq!(regs, regs_with(3, 9));
    }

    #[test]
    fn test_unsupported_ops_fail() {
        let mut regs = regs_with(6, 2);
        let mut flag = None;
        for op in [AluOp::Sub, AluOp::Mul, AluOp::Div, AluOp::Xor, AluOp::Shr] {
            let err = apply(op, &mut regs, &mut flag, 0, 1).unwrap_err();
            assert_eq!(err, AluError::Unsupported(op));
        }
        assert_eq!(regs, regs_with(6, 2));
    }

    proptest! {
        #[test]
        fn prop_compare_matches_ordering(a: u8, b: u8) {
            let mut regs = regs_with(a, b);
            let mut flag = None;
            apply(AluOp::Compare, &mut regs, &mut flag, 0, 1).unwrap();
            prop_assert_eq!(flag, Some(Flag::from(a.cmp(&b))));
        }

        #[test]
        fn prop_add_is_wrapping(a: u8, b: u8) {
            let mut regs = regs_with(a, b);
            let mut flag = None;
            apply(AluOp::Add, &mut regs, &mut flag, 0, 1).unwrap();
            prop_assert_eq!(regs.get(0), a.wrapping_add(b));
        }
    }
}
