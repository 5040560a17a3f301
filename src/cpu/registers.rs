//! LS-8 register file.
//!
//! Eight 8-bit registers:
//! - R0-R4: general purpose
//! - R5: interrupt mask (IM), reserved
//! - R6: interrupt status (IS), reserved
//! - R7: stack pointer (SP)

use serde::{Serialize, Deserialize};

/// Number of registers in the file.
pub const REGISTER_COUNT: usize = 8;

/// Registers below this index may be assigned by instructions.
pub const GENERAL_PURPOSE: u8 = 5;

/// Interrupt mask register.
pub const IM: u8 = 5;

/// Interrupt status register.
pub const IS: u8 = 6;

/// Stack pointer register.
pub const SP: u8 = 7;

/// Power-on value of the stack pointer.
pub const SP_INIT: u8 = 0xF4;

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    r: [u8; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        let mut r = [0; REGISTER_COUNT];
        r[SP as usize] = SP_INIT;
        Self { r }
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read register `index`.
    ///
    /// # Panics
    /// Panics if `index` is 8 or greater. The decoder rejects such operands.
    #[inline]
    pub fn get(&self, index: u8) -> u8 {
        self.r[index as usize]
    }

    /// Write register `index`.
    #[inline]
    pub fn set(&mut self, index: u8, value: u8) {
        self.r[index as usize] = value;
    }

    /// Current stack pointer.
    #[inline]
    pub fn sp(&self) -> u8 {
        self.r[SP as usize]
    }

    /// Overwrite the stack pointer.
    #[inline]
    pub fn set_sp(&mut self, value: u8) {
        self.r[SP as usize] = value;
    }

    /// Whether `index` is one of the general purpose registers.
    #[inline]
    pub fn is_general_purpose(index: u8) -> bool {
        index < GENERAL_PURPOSE
    }

    /// All eight registers, R0 first.
    pub fn as_array(&self) -> &[u8; REGISTER_COUNT] {
        &self.r
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state() {
        let regs = Registers::new();
        assert_eq!(regs.sp(), 0xF4);
        assert_eq!(regs.get(IM), 0);
        assert_eq!(regs.get(IS), 0);
        for i in 0..GENERAL_PURPOSE {
            assert_eq!(regs.get(i), 0);
        }
    }

    #[test]
    fn test_get_set() {
        let mut regs = Registers::new();
        regs.set(3, 200);
        assert_eq!(regs.get(3), 200);
        assert_eq!(regs.as_array()[3], 200);
    }

    #[test]
    fn test_sp_is_r7() {
        let mut regs = Registers::new();
        regs.set_sp(0x10);
        assert_eq!(regs.get(SP), 0x10);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.set(0, 1);
        regs.set_sp(0);
        regs.reset();
        assert_eq!(regs, Registers::new());
    }

    #[test]
    fn test_general_purpose_boundary() {
        assert!(Registers::is_general_purpose(4));
        assert!(!Registers::is_general_purpose(5));
        assert!(!Registers::is_general_purpose(SP));
    }
}
