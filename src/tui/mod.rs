//! TUI debugger for the LS-8 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, flag and stack pointer view
//! - Memory view with PC and SP highlighted
//! - Step/run/breakpoint controls
//! - Disassembly and program output panels

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
