//! `.ls8` program file format.
//!
//! A program is a plain text file:
//! - One byte per line, written as a binary literal of up to 8 digits
//! - `#` starts a comment that runs to the end of the line
//! - Blank lines and comment-only lines are ignored
//!
//! Bytes are loaded in file order starting at address 0.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::debug;
use thiserror::Error;

/// A parsed program file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFile {
    /// The program bytes, in load order.
    pub bytes: Vec<u8>,
    /// Source line number (1-based) each byte came from.
    pub source_lines: Vec<usize>,
}

impl ProgramFile {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte read from `line`.
    pub fn push(&mut self, byte: u8, line: usize) {
        self.bytes.push(byte);
        self.source_lines.push(line);
    }

    /// Get the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parse the text of a program file.
pub fn parse_program(source: &str) -> Result<ProgramFile, ProgramError> {
    parse_lines(source.lines().map(|line| Ok(line.to_string())))
}

/// Load a program file from disk.
///
/// `None` means no path was supplied at all.
pub fn load_program_file<P: AsRef<Path>>(path: Option<P>) -> Result<ProgramFile, ProgramError> {
    let path = path.ok_or(ProgramError::MissingProgramArgument)?;
    let path = path.as_ref();

    let file = std::fs::File::open(path)
        .map_err(|e| ProgramError::Io(format!("{}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let program = parse_lines(reader.lines().map(|line| line.map_err(|e| ProgramError::Io(e.to_string()))))?;
    debug!("loaded {} bytes from {}", program.len(), path.display());

    Ok(program)
}

fn parse_lines<I>(lines: I) -> Result<ProgramFile, ProgramError>
where
    I: Iterator<Item = Result<String, ProgramError>>,
{
    let mut program = ProgramFile::new();

    for (line_num, line) in lines.enumerate() {
        let line = line?;
        if let Some(byte) = parse_line(&line, line_num + 1)? {
            program.push(byte, line_num + 1);
        }
    }

    Ok(program)
}

fn parse_line(line: &str, line_num: usize) -> Result<Option<u8>, ProgramError> {
    let code = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let code = code.trim();

    if code.is_empty() {
        return Ok(None);
    }

    let parse_error = |message: String| ProgramError::Parse { line: line_num, message };

    if code.len() > 8 {
        return Err(parse_error(format!("`{}` is longer than 8 binary digits", code)));
    }
    if let Some(bad) = code.chars().find(|c| !matches!(c, '0' | '1')) {
        return Err(parse_error(format!("unexpected character `{}` in `{}`", bad, code)));
    }

    u8::from_str_radix(code, 2)
        .map(Some)
        .map_err(|e| parse_error(e.to_string()))
}

/// Save program bytes to disk, one binary literal per line.
pub fn save_program_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ProgramError> {
    let io = |e: std::io::Error| ProgramError::Io(e.to_string());
    let mut file = std::fs::File::create(path.as_ref()).map_err(io)?;

    writeln!(file, "# LS-8 program").map_err(io)?;
    writeln!(file, "# {} bytes", bytes.len()).map_err(io)?;
    writeln!(file).map_err(io)?;

    for (addr, byte) in bytes.iter().enumerate() {
        writeln!(file, "{:08b} # {:03}", byte, addr).map_err(io)?;
    }

    Ok(())
}

/// Errors that can occur while reading or writing program files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("no program file given")]
    MissingProgramArgument,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}
