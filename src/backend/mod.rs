use std::io::Write;

use thiserror::Error;

use crate::frontend::ast::{Node, NodeKind};

pub mod codegen;

pub use codegen::{Assembly, CodeGen, StringPool, Vars};
use codegen::x86_64::AsmWriter;

/// Walks the tree once and collects everything the assembly file needs.
pub fn generate(ast: &Node) -> Result<Assembly, BackendErr> {
    CodeGen::new().build(ast)
}

/// Lays out `code` as a complete NASM file.
pub fn asm_gen<W: Write>(code: &Assembly, fh: W) -> Result<(), BackendErr> {
    AsmWriter::new(fh).write(code)?;
    Ok(())
}

/// Renders `code` into an in-memory string.
pub fn asm_string(code: &Assembly) -> Result<String, BackendErr> {
    let mut buf = Vec::new();
    asm_gen(code, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Error)]
pub enum BackendErr {
    #[error("malformed {kind} node: {reason}")]
    Malformed {
        kind: NodeKind,
        reason: &'static str,
    },
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("integer literal {0} does not fit in 64 bits")]
    IntegerOutOfRange(String),
    #[error("BREAK outside of LOOP or WHILE")]
    BreakOutsideLoop,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
