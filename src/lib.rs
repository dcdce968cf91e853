//! Compiler for a small BASIC-like language.
//!
//! Source text is tokenized and parsed into a [`frontend::ast::Node`] tree,
//! which the backend lowers in a single pass to a self-contained NASM
//! x86-64 program that talks to Linux through raw syscalls.
//!
//! ```
//! let asm = minibas::compile("VAR x = 5; PRINT x;").unwrap();
//! assert!(asm.contains("_start:"));
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{Level, debug, info};

pub mod backend;
pub mod frontend;

use backend::BackendErr;
use frontend::FrontendErr;

#[derive(Debug, Error)]
pub enum CompileErr {
    #[error(transparent)]
    Frontend(#[from] FrontendErr),
    #[error("code generation failed: {0}")]
    Backend(#[from] BackendErr),
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Compiles `source` to the text of a NASM file. The source, its tokens and
/// the program tree are logged at debug level.
pub fn compile(source: &str) -> Result<String, CompileErr> {
    debug!("source:\n{}", source);
    if tracing::enabled!(Level::DEBUG) {
        debug!("tokens:\n{}", frontend::tokenize(source));
    }
    let ast = frontend::get_ast(source)?;
    debug!("tree:\n{}", ast);
    let code = backend::generate(&ast)?;
    Ok(backend::asm_string(&code)?)
}

/// Compiles the file at `input` and writes the assembly to `output`.
/// The output file is only created once compilation succeeded.
pub fn compile_file(input: &Path, output: &Path) -> Result<(), CompileErr> {
    let source = fs::read_to_string(input).map_err(|source| CompileErr::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let asm = compile(&source)?;
    fs::write(output, asm).map_err(|source| CompileErr::Write {
        path: output.to_path_buf(),
        source,
    })?;
    info!(input = %input.display(), output = %output.display(), "wrote assembly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::ParseErr;

    #[test]
    fn compile_reports_stage() {
        let err = compile("IF 1 THEN").unwrap_err();
        assert!(matches!(
            err,
            CompileErr::Frontend(FrontendErr::Parse(ParseErr::Expected { .. }))
        ));
        assert!(err.to_string().starts_with("parse error at line 1"));

        let err = compile("BREAK").unwrap_err();
        assert!(matches!(err, CompileErr::Backend(BackendErr::BreakOutsideLoop)));
    }

    #[test]
    fn missing_input() {
        let dir = std::env::temp_dir();
        let err = compile_file(
            &dir.join("minibas-does-not-exist.bas"),
            &dir.join("minibas-never-written.asm"),
        )
        .unwrap_err();
        assert!(matches!(err, CompileErr::Read { .. }));
    }
}
