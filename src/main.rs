use std::{
    path::{Path, PathBuf},
    process::{Command, ExitCode},
};

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{Level, error, info};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct ParserImpl {
    /// Source file to compile
    file: PathBuf,
    /// Where to write the generated assembly
    #[arg(short, long, default_value = "output.asm")]
    output: PathBuf,
    /// 0 warnings, 1 info, 2 debug dumps, 3 trace
    #[arg(short, long, default_value_t = 2)]
    verbosity: u8,
    /// Assemble with nasm and link with ld after writing the assembly
    #[arg(short, long)]
    assemble: bool,
}

fn level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> ExitCode {
    let args = match ParserImpl::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            _ = e.print();
            return ExitCode::FAILURE;
        }
        Err(e) => e.exit(),
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level(args.verbosity))
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &ParserImpl) -> anyhow::Result<()> {
    info!("generating code in {}", args.output.display());
    minibas::compile_file(&args.file, &args.output)?;

    if args.assemble {
        let object = args.output.with_extension("o");
        let binary = args.output.with_extension("");
        assemble(&args.output, &object)?;
        info!("{} successfully generated", object.display());
        link(&object, &binary)?;
        info!("executable written to {}", binary.display());
    }
    Ok(())
}

fn assemble(asm: &Path, object: &Path) -> anyhow::Result<()> {
    let status = Command::new("nasm")
        .arg("-f")
        .arg("elf64")
        .arg(asm)
        .arg("-o")
        .arg(object)
        .status()
        .context("failed to run nasm")?;
    if !status.success() {
        bail!("nasm failed with {}", status);
    }
    Ok(())
}

fn link(object: &Path, binary: &Path) -> anyhow::Result<()> {
    let status = Command::new("ld")
        .arg(object)
        .arg("-o")
        .arg(binary)
        .status()
        .context("failed to run ld")?;
    if !status.success() {
        bail!("ld failed with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level(0), Level::WARN);
        assert_eq!(level(1), Level::INFO);
        assert_eq!(level(2), Level::DEBUG);
        assert_eq!(level(7), Level::TRACE);
    }

    #[test]
    fn cli_defaults() {
        let args = ParserImpl::try_parse_from(["minibas", "prog.bas"]).unwrap();
        assert_eq!(args.output, PathBuf::from("output.asm"));
        assert_eq!(args.verbosity, 2);
        assert!(!args.assemble);

        let args =
            ParserImpl::try_parse_from(["minibas", "prog.bas", "-o", "a.asm", "-v", "0", "-a"])
                .unwrap();
        assert_eq!(args.output, PathBuf::from("a.asm"));
        assert_eq!(args.verbosity, 0);
        assert!(args.assemble);
    }

    #[test]
    fn run_writes_what_the_library_compiles() {
        let input = std::env::temp_dir().join(format!("minibas-run-{}.bas", std::process::id()));
        let output = input.with_extension("asm");
        let args = ParserImpl::try_parse_from([
            OsStr::new("minibas"),
            input.as_os_str(),
            OsStr::new("-o"),
            output.as_os_str(),
        ])
        .unwrap();

        std::fs::write(&input, "VAR x = 1 PRINT x").unwrap();
        run(&args).unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            minibas::compile("VAR x = 1 PRINT x").unwrap()
        );

        std::fs::remove_file(&output).unwrap();
        std::fs::write(&input, "IF 1 THEN PRINT 1").unwrap();
        assert!(run(&args).is_err());
        assert!(!output.exists());

        _ = std::fs::remove_file(&input);
    }

    #[test]
    fn missing_file_argument() {
        assert!(ParserImpl::try_parse_from(["minibas"]).is_err());
    }
}
