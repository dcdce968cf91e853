use std::{
    fmt::{Arguments, Display, Write as _},
    io::Write,
};

use tracing::trace;

use super::{Assembly, StringPool, Vars};
use crate::backend::BackendErr;

/// Non-local label that owns the `.str<N>` pool entries; references use the
/// qualified form `__strings.str<N>`.
pub const STRINGS_SCOPE: &str = "__strings";
pub const PRINT_INT: &str = "__print_int";
pub const PRINT_STRING: &str = "__print_string";
pub const STRLEN: &str = "__strlen";
pub const IDIV: &str = "__idiv";
pub const DIV_ZERO_TRAP: &str = "__error_div_zero";
const DIV_ZERO_MSG: &str = "Division by zero error\n";
const INT_BUF_LEN: usize = 32;

// User names live under their own prefixes. Registers, mnemonics, runtime
// symbols (`__*`, `_start`, `_exit`) and control labels (`_else0`, ...) never
// start with either one.
const VAR_PREFIX: &str = "v_";
const FN_PREFIX: &str = "fn_";

/// Assembler symbol of the storage cell for variable `name`.
pub fn var_symbol(name: &str) -> String {
    format!("{}{}", VAR_PREFIX, name)
}

/// Assembler label of the function `name`.
pub fn fn_symbol(name: &str) -> String {
    format!("{}{}", FN_PREFIX, name)
}

/// Text-section buffer. Function bodies are written into their own buffers
/// and collected separately so the entry sequence never falls into them.
#[derive(Debug, Default)]
pub struct TextSection {
    main: String,
    open_functions: Vec<String>,
    functions: String,
}

impl TextSection {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> &mut String {
        match self.open_functions.last_mut() {
            Some(buf) => buf,
            None => &mut self.main,
        }
    }

    pub fn write_in_fn(&mut self, line: Arguments) {
        _ = writeln!(self.current(), "\t{}", line);
    }

    pub fn write_label(&mut self, label: &str) {
        _ = writeln!(self.current(), "{}:", label);
    }

    pub fn begin_function(&mut self, name: &str) {
        self.open_functions.push(String::new());
        self.write_label(name);
    }

    pub fn end_function(&mut self) {
        self.write_in_fn(format_args!("ret"));
        if let Some(body) = self.open_functions.pop() {
            self.functions.push('\n');
            self.functions.push_str(&body);
        }
    }

    /// Combines the left operand in `rbx` with the right operand in `rax`,
    /// leaving the result in `rax`.
    pub fn write_op(&mut self, op: &str) -> Result<(), BackendErr> {
        match op {
            "+" | "-" | "*" => {
                let instr = match op {
                    "+" => "add",
                    "-" => "sub",
                    _ => "imul",
                };
                self.write_in_fn(format_args!("{} rbx, rax", instr));
                self.write_in_fn(format_args!("mov rax, rbx"));
            }
            "/" | "%" => {
                self.write_in_fn(format_args!("cmp rax, 0"));
                self.write_in_fn(format_args!("je {}", DIV_ZERO_TRAP));
                self.write_in_fn(format_args!("call {}", IDIV));
                if op == "%" {
                    self.write_in_fn(format_args!("mov rax, rdx"));
                }
            }
            "==" | "!=" | "<" | ">" | "<=" | ">=" => {
                let set = match op {
                    "==" => "sete",
                    "!=" => "setne",
                    "<" => "setl",
                    ">" => "setg",
                    "<=" => "setle",
                    _ => "setge",
                };
                self.write_in_fn(format_args!("cmp rbx, rax"));
                self.write_in_fn(format_args!("{} al", set));
                self.write_in_fn(format_args!("movzx rax, al"));
            }
            "&&" | "||" => {
                self.write_in_fn(format_args!("cmp rbx, 0"));
                self.write_in_fn(format_args!("setne bl"));
                self.write_in_fn(format_args!("cmp rax, 0"));
                self.write_in_fn(format_args!("setne al"));
                let instr = if op == "&&" { "and" } else { "or" };
                self.write_in_fn(format_args!("{} al, bl", instr));
                self.write_in_fn(format_args!("movzx rax, al"));
            }
            _ => return Err(BackendErr::UnknownOperator(op.to_string())),
        }
        Ok(())
    }

    /// Returns the entry-sequence text and the collected function bodies.
    pub fn finish(mut self) -> (String, String) {
        while !self.open_functions.is_empty() {
            self.end_function();
        }
        (self.main, self.functions)
    }
}

pub struct AsmWriter<W: Write> {
    fh: W,
}

impl<W: Write> AsmWriter<W> {
    pub fn new(fh: W) -> Self {
        Self { fh }
    }

    pub fn write(mut self, code: &Assembly) -> std::io::Result<()> {
        writeln!(self.fh, "default rel\n")?;

        writeln!(self.fh, "section .data")?;
        writeln!(self.fh, "__nl db 10")?;
        writeln!(self.fh, "__div_zero_msg db {}", db_operands(DIV_ZERO_MSG))?;
        writeln!(self.fh, "{}:", STRINGS_SCOPE)?;
        write!(self.fh, "{}", code.strings)?;

        writeln!(self.fh, "\nsection .bss")?;
        writeln!(self.fh, "__buf_int resb {}", INT_BUF_LEN)?;
        write!(self.fh, "{}", code.vars)?;

        writeln!(self.fh, "\nsection .text")?;
        writeln!(self.fh, "global _start\n")?;
        writeln!(self.fh, "_start:")?;
        write!(self.fh, "{}", code.text)?;
        writeln!(self.fh, "_exit:")?;
        self.write_in_fn(format_args!("mov rax, 60"))?;
        self.write_in_fn(format_args!("xor rdi, rdi"))?;
        self.write_in_fn(format_args!("syscall"))?;
        write!(self.fh, "{}", code.functions)?;

        self.write_default_funcs()?;

        write!(
            self.fh,
            "\nsection .note.GNU-stack noalloc noexec nowrite progbits\n"
        )?;
        self.fh.flush()
    }

    fn write_in_fn(&mut self, line: Arguments) -> std::io::Result<()> {
        writeln!(self.fh, "\t{}", line)
    }

    fn write_label(&mut self, label: &str) -> std::io::Result<()> {
        writeln!(self.fh, "{}:", label)
    }

    fn write_routine(&mut self, name: &str, body: &[&str]) -> std::io::Result<()> {
        trace!(routine = name, "emitting runtime routine");
        writeln!(self.fh)?;
        self.write_label(name)?;
        for line in body {
            if line.ends_with(':') {
                writeln!(self.fh, "{}", line)?;
            } else {
                self.write_in_fn(format_args!("{}", line))?;
            }
        }
        Ok(())
    }

    /// Print-integer, print-string, string-length, signed division and the
    /// division trap.
    fn write_default_funcs(&mut self) -> std::io::Result<()> {
        // value in rax; r8 holds the sign flag because the digit loop divides by rbx
        self.write_routine(
            PRINT_INT,
            &[
                "push rbx",
                "push rcx",
                "push rdx",
                "xor r8, r8",
                "cmp rax, 0",
                "jge .conv_start",
                "mov r8, 1",
                "neg rax",
                ".conv_start:",
                "lea rdi, [__buf_int]",
                "add rdi, 31",
                "mov byte [rdi], 0",
                "mov rbx, 10",
                ".conv_loop:",
                "xor rdx, rdx",
                "div rbx",
                "add dl, '0'",
                "dec rdi",
                "mov [rdi], dl",
                "cmp rax, 0",
                "jne .conv_loop",
                "cmp r8, 1",
                "jne .skip_minus",
                "dec rdi",
                "mov byte [rdi], '-'",
                ".skip_minus:",
                "call __strlen",
                "mov rdx, rax",
                "mov rsi, rdi",
                "mov rax, 1",
                "mov rdi, 1",
                "syscall",
                "pop rdx",
                "pop rcx",
                "pop rbx",
                "ret",
            ],
        )?;
        // NUL-terminated string in rdi
        self.write_routine(
            PRINT_STRING,
            &[
                "push rdi",
                "call __strlen",
                "mov rdx, rax",
                "pop rsi",
                "mov rax, 1",
                "mov rdi, 1",
                "syscall",
                "ret",
            ],
        )?;
        self.write_routine(
            STRLEN,
            &[
                "xor rax, rax",
                ".strlen_loop:",
                "cmp byte [rdi + rax], 0",
                "je .strlen_done",
                "inc rax",
                "jmp .strlen_loop",
                ".strlen_done:",
                "ret",
            ],
        )?;
        // rbx / rax, quotient in rax and remainder in rdx; rax is never zero here.
        // idiv faults on i64::MIN / -1, so -1 is negated with wrap-around instead
        self.write_routine(
            IDIV,
            &[
                "cmp rax, -1",
                "je .by_minus_one",
                "mov rcx, rax",
                "mov rax, rbx",
                "cqo",
                "idiv rcx",
                "ret",
                ".by_minus_one:",
                "mov rax, rbx",
                "neg rax",
                "xor rdx, rdx",
                "ret",
            ],
        )?;
        let msg_len = format!("mov rdx, {}", DIV_ZERO_MSG.len());
        self.write_routine(
            DIV_ZERO_TRAP,
            &[
                "mov rax, 1",
                "mov rdi, 1",
                "lea rsi, [__div_zero_msg]",
                &msg_len,
                "syscall",
                "jmp __error_div_zero",
            ],
        )
    }
}

/// Operands for a NASM `db` directive holding `s` followed by a NUL byte.
/// Bytes that cannot appear inside a double-quoted NASM string are emitted
/// as numbers.
pub fn db_operands(s: &str) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();
    for b in s.bytes() {
        if (0x20..0x7f).contains(&b) && b != b'"' {
            run.push(b as char);
            continue;
        }
        if !run.is_empty() {
            parts.push(format!("\"{}\"", run));
            run.clear();
        }
        parts.push(b.to_string());
    }
    if !run.is_empty() {
        parts.push(format!("\"{}\"", run));
    }
    parts.push("0".to_string());
    parts.join(", ")
}

impl Display for Vars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for var in self.names() {
            writeln!(f, "\t{} resq 1", var_symbol(var))?;
        }
        Ok(())
    }
}

impl Display for StringPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, text) in self.entries().iter().enumerate() {
            writeln!(f, "{} db {}", StringPool::label(i), db_operands(text))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_escaping() {
        assert_eq!(db_operands("yes"), "\"yes\", 0");
        assert_eq!(db_operands(""), "0");
        assert_eq!(db_operands("a\nb"), "\"a\", 10, \"b\", 0");
        assert_eq!(db_operands("é"), "195, 169, 0");
        assert_eq!(
            db_operands(DIV_ZERO_MSG),
            "\"Division by zero error\", 10, 0"
        );
    }

    #[test]
    fn functions_are_collected_apart_from_main() {
        let mut text = TextSection::new();
        text.write_in_fn(format_args!("mov rax, 1"));
        text.begin_function("outer");
        text.write_in_fn(format_args!("mov rax, 2"));
        text.begin_function("inner");
        text.write_in_fn(format_args!("mov rax, 3"));
        text.end_function();
        text.write_in_fn(format_args!("mov rax, 4"));
        text.end_function();
        text.write_in_fn(format_args!("mov rax, 5"));

        let (main, functions) = text.finish();
        assert_eq!(main, "\tmov rax, 1\n\tmov rax, 5\n");
        assert_eq!(
            functions,
            "\ninner:\n\tmov rax, 3\n\tret\n\nouter:\n\tmov rax, 2\n\tmov rax, 4\n\tret\n"
        );
    }

    #[test]
    fn unknown_operator() {
        let mut text = TextSection::new();
        assert!(matches!(
            text.write_op("**"),
            Err(BackendErr::UnknownOperator(op)) if op == "**"
        ));
    }

    #[test]
    fn guarded_division() {
        let mut text = TextSection::new();
        text.write_op("/").unwrap();
        let (main, _) = text.finish();
        assert_eq!(main, "\tcmp rax, 0\n\tje __error_div_zero\n\tcall __idiv\n");

        let mut text = TextSection::new();
        text.write_op("%").unwrap();
        let (main, _) = text.finish();
        assert_eq!(
            main,
            "\tcmp rax, 0\n\tje __error_div_zero\n\tcall __idiv\n\tmov rax, rdx\n"
        );
    }

    fn lowered(op: &str) -> String {
        let mut text = TextSection::new();
        text.write_op(op).unwrap();
        text.finish().0
    }

    #[test]
    fn comparisons_set_a_flag_byte() {
        for (op, set) in [
            ("==", "sete"),
            ("!=", "setne"),
            ("<", "setl"),
            (">", "setg"),
            ("<=", "setle"),
            (">=", "setge"),
        ] {
            assert_eq!(
                lowered(op),
                format!("\tcmp rbx, rax\n\t{} al\n\tmovzx rax, al\n", set),
                "operator {}",
                op
            );
        }
    }

    #[test]
    fn logic_ops_normalise_both_operands() {
        let normalise = "\tcmp rbx, 0\n\tsetne bl\n\tcmp rax, 0\n\tsetne al\n";
        assert_eq!(
            lowered("&&"),
            format!("{}\tand al, bl\n\tmovzx rax, al\n", normalise)
        );
        assert_eq!(
            lowered("||"),
            format!("{}\tor al, bl\n\tmovzx rax, al\n", normalise)
        );
    }

    fn runtime() -> String {
        let code = Assembly {
            text: String::new(),
            functions: String::new(),
            vars: Vars::default(),
            strings: StringPool::default(),
        };
        let mut buf = Vec::new();
        AsmWriter::new(&mut buf).write(&code).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn routine<'a>(out: &'a str, name: &str) -> &'a str {
        let start = out.find(&format!("\n{}:\n", name)).unwrap() + 1;
        let len = out[start..].find("\n\n").unwrap_or(out.len() - start);
        &out[start..start + len]
    }

    #[test]
    fn print_int_keeps_sign_in_r8() {
        let out = runtime();
        let body = routine(&out, PRINT_INT);
        assert!(body.contains("\tmov r8, 1\n\tneg rax\n"));
        assert!(body.contains("\tcmp r8, 1\n\tjne .skip_minus\n"));
        assert!(!body.contains("cmp rbx"));
        // the digit loop reuses rbx as the divisor
        assert!(body.contains("\tmov rbx, 10\n"));
    }

    #[test]
    fn idiv_handles_minus_one_without_faulting() {
        let out = runtime();
        let body = routine(&out, IDIV);
        assert!(body.starts_with("__idiv:\n\tcmp rax, -1\n\tje .by_minus_one\n"));
        assert!(body.contains(".by_minus_one:\n\tmov rax, rbx\n\tneg rax\n\txor rdx, rdx\n\tret"));
        assert_eq!(body.matches("\tidiv ").count(), 1);
    }
}
