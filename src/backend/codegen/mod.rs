use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::backend::BackendErr;
use crate::frontend::ast::{Node, NodeKind, UNARY_MINUS};

pub mod x86_64;

use x86_64::{PRINT_INT, PRINT_STRING, STRINGS_SCOPE, TextSection, fn_symbol, var_symbol};

/// Output of one generation pass, laid out by [`x86_64::AsmWriter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembly {
    pub(crate) text: String,
    pub(crate) functions: String,
    pub(crate) vars: Vars,
    pub(crate) strings: StringPool,
}

impl Assembly {
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }
}

/// Declared variable names in declaration order, without duplicates.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Vars {
    inner: Vec<String>,
}

impl Vars {
    /// Returns `true` if `var` was not declared before.
    fn add(&mut self, var: &str) -> bool {
        if self.contains(var) {
            return false;
        }
        self.inner.push(var.to_string());
        true
    }

    pub fn contains(&self, var: &str) -> bool {
        self.inner.iter().any(|v| v == var)
    }

    pub fn names(&self) -> &[String] {
        &self.inner
    }
}

/// String literals in first-occurrence order; the entry at index `i` is
/// labelled `.str<i>`.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct StringPool {
    inner: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl StringPool {
    pub fn intern(&mut self, text: &str) -> usize {
        if let Some(&i) = self.index.get(text) {
            return i;
        }
        let i = self.inner.len();
        self.inner.push(text.to_string());
        self.index.insert(text.to_string(), i);
        i
    }

    pub fn label(i: usize) -> String {
        format!(".str{}", i)
    }

    pub fn entries(&self) -> &[String] {
        &self.inner
    }
}

/// Label counters. Each only ever increases within one pass.
#[derive(Default, Debug)]
struct Labels {
    cond: usize,
    loops: usize,
    whiles: usize,
}

impl Labels {
    fn bump(counter: &mut usize) -> usize {
        let n = *counter;
        *counter += 1;
        n
    }

    fn cond(&mut self) -> usize {
        Self::bump(&mut self.cond)
    }

    fn loop_id(&mut self) -> usize {
        Self::bump(&mut self.loops)
    }

    fn while_id(&mut self) -> usize {
        Self::bump(&mut self.whiles)
    }
}

fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn payload(node: &Node) -> Result<&str, BackendErr> {
    node.value().ok_or(BackendErr::Malformed {
        kind: node.kind(),
        reason: "missing payload",
    })
}

fn nth(node: &Node, i: usize) -> Result<&Node, BackendErr> {
    node.child(i).ok_or(BackendErr::Malformed {
        kind: node.kind(),
        reason: "missing child",
    })
}

/// Single-pass tree walker. Every expression leaves its value in `rax`.
#[derive(Debug, Default)]
pub struct CodeGen {
    text: TextSection,
    vars: Vars,
    strings: StringPool,
    labels: Labels,
    // end labels of the lexically enclosing loops, innermost last
    loop_ends: Vec<String>,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(mut self, ast: &Node) -> Result<Assembly, BackendErr> {
        if ast.kind() != NodeKind::Program {
            return Err(BackendErr::Malformed {
                kind: ast.kind(),
                reason: "the root must be a PROGRAM node",
            });
        }
        self.gen_node(ast)?;
        debug!(
            vars = self.vars.names().len(),
            strings = self.strings.entries().len(),
            if_labels = self.labels.cond,
            loops = self.labels.loops,
            whiles = self.labels.whiles,
            "generated code"
        );
        let (text, functions) = self.text.finish();
        Ok(Assembly {
            text,
            functions,
            vars: self.vars,
            strings: self.strings,
        })
    }

    fn gen_node(&mut self, node: &Node) -> Result<(), BackendErr> {
        match node.kind() {
            NodeKind::Program | NodeKind::Block => {
                for child in node.children() {
                    self.gen_node(child)?;
                }
            }
            NodeKind::VarDecl => self.gen_var_decl(node)?,
            NodeKind::Assignment => {
                let target = payload(nth(node, 0)?)?;
                self.gen_node(nth(node, 1)?)?;
                let target = var_symbol(target);
                self.text.write_in_fn(format_args!("mov [{}], rax", target));
            }
            NodeKind::Identifier => {
                let name = payload(node)?;
                if !self.vars.contains(name) {
                    warn!(name, "identifier used before any declaration");
                }
                self.text
                    .write_in_fn(format_args!("mov rax, [{}]", var_symbol(name)));
            }
            NodeKind::Literal => self.gen_literal(node)?,
            NodeKind::BinaryExpr => self.gen_binary(node)?,
            NodeKind::If => self.gen_if(node)?,
            NodeKind::Loop => self.gen_loop(node)?,
            NodeKind::While => self.gen_while(node)?,
            NodeKind::Break => {
                let Some(end) = self.loop_ends.last() else {
                    return Err(BackendErr::BreakOutsideLoop);
                };
                let end = end.clone();
                self.text.write_in_fn(format_args!("jmp {}", end));
            }
            NodeKind::FunctionDef => {
                let name = payload(node)?;
                self.text.begin_function(&fn_symbol(name));
                let outer_loops = std::mem::take(&mut self.loop_ends);
                for child in node.children() {
                    self.gen_node(child)?;
                }
                self.loop_ends = outer_loops;
                self.text.end_function();
            }
            NodeKind::Return => match node.child(0) {
                Some(expr) => self.gen_node(expr)?,
                None => self.text.write_in_fn(format_args!("xor rax, rax")),
            },
            NodeKind::Print => self.gen_print(node)?,
        }
        Ok(())
    }

    fn gen_var_decl(&mut self, node: &Node) -> Result<(), BackendErr> {
        let name = payload(node)?;
        if self.vars.add(name) {
            debug!(name, "reserved storage");
        }
        let cell = var_symbol(name);
        match node.child(0) {
            Some(init) => {
                self.gen_node(init)?;
                self.text.write_in_fn(format_args!("mov [{}], rax", cell));
            }
            None => self.text.write_in_fn(format_args!("mov qword [{}], 0", cell)),
        }
        Ok(())
    }

    fn gen_literal(&mut self, node: &Node) -> Result<(), BackendErr> {
        let text = payload(node)?;
        if !is_numeric(text) {
            self.text.write_in_fn(format_args!("xor rax, rax"));
            return Ok(());
        }
        let value: i64 = text
            .parse()
            .map_err(|_| BackendErr::IntegerOutOfRange(text.to_string()))?;
        self.text.write_in_fn(format_args!("mov rax, {}", value));
        Ok(())
    }

    fn gen_binary(&mut self, node: &Node) -> Result<(), BackendErr> {
        let op = payload(node)?;
        if op == UNARY_MINUS {
            self.gen_node(nth(node, 0)?)?;
            self.text.write_in_fn(format_args!("neg rax"));
            return Ok(());
        }
        self.gen_node(nth(node, 0)?)?;
        self.text.write_in_fn(format_args!("push rax"));
        self.gen_node(nth(node, 1)?)?;
        self.text.write_in_fn(format_args!("pop rbx"));
        self.text.write_op(op)
    }

    fn gen_if(&mut self, node: &Node) -> Result<(), BackendErr> {
        let else_label = format!("_else{}", self.labels.cond());
        let end_label = format!("_endif{}", self.labels.cond());
        self.gen_node(nth(node, 0)?)?;
        self.text.write_in_fn(format_args!("cmp rax, 0"));
        self.text.write_in_fn(format_args!("je {}", else_label));
        self.gen_node(nth(node, 1)?)?;
        self.text.write_in_fn(format_args!("jmp {}", end_label));
        self.text.write_label(&else_label);
        if let Some(else_block) = node.child(2) {
            self.gen_node(else_block)?;
        }
        self.text.write_label(&end_label);
        Ok(())
    }

    fn gen_loop(&mut self, node: &Node) -> Result<(), BackendErr> {
        let start_label = format!("_loop{}", self.labels.loop_id());
        let end_label = format!("_end_loop{}", self.labels.cond());
        self.gen_pre_test_loop(node, &start_label, end_label)
    }

    fn gen_while(&mut self, node: &Node) -> Result<(), BackendErr> {
        let id = self.labels.while_id();
        let start_label = format!("_while_start{}", id);
        let end_label = format!("_while_end{}", id);
        self.gen_pre_test_loop(node, &start_label, end_label)
    }

    fn gen_pre_test_loop(
        &mut self,
        node: &Node,
        start_label: &str,
        end_label: String,
    ) -> Result<(), BackendErr> {
        self.text.write_label(start_label);
        self.gen_node(nth(node, 0)?)?;
        self.text.write_in_fn(format_args!("cmp rax, 0"));
        self.text.write_in_fn(format_args!("je {}", end_label));
        self.loop_ends.push(end_label);
        self.gen_node(nth(node, 1)?)?;
        let end_label = self.loop_ends.pop().unwrap_or_default();
        self.text.write_in_fn(format_args!("jmp {}", start_label));
        self.text.write_label(&end_label);
        Ok(())
    }

    fn gen_print(&mut self, node: &Node) -> Result<(), BackendErr> {
        let arg = nth(node, 0)?;
        if arg.kind() == NodeKind::Literal {
            let text = payload(arg)?;
            if !is_numeric(text) {
                let i = self.strings.intern(text);
                self.text.write_in_fn(format_args!(
                    "lea rdi, [{}{}]",
                    STRINGS_SCOPE,
                    StringPool::label(i)
                ));
                self.text.write_in_fn(format_args!("call {}", PRINT_STRING));
                return Ok(());
            }
        }
        self.gen_node(arg)?;
        self.text.write_in_fn(format_args!("call {}", PRINT_INT));
        Ok(())
    }
}
