use std::fmt::Display;

/// Operator payload that marks a single-child `BinaryExpr` as unary minus.
pub const UNARY_MINUS: &str = "-u";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    VarDecl,
    Assignment,
    If,
    Loop,
    While,
    FunctionDef,
    Return,
    Print,
    Block,
    BinaryExpr,
    Literal,
    Identifier,
    Break,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Program => "PROGRAM",
            Self::VarDecl => "VAR_DECL",
            Self::Assignment => "ASSIGNMENT",
            Self::If => "IF",
            Self::Loop => "LOOP",
            Self::While => "WHILE",
            Self::FunctionDef => "FUNCTION_DEF",
            Self::Return => "RETURN",
            Self::Print => "PRINT",
            Self::Block => "BLOCK",
            Self::BinaryExpr => "BINARY_EXPR",
            Self::Literal => "LITERAL",
            Self::Identifier => "IDENTIFIER",
            Self::Break => "BREAK",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A program tree node. The payload holds the identifier name, operator
/// symbol or literal text depending on the kind; children are positional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    value: Option<String>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            value: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(kind: NodeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    fn with_child(mut self, child: Node) -> Self {
        self.push(child);
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, i: usize) -> Option<&Node> {
        self.children.get(i)
    }

    pub fn program(body: Node) -> Self {
        Self::new(NodeKind::Program).with_child(body)
    }

    pub fn block(statements: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Block,
            value: None,
            children: statements,
        }
    }

    pub fn var_decl(name: impl Into<String>, init: Node) -> Self {
        Self::with_value(NodeKind::VarDecl, name).with_child(init)
    }

    pub fn assignment(name: impl Into<String>, expr: Node) -> Self {
        Self::new(NodeKind::Assignment)
            .with_child(Self::identifier(name))
            .with_child(expr)
    }

    pub fn if_else(cond: Node, then_block: Node, else_block: Option<Node>) -> Self {
        let mut node = Self::new(NodeKind::If)
            .with_child(cond)
            .with_child(then_block);
        if let Some(else_block) = else_block {
            node.push(else_block);
        }
        node
    }

    pub fn loop_(cond: Node, body: Node) -> Self {
        Self::new(NodeKind::Loop).with_child(cond).with_child(body)
    }

    pub fn while_(cond: Node, body: Node) -> Self {
        Self::new(NodeKind::While).with_child(cond).with_child(body)
    }

    pub fn function_def(name: impl Into<String>, body: Node) -> Self {
        Self::with_value(NodeKind::FunctionDef, name).with_child(body)
    }

    pub fn return_(expr: Node) -> Self {
        Self::new(NodeKind::Return).with_child(expr)
    }

    pub fn print(expr: Node) -> Self {
        Self::new(NodeKind::Print).with_child(expr)
    }

    pub fn binary(op: impl Into<String>, lhs: Node, rhs: Node) -> Self {
        Self::with_value(NodeKind::BinaryExpr, op)
            .with_child(lhs)
            .with_child(rhs)
    }

    pub fn unary_minus(operand: Node) -> Self {
        Self::with_value(NodeKind::BinaryExpr, UNARY_MINUS).with_child(operand)
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::with_value(NodeKind::Literal, text)
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::with_value(NodeKind::Identifier, name)
    }

    pub fn break_() -> Self {
        Self::new(NodeKind::Break)
    }

    fn fmt_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        write!(f, "{:width$}{}", "", self.kind, width = depth * 2)?;
        match (&self.value, self.kind) {
            (Some(v), NodeKind::VarDecl)
            | (Some(v), NodeKind::FunctionDef)
            | (Some(v), NodeKind::BinaryExpr)
            | (Some(v), NodeKind::Literal)
            | (Some(v), NodeKind::Identifier) => writeln!(f, " ({})", v)?,
            _ => writeln!(f)?,
        }
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}
