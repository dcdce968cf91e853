use std::fmt::Display;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Var,
    If,
    Else,
    Then,
    EndIf,
    Loop,
    Next,
    Define,
    Function,
    Return,
    EndDef,
    Print,
    Break,
    While,
    Identifier,
    IntNumber,
    FloatNumber,
    StringLiteral,
    Assign,
    ArithOp,
    CompareOp,
    LogicOp,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Unknown,
    /// Reserved for malformed input; the scanner itself classifies stray
    /// characters as `Unknown` instead.
    Error,
    Eof,
}

impl TokenKind {
    /// Exact, case-sensitive keyword lookup.
    pub fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "VAR" => Self::Var,
            "IF" => Self::If,
            "ELSE" => Self::Else,
            "THEN" => Self::Then,
            "ENDIF" => Self::EndIf,
            "LOOP" => Self::Loop,
            // both close a loop body
            "NEXT" | "ENDWHILE" => Self::Next,
            "DEFINE" => Self::Define,
            "FUNCTION" => Self::Function,
            "RETURN" => Self::Return,
            "ENDDEF" => Self::EndDef,
            "PRINT" => Self::Print,
            "BREAK" => Self::Break,
            "WHILE" => Self::While,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Var => "VAR",
            Self::If => "IF",
            Self::Else => "ELSE",
            Self::Then => "THEN",
            Self::EndIf => "ENDIF",
            Self::Loop => "LOOP",
            Self::Next => "NEXT",
            Self::Define => "DEFINE",
            Self::Function => "FUNCTION",
            Self::Return => "RETURN",
            Self::EndDef => "ENDDEF",
            Self::Print => "PRINT",
            Self::Break => "BREAK",
            Self::While => "WHILE",
            Self::Identifier => "IDENTIFIER",
            Self::IntNumber => "INT_NUMBER",
            Self::FloatNumber => "FLOAT_NUMBER",
            Self::StringLiteral => "STRING_LITERAL",
            Self::Assign => "ASSIGN",
            Self::ArithOp => "ARITH_OP",
            Self::CompareOp => "COMPARE_OP",
            Self::LogicOp => "LOGIC_OP",
            Self::LParen => "LPAREN",
            Self::RParen => "RPAREN",
            Self::Comma => "COMMA",
            Self::Semicolon => "SEMICOLON",
            Self::Unknown => "UNKNOWN",
            Self::Error => "ERROR",
            Self::Eof => "EOF",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Scans one token from the start of `s`, which must not begin with whitespace.
    /// Returns the kind, the literal text and the number of bytes consumed.
    fn parse(s: &str) -> (TokenKind, &str, usize) {
        let Some(c) = s.chars().next() else {
            return (TokenKind::Eof, "", 0);
        };

        if c.is_ascii_alphabetic() || c == '_' {
            let end = s
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(s.len());
            let word = &s[..end];
            let kind = TokenKind::keyword(word).unwrap_or(TokenKind::Identifier);
            return (kind, word, end);
        }

        if c.is_ascii_digit() {
            let mut is_float = false;
            let mut end = s.len();
            for (i, c) in s.char_indices() {
                if c.is_ascii_digit() {
                    continue;
                }
                if c == '.' && !is_float {
                    is_float = true;
                    continue;
                }
                end = i;
                break;
            }
            let kind = if is_float {
                TokenKind::FloatNumber
            } else {
                TokenKind::IntNumber
            };
            return (kind, &s[..end], end);
        }

        if c == '"' {
            let body = &s[1..];
            return match body.find('"') {
                Some(close) => (TokenKind::StringLiteral, &body[..close], close + 2),
                None => {
                    warn!("unterminated string literal, consuming to end of input");
                    (TokenKind::StringLiteral, body, s.len())
                }
            };
        }

        for (op, kind) in [
            ("==", TokenKind::CompareOp),
            ("!=", TokenKind::CompareOp),
            ("<=", TokenKind::CompareOp),
            (">=", TokenKind::CompareOp),
            ("&&", TokenKind::LogicOp),
            ("||", TokenKind::LogicOp),
        ] {
            if s.starts_with(op) {
                return (kind, op, op.len());
            }
        }

        let len = c.len_utf8();
        let kind = match c {
            '=' => TokenKind::Assign,
            '+' | '-' | '*' | '/' | '%' => TokenKind::ArithOp,
            '<' | '>' => TokenKind::CompareOp,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            _ => TokenKind::Unknown,
        };
        (kind, &s[..len], len)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Line {}, Pos {}] {:<15} '{}'",
            self.line,
            self.column,
            self.kind.name(),
            self.text
        )
    }
}

/// Tracks the 1-based line and column while the scanner walks the source.
#[derive(Debug, Clone, Copy)]
struct Position {
    line: usize,
    column: usize,
}

impl Position {
    fn start() -> Self {
        Self { line: 1, column: 1 }
    }

    fn advance_over(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

pub struct TokenStream {
    inner: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    fn new() -> Self {
        Self {
            inner: Vec::new(),
            cursor: 0,
        }
    }

    /// Builds a stream from already scanned tokens, appending an EOF marker if missing.
    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(|t| t.is(TokenKind::Eof)) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.text.chars().count()))
                .unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Self {
            inner: tokens,
            cursor: 0,
        }
    }

    pub fn next(&mut self) -> Token {
        let r = self.peek().clone();
        self.advance();
        r
    }

    pub fn advance(&mut self) {
        self.cursor = self.inner.len().min(self.cursor + 1);
    }

    /// The current token. Past the end this keeps returning the trailing EOF.
    pub fn peek(&self) -> &Token {
        self.peekn(0)
    }

    pub fn peekn(&self, n: usize) -> &Token {
        let last = self.inner.len() - 1;
        &self.inner[(self.cursor + n).min(last)]
    }

    pub fn tokens(&self) -> &[Token] {
        &self.inner
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    fn push(&mut self, token: Token) {
        self.inner.push(token);
    }

    pub fn from_str(s: &str) -> Self {
        let mut stream = Self::new();
        let mut pos = Position::start();
        let mut rest = s;
        loop {
            let trimmed = rest.trim_start();
            pos.advance_over(&rest[..rest.len() - trimmed.len()]);
            rest = trimmed;
            if rest.is_empty() {
                break;
            }
            let (kind, text, consumed) = Token::parse(rest);
            stream.push(Token::new(kind, text, pos.line, pos.column));
            pos.advance_over(&rest[..consumed]);
            rest = &rest[consumed..];
        }
        stream.push(Token::new(TokenKind::Eof, "", pos.line, pos.column));
        stream
    }
}

impl Display for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for token in &self.inner {
            writeln!(f, "{}", token)?;
        }
        Ok(())
    }
}
