//! Recursive-descent parser producing the program tree.
//!
//! One function per non-terminal. Block-bounded constructs all go through
//! [`parse_statement_list`], parametrized by the token kinds that end the
//! block. The terminator itself is left for the caller to consume.

use thiserror::Error;
use tracing::{debug, trace};

use super::ast::Node;
use super::lexer::{Token, TokenKind, TokenStream};

mod expr;

pub use expr::parse_expression;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErr {
    #[error("line {line}, column {column}: expected {expected} (found '{found}')")]
    Expected {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("line {line}, column {column}: unexpected token '{found}'")]
    UnexpectedToken {
        found: String,
        line: usize,
        column: usize,
    },
}

impl ParseErr {
    pub(crate) fn expected(expected: impl Into<String>, found: &Token) -> Self {
        Self::Expected {
            expected: expected.into(),
            found: found.text.clone(),
            line: found.line,
            column: found.column,
        }
    }

    pub(crate) fn unexpected(found: &Token) -> Self {
        Self::UnexpectedToken {
            found: found.text.clone(),
            line: found.line,
            column: found.column,
        }
    }
}

/// Consumes the current token if it has the given kind, otherwise fails with `what`.
pub(crate) fn expect(
    stream: &mut TokenStream,
    kind: TokenKind,
    what: &str,
) -> Result<Token, ParseErr> {
    if stream.peek().is(kind) {
        Ok(stream.next())
    } else {
        Err(ParseErr::expected(what, stream.peek()))
    }
}

/// Parses a whole program: `Program(Block(statements...))` followed by EOF.
pub fn parse_program(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    let body = parse_statement_list(stream, &[TokenKind::Eof])?;
    expect(stream, TokenKind::Eof, "end of input")?;
    debug!(statements = body.children().len(), "parsed program");
    Ok(Node::program(body))
}

/// Parses statements until the current token is one of `stops`.
pub fn parse_statement_list(
    stream: &mut TokenStream,
    stops: &[TokenKind],
) -> Result<Node, ParseErr> {
    let mut statements = Vec::new();
    while !stops.contains(&stream.peek().kind) {
        if stream.peek().is(TokenKind::Eof) {
            let expected = stops
                .iter()
                .map(|k| format!("'{}'", k))
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(ParseErr::expected(expected, stream.peek()));
        }
        if let Some(statement) = parse_statement(stream)? {
            statements.push(statement);
        }
    }
    Ok(Node::block(statements))
}

/// Parses one statement. Returns `None` when the leading token does not start
/// a statement; that token is skipped.
pub fn parse_statement(stream: &mut TokenStream) -> Result<Option<Node>, ParseErr> {
    let kind = stream.peek().kind;
    let node = match kind {
        TokenKind::Var => parse_var_decl(stream)?,
        TokenKind::If => parse_if(stream)?,
        TokenKind::Loop => parse_loop(stream)?,
        TokenKind::While => parse_while(stream)?,
        TokenKind::Define => parse_function_def(stream)?,
        TokenKind::Return => parse_return(stream)?,
        TokenKind::Print => parse_print(stream)?,
        TokenKind::Break => {
            stream.advance();
            Node::break_()
        }
        TokenKind::Identifier if stream.peekn(1).is(TokenKind::Assign) => {
            parse_assignment(stream)?
        }
        TokenKind::Identifier => parse_expression(stream)?,
        _ => {
            trace!(token = %stream.peek().text, "skipping token in statement position");
            stream.advance();
            return Ok(None);
        }
    };
    Ok(Some(node))
}

// VAR IDENTIFIER = expression
fn parse_var_decl(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::Var, "'VAR'")?;
    let name = expect(stream, TokenKind::Identifier, "identifier after 'VAR'")?;
    expect(stream, TokenKind::Assign, "'=' after identifier in declaration")?;
    let init = parse_expression(stream)?;
    Ok(Node::var_decl(name.text, init))
}

// IDENTIFIER = expression
fn parse_assignment(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    let name = expect(stream, TokenKind::Identifier, "identifier")?;
    expect(stream, TokenKind::Assign, "'=' in assignment")?;
    let expr = parse_expression(stream)?;
    Ok(Node::assignment(name.text, expr))
}

// IF expression THEN statement_list [ELSE statement_list] ENDIF
fn parse_if(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::If, "'IF'")?;
    let cond = parse_expression(stream)?;
    expect(stream, TokenKind::Then, "'THEN'")?;
    let then_block = parse_statement_list(stream, &[TokenKind::EndIf, TokenKind::Else])?;
    let else_block = if stream.peek().is(TokenKind::Else) {
        stream.advance();
        Some(parse_statement_list(stream, &[TokenKind::EndIf])?)
    } else {
        None
    };
    expect(stream, TokenKind::EndIf, "'ENDIF'")?;
    Ok(Node::if_else(cond, then_block, else_block))
}

// LOOP expression statement_list NEXT
fn parse_loop(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::Loop, "'LOOP'")?;
    let cond = parse_expression(stream)?;
    let body = parse_statement_list(stream, &[TokenKind::Next])?;
    expect(stream, TokenKind::Next, "'NEXT' at end of loop")?;
    Ok(Node::loop_(cond, body))
}

// WHILE expression statement_list (NEXT | ENDWHILE)
fn parse_while(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::While, "'WHILE'")?;
    let cond = parse_expression(stream)?;
    let body = parse_statement_list(stream, &[TokenKind::Next])?;
    expect(stream, TokenKind::Next, "'ENDWHILE' at end of while")?;
    Ok(Node::while_(cond, body))
}

// DEFINE FUNCTION IDENTIFIER ( ) statement_list ENDDEF
fn parse_function_def(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::Define, "'DEFINE'")?;
    expect(stream, TokenKind::Function, "'FUNCTION'")?;
    let name = expect(stream, TokenKind::Identifier, "function name")?;
    expect(stream, TokenKind::LParen, "'(' after function name")?;
    expect(stream, TokenKind::RParen, "')' after function name")?;
    let body = parse_statement_list(stream, &[TokenKind::EndDef])?;
    expect(stream, TokenKind::EndDef, "'ENDDEF' at end of function")?;
    Ok(Node::function_def(name.text, body))
}

// RETURN expression
fn parse_return(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::Return, "'RETURN'")?;
    let expr = parse_expression(stream)?;
    Ok(Node::return_(expr))
}

// PRINT expression
fn parse_print(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    expect(stream, TokenKind::Print, "'PRINT'")?;
    let expr = parse_expression(stream)?;
    Ok(Node::print(expr))
}
