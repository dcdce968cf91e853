//! Expression layers, lowest precedence first:
//! logical, comparison, additive, multiplicative, unary minus, primary.

use crate::frontend::ast::Node;
use crate::frontend::lexer::{TokenKind, TokenStream};

use super::{ParseErr, expect};

pub fn parse_expression(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    parse_logical(stream)
}

/// Folds `next (op next)*` left-associatively while the current token has
/// kind `kind` and its text is one of `ops`.
fn parse_left_assoc(
    stream: &mut TokenStream,
    kind: TokenKind,
    ops: &[&str],
    next: fn(&mut TokenStream) -> Result<Node, ParseErr>,
) -> Result<Node, ParseErr> {
    let mut lhs = next(stream)?;
    while stream.peek().is(kind) && ops.contains(&stream.peek().text.as_str()) {
        let op = stream.next();
        let rhs = next(stream)?;
        lhs = Node::binary(op.text, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_logical(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    parse_left_assoc(stream, TokenKind::LogicOp, &["&&", "||"], parse_comparison)
}

fn parse_comparison(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    parse_left_assoc(
        stream,
        TokenKind::CompareOp,
        &["==", "!=", "<", ">", "<=", ">="],
        parse_additive,
    )
}

fn parse_additive(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    parse_left_assoc(stream, TokenKind::ArithOp, &["+", "-"], parse_multiplicative)
}

fn parse_multiplicative(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    parse_left_assoc(stream, TokenKind::ArithOp, &["*", "/", "%"], parse_unary)
}

fn parse_unary(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    if stream.peek().is(TokenKind::ArithOp) && stream.peek().text == "-" {
        stream.advance();
        let operand = parse_unary(stream)?;
        return Ok(Node::unary_minus(operand));
    }
    parse_primary(stream)
}

fn parse_primary(stream: &mut TokenStream) -> Result<Node, ParseErr> {
    let kind = stream.peek().kind;
    match kind {
        TokenKind::IntNumber | TokenKind::FloatNumber | TokenKind::StringLiteral => {
            Ok(Node::literal(stream.next().text))
        }
        TokenKind::Identifier => Ok(Node::identifier(stream.next().text)),
        TokenKind::LParen => {
            stream.advance();
            let expr = parse_expression(stream)?;
            expect(stream, TokenKind::RParen, "')' in parenthesized expression")?;
            Ok(expr)
        }
        _ => Err(ParseErr::unexpected(stream.peek())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(s: &str) -> Node {
        parse_expression(&mut TokenStream::from_str(s)).unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Node::binary(
                "+",
                Node::literal("1"),
                Node::binary("*", Node::literal("2"), Node::literal("3"))
            )
        );
        assert_eq!(
            expr("a < b + 1 && c"),
            Node::binary(
                "&&",
                Node::binary(
                    "<",
                    Node::identifier("a"),
                    Node::binary("+", Node::identifier("b"), Node::literal("1"))
                ),
                Node::identifier("c")
            )
        );
    }

    #[test]
    fn left_associative() {
        assert_eq!(
            expr("10 - 4 - 3"),
            Node::binary(
                "-",
                Node::binary("-", Node::literal("10"), Node::literal("4")),
                Node::literal("3")
            )
        );
        assert_eq!(
            expr("8 / 2 % 3"),
            Node::binary(
                "%",
                Node::binary("/", Node::literal("8"), Node::literal("2")),
                Node::literal("3")
            )
        );
    }

    #[test]
    fn parentheses_and_unary_minus() {
        assert_eq!(
            expr("-(1 + x) * --2"),
            Node::binary(
                "*",
                Node::unary_minus(Node::binary("+", Node::literal("1"), Node::identifier("x"))),
                Node::unary_minus(Node::unary_minus(Node::literal("2")))
            )
        );
    }

    #[test]
    fn literals_keep_their_text() {
        assert_eq!(expr("3.25"), Node::literal("3.25"));
        assert_eq!(expr("\"hi there\""), Node::literal("hi there"));
    }

    #[test]
    fn unexpected_token_in_primary() {
        let err = parse_expression(&mut TokenStream::from_str("1 + )")).unwrap_err();
        assert_eq!(
            err,
            ParseErr::UnexpectedToken {
                found: ")".into(),
                line: 1,
                column: 5,
            }
        );
    }

    #[test]
    fn unclosed_parenthesis() {
        let err = parse_expression(&mut TokenStream::from_str("(1 + 2")).unwrap_err();
        assert!(matches!(err, ParseErr::Expected { .. }));
    }
}
