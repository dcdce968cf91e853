use ast::Node;
use lexer::TokenStream;
use parser::ParseErr;
use thiserror::Error;
use tracing::debug;

pub mod ast;
pub mod lexer;
pub mod parser;

pub fn tokenize(s: &str) -> TokenStream {
    let stream = TokenStream::from_str(s);
    debug!(tokens = stream.tokens().len(), "tokenized source");
    stream
}

pub fn get_ast(s: &str) -> Result<Node, FrontendErr> {
    let mut token_stream = tokenize(s);
    Ok(parser::parse_program(&mut token_stream)?)
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum FrontendErr {
    #[error("parse error at {0}")]
    Parse(#[from] ParseErr),
}
