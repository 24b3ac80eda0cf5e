use monkey_lexer::{Span, TokenKind};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken { expected: String, found: TokenKind, span: Span },
    NoPrefixParseFn { found: TokenKind, span: Span },
    InvalidInteger { raw: String, span: Span },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, span } =>
                write!(f, "[ParseError] Expected {} but found {:?} at line {}, column {}", expected, found, span.line, span.column),
            ParseError::NoPrefixParseFn { found, span } =>
                write!(f, "[ParseError] No prefix parse function for {:?} at line {}, column {}", found, span.line, span.column),
            ParseError::InvalidInteger { raw, span } =>
                write!(f, "[ParseError] Could not parse '{}' as integer at line {}, column {}", raw, span.line, span.column),
        }
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;
