use sqlparser::dialect::Dialect;

/// The lexical rules of attribute expressions.
///
/// Identifiers are Unicode words. Strings may be single or double quoted:
/// a double-quoted string is lexed as a delimited identifier and read back as a string by the parser.
#[derive(Debug)]
pub struct ExpressionDialect {}

impl Dialect for ExpressionDialect {
    fn is_identifier_start(&self, ch: char) -> bool {
        ch.is_alphabetic() || ch == '_'
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_'
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '"'
    }
}
