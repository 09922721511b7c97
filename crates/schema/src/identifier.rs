use crate::error::IdentifierError;
use std::borrow::Borrow;
use std::fmt::{self, Debug, Display};
use std::ops::Deref;
use unicode_ident::{is_xid_continue, is_xid_start};
use unicode_normalization::UnicodeNormalization;

/// Words the expression grammar claims for itself.
/// A model, field, enum, role or input may not use one of these as its name,
/// otherwise expressions referring to it could not be parsed.
const RESERVED_IDENTIFIERS: &[&str] = &["and", "or", "not", "in", "true", "false", "null", "ctx"];

/// A valid schema identifier.
///
/// Identifiers must be normalized according to [Unicode Standard Annex 15](https://www.unicode.org/reports/tr15/), normalization form C.
/// Following Rust, we use the identifier rules defined by [Unicode Standard Annex 31](https://www.unicode.org/reports/tr31/tr31-37.html) to validate identifiers.
/// We allow underscores as well as any XID_Start character to start an identifier.
///
/// Keywords of the expression language are rejected, compared case-sensitively,
/// since the expression tokenizer treats `And` as an identifier but `and` as an operator.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    id: Box<str>,
}

impl Identifier {
    /// Validates that the input string is a valid identifier.
    pub fn new(name: Box<str>) -> Result<Self, IdentifierError> {
        if name.is_empty() {
            return Err(IdentifierError::Empty {});
        }

        if name.nfc().zip(name.chars()).any(|(a, b)| a != b) {
            return Err(IdentifierError::NotCanonicalized { name: name.into() });
        }

        let mut chars = name.chars();

        let start = chars.next().ok_or(IdentifierError::Empty {})?;
        if !is_xid_start(start) && start != '_' {
            return Err(IdentifierError::InvalidStart {
                name: name.into(),
                invalid_start: start,
            });
        }

        for char_ in chars {
            if !is_xid_continue(char_) {
                return Err(IdentifierError::InvalidContinue {
                    name: name.into(),
                    invalid_continue: char_,
                });
            }
        }

        if Identifier::is_reserved(&name) {
            return Err(IdentifierError::Reserved { name: name.into() });
        }

        Ok(Identifier { id: name })
    }

    /// Check if a string is a reserved identifier.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_IDENTIFIERS.contains(&name)
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.id, f)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.id, f)
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.id
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.id
    }
}

impl From<Identifier> for Box<str> {
    fn from(value: Identifier) -> Self {
        value.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_a_bunch_of_identifiers() {
        assert!(Identifier::new("post".into()).is_ok());
        assert!(Identifier::new("BlogPost".into()).is_ok());
        assert!(Identifier::new("_hidden".into()).is_ok());
        assert!(Identifier::new("createdAt".into()).is_ok());
        assert!(Identifier::new("Москва".into()).is_ok());
        assert!(Identifier::new("item2".into()).is_ok());

        assert!(Identifier::new("".into()).is_err());
        assert!(Identifier::new("2items".into()).is_err());
        assert!(Identifier::new("\u{200B}post".into()).is_err()); // zero-width space
        assert!(Identifier::new(" post".into()).is_err());
        assert!(Identifier::new("post ".into()).is_err());
        assert!(Identifier::new("is-active".into()).is_err());
    }

    #[test]
    fn test_keywords_are_reserved() {
        for kw in ["and", "or", "not", "in", "true", "false", "null", "ctx"] {
            assert_eq!(
                Identifier::new(kw.into()),
                Err(IdentifierError::Reserved { name: kw.into() }),
                "{kw} should be reserved"
            );
        }
        // Only the exact keyword spelling is reserved.
        assert!(Identifier::new("Ctx".into()).is_ok());
        assert!(Identifier::new("notes".into()).is_ok());
    }

    #[test]
    fn test_canonicalization() {
        assert!(Identifier::new("_\u{0041}\u{030A}".into()).is_err());
        // canonicalized version of the above.
        assert!(Identifier::new("_\u{00C5}".into()).is_ok());
    }

    proptest! {
        #[test]
        fn test_standard_ascii_identifiers(s in "[a-zA-Z_][a-zA-Z0-9_]*") {
            prop_assume!(!Identifier::is_reserved(&s));

            prop_assert!(Identifier::new(s.into()).is_ok());
        }
    }
}
