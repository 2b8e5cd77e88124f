//! `aclitem` text codec.
//!
//! Unlike `hstore`, `aclitem` is a builtin `pg_catalog` type with a fixed oid,
//! but postgres has no binary send/recv for it — only text I/O — so this
//! codec always speaks the text format regardless of the requested wire format.
use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
};

/// One `grantee=privileges/grantor` ACL entry, held unparsed past the
/// outer comma-splitting: the grantee/privilege grammar is out of scope here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclItem(pub String);

impl PgType for AclItem {
    /// aclitem, access control list
    const OID: Oid = 1033;
}

impl ArrayElement for AclItem {
    const ARRAY_OID: Oid = 1034;
}

impl Decode for AclItem {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        Ok(AclItem(String::from_utf8(column.try_into_value().map(Into::into)?)?))
    }
}

impl Encode<'static> for AclItem {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self.0.into_bytes(), Self::OID)
    }
}

/// Split a `pg_catalog.aclitem[]` text array element list on its top-level
/// commas, honoring the `\"`/`\\` escapes a quoted element may contain.
///
/// Array-level quoting (the surrounding `{...}` and per-element double quotes)
/// is handled by the array codec; this only exists for standalone aclitem text.
pub fn split_list(input: &str) -> Result<Vec<String>, ParseError> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_quotes => in_quotes = true,
            '"' if in_quotes => in_quotes = false,
            '\\' if in_quotes => match chars.next() {
                Some(next) => current.push(next),
                None => return Err(ParseError::UnterminatedQuote),
            },
            ',' if !in_quotes => {
                items.push(std::mem::take(&mut current));
            },
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    if !current.is_empty() || !items.is_empty() {
        items.push(current);
    }
    Ok(items)
}

/// An error parsing an `aclitem` list.
#[derive(Debug)]
pub enum ParseError {
    UnterminatedQuote,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedQuote => write!(f, "unterminated quoted aclitem element"),
        }
    }
}

impl std::error::Error for ParseError { }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_list() {
        assert_eq!(split_list("alice=arwdDxt/bob,bob=r/alice").unwrap(), vec!["alice=arwdDxt/bob", "bob=r/alice"]);
    }

    #[test]
    fn honors_quoted_commas() {
        let items = split_list(r#""role, with comma"=r/bob"#).unwrap();
        assert_eq!(items, vec!["role, with comma=r/bob"]);
    }
}
