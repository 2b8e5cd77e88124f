//! `hstore` text codec.
//!
//! `hstore` ships as a contrib extension, so its oid is assigned per-database
//! at `CREATE EXTENSION` time rather than being a fixed builtin — there is no
//! [`PgType`][crate::postgres::PgType] impl here, just the text format used
//! by both directions. Callers look the oid up themselves (e.g. from
//! `pg_type` at connect time) and decode/encode through [`Column::as_slice`].
//!
//! Format: `"key"=>"value"` pairs separated by `, `; a NULL value is the bare
//! (unquoted) literal `NULL`.
use std::fmt::Write;

/// Parse the hstore text format into its key/value pairs, in wire order.
pub fn decode_text(input: &str) -> Result<Vec<(String, Option<String>)>, ParseError> {
    let mut pairs = Vec::new();
    let mut chars = input.char_indices().peekable();

    skip_ws(&mut chars);
    if chars.peek().is_none() {
        return Ok(pairs);
    }

    loop {
        let key = parse_quoted(&mut chars, input)?;
        skip_ws(&mut chars);
        expect(&mut chars, '=')?;
        expect(&mut chars, '>')?;
        skip_ws(&mut chars);

        let value = if matches_keyword(&mut chars, input, "NULL") {
            None
        } else {
            Some(parse_quoted(&mut chars, input)?)
        };

        pairs.push((key, value));

        skip_ws(&mut chars);
        match chars.next() {
            None => break,
            Some((_, ',')) => skip_ws(&mut chars),
            Some((i, c)) => return Err(ParseError::Unexpected(i, c)),
        }
    }

    Ok(pairs)
}

/// Render key/value pairs into the hstore text format.
pub fn encode_text<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let mut out = String::new();
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        quote(&mut out, key);
        out.push_str("=>");
        match value {
            Some(value) => quote(&mut out, value),
            None => out.push_str("NULL"),
        }
    }
    out
}

fn quote(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::CharIndices>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn expect(chars: &mut std::iter::Peekable<std::str::CharIndices>, want: char) -> Result<(), ParseError> {
    match chars.next() {
        Some((_, c)) if c == want => Ok(()),
        Some((i, c)) => Err(ParseError::Unexpected(i, c)),
        None => Err(ParseError::UnexpectedEof),
    }
}

fn matches_keyword(chars: &mut std::iter::Peekable<std::str::CharIndices>, input: &str, kw: &str) -> bool {
    let Some(&(start, _)) = chars.peek() else { return false };
    if input[start..].starts_with(kw) {
        for _ in 0..kw.len() {
            chars.next();
        }
        true
    } else {
        false
    }
}

fn parse_quoted(chars: &mut std::iter::Peekable<std::str::CharIndices>, input: &str) -> Result<String, ParseError> {
    expect(chars, '"')?;
    let mut out = String::with_capacity(8);
    loop {
        match chars.next() {
            None => return Err(ParseError::UnterminatedQuote),
            Some((_, '"')) => return Ok(out),
            Some((_, '\\')) => match chars.next() {
                Some((_, c)) => {
                    let _ = write!(out, "{c}");
                },
                None => return Err(ParseError::UnterminatedQuote),
            },
            Some((_, c)) => out.push(c),
        }
    }
}

/// An error parsing `hstore` text.
#[derive(Debug)]
pub enum ParseError {
    UnterminatedQuote,
    UnexpectedEof,
    Unexpected(usize, char),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedQuote => write!(f, "unterminated quoted string"),
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::Unexpected(i, c) => write!(f, "unexpected character {c:?} at byte {i}"),
        }
    }
}

impl std::error::Error for ParseError { }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_pairs() {
        let pairs = vec![("a".to_owned(), Some("1".to_owned())), ("b".to_owned(), None)];
        let text = encode_text(pairs.iter().map(|(k, v)| (k.as_str(), v.as_deref())));
        assert_eq!(text, r#""a"=>"1", "b"=>NULL"#);
        assert_eq!(decode_text(&text).unwrap(), pairs);
    }

    #[test]
    fn decodes_empty() {
        assert_eq!(decode_text("").unwrap(), vec![]);
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        let text = encode_text([("k", Some(r#"has "quote" and \ back"#))]);
        let decoded = decode_text(&text).unwrap();
        assert_eq!(decoded[0].1.as_deref(), Some(r#"has "quote" and \ back"#));
    }
}
