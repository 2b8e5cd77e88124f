//! Text-format codec, parallel to the binary [`Decode`][crate::Decode]/
//! [`Encode`][crate::Encode] pair.
//!
//! Every extended-query parameter in this crate carries its postgres [`Oid`]
//! explicitly (see [`Encoded::oid`][crate::encode::Encoded::oid]), so the
//! server is never asked to infer a parameter's type from context and the
//! classic "two host types share one oid" ambiguity that forces a text
//! fallback cannot arise on the wire path `fetch.rs` drives. These traits
//! exist independent of that: they let a value round-trip through postgres's
//! text representation, which callers building raw `SIMPLE`-query strings or
//! talking to tools that only understand text (`COPY ... TEXT`, `psql`
//! output) still need.
use crate::{
    DecodeError,
    row::Column,
};

/// A value decodable from postgres's text wire representation.
pub trait DecodeText: Sized {
    fn decode_text(column: Column) -> Result<Self, DecodeError>;
}

/// A value encodable into postgres's text wire representation.
pub trait EncodeText {
    /// Returns `None` for `NULL`.
    fn encode_text(self) -> Option<String>;
}

impl<T: DecodeText> DecodeText for Option<T> {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode_text().map(Some),
        }
    }
}

impl<T: EncodeText> EncodeText for Option<T> {
    fn encode_text(self) -> Option<String> {
        self.and_then(EncodeText::encode_text)
    }
}

fn text_of(column: Column) -> Result<String, DecodeError> {
    let bytes = column.try_into_value()?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

macro_rules! decode_text_num {
    ($($ty:ty),*) => {$(
        impl DecodeText for $ty {
            fn decode_text(column: Column) -> Result<Self, DecodeError> {
                text_of(column)?.parse().map_err(|_| DecodeError::Malformed(stringify!($ty)))
            }
        }

        impl EncodeText for $ty {
            fn encode_text(self) -> Option<String> {
                Some(self.to_string())
            }
        }
    )*};
}

decode_text_num!(i16, i32, i64, f32, f64);

impl DecodeText for bool {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        match text_of(column)?.as_str() {
            "t" => Ok(true),
            "f" => Ok(false),
            _ => Err(DecodeError::Malformed("bool")),
        }
    }
}

impl EncodeText for bool {
    fn encode_text(self) -> Option<String> {
        Some(if self { "t" } else { "f" }.to_owned())
    }
}

impl DecodeText for String {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        text_of(column)
    }
}

impl EncodeText for String {
    fn encode_text(self) -> Option<String> {
        Some(self)
    }
}

impl EncodeText for &str {
    fn encode_text(self) -> Option<String> {
        Some(self.to_owned())
    }
}

/// `bytea`'s text representation is postgres's `\x`-prefixed hex encoding
/// (the modern default, as opposed to the legacy escape format).
impl DecodeText for Vec<u8> {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        let text = text_of(column)?;
        let hex = text.strip_prefix("\\x").ok_or(DecodeError::Malformed("bytea hex prefix"))?;
        if hex.len() % 2 != 0 {
            return Err(DecodeError::Malformed("bytea hex length"));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| DecodeError::Malformed("bytea hex digit")))
            .collect()
    }
}

impl EncodeText for Vec<u8> {
    fn encode_text(self) -> Option<String> {
        let mut out = String::with_capacity(2 + self.len() * 2);
        out.push_str("\\x");
        for byte in self {
            out.push_str(&format!("{byte:02x}"));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn col(oid: u32, text: &str) -> Column {
        Column::from_parts(oid, Some(Bytes::copy_from_slice(text.as_bytes())), "c")
    }

    #[test]
    fn int_roundtrips_through_text() {
        let encoded = 420_i32.encode_text().unwrap();
        let decoded = i32::decode_text(col(23, &encoded)).unwrap();
        assert_eq!(decoded, 420);
    }

    #[test]
    fn bool_uses_single_letter_form() {
        assert_eq!(true.encode_text().as_deref(), Some("t"));
        assert_eq!(bool::decode_text(col(16, "f")).unwrap(), false);
    }

    #[test]
    fn bytea_roundtrips_hex() {
        let encoded = vec![0xDEu8, 0xAD, 0xBE, 0xEF].encode_text().unwrap();
        assert_eq!(encoded, "\\xdeadbeef");
        let decoded = Vec::<u8>::decode_text(col(17, &encoded)).unwrap();
        assert_eq!(decoded, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn option_none_encodes_to_none() {
        assert_eq!(None::<i32>.encode_text(), None);
    }
}
