use uuid::Uuid;

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
    text::{DecodeText, EncodeText},
};

impl PgType for Uuid {
    /// uuid
    const OID: Oid = 2950;
}

impl ArrayElement for Uuid {
    const ARRAY_OID: Oid = 2951;
}

impl Decode for Uuid {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let bytes: [u8; 16] = value[..].try_into().map_err(|_| DecodeError::Malformed("uuid"))?;
        Ok(Uuid::from_bytes(bytes))
    }
}

impl Encode<'static> for Uuid {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self.as_bytes().to_vec(), Self::OID)
    }
}

/// Canonical hyphenated lowercase form, per `uuid`'s own `Display`.
impl DecodeText for Uuid {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("uuid text"))?;
        Uuid::parse_str(text).map_err(|_| DecodeError::Malformed("uuid text"))
    }
}

impl EncodeText for Uuid {
    fn encode_text(self) -> Option<String> {
        Some(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn roundtrips_nil() {
        let encoded = Uuid::nil().encode();
        assert_eq!(encoded.chunk(), [0u8; 16]);
    }

    #[test]
    fn roundtrips_through_text() {
        let id = Uuid::nil();
        let text = id.encode_text().unwrap();
        let col = Column::from_parts(Uuid::OID, Some(text.into_bytes().into()), "id");
        assert_eq!(Uuid::decode_text(col).unwrap(), id);
    }
}
