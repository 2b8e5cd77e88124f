use bytes::Buf;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType},
    row::Column,
    text::{DecodeText, EncodeText},
};

/// Decode and Encode postgres json value.
///
/// # Panics
///
/// Note that when performing [`Encode`], if [`Serialize`] implementation decide
/// to fail, it will will panics.
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<T> PgType for Json<T> {
    /// jsonb, Binary JSON
    const OID: Oid = 3802;
}

impl<T> Decode for Json<T>
where
    T: DeserializeOwned,
{
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        assert_eq!(value.get_u8(), b'\x01', "jsonb version");
        serde_json::from_slice(&value).map_err(Into::into)
    }
}

impl<T: Serialize> Encode<'static> for Json<T> {
    fn encode(self) -> Encoded<'static> {
        let mut buf = vec![b'\x01'];
        serde_json::to_writer(&mut buf, &self).unwrap();
        Encoded::owned(buf, Self::OID)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

/// `jsonb`'s text form (unlike its binary form) carries no version byte:
/// it's plain UTF-8 JSON, same as the `json` type's wire representation.
impl<T> DecodeText for Json<T>
where
    T: DeserializeOwned,
{
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        serde_json::from_slice(&value).map_err(Into::into)
    }
}

impl<T: Serialize> EncodeText for Json<T> {
    fn encode_text(self) -> Option<String> {
        Some(serde_json::to_string(&self).expect("Serialize impl failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_roundtrips_with_version_byte() {
        let value = Json(serde_json::json!({"a": 1}));
        let encoded = value.encode();
        assert_eq!(encoded.chunk()[0], 1);
        let col = Column::from_parts(Json::<serde_json::Value>::OID, Some(encoded.chunk().to_vec().into()), "j");
        let decoded = Json::<serde_json::Value>::decode(col).unwrap();
        assert_eq!(decoded.0, serde_json::json!({"a": 1}));
    }

    #[test]
    fn text_form_has_no_version_byte() {
        let value = Json(serde_json::json!({"a": 1}));
        let text = value.encode_text().unwrap();
        assert!(!text.starts_with('\u{1}'));
        let col = Column::from_parts(Json::<serde_json::Value>::OID, Some(text.into_bytes().into()), "j");
        let decoded = Json::<serde_json::Value>::decode_text(col).unwrap();
        assert_eq!(decoded.0, serde_json::json!({"a": 1}));
    }
}

