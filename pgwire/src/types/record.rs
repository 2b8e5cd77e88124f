//! Generic `record` (anonymous composite) binary decode.
//!
//! A [`Record`] carries its fields as raw `(oid, bytes)` pairs; decoding a
//! named composite type's fields further is left to the caller (there is no
//! fixed field layout for `record` itself, only for each concrete composite
//! type the server might report it as).
use bytes::{Buf, Bytes};

use crate::{
    Decode, DecodeError,
    postgres::{Oid, PgType},
    row::Column,
};

/// One field of a decoded [`Record`]: its oid and raw value (`None` if `NULL`).
pub struct Field {
    pub oid: Oid,
    pub value: Option<Bytes>,
}

/// An anonymous composite value, as returned e.g. by `SELECT ROW(...)`.
pub struct Record {
    pub fields: Vec<Field>,
}

impl PgType for Record {
    /// record, pseudo-type for anonymous composite
    const OID: Oid = 2249;
}

impl Decode for Record {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut buf = column.try_into_value()?;

        if buf.remaining() < 4 {
            return Err(DecodeError::Malformed("record header"));
        }
        let field_count = buf.get_i32();
        if field_count < 0 {
            return Err(DecodeError::Malformed("record field count"));
        }

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            if buf.remaining() < 8 {
                return Err(DecodeError::Malformed("record field header"));
            }
            let oid = buf.get_u32();
            let len = buf.get_i32();
            let value = if len < 0 {
                None
            } else {
                if (buf.remaining() as i64) < len as i64 {
                    return Err(DecodeError::Malformed("record field truncated"));
                }
                Some(buf.copy_to_bytes(len as usize))
            };
            fields.push(Field { oid, value });
        }

        Ok(Record { fields })
    }
}

impl Record {
    /// Decode the `i`-th field via its own [`Decode`] impl.
    pub fn field<D: Decode>(&self, i: usize) -> Result<D, DecodeError> {
        let field = self.fields.get(i).ok_or(DecodeError::IndexOutOfBounds(i))?;
        D::decode(Column::from_parts(field.oid, field.value.clone(), "record field"))
    }
}
