//! Array binary codec: N-dimensional, preserving dimension lower bounds.
//!
//! Wire shape: `[ndim:i32, has_nulls:i32, elem_oid:i32]` then per dimension
//! `[length:i32, lower_bound:i32]`, then `Π length` elements in row-major
//! order as `[length:i32, bytes…]` (`length = -1` for `NULL`).
use bytes::{Buf, BufMut, BytesMut};

use crate::{
    Decode, DecodeError, Encode,
    ext::BindParams,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
};

/// One dimension of a postgres array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub length: i32,
    pub lower_bound: i32,
}

/// A decoded postgres array: elements in row-major order, alongside the
/// dimensions (lengths and lower bounds) that produced that order.
/// `elements[i] == None` marks a `NULL` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array<T> {
    pub dims: Vec<Dimension>,
    pub elements: Vec<Option<T>>,
}

impl<T> Array<T> {
    /// Build a one-dimensional array with the default lower bound of 1 and no nulls.
    pub fn from_vec(elements: Vec<T>) -> Self {
        let length = elements.len() as i32;
        Array {
            dims: vec![Dimension { length, lower_bound: 1 }],
            elements: elements.into_iter().map(Some).collect(),
        }
    }
}

impl<T: ArrayElement> PgType for Array<T> {
    const OID: Oid = T::ARRAY_OID;
}

impl<T: ArrayElement + Decode> Decode for Array<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != T::ARRAY_OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut buf = column.try_into_value()?;

        if buf.remaining() < 12 {
            return Err(DecodeError::Malformed("array header"));
        }
        let ndim = buf.get_i32();
        let _has_nulls = buf.get_i32();
        let elem_oid = buf.get_u32();

        if ndim == 0 {
            return Ok(Array { dims: Vec::new(), elements: Vec::new() });
        }
        if ndim < 0 {
            return Err(DecodeError::Malformed("array dimension count"));
        }
        if elem_oid != T::OID {
            return Err(DecodeError::OidMissmatch);
        }

        let mut dims = Vec::with_capacity(ndim as usize);
        let mut total: i64 = 1;
        for _ in 0..ndim {
            if buf.remaining() < 8 {
                return Err(DecodeError::Malformed("array dimension"));
            }
            let length = buf.get_i32();
            let lower_bound = buf.get_i32();
            if length < 0 {
                return Err(DecodeError::Malformed("array dimension length"));
            }
            total *= length as i64;
            dims.push(Dimension { length, lower_bound });
        }

        let mut elements = Vec::with_capacity(total.max(0) as usize);
        for _ in 0..total {
            if buf.remaining() < 4 {
                return Err(DecodeError::Malformed("array element length"));
            }
            let elem_len = buf.get_i32();
            let value = if elem_len < 0 {
                None
            } else {
                if (buf.remaining() as i64) < elem_len as i64 {
                    return Err(DecodeError::Malformed("array element truncated"));
                }
                let bytes = buf.copy_to_bytes(elem_len as usize);
                Some(T::decode(Column::from_parts(T::OID, Some(bytes), "array element"))?)
            };
            elements.push(value);
        }

        Ok(Array { dims, elements })
    }
}

impl<T> Encode<'static> for Array<T>
where
    T: ArrayElement + Encode<'static>,
{
    fn encode(self) -> Encoded<'static> {
        let ndim = self.dims.len() as i32;
        let has_nulls = self.elements.iter().any(Option::is_none) as i32;
        let mut buf = BytesMut::with_capacity(12 + self.dims.len() * 8 + self.elements.len() * 8);

        buf.put_i32(ndim);
        buf.put_i32(has_nulls);
        buf.put_u32(T::OID);
        for dim in &self.dims {
            buf.put_i32(dim.length);
            buf.put_i32(dim.lower_bound);
        }

        for item in self.elements {
            match item {
                None => buf.put_i32(-1),
                Some(item) => {
                    let mut encoded = item.encode();
                    buf.put_i32(encoded.remaining() as i32);
                    while encoded.has_remaining() {
                        let chunk = encoded.chunk();
                        buf.put_slice(chunk);
                        let n = chunk.len();
                        encoded.advance(n);
                    }
                },
            }
        }

        Encoded::owned(buf.freeze(), T::ARRAY_OID)
    }
}

/// Convenience codec for the common case: a one-dimensional array with no
/// `NULL` elements. Any other shape (multi-dimensional, or containing a
/// `NULL`) is a [`DecodeError::Malformed`] rather than being silently
/// flattened or dropped — use [`Array`] directly when nulls or dimension
/// metadata matter.
impl<T: ArrayElement + Decode> Decode for Vec<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let array = Array::<T>::decode(column)?;
        match array.dims.len() {
            0 => Ok(Vec::new()),
            1 => array
                .elements
                .into_iter()
                .map(|e| e.ok_or(DecodeError::Malformed("array element is NULL, use Array<T> to decode nulls")))
                .collect(),
            _ => Err(DecodeError::Malformed("multi-dimensional array, use Array<T> to decode it")),
        }
    }
}

impl<T> Encode<'static> for Vec<T>
where
    T: ArrayElement + Encode<'static>,
{
    fn encode(self) -> Encoded<'static> {
        Array::from_vec(self).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_lower_bound() {
        let arr = Array::<i32> {
            dims: vec![Dimension { length: 3, lower_bound: 5 }],
            elements: vec![Some(1), None, Some(3)],
        };
        let encoded = arr.clone().encode();
        let col = Column::from_parts(arr_oid(), Some(encoded.chunk().to_vec().into()), "a");
        let decoded = Array::<i32>::decode(col).unwrap();
        assert_eq!(decoded, arr);
    }

    #[test]
    fn vec_rejects_null_element() {
        let arr = Array::<i32> {
            dims: vec![Dimension { length: 1, lower_bound: 1 }],
            elements: vec![None],
        };
        let encoded = arr.encode();
        let col = Column::from_parts(arr_oid(), Some(encoded.chunk().to_vec().into()), "a");
        assert!(matches!(Vec::<i32>::decode(col), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn vec_rejects_multi_dimensional() {
        let arr = Array::<i32> {
            dims: vec![Dimension { length: 2, lower_bound: 1 }, Dimension { length: 2, lower_bound: 1 }],
            elements: vec![Some(1), Some(2), Some(3), Some(4)],
        };
        let encoded = arr.encode();
        let col = Column::from_parts(arr_oid(), Some(encoded.chunk().to_vec().into()), "a");
        assert!(matches!(Vec::<i32>::decode(col), Err(DecodeError::Malformed(_))));
    }

    fn arr_oid() -> Oid {
        <i32 as ArrayElement>::ARRAY_OID
    }
}
