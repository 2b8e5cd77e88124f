//! Encoding value into postgres wire parameter.
use bytes::{Buf, Bytes};

use crate::{
    ext::BindParams,
    postgres::{Oid, PgType},
    value::ValueRef,
};

/// An encoded parameter value, ready to be written into a `Bind` message.
///
/// This wraps either a borrowed slice, an inlined small buffer, or an owned
/// [`Bytes`], to avoid allocating for the common case of small fixed-size values.
pub struct Encoded<'a> {
    value: ValueRef<'a>,
    is_null: bool,
    oid: Oid,
}

impl<'a> Encoded<'a> {
    /// Construct from a borrowed slice.
    pub fn from_slice(value: &'a [u8], oid: Oid) -> Self {
        Self { value: ValueRef::Slice(value), is_null: false, oid }
    }

    /// Construct by inlining a small slice, avoiding an allocation.
    ///
    /// # Panics
    ///
    /// Panics if `value` is 15 bytes or longer.
    pub fn inline(value: &[u8], oid: Oid) -> Encoded<'static> {
        Encoded { value: ValueRef::inline(value), is_null: false, oid }
    }

    /// Construct from an owned buffer.
    pub fn owned(value: impl Into<Bytes>, oid: Oid) -> Encoded<'static> {
        Encoded { value: ValueRef::Bytes(value.into()), is_null: false, oid }
    }

    /// Construct a `NULL` parameter value of the given type.
    pub fn null(oid: Oid) -> Encoded<'static> {
        Encoded { value: ValueRef::Bytes(Bytes::new()), is_null: true, oid }
    }

    /// Returns the postgres [`Oid`] of this parameter.
    pub fn oid(&self) -> Oid {
        self.oid
    }
}

impl Buf for Encoded<'_> {
    fn remaining(&self) -> usize {
        self.value.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.value.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.value.advance(cnt);
    }
}

impl BindParams for Encoded<'_> {
    fn size(&self) -> i32 {
        if self.is_null {
            return -1;
        }
        self.value.len() as i32
    }
}

impl std::fmt::Debug for Encoded<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoded")
            .field("oid", &self.oid)
            .field("is_null", &self.is_null)
            .field("value", &self.value)
            .finish()
    }
}

/// A value that can be encoded as a query parameter.
pub trait Encode<'a> {
    /// Encode self into an [`Encoded`] parameter.
    fn encode(self) -> Encoded<'a>;
}

impl<'a, T> Encode<'a> for Option<T>
where
    T: Encode<'a> + PgType,
{
    fn encode(self) -> Encoded<'a> {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(T::OID),
        }
    }
}

impl<'a, T> Encode<'a> for &'a T
where
    T: Encode<'a> + Copy,
{
    fn encode(self) -> Encoded<'a> {
        (*self).encode()
    }
}

macro_rules! encode_int {
    ($($ty:ty),*) => {$(
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                Encoded::inline(&self.to_be_bytes(), Self::OID)
            }
        }
    )*};
}

encode_int!(i16, i32, i64, f32, f64);

impl Encode<'static> for bool {
    fn encode(self) -> Encoded<'static> {
        Encoded::inline(&[self as u8], Self::OID)
    }
}

impl Encode<'static> for char {
    fn encode(self) -> Encoded<'static> {
        let mut buf = [0u8; 4];
        let s = self.encode_utf8(&mut buf);
        Encoded::inline(s.as_bytes(), Self::OID)
    }
}

impl<'a> Encode<'a> for &'a str {
    fn encode(self) -> Encoded<'a> {
        Encoded::from_slice(self.as_bytes(), <str as PgType>::OID)
    }
}

impl Encode<'static> for String {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self.into_bytes(), <str as PgType>::OID)
    }
}

impl<'a> Encode<'a> for &'a [u8] {
    fn encode(self) -> Encoded<'a> {
        Encoded::from_slice(self, <[u8] as PgType>::OID)
    }
}

impl Encode<'static> for Vec<u8> {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self, Self::OID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_negative_size() {
        let enc: Encoded<'static> = Option::<i32>::None.encode();
        assert_eq!(enc.size(), -1);
    }

    #[test]
    fn int_roundtrips_be_bytes() {
        let enc = 420_i32.encode();
        assert_eq!(enc.chunk(), 420_i32.to_be_bytes());
    }

    #[test]
    fn str_borrows_without_copy() {
        let value = "hello";
        let enc = value.encode();
        assert_eq!(enc.chunk(), b"hello");
    }
}
