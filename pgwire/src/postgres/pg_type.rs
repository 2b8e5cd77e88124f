
/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// A type that have corresponding postgres oid.
pub trait PgType {
    const OID: Oid;
}

macro_rules! oid {
    ($ty:ty, $oid:literal $(, $doc:literal)? ) => {
        impl PgType for $ty {
            $(#[doc = $doc])?
            const OID: Oid = $oid;
        }
    };
}

oid!((), 0, "unspecified");
oid!(bool, 16, "`bool` boolean, 'true'/'false'");
oid!(char, 18, "`char` single-byte internal type");
oid!(i64, 20, "`int8` ~18 digit integer, 8-byte storage");
oid!(i16, 21, "`int2` -32 thousand to 32 thousand, 2-byte storage");
oid!(i32, 23, "`int4` -2 billion to 2 billion integer, 4-byte storage");
oid!(str, 25, "`text` variable-length string, no limit specified");
oid!(String, 25, "`text` variable-length string, no limit specified");
oid!([u8], 17, "`bytea` variable-length string, binary values escaped");
oid!(Vec<u8>, 17, "`bytea` variable-length string, binary values escaped");
oid!(f32, 700, "`float4` single-precision floating point number, 4-byte storage");
oid!(f64, 701, "`float8` double-precision floating point number, 8-byte storage");

/// An element type that has a known postgres array oid, in addition to its scalar oid.
///
/// Array oids are not a pure function of the element oid in postgres, so each
/// supported element carries its array oid explicitly.
pub trait ArrayElement: PgType {
    /// Oid of the one-dimensional array of this element type.
    const ARRAY_OID: Oid;
}

macro_rules! array_oid {
    ($ty:ty, $oid:literal) => {
        impl ArrayElement for $ty {
            const ARRAY_OID: Oid = $oid;
        }
    };
}

array_oid!(bool, 1000);
array_oid!(i64, 1016);
array_oid!(i16, 1005);
array_oid!(i32, 1007);
array_oid!(String, 1009);
array_oid!(f32, 1021);
array_oid!(f64, 1022);
array_oid!(Vec<u8>, 1001);

impl<T: ArrayElement> PgType for Vec<T> {
    const OID: Oid = T::ARRAY_OID;
}

// `time::PrimitiveDateTime`/`UtcDateTime` PgType impls live in `crate::types::time`,
// next to their Decode/Encode impls.
