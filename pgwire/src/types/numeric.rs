//! `numeric` binary codec.
//!
//! Postgres stores numeric as base-10000 "digits" (`NBASE`), most significant
//! first, plus a weight (index of the first digit group, in NBASE units) and
//! a display scale. `rust_decimal::Decimal` carries at most 28-29 significant
//! decimal digits and no NaN/Infinity, so those sign values are rejected
//! rather than approximated.
use rust_decimal::Decimal;

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
    text::{DecodeText, EncodeText},
};

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

impl PgType for Decimal {
    /// numeric, arbitrary precision number
    const OID: Oid = 1700;
}

impl ArrayElement for Decimal {
    const ARRAY_OID: Oid = 1231;
}

impl Decode for Decimal {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let mut buf = &value[..];

        let mut read_u16 = |buf: &mut &[u8]| -> Result<u16, DecodeError> {
            let (head, rest) = buf.split_at_checked(2).ok_or(DecodeError::Malformed("numeric"))?;
            *buf = rest;
            Ok(u16::from_be_bytes([head[0], head[1]]))
        };

        let ndigits = read_u16(&mut buf)? as usize;
        let weight = read_u16(&mut buf)? as i16 as i32;
        let sign = read_u16(&mut buf)?;
        let dscale = read_u16(&mut buf)?;

        match sign {
            SIGN_NAN | SIGN_PINF | SIGN_NINF => {
                return Err(DecodeError::Malformed("numeric NaN/Infinity has no Decimal representation"));
            },
            SIGN_POS | SIGN_NEG => {},
            _ => return Err(DecodeError::Malformed("numeric sign")),
        }

        let mut mantissa: i128 = 0;
        for _ in 0..ndigits {
            let digit = read_u16(&mut buf)? as i128;
            if !(0..10_000).contains(&digit) {
                return Err(DecodeError::Malformed("numeric digit out of range"));
            }
            mantissa = mantissa * 10_000 + digit;
        }

        // `mantissa` currently represents the digit groups as an integer with
        // implied decimal point after the (weight+1)-th group of 4 digits.
        let value_scale = 4 * (ndigits as i32 - weight - 1);
        let mut value = if value_scale >= 0 {
            Decimal::from_i128_with_scale(mantissa, value_scale as u32)
        } else {
            Decimal::from_i128_with_scale(mantissa, 0)
                * Decimal::from_i128_with_scale(10i128.pow((-value_scale) as u32), 0)
        };
        value.rescale(dscale as u32);
        if sign == SIGN_NEG {
            value.set_sign_negative(true);
        }

        Ok(value)
    }
}

impl Encode<'static> for Decimal {
    fn encode(self) -> Encoded<'static> {
        let dscale = self.scale();
        let digit_str = self.mantissa().unsigned_abs().to_string();

        // full_str is the value's digits with the decimal point implicitly
        // `dscale` digits from the right; left-pad so the point lands inside it.
        let full_str = if dscale as usize >= digit_str.len() {
            format!("{}{digit_str}", "0".repeat(dscale as usize - digit_str.len() + 1))
        } else {
            digit_str
        };
        let int_digits = full_str.len() - dscale as usize;

        let left_pad = (4 - int_digits % 4) % 4;
        let right_pad = (4 - dscale as usize % 4) % 4;
        let full_str: String = "0".repeat(left_pad) + &full_str + &"0".repeat(right_pad);

        let weight = ((int_digits + left_pad) / 4) as i32 - 1;

        let mut digits: Vec<u16> = full_str
            .as_bytes()
            .chunks(4)
            .map(|c| std::str::from_utf8(c).unwrap().parse().unwrap())
            .collect();

        // trailing all-zero groups are implicit; dscale still records true scale.
        while digits.len() > 1 && *digits.last().unwrap() == 0 {
            digits.pop();
        }

        let sign = if self.is_sign_negative() && !self.is_zero() { SIGN_NEG } else { SIGN_POS };

        let mut out = Vec::with_capacity(8 + digits.len() * 2);
        out.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        out.extend_from_slice(&(weight as i16).to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&(dscale as u16).to_be_bytes());
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }

        Encoded::owned(out, Self::OID)
    }
}

/// postgres's `numeric` text form is plain decimal, which is exactly
/// `Decimal`'s own `Display`/`FromStr`.
impl DecodeText for Decimal {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("numeric text"))?;
        text.parse().map_err(|_| DecodeError::Malformed("numeric text"))
    }
}

impl EncodeText for Decimal {
    fn encode_text(self) -> Option<String> {
        Some(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_text() {
        let value = Decimal::new(123456, 2);
        let text = value.encode_text().unwrap();
        let col = Column::from_parts(Decimal::OID, Some(text.into_bytes().into()), "n");
        assert_eq!(Decimal::decode_text(col).unwrap(), value);
    }

    #[test]
    fn encode_small_integer() {
        let enc = Decimal::from(42).encode();
        assert_eq!(enc.oid(), 1700);
    }

    #[test]
    fn decode_rejects_nan() {
        // ndigits=0, weight=0, sign=NaN, dscale=0
        let bytes = [0u8, 0, 0, 0, 0xC0, 0, 0, 0];
        let col = Column::from_parts(1700, Some(bytes.to_vec().into()), "n");
        let err = Decimal::decode(col).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
