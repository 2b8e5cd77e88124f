use time::{Date, Duration, PrimitiveDateTime, UtcDateTime, macros::format_description};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
    text::{DecodeText, EncodeText},
};

impl ArrayElement for PrimitiveDateTime {
    const ARRAY_OID: Oid = 1115;
}

impl ArrayElement for UtcDateTime {
    const ARRAY_OID: Oid = 1185;
}

impl ArrayElement for Date {
    const ARRAY_OID: Oid = 1182;
}

impl PgType for PrimitiveDateTime {
    /// date and time
    const OID: Oid = 1114;
}

impl PgType for UtcDateTime {
    /// date and time with timezone
    const OID: Oid = 1184;
}

impl PgType for Date {
    /// calendar date (year, month, day)
    const OID: Oid = 1082;
}

const PRIMITIVE_PG_EPOCH: PrimitiveDateTime = {
    // source: `from_julian_day` docs
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("for fuck sake"),
    };
    PrimitiveDateTime::new(date, time::Time::MIDNIGHT)
};

const UTC_PG_EPOCH: UtcDateTime = {
    // source: `from_julian_day` docs
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("for fuck sake"),
    };
    UtcDateTime::new(date, time::Time::MIDNIGHT)
};

const DATE_PG_EPOCH: Date = PRIMITIVE_PG_EPOCH.date();

impl Decode for PrimitiveDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        assert_eq!(
            value.len(),
            size_of::<i64>(),
            "postgres did not return `i64`"
        );
        Ok(
            PRIMITIVE_PG_EPOCH.saturating_add(Duration::microseconds(i64::from_be_bytes(
                value[..].try_into().unwrap(),
            ))),
        )
    }
}

impl Decode for UtcDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        assert_eq!(
            value.len(),
            size_of::<i64>(),
            "postgres did not return `i64`"
        );
        Ok(
            UTC_PG_EPOCH.saturating_add(Duration::microseconds(i64::from_be_bytes(
                value[..].try_into().unwrap(),
            ))),
        )
    }
}

/// `date`'s infinity sentinels don't fit a plain calendar date; they saturate
/// to the representable extremes instead of being rejected.
impl Decode for Date {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let be: [u8; 4] = value[..].try_into().map_err(|_| DecodeError::Malformed("date"))?;
        let days = i32::from_be_bytes(be);
        Ok(match days {
            i32::MAX => Date::MAX,
            i32::MIN => Date::MIN,
            days => DATE_PG_EPOCH.saturating_add(Duration::days(days as i64)),
        })
    }
}

impl Encode<'static> for Date {
    fn encode(self) -> Encoded<'static> {
        let days = (self - DATE_PG_EPOCH).whole_days();
        let days = days.clamp(i32::MIN as i64 + 1, i32::MAX as i64 - 1) as i32;
        Encoded::inline(&days.to_be_bytes(), Self::OID)
    }
}

impl Encode<'static> for PrimitiveDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - PRIMITIVE_PG_EPOCH).whole_microseconds() as i64;
        Encoded::inline(&micros.to_be_bytes(), Self::OID)
    }
}

impl Encode<'static> for UtcDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - UTC_PG_EPOCH).whole_microseconds() as i64;
        Encoded::inline(&micros.to_be_bytes(), Self::OID)
    }
}

const DATE_FORMAT: &[time::format_description::FormatItem] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_ENCODE_FORMAT: &[time::format_description::FormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
const TIMESTAMP_DECODE_FORMAT: &[time::format_description::FormatItem] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond digits:1+]]]"
);

impl DecodeText for Date {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("date text"))?;
        Date::parse(text, &DATE_FORMAT).map_err(|_| DecodeError::Malformed("date text"))
    }
}

impl EncodeText for Date {
    fn encode_text(self) -> Option<String> {
        Some(self.format(&DATE_FORMAT).expect("date always formats"))
    }
}

impl DecodeText for PrimitiveDateTime {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("timestamp text"))?;
        PrimitiveDateTime::parse(text, &TIMESTAMP_DECODE_FORMAT)
            .map_err(|_| DecodeError::Malformed("timestamp text"))
    }
}

impl EncodeText for PrimitiveDateTime {
    fn encode_text(self) -> Option<String> {
        Some(self.format(&TIMESTAMP_ENCODE_FORMAT).expect("timestamp always formats"))
    }
}

/// `timestamptz`'s text form carries a zone offset (`postgres` renders it in
/// the session's `TimeZone`); only the `+00`/`Z`/no-offset forms round-trip
/// cleanly here since [`UtcDateTime`] itself carries no offset. Any other
/// offset is rejected rather than silently reinterpreted as UTC.
impl DecodeText for UtcDateTime {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("timestamptz text"))?;
        let naive = text
            .strip_suffix("+00")
            .or_else(|| text.strip_suffix('Z'))
            .unwrap_or(text);
        let parsed = PrimitiveDateTime::parse(naive, &TIMESTAMP_DECODE_FORMAT)
            .map_err(|_| DecodeError::Malformed("timestamptz text"))?;
        Ok(UtcDateTime::new(parsed.date(), parsed.time()))
    }
}

impl EncodeText for UtcDateTime {
    fn encode_text(self) -> Option<String> {
        let naive = PrimitiveDateTime::new(self.date(), self.time());
        Some(format!("{}+00", naive.format(&TIMESTAMP_ENCODE_FORMAT).expect("timestamptz always formats")))
    }
}

#[cfg(test)]
mod text_tests {
    use super::*;

    #[test]
    fn date_roundtrips_through_text() {
        let date = Date::from_calendar_date(2024, time::Month::March, 7).unwrap();
        let text = date.encode_text().unwrap();
        assert_eq!(text, "2024-03-07");
        let col = Column::from_parts(Date::OID, Some(text.into_bytes().into()), "d");
        assert_eq!(Date::decode_text(col).unwrap(), date);
    }

    #[test]
    fn timestamp_roundtrips_through_text() {
        let date = Date::from_calendar_date(2024, time::Month::March, 7).unwrap();
        let dt = PrimitiveDateTime::new(date, time::Time::from_hms(13, 5, 9).unwrap());
        let text = dt.encode_text().unwrap();
        let col = Column::from_parts(PrimitiveDateTime::OID, Some(text.into_bytes().into()), "t");
        assert_eq!(PrimitiveDateTime::decode_text(col).unwrap(), dt);
    }

    #[test]
    fn timestamp_decode_accepts_missing_fractional_seconds() {
        let col = Column::from_parts(PrimitiveDateTime::OID, Some(b"2024-03-07 13:05:09".to_vec().into()), "t");
        let date = Date::from_calendar_date(2024, time::Month::March, 7).unwrap();
        let expected = PrimitiveDateTime::new(date, time::Time::from_hms(13, 5, 9).unwrap());
        assert_eq!(PrimitiveDateTime::decode_text(col).unwrap(), expected);
    }

    #[test]
    fn timestamptz_roundtrips_through_text() {
        let date = Date::from_calendar_date(2024, time::Month::March, 7).unwrap();
        let dt = UtcDateTime::new(date, time::Time::from_hms(13, 5, 9).unwrap());
        let text = dt.encode_text().unwrap();
        assert!(text.ends_with("+00"));
        let col = Column::from_parts(UtcDateTime::OID, Some(text.into_bytes().into()), "t");
        assert_eq!(UtcDateTime::decode_text(col).unwrap(), dt);
    }
}

