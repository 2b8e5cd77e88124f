//! Type integration with external types
//!
//! Implementation [`Decode`][d], [`Encode`][e], and [`FromRow`][f] for external types.
//!
//! Available for:
//!
//! - [`serde`]'s [`Deserialize`][sd] and [`Serialize`][ss] via [`Json`], requires `json` feature
//! - [`time`][::time]'s [`PrimitiveDateTime`][tp], [`UtcDateTime`][tu], [`Date`][td], requires `time` feature
//! - [`uuid`][::uuid]'s [`Uuid`][tuid], requires `uuid` feature
//! - [`rust_decimal`]'s [`Decimal`][dec], requires `decimal` feature
//! - [`std::net`]'s [`IpAddr`][ip] (`inet`) and [`Cidr`][cidr] (`cidr`)
//! - [`hstore`] text codec (no fixed oid; contrib extension type)
//! - [`AclItem`] (`aclitem`/`_aclitem`)
//! - [`Record`] (`record`), generic anonymous composite decode
//!
//! [d]: crate::Decode
//! [e]: crate::Encode
//! [f]: crate::FromRow
//! [sd]: serde::Deserialize
//! [ss]: serde::Serialize
//! [tp]: ::time::PrimitiveDateTime
//! [tu]: ::time::UtcDateTime
//! [td]: ::time::Date
//! [tuid]: ::uuid::Uuid
//! [dec]: rust_decimal::Decimal
//! [ip]: std::net::IpAddr
//! [cidr]: inet::Cidr

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::Json;

#[cfg(feature = "time")]
mod time;

#[cfg(feature = "uuid")]
mod uuid;

#[cfg(feature = "decimal")]
mod numeric;

mod inet;
pub use inet::Cidr;

pub mod hstore;

mod aclitem;
pub use aclitem::AclItem;

mod record;
pub use record::{Field, Record};

