//! Postgres wire protocol v3 client driver.
//!
//! This crate implements the connection-level building blocks of the protocol: frame
//! codec, startup/authentication, the extended-query pipeline, a prepared statement
//! cache, and the postgres type registry. It does not implement pooling.
//!
//! # Examples
//!
//! Single connection:
//!
//! ```no_run
//! use pgwire::Connection;
//!
//! # async fn app() -> pgwire::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let res = pgwire::query_as::<_, _, (i32,String)>("SELECT 420,$1", &mut conn)
//!     .bind("Foo")
//!     .fetch_one()
//!     .await?;
//!
//! assert_eq!(res.0,420);
//! assert_eq!(res.1.as_str(),"Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Pipelining several statements without waiting for each round trip:
//!
//! ```no_run
//! use pgwire::{Connection, pipeline::Pipeline};
//!
//! # async fn app() -> pgwire::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//! let mut pipe = Pipeline::new(&mut conn);
//!
//! pipe.query_as::<(i32,)>("SELECT 1", vec![]);
//! pipe.query_as::<(i32,)>("SELECT 2", vec![]);
//!
//! let results = pipe.execute().await?;
//! assert_eq!(results.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod io;
mod net;
mod ext;

// Protocol
pub mod postgres;

// Encoding
mod value;
pub mod encode;

// Component
mod statement;
pub mod sql;
pub mod row;
pub mod types;
pub mod array;
pub mod text;
pub mod tracer;

// Operation
pub mod transport;
pub mod executor;
mod fetch;
pub mod query;
pub mod phase;
pub mod transaction;
pub mod pipeline;
pub mod batch;
pub mod copy;

// Connection
pub mod connection;

mod error;


pub use encode::Encode;
pub use row::{Row, FromRow, Decode, DecodeError};
pub use sql::SqlExt;
pub use text::{DecodeText, EncodeText};
pub use tracer::Tracer;

pub use executor::Executor;
pub use connection::{Connection, Config};
#[doc(inline)]
pub use query::{query, query_as, query_scalar, query_as_named, query_named, query_scalar_named};
pub use sql::rewrite_named_args;
pub use phase::begin;
pub use error::{Error, Result};

#[cfg(feature = "macros")]
pub use pgwire_macros::FromRow;

