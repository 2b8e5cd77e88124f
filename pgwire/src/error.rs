//! `pgwire` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    batch::BatchError,
    connection::{ParseError, TlsNotSupported},
    fetch::EmptyQueryError,
    phase::UnsupportedAuth,
    postgres::{ErrorResponse, ProtocolError},
    row::{DecodeError, RowNotFound},
};

/// A specialized [`Result`] type for `pgwire` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgwire` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn empty_query() -> Self {
        crate::fetch::EmptyQueryError.into()
    }
}

/// All possible error kind from `pgwire` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Database(ErrorResponse),
    Utf8(std::str::Utf8Error),
    RowNotFound(RowNotFound),
    EmptyQuery(EmptyQueryError),
    UnsupportedAuth(UnsupportedAuth),
    Decode(DecodeError),
    Batch(Box<BatchError>),
    TlsNotSupported(TlsNotSupported),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<EmptyQueryError>e => ErrorKind::EmptyQuery(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));

from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<BatchError>e => ErrorKind::Batch(Box::new(e)));
from!(<TlsNotSupported>e => ErrorKind::TlsNotSupported(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::UnsupportedAuth(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::EmptyQuery(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Batch(e) => e.fmt(f),
            Self::TlsNotSupported(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

