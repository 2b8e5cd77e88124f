//! Protocol level errors.
use std::fmt;

/// An error when translating bytes to/from a postgres message.
pub enum ProtocolError {
    /// Received a message type that was not expected in the current phase.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// Server requested an authentication method unknown to this crate.
    UnknownAuth { auth: u32 },
    /// SCRAM exchange produced a malformed or unverifiable server message.
    Scram(&'static str),
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: None }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected { expect: Some(expect), found, phase: None }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: Some(phase) }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }

    pub(crate) fn scram(reason: &'static str) -> ProtocolError {
        Self::Scram(reason)
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unexpected { expect: Some(expect), found, phase: Some(phase) } => write!(
                f, "unexpected message {found:?} in {phase}, expected {expect:?}"
            ),
            Self::Unexpected { expect: Some(expect), found, phase: None } => write!(
                f, "unexpected message {found:?}, expected {expect:?}"
            ),
            Self::Unexpected { expect: None, found, phase: Some(phase) } => write!(
                f, "unexpected message {found:?} in {phase}"
            ),
            Self::Unexpected { expect: None, found, phase: None } => write!(
                f, "unknown message type {found:?}"
            ),
            Self::UnknownAuth { auth } => write!(f, "unknown authentication method: {auth}"),
            Self::Scram(reason) => write!(f, "SCRAM exchange failed: {reason}"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
