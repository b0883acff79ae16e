use std::fmt;

use crate::address::Address;

/// Error taxonomy for the ODMRP core.
///
/// Mirrors the hand-rolled error style used throughout this codebase: a plain
/// enum with a manual `Display` impl rather than a derive macro, so the
/// messages stay exactly as written here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OdmrpError {
    /// Failed to add, connect, or identify a node.
    NodeConnect(String),
    /// A command or packet field did not parse or validate.
    InputMismatch(String),
    /// Reference to an address with no corresponding node.
    NotFound(Address),
    /// Unrecoverable scheduler state; the worker should stop.
    Fatal(String),
}

impl fmt::Display for OdmrpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdmrpError::NodeConnect(msg) => write!(f, "node connect error: {msg}"),
            OdmrpError::InputMismatch(msg) => write!(f, "input mismatch: {msg}"),
            OdmrpError::NotFound(addr) => write!(f, "no such node: {addr}"),
            OdmrpError::Fatal(msg) => write!(f, "fatal scheduler error: {msg}"),
        }
    }
}

impl std::error::Error for OdmrpError {}

pub type OdmrpResult<T> = Result<T, OdmrpError>;
