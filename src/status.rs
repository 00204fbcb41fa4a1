//! Status codes and the error ⇄ status mapper.
//!
//! This module is the single place that defines the outcome taxonomy carried
//! in reply envelopes. Every local error that must cross the wire goes
//! through [`to_status`]; every reply status a caller receives comes back
//! through [`from_status`]. Code and message survive the round trip exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RpcError;

/// Outcome code carried in a reply [`Status`].
///
/// Codes are transmitted as integers so that independently built peers agree
/// on them without sharing string spellings. Integers this build does not
/// know decode as [`Code::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    Timeout,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Wire value of this code.
    pub fn as_u32(self) -> u32 {
        // ---
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::Timeout => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
        }
    }

    /// Human readable name, used in error display.
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "Cancelled",
            Code::Unknown => "Unknown",
            Code::InvalidArgument => "InvalidArgument",
            Code::Timeout => "Timeout",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::Aborted => "Aborted",
            Code::OutOfRange => "OutOfRange",
            Code::Unimplemented => "Unimplemented",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
            Code::DataLoss => "DataLoss",
            Code::Unauthenticated => "Unauthenticated",
        }
    }
}

impl From<u32> for Code {
    fn from(value: u32) -> Self {
        // ---
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            3 => Code::InvalidArgument,
            4 => Code::Timeout,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

impl From<Code> for u32 {
    fn from(code: Code) -> Self {
        code.as_u32()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of a call: a [`Code`] plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: Code,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Status {
    /// Create a status with the given code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The success status.
    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        if self.message.is_empty() {
            write!(f, "[{}]", self.code)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

/// Canonicalize a local error into a wire status.
///
/// - `None` maps to OK.
/// - An error that already carries a code ([`RpcError::Status`], or a
///   [`RpcError::Timeout`]) keeps it.
/// - Anything else becomes [`Code::Unknown`] with the error's display text.
pub fn to_status(err: Option<&RpcError>) -> Status {
    // ---
    match err {
        None => Status::ok(),
        Some(RpcError::Status(status)) => status.clone(),
        Some(err @ RpcError::Timeout) => Status::new(Code::Timeout, err.to_string()),
        Some(err) => Status::new(Code::Unknown, err.to_string()),
    }
}

/// Convert a received status back into a caller-facing error.
///
/// OK maps to `None`; every other code maps to [`RpcError::Status`] carrying
/// the same code and message.
pub fn from_status(status: &Status) -> Option<RpcError> {
    // ---
    if status.is_ok() {
        None
    } else {
        Some(RpcError::Status(status.clone()))
    }
}
