// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared across the HTTP, WebSocket, and tool surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidKind,
    InvalidFormat,
    PortExhausted,
    ChildFailure,
    CommandTimeout,
    SandboxViolation,
    NotStarted,
    AlreadyStarted,
    NotFound,
    BadRequest,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidKind => 400,
            Self::InvalidFormat => 400,
            Self::PortExhausted => 500,
            Self::ChildFailure => 500,
            Self::CommandTimeout => 504,
            Self::SandboxViolation => 403,
            Self::NotStarted => 409,
            Self::AlreadyStarted => 409,
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidKind => "INVALID_KIND",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::PortExhausted => "PORT_EXHAUSTED",
            Self::ChildFailure => "CHILD_FAILURE",
            Self::CommandTimeout => "COMMAND_TIMEOUT",
            Self::SandboxViolation => "SANDBOX_VIOLATION",
            Self::NotStarted => "NOT_STARTED",
            Self::AlreadyStarted => "ALREADY_STARTED",
            Self::NotFound => "NOT_FOUND",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
