// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Error domain of control protocol.

/// Any error of control protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlProtocolError {
    /// Bad control index, oversized request, or any malformed argument.
    InvalidArgument,
    /// The device could not be activated. No mailbox traffic happened.
    PowerResumeFailed,
    /// Failure of request and reply with the device.
    Transport,
    /// Bad magic, incompatible ABI version, declared size exceeding capacity, or id mismatch.
    ProtocolViolation,
    /// Failure of file operation in host side.
    Io,
}

impl std::fmt::Display for ControlProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = match self {
            ControlProtocolError::InvalidArgument => "invalid-argument",
            ControlProtocolError::PowerResumeFailed => "power-resume-failed",
            ControlProtocolError::Transport => "transport",
            ControlProtocolError::ProtocolViolation => "protocol-violation",
            ControlProtocolError::Io => "io",
        };

        write!(f, "ControlProtocolError::{}", msg)
    }
}

/// The error reported by any operation in the crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ControlProtocolError,
    message: String,
}

impl Error {
    pub fn new(kind: ControlProtocolError, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ControlProtocolError {
        self.kind
    }

    pub fn matches(&self, kind: ControlProtocolError) -> bool {
        self.kind == kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ControlProtocolError::Io, &err.to_string())
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::new(ControlProtocolError::Io, &err.to_string())
    }
}
