// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error types shared across the multiplexer.
//!
//! Each component gets its own `thiserror` enum so callers can match on the failure kind that is
//! actually meaningful to them; [`MetamixError`] aggregates all of them for call sites (the
//! supervisor, `main`) that only care about propagating a single error upward.

use thiserror::Error;

/// A parse failure from any binary codec (bit I/O, H.264, SCTE-35).
///
/// Carries the position the parser had reached so callers can log a precise diagnostic without
/// re-deriving it from the original buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (consumed {bytes_consumed} bytes, {bytes_left} left)")]
pub struct BinaryParseError {
    pub message: String,
    pub bytes_consumed: usize,
    pub bytes_left: usize,
}

impl BinaryParseError {
    pub fn new(message: impl Into<String>, bytes_consumed: usize, bytes_left: usize) -> Self {
        Self { message: message.into(), bytes_consumed, bytes_left }
    }
}

/// Bad configuration, or an operator request that names something that does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    Message(String),
    #[error("input id #{0} is out of range")]
    UnknownInputId(u32),
    #[error("unknown input name: {0:?}")]
    UnknownInputName(String),
}

impl ValidationError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Failure from the underlying container I/O. Retryable up to a fixed bound (see
/// [`crate::container`]).
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("failed to open {url:?}: {source}")]
    Open { url: String, source: anyhow::Error },
    #[error("failed to read packet: {0}")]
    Read(anyhow::Error),
    #[error("failed to write packet: {0}")]
    Write(anyhow::Error),
    #[error("end of stream")]
    Eof,
}

/// Signals that the current thread body should return cleanly so the supervisor can restart it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamRestart {
    #[error("sink rejected non-monotonic dts (prev={prev_dts}, next={next_dts})")]
    NonMonotonicDts { prev_dts: i64, next_dts: i64 },
    #[error("restart requested by operator")]
    Requested,
}

/// A defensive guard around a foreign-handle invariant that must never actually fail in a
/// correctly wired application; surfaced rather than panicking so the supervisor can log and
/// restart instead of aborting the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("null pointer: {0}")]
pub struct NullPointerError(pub String);

/// The union of every error kind a primary thread body can raise.
#[derive(Error, Debug)]
pub enum MetamixError {
    #[error(transparent)]
    Parse(#[from] BinaryParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Restart(#[from] StreamRestart),
    #[error(transparent)]
    NullPointer(#[from] NullPointerError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
