// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the offload link.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while talking to the accelerator.
///
/// None of these are recoverable within a session: the protocol has no
/// resynchronisation, so the caller must abandon the exchange.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The device could not be opened or configured.
    #[error("serial link '{device}' unavailable: {detail}")]
    LinkUnavailable { device: String, detail: String },

    /// A write did not deliver every byte.
    #[error("serial write failed after {written} of {expected} bytes: {source}")]
    LinkWriteError {
        written: usize,
        expected: usize,
        #[source]
        source: std::io::Error,
    },

    /// A hard I/O failure while reading.
    #[error("serial read failed after {received} of {expected} bytes: {source}")]
    LinkReadError {
        received: usize,
        expected: usize,
        #[source]
        source: std::io::Error,
    },

    /// The read deadline passed before the requested byte count arrived.
    #[error("serial read timed out after {timeout:?}: received {received} of {expected} bytes")]
    LinkTimeout {
        expected: usize,
        received: usize,
        timeout: Duration,
    },

    /// The weight blob path does not resolve.
    #[error("weight file not found: {}", path.display())]
    WeightFileMissing { path: PathBuf },

    /// The weight blob exists but could not be read.
    #[error("failed to read weight file '{}': {source}", path.display())]
    WeightFileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tensor does not match the geometry the exchange was declared with.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// The CRC-32 trailer did not match the received payload.
    #[error("integrity check failed: trailer crc32 {expected:#010x}, payload crc32 {actual:#010x}")]
    IntegrityMismatch { expected: u32, actual: u32 },

    /// The session was used after `close()`.
    #[error("serial session already closed")]
    SessionClosed,
}

impl LinkError {
    /// Returns `true` for failures of the physical link itself.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::LinkUnavailable { .. }
                | Self::LinkWriteError { .. }
                | Self::LinkReadError { .. }
                | Self::LinkTimeout { .. }
        )
    }
}
