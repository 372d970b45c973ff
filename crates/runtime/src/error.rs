// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the hybrid runtime.

use offload_link::LinkError;

/// Errors that can occur while planning or running a hybrid forward pass.
///
/// Any error aborts the whole pass; no partial output is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The offload exchange for `layer` failed on the link.
    #[error("offload of layer {layer} failed: {source}")]
    Link {
        layer: usize,
        #[source]
        source: LinkError,
    },

    /// The offload plan is inconsistent with the network.
    #[error("invalid offload plan: {0}")]
    InvalidPlan(String),

    /// The activation reaching an offload point does not match its wire
    /// contract. Raised before any byte is sent.
    #[error("activation at layer {layer} violates its wire contract: expected {expected}, got {actual}")]
    ContractViolation {
        layer: usize,
        expected: String,
        actual: String,
    },

    /// A host layer failed.
    #[error("host layer {layer} ('{name}') failed: {source}")]
    LayerError {
        layer: usize,
        name: String,
        #[source]
        source: tensor_core::TensorError,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RuntimeError {
    /// Returns the layer index the error is attributed to, if any.
    pub fn layer(&self) -> Option<usize> {
        match self {
            Self::Link { layer, .. }
            | Self::ContractViolation { layer, .. }
            | Self::LayerError { layer, .. } => Some(*layer),
            Self::InvalidPlan(_) | Self::ConfigError(_) => None,
        }
    }

    /// Returns the underlying link error, if this is one.
    pub fn as_link_error(&self) -> Option<&LinkError> {
        match self {
            Self::Link { source, .. } => Some(source),
            _ => None,
        }
    }
}
