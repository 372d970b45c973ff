// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight blob resolution for offload points.
//!
//! [`WeightLoader`] provides two modes:
//!
//! 1. **Stream** opens the file on every offload and streams it in chunks.
//!    Host memory stays bounded regardless of blob size.
//! 2. **Cache** keeps each blob resident after the first read and re-reads
//!    it only when its length or modification time changes.
//!
//! In both modes the blob is resolved before the session is opened, and the
//! bytes go over the wire on every offload.

use crate::WeightPolicy;
use offload_link::{LinkError, WeightBlob, WeightCache};
use std::path::Path;

/// Resolves weight blobs according to a [`WeightPolicy`].
#[derive(Debug)]
pub struct WeightLoader {
    policy: WeightPolicy,
    cache: WeightCache,
}

impl WeightLoader {
    pub fn new(policy: WeightPolicy) -> Self {
        Self {
            policy,
            cache: WeightCache::new(),
        }
    }

    pub fn policy(&self) -> WeightPolicy {
        self.policy
    }

    /// Opens the blob at `path`, ready to stream.
    pub fn load(&mut self, path: &Path) -> Result<WeightBlob, LinkError> {
        let blob = match self.policy {
            WeightPolicy::Stream => WeightBlob::open(path)?,
            WeightPolicy::Cache => self.cache.get(path)?,
        };
        tracing::debug!(
            "weight blob {} resolved ({} bytes, {:?} policy)",
            path.display(),
            blob.len(),
            self.policy,
        );
        Ok(blob)
    }

    /// Cache `(hits, misses)`; always `(0, 0)` in stream mode.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Bytes held in memory by the cache.
    pub fn resident_bytes(&self) -> u64 {
        self.cache.resident_bytes()
    }
}
