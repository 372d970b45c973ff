// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight blob streaming.
//!
//! A weight blob is an opaque file already laid out in the accelerator's
//! expected format. The host never parses it; it only checks that it exists
//! and transmits every byte, in file order, in bounded chunks.

use crate::{LinkError, SerialSession, Transport};
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Chunk size for streaming weight files. Bounds host memory use for
/// arbitrarily large blobs.
pub const WEIGHT_CHUNK_BYTES: usize = 64 * 1024;

enum Source {
    File(File),
    Memory(Arc<[u8]>),
}

/// An opened weight blob, ready to stream.
///
/// Opening resolves the path and records its length up front, so a missing
/// file is reported before any byte goes on the wire.
pub struct WeightBlob {
    path: PathBuf,
    len: u64,
    source: Source,
}

impl WeightBlob {
    /// Opens `path` for streaming.
    ///
    /// # Errors
    /// [`LinkError::WeightFileMissing`] if the path does not exist,
    /// [`LinkError::WeightFileReadError`] for any other I/O failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let meta = file.metadata().map_err(|e| open_error(path, e))?;
        if meta.is_dir() {
            return Err(LinkError::WeightFileReadError {
                path: path.to_path_buf(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "path is a directory"),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            len: meta.len(),
            source: Source::File(file),
        })
    }

    /// Wraps bytes that are already resident in memory.
    pub fn from_shared(path: impl Into<PathBuf>, bytes: Arc<[u8]>) -> Self {
        Self {
            path: path.into(),
            len: bytes.len() as u64,
            source: Source::Memory(bytes),
        }
    }

    /// Path the blob was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blob length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for a zero-length blob.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes the whole blob to `session` and returns the byte count.
    ///
    /// A zero-length blob writes nothing and succeeds. If the file shrinks
    /// or grows while streaming, the transfer fails with
    /// [`LinkError::WeightFileReadError`]: the accelerator would otherwise
    /// consume the wrong number of weight bytes.
    pub fn stream_to<T: Transport>(self, session: &mut SerialSession<T>) -> Result<u64, LinkError> {
        let Self { path, len, source } = self;
        let sent = match source {
            Source::Memory(bytes) => {
                for chunk in bytes.chunks(WEIGHT_CHUNK_BYTES) {
                    session.write(chunk)?;
                }
                bytes.len() as u64
            }
            Source::File(mut file) => {
                let mut buf = vec![0u8; WEIGHT_CHUNK_BYTES];
                let mut sent = 0u64;
                loop {
                    let n = match file.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(source) => {
                            return Err(LinkError::WeightFileReadError { path, source });
                        }
                    };
                    if sent + n as u64 > len {
                        sent += n as u64;
                        break;
                    }
                    session.write(&buf[..n])?;
                    sent += n as u64;
                }
                sent
            }
        };

        if sent != len {
            return Err(LinkError::WeightFileReadError {
                path,
                source: std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("weight file changed while streaming: expected {len} bytes, read {sent}"),
                ),
            });
        }

        tracing::debug!("streamed {sent} weight bytes from {}", path.display());
        Ok(sent)
    }
}

impl std::fmt::Debug for WeightBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightBlob")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("cached", &matches!(self.source, Source::Memory(_)))
            .finish()
    }
}

fn open_error(path: &Path, source: std::io::Error) -> LinkError {
    if source.kind() == ErrorKind::NotFound {
        LinkError::WeightFileMissing {
            path: path.to_path_buf(),
        }
    } else {
        LinkError::WeightFileReadError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Opens the file at `path` and streams it to `session`.
///
/// The file is resolved before anything is written, so a missing file
/// leaves the link untouched.
pub fn stream_weights<T: Transport>(
    session: &mut SerialSession<T>,
    path: impl AsRef<Path>,
) -> Result<u64, LinkError> {
    WeightBlob::open(path)?.stream_to(session)
}

// ── Cache ──────────────────────────────────────────────────────

struct CachedBlob {
    bytes: Arc<[u8]>,
    len: u64,
    modified: Option<SystemTime>,
}

/// Keeps weight blobs resident between forward passes.
///
/// An entry is reused while the file's length and modification time are
/// unchanged, and re-read otherwise.
#[derive(Default)]
pub struct WeightCache {
    entries: HashMap<PathBuf, CachedBlob>,
    hits: u64,
    misses: u64,
}

impl WeightCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the blob for `path`, reading it from disk on a miss or when
    /// the file has changed since it was cached.
    pub fn get(&mut self, path: impl AsRef<Path>) -> Result<WeightBlob, LinkError> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|e| open_error(path, e))?;
        let modified = meta.modified().ok();

        if let Some(entry) = self.entries.get(path) {
            if entry.len == meta.len() && entry.modified == modified {
                self.hits += 1;
                return Ok(WeightBlob::from_shared(path, Arc::clone(&entry.bytes)));
            }
            tracing::debug!("weight file {} changed on disk; reloading", path.display());
        }

        let bytes: Arc<[u8]> = std::fs::read(path)
            .map_err(|e| open_error(path, e))?
            .into();
        self.misses += 1;
        self.entries.insert(
            path.to_path_buf(),
            CachedBlob {
                bytes: Arc::clone(&bytes),
                len: bytes.len() as u64,
                modified,
            },
        );
        Ok(WeightBlob::from_shared(path, bytes))
    }

    /// Drops the entry for `path`, if any.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) -> bool {
        self.entries.remove(path.as_ref()).is_some()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total resident bytes.
    pub fn resident_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.len).sum()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl std::fmt::Debug for WeightCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightCache")
            .field("entries", &self.entries.len())
            .field("resident_bytes", &self.resident_bytes())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;
    use std::io::Write;
    use std::time::Duration;

    fn session() -> (SerialSession<ScriptedTransport>, crate::mock::ScriptHandle) {
        let (transport, handle) = ScriptedTransport::new();
        (
            SerialSession::with_transport(transport, "scripted", Duration::from_millis(50)),
            handle,
        )
    }

    fn weight_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_stream_small_file() {
        let file = weight_file(&[1, 2, 3, 4, 5]);
        let (mut s, handle) = session();
        assert_eq!(stream_weights(&mut s, file.path()).unwrap(), 5);
        assert_eq!(handle.written(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stream_spans_several_chunks() {
        let bytes: Vec<u8> = (0..(WEIGHT_CHUNK_BYTES * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let file = weight_file(&bytes);
        let (mut s, handle) = session();
        assert_eq!(stream_weights(&mut s, file.path()).unwrap(), bytes.len() as u64);
        assert_eq!(handle.written(), bytes);
    }

    #[test]
    fn test_grown_file_sends_nothing_past_length() {
        let file = weight_file(&[1, 2, 3, 4, 5]);
        let blob = WeightBlob::open(file.path()).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap()
            .write_all(&[6, 7, 8])
            .unwrap();

        let (mut s, handle) = session();
        assert!(matches!(
            blob.stream_to(&mut s),
            Err(LinkError::WeightFileReadError { .. })
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_stream_empty_file() {
        let file = weight_file(&[]);
        let (mut s, handle) = session();
        assert_eq!(stream_weights(&mut s, file.path()).unwrap(), 0);
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_missing_file_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, handle) = session();
        let err = stream_weights(&mut s, dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, LinkError::WeightFileMissing { .. }));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_directory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            WeightBlob::open(dir.path()),
            Err(LinkError::WeightFileReadError { .. })
        ));
    }

    #[test]
    fn test_cache_hit_and_invalidate() {
        let file = weight_file(&[7; 32]);
        let mut cache = WeightCache::new();

        let a = cache.get(file.path()).unwrap();
        let b = cache.get(file.path()).unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.resident_bytes(), 32);

        assert!(cache.invalidate(file.path()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_reloads_changed_file() {
        let mut file = weight_file(&[1; 8]);
        let mut cache = WeightCache::new();
        cache.get(file.path()).unwrap();

        file.write_all(&[2; 8]).unwrap();
        file.flush().unwrap();

        let blob = cache.get(file.path()).unwrap();
        assert_eq!(blob.len(), 16);
        assert_eq!(cache.stats(), (0, 2));

        let (mut s, handle) = session();
        blob.stream_to(&mut s).unwrap();
        assert_eq!(handle.written().len(), 16);
    }

    #[test]
    fn test_cache_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = WeightCache::new();
        assert!(matches!(
            cache.get(dir.path().join("nope.bin")),
            Err(LinkError::WeightFileMissing { .. })
        ));
    }
}
