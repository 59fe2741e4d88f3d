// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Release assets as files.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// Permission bits reported for assets.
pub const MODE_READ_ONLY: u32 = 0o400;

/// Directory bit, as in `st_mode`.
pub const MODE_DIR: u32 = 0o040_000;

/// Capabilities shared by everything [`open`](crate::ReleaseFileSystem::open) returns.
pub trait FsFile: Read {
    fn stat(&self) -> FileInfo;
    fn name(&self) -> &str;
    fn is_dir(&self) -> bool;
    /// Release the underlying stream. Closing twice is fine.
    fn close(&mut self) -> io::Result<()>;
}

/// Stat data of an asset or of the release directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    is_dir: bool,
}

impl FileInfo {
    pub(crate) fn new(
        name: impl Into<String>,
        size: u64,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        is_dir: bool,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            created,
            modified,
            is_dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in bytes (0 for the directory).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Mode bits. There is no executable or symlink concept.
    pub fn mode(&self) -> u32 {
        if self.is_dir {
            MODE_DIR | 0o500
        } else {
            MODE_READ_ONLY
        }
    }
}

/// One entry of the release directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    info: FileInfo,
}

impl DirEntry {
    pub(crate) fn new(info: FileInfo) -> Self {
        Self { info }
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    pub fn info(&self) -> FileInfo {
        self.info.clone()
    }
}

/// Where the bytes of an asset come from right now.
///
/// `Closed` resolves like `Unopened`: the next open goes through the tiers again.
#[derive(Default)]
pub enum StreamState {
    #[default]
    Unopened,
    CacheAttached(File),
    RemoteAttached(Box<dyn Read + Send>),
    Closed,
}

impl StreamState {
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::CacheAttached(_) | Self::RemoteAttached(_))
    }
}

impl fmt::Debug for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unopened => "Unopened",
            Self::CacheAttached(_) => "CacheAttached",
            Self::RemoteAttached(_) => "RemoteAttached",
            Self::Closed => "Closed",
        };
        f.write_str(label)
    }
}

/// A downloadable file of a release.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetFile {
    pub id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: DateTime<Utc>,
    #[serde(rename = "browser_download_url", default)]
    url: String,
    #[serde(skip)]
    state: StreamState,
    #[serde(skip)]
    cache_path: Option<PathBuf>,
}

impl AssetFile {
    pub fn new(id: i64, name: impl Into<String>, size: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            url: url.into(),
            state: StreamState::Unopened,
            cache_path: None,
        }
    }

    pub fn with_times(mut self, created: DateTime<Utc>, updated: DateTime<Utc>) -> Self {
        self.created_at = created;
        self.updated_at = updated;
        self
    }

    /// Asset name. Same as [`FsFile::name`], without importing the trait.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Download URL of the asset.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// True while a stream is attached.
    pub fn is_open(&self) -> bool {
        self.state.is_attached()
    }

    /// Local copy, once the asset has been cached.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    pub fn info(&self) -> FileInfo {
        FileInfo::new(&self.name, self.size, self.created_at, self.updated_at, false)
    }

    /// Attach a stream. Any stream still attached is dropped first.
    pub(crate) fn attach(&mut self, state: StreamState) {
        if self.state.is_attached() {
            tracing::debug!("Releasing previous stream of {}", self.name);
        }
        self.state = state;
    }

    /// Take the attached stream out, leaving the asset closed.
    pub(crate) fn detach(&mut self) -> Option<Box<dyn Read + Send>> {
        match std::mem::replace(&mut self.state, StreamState::Closed) {
            StreamState::CacheAttached(file) => Some(Box::new(file)),
            StreamState::RemoteAttached(stream) => Some(stream),
            StreamState::Unopened => {
                self.state = StreamState::Unopened;
                None
            }
            StreamState::Closed => None,
        }
    }

    pub(crate) fn set_cache_path(&mut self, path: PathBuf) {
        self.cache_path = Some(path);
    }
}

impl Read for AssetFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.state {
            StreamState::CacheAttached(file) => file.read(buf),
            StreamState::RemoteAttached(stream) => stream.read(buf),
            StreamState::Unopened | StreamState::Closed => {
                Err(io::Error::other(FsError::NoStream(self.name.clone())))
            }
        }
    }
}

impl FsFile for AssetFile {
    fn stat(&self) -> FileInfo {
        self.info()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn close(&mut self) -> io::Result<()> {
        if self.state.is_attached() {
            tracing::debug!("Closing {}", self.name);
            self.state = StreamState::Closed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn asset() -> AssetFile {
        AssetFile::new(1, "a.txt", 5, "https://example.com/a.txt")
    }

    #[test]
    fn test_read_requires_stream() {
        let mut a = asset();
        let mut buf = [0u8; 4];
        let err = a.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("file is not open"));
    }

    #[test]
    fn test_state_transitions() {
        let mut a = asset();
        assert!(matches!(a.state(), StreamState::Unopened));

        a.attach(StreamState::RemoteAttached(Box::new(Cursor::new(b"hello".to_vec()))));
        assert!(a.is_open());

        let mut out = String::new();
        a.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");

        a.close().unwrap();
        assert!(matches!(a.state(), StreamState::Closed));
        assert!(!a.is_open());

        // Closing is idempotent
        a.close().unwrap();
        assert!(matches!(a.state(), StreamState::Closed));
    }

    #[test]
    fn test_detach() {
        let mut a = asset();
        assert!(a.detach().is_none());
        assert!(matches!(a.state(), StreamState::Unopened));

        a.attach(StreamState::RemoteAttached(Box::new(Cursor::new(vec![1, 2, 3]))));
        let mut stream = a.detach().unwrap();
        assert!(matches!(a.state(), StreamState::Closed));

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_file_info() {
        let a = asset();
        let info = a.stat();
        assert_eq!(info.name(), "a.txt");
        assert_eq!(info.size(), 5);
        assert!(!info.is_dir());
        assert_eq!(info.mode(), MODE_READ_ONLY);

        let dir = FileInfo::new("v1", 0, Utc::now(), Utc::now(), true);
        assert_eq!(dir.mode() & MODE_DIR, MODE_DIR);
    }
}
