// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The release seen as a directory.

use std::io::{self, Read};

use super::file::{AssetFile, DirEntry, FileInfo, FsFile};
use crate::release::ReleaseState;

/// The release root. Named after the tag, its children are the assets.
///
/// Built fresh for every request of `"."` from the assets loaded at that time.
#[derive(Debug, Clone)]
pub struct ReleaseDir {
    info: FileInfo,
    entries: Vec<DirEntry>,
}

impl ReleaseDir {
    pub(crate) fn new(release: &ReleaseState) -> Self {
        let entries = release
            .assets()
            .iter()
            .map(|asset| DirEntry::new(asset.info()))
            .collect();
        Self {
            info: Self::info_of(release),
            entries,
        }
    }

    /// Stat data of the root of `release`.
    pub(crate) fn info_of(release: &ReleaseState) -> FileInfo {
        let created = release.created_at.unwrap_or_default();
        let modified = release.published_at.unwrap_or(created);
        FileInfo::new(&release.tag, 0, created, modified, true)
    }

    /// All entries, in release order. `n` is accepted for API parity but the
    /// full list is always returned.
    pub fn read_dir(&self, _n: usize) -> Vec<DirEntry> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// The directory itself as an entry.
    pub fn entry(&self) -> DirEntry {
        DirEntry::new(self.info.clone())
    }
}

impl Read for ReleaseDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other(format!("{} is a directory", self.info.name())))
    }
}

impl FsFile for ReleaseDir {
    fn stat(&self) -> FileInfo {
        self.info.clone()
    }

    fn name(&self) -> &str {
        self.info.name()
    }

    fn is_dir(&self) -> bool {
        true
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What [`open`](crate::ReleaseFileSystem::open) hands out.
#[derive(Debug)]
pub enum OpenFile<'a> {
    Regular(&'a mut AssetFile),
    Directory(ReleaseDir),
}

impl OpenFile<'_> {
    pub fn as_dir(&self) -> Option<&ReleaseDir> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::Regular(_) => None,
        }
    }
}

impl Read for OpenFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Regular(file) => file.read(buf),
            Self::Directory(dir) => dir.read(buf),
        }
    }
}

impl FsFile for OpenFile<'_> {
    fn stat(&self) -> FileInfo {
        match self {
            Self::Regular(file) => file.stat(),
            Self::Directory(dir) => dir.stat(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Regular(file) => FsFile::name(&**file),
            Self::Directory(dir) => dir.name(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    fn close(&mut self) -> io::Result<()> {
        match self {
            Self::Regular(file) => file.close(),
            Self::Directory(dir) => dir.close(),
        }
    }
}
