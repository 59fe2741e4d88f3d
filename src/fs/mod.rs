// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only filesystem over a release.
//!
//! The release is a single directory, addressed as `"."`, whose files are the
//! release assets. Opening a file resolves its bytes through three tiers:
//!
//! ```text
//! open(name) ──▶ stream already attached? ──yes──▶ same file
//!                      │ no
//!                      ▼
//!                cache enabled? ──yes──▶ cache_dir/name ──missing──┐
//!                      │ no                   │ found              │
//!                      ▼                      ▼                    ▼
//!                remote fetch ◀──────────── attach ◀──────── remote fetch
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::io::Read;
//! use releasefs::{FsFile, ReleaseFileSystem};
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut rfs = ReleaseFileSystem::from_url(
//!     "https://github.com/acme/demo/releases/tag/v1.0.0",
//! )?;
//! rfs.load_release()?;
//!
//! for entry in rfs.read_dir(".")? {
//!     println!("{} ({} bytes)", entry.name(), entry.info().size());
//! }
//!
//! let mut file = rfs.open("about.txt")?;
//! let mut text = String::new();
//! file.read_to_string(&mut text)?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! The filesystem does no internal locking: `open` takes `&mut self`, so the
//! borrow checker keeps callers from opening concurrently or while caching.

pub mod dir;
pub mod file;

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;

use crate::cache::is_reserved_name;
use crate::client::{ApiClient, HttpClient, RequestTarget};
use crate::error::FsError;
use crate::options::Options;
use crate::release::ReleaseState;

pub use dir::{OpenFile, ReleaseDir};
pub use file::{AssetFile, DirEntry, FileInfo, FsFile, StreamState, MODE_DIR, MODE_READ_ONLY};

/// Name of the release directory.
pub const ROOT: &str = ".";

/// A GitHub release exposed as a read-only filesystem.
pub struct ReleaseFileSystem {
    pub(crate) options: Options,
    pub(crate) release: ReleaseState,
    pub(crate) client: Arc<dyn ApiClient>,
}

impl std::fmt::Debug for ReleaseFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseFileSystem")
            .field("options", &self.options)
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

impl ReleaseFileSystem {
    /// Create a filesystem talking to `options.host`.
    ///
    /// Fails before any request if the host is not usable. Nothing is
    /// fetched until [`load_release`](Self::load_release).
    pub fn new(options: Options) -> Result<Self> {
        let client = HttpClient::new(&options.host)?;
        Ok(Self::with_client(options, Arc::new(client)))
    }

    /// Create a filesystem for the release page at `url`.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(Options::from_url(url)?)
    }

    /// Create a filesystem with a custom API client.
    pub fn with_client(options: Options, client: Arc<dyn ApiClient>) -> Self {
        Self {
            options,
            release: ReleaseState::default(),
            client,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn release(&self) -> &ReleaseState {
        &self.release
    }

    /// Fetch the release metadata, replacing whatever was loaded before.
    ///
    /// With caching enabled the release is cached right after.
    pub fn load_release(&mut self) -> Result<()> {
        let path = self.options.release_path();
        let target = RequestTarget::Path(&path);

        let response = self
            .client
            .get(target)
            .and_then(|response| response.error_for_status(target))
            .context("loading release")?;
        let release = ReleaseState::from_reader(response.body).context("unmarshaling release data")?;

        tracing::info!(
            "Loaded release {} of {}/{} ({} assets)",
            release.tag,
            self.options.organization,
            self.options.repository,
            release.assets().len()
        );
        self.release = release;

        if self.options.cache {
            self.cache_release().context("caching release")?;
        }

        Ok(())
    }

    /// Open a file, or the release directory for `"."`.
    pub fn open(&mut self, name: &str) -> Result<OpenFile<'_>> {
        if name == ROOT {
            return Ok(OpenFile::Directory(ReleaseDir::new(&self.release)));
        }

        let index = self.position(name)?;
        if self.release.assets()[index].is_open() {
            tracing::debug!("Reusing open stream of {}", name);
            return Ok(OpenFile::Regular(self.release.asset_at_mut(index)));
        }

        let asset = if self.options.cache {
            self.open_cached_at(index)?
        } else {
            self.open_remote_at(index)?
        };
        Ok(OpenFile::Regular(asset))
    }

    /// Open a file from the local cache, falling back to the remote copy
    /// when it was never cached.
    pub fn open_cached_file(&mut self, name: &str) -> Result<&mut AssetFile> {
        let index = self.position(name)?;
        self.open_cached_at(index)
    }

    /// Open a file by downloading it.
    pub fn open_remote_file(&mut self, name: &str) -> Result<&mut AssetFile> {
        let index = self.position(name)?;
        self.open_remote_at(index)
    }

    /// Stat a file, or the release directory for `"."`. Never does I/O.
    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == ROOT {
            return Ok(ReleaseDir::info_of(&self.release));
        }
        let index = self.position(name)?;
        Ok(self.release.assets()[index].info())
    }

    /// List the release directory. There are no other directories.
    pub fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        if name != ROOT {
            return Err(anyhow!(FsError::NotFound(name.to_string())));
        }
        Ok(ReleaseDir::new(&self.release).read_dir(0))
    }

    /// Read a whole file and close it.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.open(name)?;
        let mut data = Vec::new();
        let read = file.read_to_end(&mut data).with_context(|| format!("reading {}", name));
        file.close().with_context(|| format!("closing {}", name))?;
        read?;
        Ok(data)
    }

    /// Every path of the filesystem with its entry, the root first.
    pub fn walk(&self) -> Vec<(String, DirEntry)> {
        let root = ReleaseDir::new(&self.release);
        let mut paths = Vec::with_capacity(root.entries().len() + 1);
        paths.push((ROOT.to_string(), root.entry()));
        paths.extend(
            root.entries()
                .iter()
                .map(|entry| (entry.name().to_string(), entry.clone())),
        );
        paths
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.release
            .position(name)
            .ok_or_else(|| anyhow!(FsError::NotFound(name.to_string())))
    }

    fn open_cached_at(&mut self, index: usize) -> Result<&mut AssetFile> {
        let name = self.release.assets()[index].name().to_string();
        // Never cached, the file under this name is the manifest
        if is_reserved_name(&name) {
            return self.open_remote_at(index);
        }
        let path = match &self.options.cache_path {
            Some(dir) => dir.join(&name),
            None => {
                return Err(anyhow!(FsError::CacheUnavailable(
                    "release cache path not set".to_string()
                )))
            }
        };

        match File::open(&path) {
            Ok(file) => {
                let expected = self.release.assets()[index].size();
                let len = file
                    .metadata()
                    .with_context(|| format!("reading metadata of cached file {:?}", path))?
                    .len();
                // Incomplete copy, serve the remote file instead
                if len != expected {
                    tracing::debug!("Cached {} has {} of {} bytes, fetching it", name, len, expected);
                    return self.open_remote_at(index);
                }
                tracing::debug!("Serving {} from cache", name);
                let asset = self.release.asset_at_mut(index);
                asset.attach(StreamState::CacheAttached(file));
                asset.set_cache_path(path);
                Ok(asset)
            }
            // Filtered out of the cache or not cached yet
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} is not cached, fetching it", name);
                self.open_remote_at(index)
            }
            Err(e) => Err(e).with_context(|| format!("opening cached file {:?}", path)),
        }
    }

    fn open_remote_at(&mut self, index: usize) -> Result<&mut AssetFile> {
        let asset = &self.release.assets()[index];
        let stream = fetch_asset(self.client.as_ref(), asset.name(), asset.url())
            .with_context(|| format!("requesting {} from API", asset.name()))?;

        let asset = self.release.asset_at_mut(index);
        asset.attach(StreamState::RemoteAttached(stream));
        Ok(asset)
    }
}

/// Issue the single GET that serves an asset's bytes.
pub(crate) fn fetch_asset(
    client: &dyn ApiClient,
    name: &str,
    url: &str,
) -> Result<Box<dyn Read + Send>> {
    if url.is_empty() {
        return Err(anyhow!(FsError::MissingUrl(name.to_string())));
    }
    // Downloads are served from their own host, not the API host
    let parsed = Url::parse(url)
        .map_err(|e| anyhow!(FsError::InvalidUrl(format!("{}: {}", url, e))))
        .context("parsing asset URL")?;
    tracing::debug!("Fetching {} from {}", name, parsed.host_str().unwrap_or_default());

    let target = RequestTarget::Url(url);
    let response = client.get(target)?.error_for_status(target)?;
    Ok(response.body)
}
