// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local caching of release assets.
//!
//! `cache_release` writes the release manifest and then copies every asset
//! the [`CachePolicy`] admits into the cache directory:
//!
//! ```text
//! ┌──────────────┐  permit   ┌──────────────────┐
//! │ admission    │──────────▶│ blocking worker  │──▶ cache_dir/<asset>
//! │ (semaphore)  │◀──────────│ fetch + copy     │
//! └──────┬───────┘  release  └──────────────────┘
//!        │ join every transfer
//!        ▼
//!   CacheReport / FsError::CacheIncomplete
//! ```
//!
//! At most `parallel_downloads` transfers run at once. The call returns only
//! after every admitted transfer has finished.

pub mod policy;

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::Semaphore;

use crate::client::ApiClient;
use crate::error::FsError;
use crate::fs::{fetch_asset, FsFile, ReleaseFileSystem, StreamState};
use crate::options::Options;
use crate::release::{is_flat_name, ReleaseState};

pub(crate) use policy::is_reserved_name;
pub use policy::{CachePolicy, SkipReason};

/// Manifest file written into the cache directory.
pub const MANIFEST_FILE: &str = ".release.json";

/// Outcome of a successful [`cache_release`](ReleaseFileSystem::cache_release).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
    /// Directory the release was cached into
    pub dir: PathBuf,
    /// Assets now present in the cache
    pub cached: Vec<String>,
    /// Assets left out by the policy
    pub skipped: Vec<(String, SkipReason)>,
}

impl CacheReport {
    /// Number of assets this report accounts for.
    pub fn total(&self) -> usize {
        self.cached.len() + self.skipped.len()
    }
}

/// One asset to copy into the cache.
struct Transfer {
    index: usize,
    name: String,
    url: String,
    /// Declared size; a copy of any other length is discarded
    size: u64,
    /// Stream that was already open on the asset, possibly partly read
    source: Option<Box<dyn Read + Send>>,
    dest: PathBuf,
}

impl Transfer {
    fn run(mut self, client: &dyn ApiClient) -> Result<PathBuf> {
        if let Some(stream) = self.source.take() {
            match self.copy_from(stream) {
                Ok(()) => return Ok(self.dest),
                Err(e) => {
                    tracing::debug!("Open stream of {} unusable ({:#}), fetching it again", self.name, e)
                }
            }
        }

        let stream = fetch_asset(client, &self.name, &self.url)
            .with_context(|| format!("requesting {} from API", self.name))?;
        self.copy_from(stream)?;
        Ok(self.dest)
    }

    /// Copy `source` into the destination file. The file is removed again
    /// unless exactly `size` bytes were written.
    fn copy_from(&self, mut source: Box<dyn Read + Send>) -> Result<()> {
        let copied = File::create(&self.dest)
            .with_context(|| format!("creating cache file {:?}", self.dest))
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                let bytes = io::copy(&mut source, &mut writer)?;
                writer.flush()?;
                if bytes != self.size {
                    return Err(anyhow!(
                        "received {} bytes of {}, expected {}",
                        bytes,
                        self.name,
                        self.size
                    ));
                }
                Ok(bytes)
            });

        match copied {
            Ok(bytes) => {
                tracing::debug!("Cached {} ({} bytes)", self.name, bytes);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&self.dest);
                Err(e.context(format!("writing {} to cache", self.name)))
            }
        }
    }
}

/// Result of one transfer, joined back on the caller's thread.
struct TransferOutcome {
    index: usize,
    name: String,
    result: Result<PathBuf>,
}

impl ReleaseFileSystem {
    /// Copy the release into the cache directory.
    ///
    /// Without a configured cache path a temporary directory is created and
    /// kept for the lifetime of this filesystem. Afterwards `open` prefers
    /// the cache. If any asset fails the error is
    /// [`FsError::CacheIncomplete`]; assets that were written stay cached.
    ///
    /// Blocks the calling thread; do not call it from async code.
    pub fn cache_release(&mut self) -> Result<CacheReport> {
        let dir = self.resolve_cache_dir()?;
        write_manifest(&dir, &self.release)?;

        let policy = CachePolicy::from_options(&self.options);
        let mut report = CacheReport {
            dir: dir.clone(),
            ..CacheReport::default()
        };

        // Only the indexed asset of each name owns its cache file
        let indexed: Vec<bool> = self
            .release
            .assets()
            .iter()
            .enumerate()
            .map(|(i, asset)| self.release.position(asset.name()) == Some(i))
            .collect();

        let mut transfers = Vec::new();
        for (index, asset) in self.release.assets_mut().iter_mut().enumerate() {
            let name = asset.name().to_string();
            let skip = policy
                .check(&name, asset.size())
                .or_else(|| (!indexed[index]).then_some(SkipReason::Duplicate));
            if let Some(reason) = skip {
                tracing::debug!("Not caching {}: {}", name, reason);
                report.skipped.push((name, reason));
                continue;
            }

            let dest = dir.join(&name);
            // Open from this very cache file, nothing to copy
            if matches!(asset.state(), StreamState::CacheAttached(_))
                && asset.cache_path() == Some(dest.as_path())
            {
                let _ = asset.close();
                report.cached.push(name);
                continue;
            }

            transfers.push(Transfer {
                index,
                url: asset.url().to_string(),
                size: asset.size(),
                source: asset.detach(),
                name,
                dest,
            });
        }

        let parallel = self.options.parallel_downloads.clamp(1, transfers.len().max(1));
        tracing::info!(
            "Caching {} of {} assets into {:?} ({} at a time)",
            transfers.len(),
            self.release.assets().len(),
            dir,
            parallel
        );

        let outcomes = run_transfers(Arc::clone(&self.client), transfers, parallel)?;

        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(path) => {
                    let asset = self.release.asset_at_mut(outcome.index);
                    asset.set_cache_path(path);
                    report.cached.push(outcome.name);
                }
                Err(e) => {
                    tracing::warn!("Failed to cache {}: {:#}", outcome.name, e);
                    failures.push((outcome.name, e));
                }
            }
        }

        self.options.cache = true;

        if !failures.is_empty() {
            return Err(anyhow!(FsError::CacheIncomplete(failures)));
        }
        tracing::info!(
            "Cached {} assets, skipped {}",
            report.cached.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Load a release from a cache directory written by
    /// [`cache_release`](Self::cache_release), without network access.
    ///
    /// Assets missing from the directory are still listed and are fetched
    /// remotely when opened.
    pub fn load_cached_release(&mut self) -> Result<()> {
        let dir = self.options.cache_path.clone().ok_or_else(|| {
            anyhow!(FsError::CacheUnavailable("release cache path not set".to_string()))
        })?;

        let manifest = dir.join(MANIFEST_FILE);
        let file = File::open(&manifest)
            .with_context(|| format!("opening release manifest {:?}", manifest))?;
        let mut release = ReleaseState::from_reader(io::BufReader::new(file))
            .with_context(|| format!("reading release manifest {:?}", manifest))?;

        let mut present = 0;
        for asset in release.assets_mut() {
            let name = asset.name();
            if !is_flat_name(name) || is_reserved_name(name) {
                continue;
            }
            let path = dir.join(name);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() && meta.len() == asset.size() => {
                    asset.set_cache_path(path);
                    present += 1;
                }
                Ok(meta) if meta.is_file() => {
                    tracing::warn!(
                        "Ignoring cached {}: {} bytes, expected {}",
                        name,
                        meta.len(),
                        asset.size()
                    );
                }
                _ => {}
            }
        }

        tracing::info!(
            "Loaded cached release {} from {:?} ({} of {} assets present)",
            release.tag,
            dir,
            present,
            release.assets().len()
        );
        self.release = release;
        self.options.cache = true;
        Ok(())
    }

    /// Open a cache directory as a filesystem. Uncached assets are fetched
    /// from their download URLs.
    pub fn from_cache(dir: impl Into<PathBuf>) -> Result<Self> {
        let options = Options::builder().cache(true).cache_path(dir).build()?;
        let mut rfs = Self::new(options)?;
        rfs.load_cached_release()?;
        Ok(rfs)
    }

    fn resolve_cache_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.options.cache_path {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating cache directory {:?}", dir))?;
            return Ok(dir.clone());
        }

        let dir = tempfile::Builder::new()
            .prefix("releasefs-")
            .tempdir()
            .context("creating temporary cache directory")?
            .keep();
        tracing::info!("Caching release in temporary directory {:?}", dir);
        self.options.cache_path = Some(dir.clone());
        Ok(dir)
    }
}

fn write_manifest(dir: &Path, release: &ReleaseState) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let file = File::create(&path).with_context(|| format!("creating manifest {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, release)
        .with_context(|| format!("writing manifest {:?}", path))?;
    writer.flush().with_context(|| format!("writing manifest {:?}", path))?;
    Ok(path)
}

/// Run transfers on the blocking pool, `parallel` at a time, and join them all.
fn run_transfers(
    client: Arc<dyn ApiClient>,
    transfers: Vec<Transfer>,
    parallel: usize,
) -> Result<Vec<TransferOutcome>> {
    if transfers.is_empty() {
        return Ok(Vec::new());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("starting cache workers")?;

    let outcomes = runtime.block_on(async move {
        let permits = Arc::new(Semaphore::new(
            parallel.clamp(1, transfers.len().min(Semaphore::MAX_PERMITS)),
        ));
        let mut outcomes = Vec::with_capacity(transfers.len());
        let mut running = Vec::with_capacity(transfers.len());

        for transfer in transfers {
            let index = transfer.index;
            let name = transfer.name.clone();

            // Wait for a free slot before starting the next transfer
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes.push(TransferOutcome {
                        index,
                        name,
                        result: Err(anyhow!("cache workers stopped: {}", e)),
                    });
                    continue;
                }
            };

            let client = Arc::clone(&client);
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                transfer.run(client.as_ref())
            });
            running.push((index, name, handle));
        }

        for (index, name, handle) in running {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("transfer of {} did not complete: {}", name, e)),
            };
            outcomes.push(TransferOutcome { index, name, result });
        }

        outcomes
    });

    Ok(outcomes)
}
