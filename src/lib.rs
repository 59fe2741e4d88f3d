// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! releasefs - GitHub releases as a read-only filesystem
//!
//! A release is one directory; its assets are the files in it. Contents
//! are fetched on demand and can optionally be cached on local disk:
//!
//! **Open stream** -> **Local cache** -> **Remote download**
//!
//! # Core Modules
//!
//! - [`fs`] - The filesystem: open, stat, read_dir and the file types
//! - [`cache`] - Bulk caching of a release with bounded parallelism
//! - [`options`] - Configuration and release URL parsing
//! - [`client`] - The API client seam and its HTTP implementation
//! - [`release`] - Release metadata and the asset index
//! - [`error`] - Error types and consistent error formatting
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use releasefs::{Options, ReleaseFileSystem};
//!
//! # fn main() -> anyhow::Result<()> {
//! let options = Options::builder()
//!     .release_url("https://github.com/acme/demo/releases/tag/v1.0.0")
//!     .cache(true)
//!     .cache_max_size(1024 * 1024)
//!     .build()?;
//!
//! let mut rfs = ReleaseFileSystem::new(options)?;
//! rfs.load_release()?;
//!
//! let about = rfs.read_file("about.txt")?;
//! println!("{}", String::from_utf8_lossy(&about));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod fs;
pub mod options;
pub mod release;
pub mod utils;

pub use cache::{CachePolicy, CacheReport, SkipReason, MANIFEST_FILE};
pub use client::{ApiClient, ApiResponse, HttpClient, RequestTarget};
pub use error::{is_not_found, FsError};
pub use fs::{
    AssetFile, DirEntry, FileInfo, FsFile, OpenFile, ReleaseDir, ReleaseFileSystem, StreamState,
    ROOT,
};
pub use options::{Options, OptionsBuilder};
pub use release::ReleaseState;
