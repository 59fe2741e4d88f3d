// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the release filesystem.
//!
//! [`Options`] is a plain value. It is built with [`OptionsBuilder`], whose
//! methods each return a new builder, or loaded from a JSON config file.
//!
//! ```
//! use releasefs::Options;
//!
//! let opts = Options::builder()
//!     .release_url("https://github.com/acme/demo/releases/tag/v1.0.0")
//!     .cache(true)
//!     .cache_max_size(1024 * 1024)
//!     .build()
//!     .unwrap();
//! assert_eq!(opts.organization, "acme");
//! assert_eq!(opts.repository, "demo");
//! assert_eq!(opts.tag, "v1.0.0");
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// Hostname of the public GitHub REST API.
pub const GITHUB_API_HOST: &str = "api.github.com";

/// Number of assets transferred at once when caching a release.
pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 3;

/// Tag value that selects the most recent release.
pub const LATEST_TAG: &str = "latest";

static RELEASE_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+)/releases/tag/(\S+)")
        .expect("RELEASE_PATH_PATTERN is a valid regex")
});

/// Configuration of a [`ReleaseFileSystem`](crate::ReleaseFileSystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// API host, optionally with a scheme (`http://127.0.0.1:8080`)
    pub host: String,
    pub organization: String,
    pub repository: String,
    /// Release tag. Empty or `"latest"` selects the most recent release.
    pub tag: String,
    /// Serve files from the local cache
    pub cache: bool,
    /// Cache directory. A temporary one is created when caching without it.
    pub cache_path: Option<PathBuf>,
    /// Largest asset that gets cached, in bytes. 0 means no limit.
    pub cache_max_size: u64,
    /// Extensions allowed into the cache. Empty allows every asset.
    pub cache_extensions: BTreeSet<String>,
    pub parallel_downloads: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: GITHUB_API_HOST.to_string(),
            organization: String::new(),
            repository: String::new(),
            tag: String::new(),
            cache: false,
            cache_path: None,
            cache_max_size: 0,
            cache_extensions: BTreeSet::new(),
            parallel_downloads: DEFAULT_PARALLEL_DOWNLOADS,
        }
    }
}

impl Options {
    /// Start a builder from the default options.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Continue adjusting these options with a builder.
    pub fn into_builder(self) -> OptionsBuilder {
        OptionsBuilder {
            options: self,
            error: None,
        }
    }

    /// Options pointing at the release behind `url`, everything else default.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::builder().release_url(url).build()
    }

    /// Load options from a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let options: Options = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(options)
    }

    /// True when the tag selects the most recent release.
    pub fn wants_latest(&self) -> bool {
        self.tag.is_empty() || self.tag == LATEST_TAG
    }

    /// API path of the release metadata.
    pub fn release_path(&self) -> String {
        if self.wants_latest() {
            format!("/repos/{}/{}/releases/latest", self.organization, self.repository)
        } else {
            format!(
                "/repos/{}/{}/releases/tags/{}",
                self.organization, self.repository, self.tag
            )
        }
    }
}

/// Builder for [`Options`]. Later calls override earlier ones touching the same field.
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: Options,
    error: Option<String>,
}

impl OptionsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.options.organization = org.into();
        self
    }

    pub fn repository(mut self, repo: impl Into<String>) -> Self {
        self.options.repository = repo.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tag = tag.into();
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.options.cache = enabled;
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cache_path = Some(path.into());
        self
    }

    pub fn cache_max_size(mut self, bytes: u64) -> Self {
        self.options.cache_max_size = bytes;
        self
    }

    /// Restrict caching to these extensions (`"txt"`, `".json"`, `"tar.gz"`).
    pub fn cache_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.cache_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallel_downloads(mut self, count: usize) -> Self {
        self.options.parallel_downloads = count;
        self
    }

    /// Take organization, repository and tag from a release page URL.
    ///
    /// An invalid URL is reported by [`build`](Self::build).
    pub fn release_url(mut self, url: &str) -> Self {
        match parse_release_url(url) {
            Ok(target) => {
                self.options.organization = target.organization;
                self.options.repository = target.repository;
                self.options.tag = target.tag;
                if let Some(host) = target.api_host {
                    self.options.host = host;
                }
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    /// Finish the options, failing if any adjustment was invalid.
    pub fn build(self) -> Result<Options> {
        match self.error {
            Some(msg) => Err(anyhow!(FsError::InvalidUrl(msg))),
            None => Ok(self.options),
        }
    }
}

/// Coordinates extracted from a release URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReleaseTarget {
    organization: String,
    repository: String,
    tag: String,
    api_host: Option<String>,
}

fn parse_release_url(input: &str) -> std::result::Result<ReleaseTarget, String> {
    let url = Url::parse(input).map_err(|e| format!("{}: {}", input, e))?;

    let captures = RELEASE_PATH_PATTERN
        .captures(url.path())
        .ok_or_else(|| format!("{}: URL does not point to a release", input))?;

    // github.com pages are served by a different API host
    let api_host = match url.host_str() {
        Some("github.com") | Some("www.github.com") => Some(GITHUB_API_HOST.to_string()),
        _ => None,
    };

    Ok(ReleaseTarget {
        organization: captures[1].to_string(),
        repository: captures[2].to_string(),
        tag: captures[3].trim_end_matches('/').to_string(),
        api_host,
    })
}
