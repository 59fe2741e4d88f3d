// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Which assets are allowed into the cache.

use std::fmt;

use super::MANIFEST_FILE;
use crate::options::Options;
use crate::release::is_flat_name;
use crate::utils::format_size;

/// Why an asset was left out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Larger than the configured maximum
    TooLarge { size: u64, limit: u64 },
    /// Extension not in the allowed set
    ExtensionNotAllowed,
    /// Nameless assets have no file to be written to
    Unnamed,
    /// Name is a path, not a single file name
    UnsafeName,
    /// Name collides with the cache manifest
    Reserved,
    /// An earlier asset has the same name
    Duplicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, limit } => {
                write!(f, "{} exceeds cache limit of {}", format_size(*size), format_size(*limit))
            }
            Self::ExtensionNotAllowed => write!(f, "extension not allowed"),
            Self::Unnamed => write!(f, "asset has no name"),
            Self::UnsafeName => write!(f, "name is not a plain file name"),
            Self::Reserved => write!(f, "name is reserved for the cache manifest"),
            Self::Duplicate => write!(f, "another asset has the same name"),
        }
    }
}

/// Size and extension filter applied before caching an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    max_size: u64,
    /// Lowercase, without leading dot
    extensions: Vec<String>,
}

impl CachePolicy {
    pub fn new<I, S>(max_size: u64, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { max_size, extensions }
    }

    pub fn from_options(options: &Options) -> Self {
        Self::new(options.cache_max_size, &options.cache_extensions)
    }

    /// `None` if the asset may be cached, otherwise why not.
    pub fn check(&self, name: &str, size: u64) -> Option<SkipReason> {
        if name.is_empty() {
            return Some(SkipReason::Unnamed);
        }
        if !is_flat_name(name) {
            return Some(SkipReason::UnsafeName);
        }
        if is_reserved_name(name) {
            return Some(SkipReason::Reserved);
        }
        if self.max_size > 0 && size > self.max_size {
            return Some(SkipReason::TooLarge {
                size,
                limit: self.max_size,
            });
        }
        if !self.allows_extension(name) {
            return Some(SkipReason::ExtensionNotAllowed);
        }
        None
    }

    /// Case-insensitive suffix match, so `tar.gz` works as an extension.
    pub fn allows_extension(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.extensions.iter().any(|ext| {
            name.len() > ext.len() + 1
                && name.ends_with(ext.as_str())
                && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
        })
    }
}

/// Names the cache directory uses for itself. Compared without case, as
/// the cache may live on a case-insensitive filesystem.
pub(crate) fn is_reserved_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(MANIFEST_FILE)
}
