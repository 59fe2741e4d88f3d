// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Release metadata as returned by the releases API.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::fs::AssetFile;

/// A loaded release: identity, timestamps and its ordered assets.
///
/// Assets are addressed by name through an index that is rebuilt every time
/// the asset list is replaced. Assets without a name stay in the list but
/// cannot be opened.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReleaseState {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "tag_name", default)]
    pub tag: String,
    #[serde(default)]
    pub draft: bool,
    /// Drafts have no publish date
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<AssetFile>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ReleaseState {
    /// Build a release from its parts.
    pub fn new(id: i64, tag: impl Into<String>, assets: Vec<AssetFile>) -> Self {
        let mut release = Self {
            id,
            tag: tag.into(),
            ..Self::default()
        };
        release.set_assets(assets);
        release
    }

    /// Decode release JSON and index its assets.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut release: ReleaseState = serde_json::from_reader(reader)
            .map_err(|e| anyhow!(FsError::Decode(e.to_string())))?;
        release.reindex();
        Ok(release)
    }

    pub fn assets(&self) -> &[AssetFile] {
        &self.assets
    }

    pub(crate) fn assets_mut(&mut self) -> &mut [AssetFile] {
        &mut self.assets
    }

    /// Replace the asset list and rebuild the name index.
    pub fn set_assets(&mut self, assets: Vec<AssetFile>) {
        self.assets = assets;
        self.reindex();
    }

    /// Position of the asset called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn asset(&self, name: &str) -> Option<&AssetFile> {
        self.position(name).map(|i| &self.assets[i])
    }

    pub(crate) fn asset_at_mut(&mut self, index: usize) -> &mut AssetFile {
        &mut self.assets[index]
    }

    /// Index every usable name. The first asset with a name wins; later
    /// duplicates and names that are not flat stay listed but unindexed.
    fn reindex(&mut self) {
        let mut index = HashMap::with_capacity(self.assets.len());
        for (i, asset) in self.assets.iter().enumerate() {
            let name = asset.name();
            if name.is_empty() {
                continue;
            }
            if !is_flat_name(name) {
                tracing::warn!("Ignoring asset with unusable name {:?}", name);
                continue;
            }
            if index.contains_key(name) {
                tracing::warn!("Ignoring duplicate asset {:?} (id {})", name, asset.id);
                continue;
            }
            index.insert(name.to_string(), i);
        }
        self.index = index;
    }
}

/// True if `name` is a single plain path component: not empty, not `.` or
/// `..`, no separators and no drive or root prefix.
pub fn is_flat_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains(['/', '\\']) || name.contains('\0') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}
