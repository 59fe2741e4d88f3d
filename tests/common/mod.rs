// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures: an in-memory release API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;

use releasefs::{ApiClient, ApiResponse, FsError, Options, ReleaseFileSystem, RequestTarget};

pub const RELEASE_URL: &str = "https://github.com/acme/demo/releases/tag/v1.0.0";
pub const RELEASE_PATH: &str = "/repos/acme/demo/releases/tags/v1.0.0";
pub const LATEST_PATH: &str = "/repos/acme/demo/releases/latest";

pub const MIB: u64 = 1024 * 1024;

/// Download URL of a demo asset.
pub fn asset_url(name: &str) -> String {
    format!("https://github.com/acme/demo/releases/download/v1.0.0/{}", name)
}

/// Release metadata JSON for `(name, declared size)` assets.
pub fn release_json(tag: &str, assets: &[(&str, u64)]) -> Vec<u8> {
    let assets: Vec<_> = assets
        .iter()
        .map(|(name, size)| (*name, *size, asset_url(name)))
        .collect();
    release_json_with_urls(tag, &assets)
}

/// Release metadata JSON for `(name, declared size, download URL)` assets.
pub fn release_json_with_urls(tag: &str, assets: &[(&str, u64, String)]) -> Vec<u8> {
    let assets: Vec<_> = assets
        .iter()
        .enumerate()
        .map(|(i, (name, size, url))| {
            json!({
                "id": i + 1,
                "name": name,
                "size": size,
                "browser_download_url": url,
                "created_at": "2025-01-02T03:04:05Z",
                "updated_at": "2025-01-02T03:04:05Z",
            })
        })
        .collect();

    serde_json::to_vec(&json!({
        "id": 42,
        "url": "https://api.github.com/repos/acme/demo/releases/42",
        "tag_name": tag,
        "draft": false,
        "created_at": "2025-01-02T03:04:05Z",
        "published_at": "2025-01-03T00:00:00Z",
        "assets": assets,
    }))
    .unwrap()
}

enum Route {
    Respond { status: u16, body: Vec<u8> },
    Unreachable,
}

/// Release API double. Records every request and how many asset bodies are
/// open at once.
#[derive(Default)]
pub struct MockApi {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    /// Delay before the first byte of every body
    latency: Mutex<Duration>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The acme/demo release: `a.txt` (5 bytes) and `b.bin` (10 MiB).
    pub fn demo() -> Arc<Self> {
        let api = Self::new();
        api.respond(
            RELEASE_PATH,
            200,
            release_json("v1.0.0", &[("a.txt", 5), ("b.bin", 10 * MIB)]),
        );
        api.respond(&asset_url("a.txt"), 200, b"hello".to_vec());
        api.respond(&asset_url("b.bin"), 200, vec![0xAB; (10 * MIB) as usize]);
        api
    }

    pub fn respond(&self, route: &str, status: u16, body: Vec<u8>) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), Route::Respond { status, body });
    }

    /// Requests to `route` fail before any response.
    pub fn unreachable(&self, route: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), Route::Unreachable);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == route).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Most asset bodies that were open at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ApiClient for MockApi {
    fn get(&self, target: RequestTarget<'_>) -> Result<ApiResponse> {
        let key = target.to_string();
        self.calls.lock().unwrap().push(key.clone());

        let routes = self.routes.lock().unwrap();
        let (status, body) = match routes.get(&key) {
            Some(Route::Respond { status, body }) => (*status, body.clone()),
            Some(Route::Unreachable) => {
                return Err(anyhow!(FsError::Transport(format!("connection refused: {}", key))))
            }
            None => (404, b"{\"message\":\"Not Found\"}".to_vec()),
        };
        drop(routes);

        if matches!(target, RequestTarget::Path(_)) {
            return Ok(ApiResponse::new(status, Cursor::new(body)));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(ApiResponse::new(
            status,
            TrackedBody {
                inner: Cursor::new(body),
                in_flight: Arc::clone(&self.in_flight),
                latency: Some(*self.latency.lock().unwrap()),
            },
        ))
    }
}

/// Asset body that counts as in flight until dropped.
struct TrackedBody {
    inner: Cursor<Vec<u8>>,
    in_flight: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl Read for TrackedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(latency) = self.latency.take() {
            thread::sleep(latency);
        }
        self.inner.read(buf)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Filesystem over `api` for the demo release.
pub fn demo_fs(api: &Arc<MockApi>, options: Options) -> ReleaseFileSystem {
    ReleaseFileSystem::with_client(options, Arc::clone(api) as Arc<dyn ApiClient>)
}

pub fn demo_options() -> Options {
    Options::from_url(RELEASE_URL).unwrap()
}
