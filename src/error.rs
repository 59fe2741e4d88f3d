// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for releasefs.
//!
//! Fallible operations return [`anyhow::Result`]. Conditions a caller may want
//! to branch on are raised as [`FsError`] and can be recovered from any
//! `anyhow::Error` with `downcast_ref`, even after `.context(..)` was added.
//!
//! The module also carries the formatting helpers the CLI uses to print
//! failures with possible causes and suggested fixes.

use std::fmt;

/// Errors raised by the release filesystem.
#[derive(Debug)]
pub enum FsError {
    /// The release URL could not be parsed or does not point to a release.
    InvalidUrl(String),
    /// The API host cannot be turned into a base URL.
    InvalidHost(String),
    /// A request could not be sent or its response could not be read.
    Transport(String),
    /// The server answered with a status outside 200..=399.
    HttpStatus { status: u16, target: String },
    /// The release metadata or manifest is malformed.
    Decode(String),
    /// No asset with this name exists in the release.
    NotFound(String),
    /// The asset carries no download URL.
    MissingUrl(String),
    /// Read on an asset that has no attached stream.
    NoStream(String),
    /// Cache mode is on but no cache directory can be resolved.
    CacheUnavailable(String),
    /// Some assets failed to cache. Each entry is `(asset name, error)`.
    CacheIncomplete(Vec<(String, anyhow::Error)>),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "invalid release URL: {}", msg),
            Self::InvalidHost(host) => write!(f, "invalid API host: {}", host),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::HttpStatus { status, target } => {
                write!(f, "HTTP {} from {}", status, target)
            }
            Self::Decode(msg) => write!(f, "decoding release data: {}", msg),
            Self::NotFound(name) => write!(f, "file does not exist: {}", name),
            Self::MissingUrl(name) => write!(f, "no url found in asset data: {}", name),
            Self::NoStream(name) => write!(f, "file is not open: {}", name),
            Self::CacheUnavailable(msg) => write!(f, "release cache unavailable: {}", msg),
            Self::CacheIncomplete(failures) => {
                write!(f, "{} asset(s) failed to cache:", failures.len())?;
                for (name, err) in failures {
                    write!(f, " {} ({:#});", name, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FsError {}

/// Returns true if `err` (or anything it wraps) is [`FsError::NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<FsError>(), Some(FsError::NotFound(_))))
}

/// Formats an error message with title, causes and fixes.
///
/// ```
/// use releasefs::error::format_error;
///
/// let msg = format_error(
///     "Failed to load release",
///     &["Tag does not exist"],
///     &["List releases on the repository page"],
/// );
/// assert!(msg.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n", title);

    if !causes.is_empty() {
        output.push_str("\nPossible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
    }

    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}

/// Render an error for the terminal, with hints picked from its [`FsError`].
pub fn describe(err: &anyhow::Error) -> String {
    let title = format!("{:#}", err);
    let fs_err = err.chain().find_map(|cause| cause.downcast_ref::<FsError>());

    match fs_err {
        Some(FsError::InvalidUrl(_)) => format_error(
            &title,
            &["The URL is not a release page"],
            &["Use a URL like https://github.com/<org>/<repo>/releases/tag/<tag>"],
        ),
        Some(FsError::HttpStatus { status: 401 | 403, .. }) => format_error(
            &title,
            &["The repository is private", "The API rate limit was exceeded"],
            &["Export a token: export GITHUB_TOKEN=..."],
        ),
        Some(FsError::HttpStatus { status: 404, .. }) => format_error(
            &title,
            &["The tag does not exist", "The repository name is misspelled"],
            &["Check the release page in a browser"],
        ),
        Some(FsError::NotFound(_)) => format_error(
            &title,
            &["The release has no asset with that name"],
            &["List the release contents: releasefs <url> ls"],
        ),
        Some(FsError::Transport(_)) => format_error(
            &title,
            &["No network connection", "The host is unreachable"],
            &["Retry once the network is available", "Work offline with --from-cache <dir>"],
        ),
        _ => format_error(&title, &[], &[]),
    }
}
