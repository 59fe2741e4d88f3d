// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use releasefs::error::describe;
use releasefs::utils::format_size;
use releasefs::{FsError, FsFile, Options, ReleaseFileSystem, ROOT};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file looked up when `--config` is not given.
const CONFIG_FILE: &str = "config.json";

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// General error
    pub const ERROR: u8 = 1;
    /// Usage error - no release given
    pub const USAGE: u8 = 64;
    /// The requested file does not exist
    pub const NO_INPUT: u8 = 66;
    /// I/O error - network or file operation failed
    pub const IO_ERR: u8 = 74;
}

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn finish_success(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("\x1b[32m[OK]\x1b[0m {}", message);
    }

    pub fn finish_warning(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("\x1b[33m[!]\x1b[0m {}", message);
    }
}

#[derive(Parser)]
#[command(name = "releasefs")]
#[command(version = VERSION)]
#[command(about = "Browse and cache GitHub release assets like files.")]
#[command(long_about = "releasefs - GitHub releases as a read-only filesystem\n\n\
    List assets:     releasefs <release-url> ls\n\
    Show metadata:   releasefs <release-url> stat about.txt\n\
    Print a file:    releasefs <release-url> cat about.txt\n\
    Cache locally:   releasefs <release-url> --cache-path ./cache cache\n\
    Work offline:    releasefs --from-cache ./cache cat about.txt")]
struct Cli {
    /// Release page, e.g. https://github.com/acme/demo/releases/tag/v1.0.0
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,

    /// JSON config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve files from a previously cached release, without the API
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "url")]
    from_cache: Option<PathBuf>,

    /// Cache the release when it is loaded
    #[arg(long, global = true)]
    cache: bool,

    /// Cache directory (a temporary one is used otherwise)
    #[arg(long, global = true, value_name = "DIR")]
    cache_path: Option<PathBuf>,

    /// Assets transferred at once while caching
    #[arg(long, global = true, value_name = "N")]
    parallel: Option<usize>,

    /// Largest asset to cache, in bytes (0 = no limit)
    #[arg(long, global = true, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Only cache assets with this extension (repeatable)
    #[arg(long = "ext", global = true, value_name = "EXT")]
    extensions: Vec<String>,

    /// Verbose mode (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the release and its assets
    #[command(alias = "walk")]
    Ls,

    /// Show metadata of an asset, or of the release for "."
    Stat {
        /// Asset name
        name: String,
    },

    /// Write an asset to stdout
    Cat {
        /// Asset name
        name: String,
    },

    /// Copy the release into the cache directory
    Cache,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("releasefs v{} starting", VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", describe(&e));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut rfs = open_filesystem(&cli)?;

    match cli.command {
        Commands::Ls => list(&rfs),
        Commands::Stat { name } => stat(&rfs, &name),
        Commands::Cat { name } => cat(&mut rfs, &name),
        Commands::Cache => cache(&mut rfs),
    }
}

/// Build the filesystem and load its release.
fn open_filesystem(cli: &Cli) -> Result<ReleaseFileSystem> {
    if let Some(dir) = &cli.from_cache {
        return ReleaseFileSystem::from_cache(dir)
            .with_context(|| format!("opening cached release in {:?}", dir));
    }

    let mut options = resolve_options(cli)?;
    if options.organization.is_empty() || options.repository.is_empty() {
        return Err(anyhow::anyhow!(FsError::InvalidUrl(
            "no release given, pass a release URL or set organization and repository in the config"
                .to_string()
        )));
    }
    // The cache command caches after loading, behind its own spinner
    if matches!(cli.command, Commands::Cache) {
        options.cache = false;
    }

    let cache_on_load = options.cache;
    let mut rfs = ReleaseFileSystem::new(options)?;
    if cache_on_load {
        let spinner = spinner::create("Loading and caching release...");
        let result = rfs.load_release();
        spinner.finish_and_clear();
        result?;
    } else {
        rfs.load_release()?;
    }
    Ok(rfs)
}

/// Merge the config file with the command line, command line last.
fn resolve_options(cli: &Cli) -> Result<Options> {
    let base = match &cli.config {
        Some(path) => Options::load(path)?,
        None => match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Using config file {:?}", path);
                Options::load(&path)?
            }
            _ => Options::default(),
        },
    };

    let mut builder = base.into_builder();
    if let Some(url) = &cli.url {
        builder = builder.release_url(url);
    }
    if cli.cache {
        builder = builder.cache(true);
    }
    if let Some(dir) = &cli.cache_path {
        builder = builder.cache_path(dir);
    }
    if let Some(parallel) = cli.parallel {
        builder = builder.parallel_downloads(parallel);
    }
    if let Some(max) = cli.max_size {
        builder = builder.cache_max_size(max);
    }
    if !cli.extensions.is_empty() {
        builder = builder.cache_extensions(cli.extensions.iter().cloned());
    }
    builder.build()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("releasefs").join(CONFIG_FILE))
}

fn list(rfs: &ReleaseFileSystem) -> Result<()> {
    let release = rfs.stat(ROOT)?;
    println!(
        "{} {}",
        release.name().bold(),
        format!("({})", release.modified().format("%Y-%m-%d")).dimmed()
    );

    for (path, entry) in rfs.walk().into_iter().skip(1) {
        let info = entry.info();
        let cached = rfs
            .release()
            .asset(&path)
            .and_then(|asset| asset.cache_path())
            .is_some();
        let marker = if cached { "cached".green() } else { "remote".dimmed() };
        println!(
            "  {:<40} {:>10}  {}",
            path,
            format_size(info.size()),
            marker
        );
    }
    Ok(())
}

fn stat(rfs: &ReleaseFileSystem, name: &str) -> Result<()> {
    let info = rfs.stat(name)?;
    println!("{}", info.name().bold());
    println!("  {:<10} {}", "Type:", if info.is_dir() { "directory" } else { "file" });
    println!("  {:<10} {} ({} bytes)", "Size:", format_size(info.size()), info.size());
    println!("  {:<10} {:o}", "Mode:", info.mode());
    println!("  {:<10} {}", "Created:", info.created().to_rfc3339());
    println!("  {:<10} {}", "Modified:", info.modified().to_rfc3339());
    Ok(())
}

fn cat(rfs: &mut ReleaseFileSystem, name: &str) -> Result<()> {
    let mut file = rfs.open(name)?;
    let mut stdout = io::stdout().lock();
    let copied = io::copy(&mut file, &mut stdout).with_context(|| format!("reading {}", name));
    file.close()?;
    copied?;
    stdout.flush()?;
    Ok(())
}

fn cache(rfs: &mut ReleaseFileSystem) -> Result<()> {
    let spinner = spinner::create(&format!(
        "Caching {} assets...",
        rfs.release().assets().len()
    ));
    let report = match rfs.cache_release() {
        Ok(report) => report,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    let summary = format!(
        "Cached {} of {} assets into {}",
        report.cached.len(),
        report.total(),
        report.dir.display()
    );
    if report.skipped.is_empty() {
        spinner::finish_success(&spinner, &summary);
    } else {
        spinner::finish_warning(&spinner, &summary);
        for (name, reason) in &report.skipped {
            println!("  {} {} ({})", "skipped".yellow(), name, reason);
        }
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.chain().find_map(|cause| cause.downcast_ref::<FsError>()) {
        Some(FsError::InvalidUrl(_)) => exit_codes::USAGE,
        Some(FsError::NotFound(_)) => exit_codes::NO_INPUT,
        Some(FsError::Transport(_))
        | Some(FsError::HttpStatus { .. })
        | Some(FsError::CacheIncomplete(_)) => exit_codes::IO_ERR,
        _ => exit_codes::ERROR,
    }
}
