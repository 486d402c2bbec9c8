//! Application configuration from CLI flags and environment.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use pagebump_memory::DEFAULT_POISON_LOOKAHEAD;

use crate::errors::ConfigError;

/// pagebump: page-backed bump arenas.
#[derive(Parser, Debug)]
#[command(name = "pagebump", version, about)]
pub struct AppConfig {
    /// Usable arena size (e.g. "4096", "64K", "2M").
    #[arg(
        short = 's',
        long,
        default_value = "64K",
        env = "PAGEBUMP_ARENA_SIZE",
        global = true
    )]
    pub arena_size: String,

    /// Where arena memory comes from.
    #[arg(long, value_enum, default_value_t = Backing::Mmap, global = true)]
    pub backing: Backing,

    /// What to do when an arena runs out of space.
    #[arg(long, value_enum, default_value_t = ExhaustionPolicy::Abort, global = true)]
    pub on_exhausted: ExhaustionPolicy,

    /// Bytes re-poisoned past each allocation when poisoning is enabled.
    #[arg(long, default_value_t = DEFAULT_POISON_LOOKAHEAD, global = true)]
    pub poison_lookahead: usize,

    /// Generate shell completion.
    #[arg(long, value_enum)]
    pub completion: Option<clap_complete::Shell>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split text into words, storing everything in an arena.
    Split(SplitArgs),
    /// Show page size and the footprint of an arena of the configured size.
    Info(InfoArgs),
}

/// Arguments for `split`.
#[derive(Args, Debug, Default)]
pub struct SplitArgs {
    /// Text to split. Standard input is used when neither TEXT nor --file is given.
    pub text: Option<String>,

    /// Files to split, each in its own arena.
    #[arg(short, long = "file", conflicts_with = "text")]
    pub files: Vec<PathBuf>,

    /// Characters that separate words.
    #[arg(long, default_value = " \t\r\n", env = "PAGEBUMP_SEPARATORS")]
    pub separators: String,

    /// Emit JSON instead of one word per line.
    #[arg(long)]
    pub json: bool,

    /// Print arena statistics after the words.
    #[arg(long)]
    pub stats: bool,

    /// Track poisoning in a shadow map and verify every word is accessible.
    #[arg(long)]
    pub check_poison: bool,
}

/// Arguments for `info`.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    /// Emit JSON.
    #[arg(long)]
    pub json: bool,
}

/// Backing memory for arenas.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Anonymous private mapping.
    Mmap,
    /// Page-aligned block from the global allocator.
    Heap,
}

impl Backing {
    /// Lowercase name, as accepted on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mmap => "mmap",
            Self::Heap => "heap",
        }
    }
}

/// Response to arena exhaustion.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Print a diagnostic and abort the process.
    Abort,
    /// Fail the operation with an error.
    Report,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Usable arena size in bytes.
    pub fn arena_capacity(&self) -> Result<usize, ConfigError> {
        parse_size(&self.arena_size)
    }
}

/// Parse a size string such as "4096", "64K", "2M" or "1G".
pub fn parse_size(s: &str) -> Result<usize, ConfigError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidSize {
            input: s.to_string(),
            reason: "empty".to_string(),
        });
    }

    let (num_str, multiplier) = if let Some(n) = trimmed.strip_suffix(['G', 'g']) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = trimmed.strip_suffix(['M', 'm']) {
        (n, 1024 * 1024)
    } else if let Some(n) = trimmed.strip_suffix(['K', 'k']) {
        (n, 1024)
    } else if let Some(n) = trimmed.strip_suffix('B') {
        (n, 1)
    } else {
        (trimmed, 1)
    };

    let value: usize = num_str
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidSize {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::InvalidSize {
            input: s.to_string(),
            reason: "too large".to_string(),
        })
}
