//! Application entry point and dispatch.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use pagebump_memory::{
    page_size, Arena, ArenaError, ArenaStats, HeapRegion, MmapRegion, NoPoison, Poisoner, Region,
    ReportExhaustion, Shadow, ShadowPoisoner,
};

use crate::config::{AppConfig, Backing, Command, ExhaustionPolicy, InfoArgs, SplitArgs};
use crate::output::{format_bytes, write_json, write_stats, write_words, SplitReport};
use crate::split::{required_capacity, split_in_arena};
use crate::version::full_version;

/// How every arena in this run is built.
#[derive(Debug, Clone, Copy)]
pub struct ArenaSettings {
    /// Usable bytes per arena.
    pub capacity: usize,
    /// Poison lookahead past each allocation.
    pub lookahead: usize,
    /// Response to exhaustion.
    pub policy: ExhaustionPolicy,
    /// Backing memory.
    pub backing: Backing,
}

impl ArenaSettings {
    /// Settings from parsed CLI flags.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            capacity: config.arena_capacity()?,
            lookahead: config.poison_lookahead,
            policy: config.on_exhausted,
            backing: config.backing,
        })
    }

    /// Reserve one arena with these settings.
    pub fn build<R: Region, P: Poisoner>(&self, poisoner: P) -> Result<Arena<R, P>, ArenaError> {
        let builder = Arena::builder(self.capacity)
            .poison_lookahead(self.lookahead)
            .region::<R>()
            .poisoner(poisoner);
        match self.policy {
            ExhaustionPolicy::Abort => builder.build(),
            ExhaustionPolicy::Report => builder.failure_handler(ReportExhaustion).build(),
        }
    }
}

/// Where `split` reads its text from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Text given on the command line.
    Arg(String),
    /// Standard input.
    Stdin,
    /// A file.
    File(PathBuf),
}

impl Source {
    /// Display name used in reports and errors.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Arg(_) => "<arg>".to_string(),
            Self::Stdin => "<stdin>".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    fn read(&self) -> Result<String> {
        match self {
            Self::Arg(text) => Ok(text.clone()),
            Self::Stdin => {
                let mut text = String::new();
                io::stdin()
                    .read_to_string(&mut text)
                    .context("reading standard input")?;
                Ok(text)
            }
            Self::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display())),
        }
    }
}

/// Run the application.
pub fn run(config: &AppConfig) -> Result<()> {
    // Handle shell completion
    if let Some(shell) = config.completion {
        let mut cmd = <AppConfig as clap::CommandFactory>::command();
        crate::completion::generate_completion(&mut cmd, shell, &mut io::stdout());
        return Ok(());
    }

    let settings = ArenaSettings::from_config(config)?;
    match &config.command {
        Some(Command::Split(args)) => run_split(&settings, args),
        Some(Command::Info(args)) => run_info(&settings, args),
        None => run_info(&settings, &InfoArgs::default()),
    }
}

fn run_split(settings: &ArenaSettings, args: &SplitArgs) -> Result<()> {
    let sources: Vec<Source> = if !args.files.is_empty() {
        args.files.iter().cloned().map(Source::File).collect()
    } else if let Some(text) = &args.text {
        vec![Source::Arg(text.clone())]
    } else {
        vec![Source::Stdin]
    };

    // One arena per source, each on whichever worker picks it up.
    let reports = sources
        .par_iter()
        .map(|source| split_source(settings, source, args))
        .collect::<Result<Vec<_>>>()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        write_json(&mut out, &reports)?;
        return Ok(());
    }
    for report in &reports {
        write_words(&mut out, &report.words)?;
        if args.stats {
            write_stats(&mut out, &report.stats)?;
        }
        if let Some(checked) = report.poison_checked {
            writeln!(out, "poison check: {checked} words accessible")?;
        }
    }
    Ok(())
}

type Outcome = (Vec<String>, ArenaStats, Option<usize>);

/// Split one source in a fresh arena and copy the words out.
pub fn split_source(settings: &ArenaSettings, source: &Source, args: &SplitArgs) -> Result<SplitReport> {
    let text = source.read()?;
    let name = source.name();
    let seps = args.separators.as_str();

    let outcome = match (settings.backing, args.check_poison) {
        (Backing::Mmap, false) => split_plain::<MmapRegion>(settings, &text, seps),
        (Backing::Heap, false) => split_plain::<HeapRegion>(settings, &text, seps),
        (Backing::Mmap, true) => split_checked::<MmapRegion>(settings, &text, seps),
        (Backing::Heap, true) => split_checked::<HeapRegion>(settings, &text, seps),
    };
    let (words, stats, poison_checked) = outcome.with_context(|| {
        format!(
            "splitting {name} (needs about {} of arena)",
            format_bytes(required_capacity(&text, seps))
        )
    })?;

    tracing::debug!(source = %name, words = words.len(), used = stats.used, "split complete");
    Ok(SplitReport {
        source: name,
        words,
        stats,
        poison_checked,
    })
}

fn split_plain<R: Region>(settings: &ArenaSettings, text: &str, seps: &str) -> Result<Outcome> {
    let arena = settings.build::<R, _>(NoPoison)?;
    let words = split_in_arena(text, seps, &arena)?;
    let owned = words.iter().map(|w| (*w).to_string()).collect();
    Ok((owned, arena.stats(), None))
}

fn split_checked<R: Region>(settings: &ArenaSettings, text: &str, seps: &str) -> Result<Outcome> {
    let shadow = ShadowPoisoner::new();
    let arena = settings.build::<R, _>(shadow.clone())?;
    let words = split_in_arena(text, seps, &arena)?;

    let table = (words.as_ptr().cast::<u8>(), std::mem::size_of_val(words));
    if !shadow.range_is(table.0, table.1, Shadow::Unpoisoned) {
        bail!("word table is not marked accessible");
    }
    for word in words {
        if !shadow.range_is(word.as_ptr(), word.len(), Shadow::Unpoisoned) {
            bail!("word {word:?} is not marked accessible");
        }
    }

    let spans: Vec<(usize, usize)> = words
        .iter()
        .map(|w| (w.as_ptr() as usize, w.len()))
        .collect();
    let owned = words.iter().map(|w| (*w).to_string()).collect();
    let stats = arena.stats();
    arena.release();

    for &(addr, len) in &spans {
        if !shadow.range_is(addr as *const u8, len, Shadow::Retired) {
            bail!("released word at {addr:#x} is still marked live");
        }
    }
    Ok((owned, stats, Some(spans.len())))
}

#[derive(Debug, Serialize)]
struct InfoReport {
    version: String,
    page_size: usize,
    backing: &'static str,
    arena: ArenaStats,
}

fn run_info(settings: &ArenaSettings, args: &InfoArgs) -> Result<()> {
    let arena = match settings.backing {
        Backing::Mmap => settings.build::<MmapRegion, _>(NoPoison)?.stats(),
        Backing::Heap => settings.build::<HeapRegion, _>(NoPoison)?.stats(),
    };
    let info = InfoReport {
        version: full_version(),
        page_size: page_size(),
        backing: settings.backing.name(),
        arena,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &info)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "{}", info.version)?;
    writeln!(out, "page size:  {}", format_bytes(info.page_size))?;
    writeln!(out, "backing:    {}", info.backing)?;
    writeln!(out, "capacity:   {}", format_bytes(arena.capacity))?;
    writeln!(out, "region:     {}", format_bytes(arena.region_size))?;
    writeln!(out, "overhead:   {}", format_bytes(arena.overhead()))?;
    Ok(())
}
