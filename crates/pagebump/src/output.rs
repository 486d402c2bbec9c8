//! CLI output formatting.

use std::io::{self, Write};

use console::style;
use serde::Serialize;

use pagebump_memory::ArenaStats;

/// Words split from one input, copied out of the arena that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    /// Where the text came from ("<stdin>", "<arg>", or a path).
    pub source: String,
    /// The words, in order.
    pub words: Vec<String>,
    /// Arena accounting right after splitting.
    pub stats: ArenaStats,
    /// Number of words confirmed accessible by the shadow poisoner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poison_checked: Option<usize>,
}

/// Format a number with thousand separators.
#[must_use]
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a byte count, e.g. `69,632 B (68.0 KiB)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(n: usize) -> String {
    let exact = format!("{} B", format_number(n as u64));
    if n < 1024 {
        exact
    } else if n < 1024 * 1024 {
        format!("{exact} ({:.1} KiB)", n as f64 / 1024.0)
    } else {
        format!("{exact} ({:.1} MiB)", n as f64 / (1024.0 * 1024.0))
    }
}

/// Write one word per line.
pub fn write_words(out: &mut dyn Write, words: &[String]) -> io::Result<()> {
    for word in words {
        writeln!(out, "{word}")?;
    }
    Ok(())
}

/// Write a human-readable stats block.
pub fn write_stats(out: &mut dyn Write, stats: &ArenaStats) -> io::Result<()> {
    writeln!(out, "{}", style("arena").bold())?;
    writeln!(out, "  capacity:    {}", format_bytes(stats.capacity))?;
    writeln!(out, "  used:        {}", format_bytes(stats.used))?;
    writeln!(out, "  remaining:   {}", format_bytes(stats.remaining))?;
    writeln!(out, "  region:      {}", format_bytes(stats.region_size))?;
    writeln!(out, "  utilization: {:.1}%", stats.utilization() * 100.0)?;
    if stats.exhaustions > 0 {
        writeln!(
            out,
            "  exhaustions: {}",
            style(stats.exhaustions).red()
        )?;
    }
    Ok(())
}

/// Write reports as a JSON array.
pub fn write_json(out: &mut dyn Write, reports: &[SplitReport]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, reports)?;
    writeln!(out)
}
