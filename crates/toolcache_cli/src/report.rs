//! Operator commands: `stats`, `clear`, and `sweep`.

use std::fmt::Write as _;

use toolcache_cache::stats::CacheStats;
use toolcache_config::ToolCacheConfig;

use crate::context::open_cache;
use crate::{GlobalArgs, ReportFormat};

/// Prints a snapshot of the cache contents to stdout.
pub fn stats(
    config: &ToolCacheConfig,
    global: &GlobalArgs,
    format: ReportFormat,
) -> Result<i32, Box<dyn std::error::Error>> {
    let stats = open_cache(global, config).stats();
    match format {
        ReportFormat::Text => print!("{}", render_text(&stats)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(0)
}

/// Removes every entry.
pub fn clear(
    config: &ToolCacheConfig,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = open_cache(global, config);
    let removed = cache.clear();
    if !global.quiet {
        eprintln!(
            "     Cleared {} from {}",
            plural(removed as u64, "entry", "entries"),
            cache.store().dir().display()
        );
    }
    Ok(0)
}

/// Evicts expired entries, either a random batch or all of them.
pub fn sweep(
    config: &ToolCacheConfig,
    global: &GlobalArgs,
    all: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = open_cache(global, config);
    let evicted = if all {
        cache.evict_expired()
    } else {
        cache.sweep_now()
    };
    if !global.quiet {
        eprintln!(
            "     Evicted {} expired {}",
            evicted,
            if evicted == 1 { "entry" } else { "entries" }
        );
    }
    Ok(0)
}

/// Renders a stats snapshot for a terminal.
pub fn render_text(stats: &CacheStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cache: {}", stats.location);
    let _ = writeln!(
        out,
        "  {} ({})",
        plural(stats.total_entries, "entry", "entries"),
        format_bytes(stats.total_bytes)
    );
    if stats.expired_entries > 0 {
        let _ = writeln!(
            out,
            "  {} expired, awaiting sweep",
            plural(stats.expired_entries, "entry", "entries")
        );
    }
    let width = stats.per_tool.keys().map(String::len).max().unwrap_or(0);
    for (tool, figures) in &stats.per_tool {
        let _ = writeln!(
            out,
            "    {tool:<width$}  {:>6}  {}",
            figures.count,
            format_bytes(figures.bytes)
        );
    }
    out
}

/// Formats a byte count with a binary unit, one decimal above bytes.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn plural(n: u64, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}
