//! Standard process metrics, read from procfs at scrape time.
//!
//! Each collector is registered only when its source exists under the
//! configured proc root, so on hosts without procfs only
//! `process_start_time_seconds` is exported.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use scrapeline_core::{CollectError, Collected, LabelSet, LazyCollector, Registry, Result};

use crate::config::ProcessSection;

const MALFORMED_STAT: &str = "MalformedStat";
const MALFORMED_LIMITS: &str = "MalformedLimits";

/// Where to read a process's statistics from, and how to scale them.
#[derive(Debug, Clone)]
pub struct ProcSource {
    dir: PathBuf,
    ticks_per_second: f64,
    page_size: f64,
}

impl ProcSource {
    pub fn new(proc_root: impl AsRef<Path>, pid: u32, ticks_per_second: u64, page_size: u64) -> Self {
        Self {
            dir: proc_root.as_ref().join(pid.to_string()),
            ticks_per_second: ticks_per_second as f64,
            page_size: page_size as f64,
        }
    }

    /// Source for the current process.
    pub fn from_config(cfg: &ProcessSection) -> Self {
        Self::new(
            &cfg.proc_root,
            std::process::id(),
            cfg.clock_ticks_per_second,
            cfg.page_size_bytes,
        )
    }

    fn stat_file(&self) -> PathBuf {
        self.dir.join("stat")
    }
    fn fd_dir(&self) -> PathBuf {
        self.dir.join("fd")
    }
    fn limits_file(&self) -> PathBuf {
        self.dir.join("limits")
    }
}

/// Fields of `/proc/<pid>/stat` that the collectors export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub vsize_bytes: u64,
    pub rss_pages: u64,
}

/// Parse a stat line.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_stat(line: &str) -> std::result::Result<ProcStat, CollectError> {
    let rest = line
        .rfind(')')
        .map(|i| &line[i + 1..])
        .ok_or_else(|| CollectError::with_class(MALFORMED_STAT, "no command name"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    let field = |idx: usize, what: &str| -> std::result::Result<u64, CollectError> {
        fields
            .get(idx)
            .ok_or_else(|| CollectError::with_class(MALFORMED_STAT, format!("missing {what}")))?
            .parse::<u64>()
            .map_err(|e| CollectError::with_class(MALFORMED_STAT, format!("{what}: {e}")))
    };

    // Offsets are relative to the state field, which follows the command.
    Ok(ProcStat {
        utime_ticks: field(11, "utime")?,
        stime_ticks: field(12, "stime")?,
        vsize_bytes: field(20, "vsize")?,
        rss_pages: field(21, "rss")?,
    })
}

/// Soft limit of the named row of a limits file. `unlimited` is +Inf.
pub fn parse_soft_limit(limits: &str, name: &str) -> std::result::Result<f64, CollectError> {
    let row = limits
        .lines()
        .find_map(|l| l.strip_prefix(name))
        .ok_or_else(|| CollectError::with_class(MALFORMED_LIMITS, format!("no {name:?} row")))?;

    match row.split_whitespace().next() {
        Some("unlimited") => Ok(f64::INFINITY),
        Some(v) => v
            .parse::<u64>()
            .map(|v| v as f64)
            .map_err(|e| CollectError::with_class(MALFORMED_LIMITS, format!("{name}: {e}"))),
        None => Err(CollectError::with_class(MALFORMED_LIMITS, format!("{name}: empty row"))),
    }
}

fn read_stat(path: &Path) -> std::result::Result<ProcStat, CollectError> {
    parse_stat(&fs::read_to_string(path)?)
}

fn single(value: f64) -> Collected {
    Collected::from([(LabelSet::new(), value)])
}

/// Register process metrics for the current process, if enabled.
pub fn register(registry: &Registry, cfg: &ProcessSection) -> Result<()> {
    if !cfg.enabled {
        tracing::debug!("process metrics disabled");
        return Ok(());
    }
    register_source(registry, &ProcSource::from_config(cfg))
}

pub fn register_source(registry: &Registry, source: &ProcSource) -> Result<()> {
    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    registry
        .gauge(
            "process_start_time_seconds",
            "Start time of the process since unix epoch in seconds",
            &[],
        )?
        .set(&LabelSet::new(), started)?;

    let stat_file = source.stat_file();
    if stat_file.exists() {
        let path = stat_file.clone();
        let hz = source.ticks_per_second;
        LazyCollector::builder("process_cpu_seconds_total", "Total user and system CPU time spent in seconds")
            .labels(&["mode"])
            .register(registry, move |_| {
                let stat = read_stat(&path)?;
                Ok(Collected::from([
                    (LabelSet::from([("mode", "user")]), stat.utime_ticks as f64 / hz),
                    (LabelSet::from([("mode", "system")]), stat.stime_ticks as f64 / hz),
                ]))
            })?;

        let path = stat_file.clone();
        LazyCollector::builder("process_virtual_memory_bytes", "Virtual memory size in bytes")
            .register(registry, move |_| Ok(single(read_stat(&path)?.vsize_bytes as f64)))?;

        let path = stat_file;
        let page_size = source.page_size;
        LazyCollector::builder("process_resident_memory_bytes", "Resident memory size in bytes")
            .register(registry, move |_| {
                Ok(single(read_stat(&path)?.rss_pages as f64 * page_size))
            })?;
    } else {
        tracing::debug!(path = %stat_file.display(), "no stat file, skipping cpu and memory metrics");
    }

    let fd_dir = source.fd_dir();
    if fd_dir.is_dir() {
        LazyCollector::builder("process_open_fds", "Number of open file descriptors")
            .register(registry, move |_| {
                let open = fs::read_dir(&fd_dir)?.count();
                Ok(single(open as f64))
            })?;
    }

    let limits_file = source.limits_file();
    if limits_file.exists() {
        let path = limits_file.clone();
        LazyCollector::builder("process_max_fds", "Maximum number of open file descriptors")
            .register(registry, move |_| {
                Ok(single(parse_soft_limit(&fs::read_to_string(&path)?, "Max open files")?))
            })?;

        let path = limits_file;
        LazyCollector::builder(
            "process_virtual_memory_max_bytes",
            "Maximum amount of virtual memory available in bytes",
        )
        .register(registry, move |_| {
            Ok(single(parse_soft_limit(&fs::read_to_string(&path)?, "Max address space")?))
        })?;
    }

    tracing::info!(dir = %source.dir.display(), "process metrics registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "12345 (worker) R 0 0 0 0 0 0 0 0 0 0 42 314159 0 0 0 0 0 0 0 1048576 44";

    #[test]
    fn parses_stat_fields() {
        let stat = parse_stat(STAT).unwrap();
        assert_eq!(stat.utime_ticks, 42);
        assert_eq!(stat.stime_ticks, 314159);
        assert_eq!(stat.vsize_bytes, 1048576);
        assert_eq!(stat.rss_pages, 44);
    }

    #[test]
    fn command_names_may_contain_parens_and_spaces() {
        let line = STAT.replace("(worker)", "(we ird) (name)");
        assert_eq!(parse_stat(&line).unwrap().stime_ticks, 314159);
    }

    #[test]
    fn truncated_stat_is_malformed() {
        let err = parse_stat("1 (x) R 0 0").unwrap_err();
        assert_eq!(err.class(), MALFORMED_STAT);
    }

    #[test]
    fn soft_limits() {
        let limits = "\
Limit                     Soft Limit           Hard Limit           Units
Max open files            1536                 1000000              files
Max address space         unlimited            unlimited            bytes
";
        assert_eq!(parse_soft_limit(limits, "Max open files").unwrap(), 1536.0);
        assert_eq!(parse_soft_limit(limits, "Max address space").unwrap(), f64::INFINITY);
        assert_eq!(
            parse_soft_limit(limits, "Max processes").unwrap_err().class(),
            MALFORMED_LIMITS
        );
    }
}
