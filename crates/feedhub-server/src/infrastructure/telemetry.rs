//! Process CPU and memory sampling for the health report.
//!
//! [`ProcFsMetrics`] reads Linux procfs:
//!
//! - `/proc/self/stat`: user + system CPU ticks, turned into a percentage of
//!   one core over the time since the previous sample.
//! - `/proc/self/status`: the `VmRSS` line (resident set size).
//!
//! Like most CPU meters, the first sample has no baseline and reports 0 %.

use std::fs;
use std::time::Instant;

use thiserror::Error;

/// Kernel clock ticks per second (`USER_HZ`), fixed at 100 on Linux.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("process metrics unavailable: {0}")]
    Unavailable(String),
    #[error("could not parse {source_name}: {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessMetrics {
    /// CPU use since the previous sample, in percent of one core.
    pub cpu_percent: f64,
    /// Resident memory in MiB.
    pub rss_mb: f64,
}

/// Supplies current-process CPU and memory figures on demand.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsProvider: Send {
    fn sample(&mut self) -> Result<ProcessMetrics, MetricsError>;
}

#[derive(Debug, Default)]
pub struct ProcFsMetrics {
    previous: Option<(Instant, u64)>,
}

impl ProcFsMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsProvider for ProcFsMetrics {
    fn sample(&mut self) -> Result<ProcessMetrics, MetricsError> {
        let stat = read_proc("/proc/self/stat")?;
        let status = read_proc("/proc/self/status")?;

        let now = Instant::now();
        let ticks = parse_cpu_ticks(&stat)?;
        let rss_kb = parse_rss_kb(&status)?;

        let cpu_percent = match self.previous {
            Some((then, prev_ticks)) => {
                let wall = now.duration_since(then).as_secs_f64();
                let cpu = ticks.saturating_sub(prev_ticks) as f64 / CLOCK_TICKS_PER_SEC;
                if wall > 0.0 {
                    cpu / wall * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.previous = Some((now, ticks));

        Ok(ProcessMetrics {
            cpu_percent,
            rss_mb: rss_kb as f64 / 1024.0,
        })
    }
}

fn read_proc(path: &'static str) -> Result<String, MetricsError> {
    fs::read_to_string(path).map_err(|e| MetricsError::Unavailable(format!("{path}: {e}")))
}

/// Sums `utime` and `stime` (fields 14 and 15) of a `/proc/<pid>/stat` line.
///
/// The command name in field 2 may contain spaces, so fields are counted from
/// the closing parenthesis.
fn parse_cpu_ticks(stat: &str) -> Result<u64, MetricsError> {
    let parse_error = |detail: &str| MetricsError::Parse {
        source_name: "/proc/self/stat",
        detail: detail.to_string(),
    };

    let rest = stat
        .rfind(')')
        .map(|i| &stat[i + 1..])
        .ok_or_else(|| parse_error("missing command name"))?;
    // `rest` starts at field 3, so utime (14) is index 11.
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |index: usize| -> Result<u64, MetricsError> {
        fields
            .get(index)
            .ok_or_else(|| parse_error("too few fields"))?
            .parse::<u64>()
            .map_err(|e| parse_error(&e.to_string()))
    };
    Ok(field(11)? + field(12)?)
}

/// Extracts the `VmRSS` value in kB from `/proc/<pid>/status`.
fn parse_rss_kb(status: &str) -> Result<u64, MetricsError> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
        .ok_or_else(|| MetricsError::Parse {
            source_name: "/proc/self/status",
            detail: "no VmRSS line".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (feedhub server) S 1 4242 4242 0 -1 4194560 2000 0 0 0 \
                        150 50 0 0 20 0 12 0 100 123456789 3000 18446744073709551615";

    #[test]
    fn test_parse_cpu_ticks_sums_user_and_system() {
        assert_eq!(parse_cpu_ticks(STAT), Ok(200));
    }

    #[test]
    fn test_parse_cpu_ticks_rejects_truncated_line() {
        assert!(matches!(
            parse_cpu_ticks("1 (x) S 1 2"),
            Err(MetricsError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_rss_kb() {
        let status = "Name:\tfeedhub\nVmPeak:\t  90000 kB\nVmRSS:\t   51200 kB\nThreads:\t9\n";
        assert_eq!(parse_rss_kb(status), Ok(51200));
        assert!(parse_rss_kb("Name:\tx\n").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_procfs_sample_reports_memory() {
        let mut metrics = ProcFsMetrics::new();

        let first = metrics.sample().unwrap();
        let second = metrics.sample().unwrap();

        assert_eq!(first.cpu_percent, 0.0);
        assert!(second.cpu_percent >= 0.0);
        assert!(second.rss_mb > 0.0);
    }
}
