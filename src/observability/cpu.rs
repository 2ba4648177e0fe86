//! Process CPU self-monitoring.
//!
//! Samples this process's CPU time at a fixed interval, logs the usage as a
//! percentage of one core and prints a summary when the process shuts down.
//! The numbers are for out-of-band measurement only.

use std::fs;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;

const PROC_SELF_STAT: &str = "/proc/self/stat";

/// Kernel clock ticks per second used by `/proc/<pid>/stat`.
///
/// Assumes USER_HZ = 100, which holds on mainstream Linux builds.
const CLOCK_TICKS_PER_SEC: u64 = 100;

/// Source of cumulative process CPU time.
pub trait CpuTimeReader: Send + 'static {
    fn cpu_time(&self) -> Option<Duration>;
}

/// Reads user + system time from procfs.
pub struct ProcfsReader;

impl CpuTimeReader for ProcfsReader {
    fn cpu_time(&self) -> Option<Duration> {
        let contents = fs::read_to_string(PROC_SELF_STAT).ok()?;
        parse_proc_stat(&contents)
    }
}

/// Extract `utime + stime` from a `/proc/<pid>/stat` line.
pub fn parse_proc_stat(contents: &str) -> Option<Duration> {
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &contents[contents.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is the state (field 3); utime and stime are fields 14 and 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let ticks = utime + stime;
    Some(Duration::from_millis(ticks * 1000 / CLOCK_TICKS_PER_SEC))
}

/// Running totals over the monitored period.
#[derive(Debug, Clone, Default)]
pub struct CpuSummary {
    pub records: usize,
    pub total_cpu: Duration,
    pub total_elapsed: Duration,
    pub peak_percent: f64,
    pub min_percent: f64,
}

impl CpuSummary {
    /// Add one interval and return its usage percentage.
    pub fn record(&mut self, cpu: Duration, elapsed: Duration) -> f64 {
        let percent = if elapsed.is_zero() {
            0.0
        } else {
            cpu.as_secs_f64() / elapsed.as_secs_f64() * 100.0
        };

        if self.records == 0 {
            self.peak_percent = percent;
            self.min_percent = percent;
        } else {
            self.peak_percent = self.peak_percent.max(percent);
            self.min_percent = self.min_percent.min(percent);
        }
        self.records += 1;
        self.total_cpu += cpu;
        self.total_elapsed += elapsed;
        percent
    }

    pub fn average_percent(&self) -> f64 {
        if self.total_elapsed.is_zero() {
            0.0
        } else {
            self.total_cpu.as_secs_f64() / self.total_elapsed.as_secs_f64() * 100.0
        }
    }
}

pub struct CpuMonitor<R = ProcfsReader> {
    service: String,
    interval: Duration,
    reader: R,
}

impl CpuMonitor<ProcfsReader> {
    pub fn new(service: impl Into<String>, interval: Duration) -> Self {
        Self::with_reader(service, interval, ProcfsReader)
    }
}

impl<R: CpuTimeReader> CpuMonitor<R> {
    pub fn with_reader(service: impl Into<String>, interval: Duration, reader: R) -> Self {
        Self {
            service: service.into(),
            interval,
            reader,
        }
    }

    /// Sample until shutdown, then log and return the summary.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> CpuSummary {
        let mut summary = CpuSummary::default();
        let Some(mut last_cpu) = self.reader.cpu_time() else {
            tracing::info!(service = %self.service, "Process CPU time unavailable, monitor idle");
            return summary;
        };
        let mut last_at = Instant::now();

        tracing::info!(service = %self.service, "Starting CPU monitoring");
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let stopping = tokio::select! {
                _ = ticker.tick() => false,
                _ = shutdown.recv() => true,
            };

            if let Some(cpu) = self.reader.cpu_time() {
                let now = Instant::now();
                let elapsed = now.duration_since(last_at);
                let percent = summary.record(cpu.saturating_sub(last_cpu), elapsed);
                last_cpu = cpu;
                last_at = now;

                if !stopping {
                    tracing::info!(
                        service = %self.service,
                        cpu_percent = format_args!("{percent:.2}"),
                        interval_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
                        "CPU usage"
                    );
                    metrics::record_cpu_usage(&self.service, percent);
                }
            }

            if stopping {
                break;
            }
        }

        tracing::info!(
            service = %self.service,
            total_running_secs = format_args!("{:.2}", summary.total_elapsed.as_secs_f64()),
            average_cpu_percent = format_args!("{:.2}", summary.average_percent()),
            peak_cpu_percent = format_args!("{:.2}", summary.peak_percent),
            min_cpu_percent = format_args!("{:.2}", summary.min_percent),
            records = summary.records,
            "CPU monitoring summary"
        );
        summary
    }
}
