//! Human-readable rendering of results.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::fleet::FleetObserver;
use crate::schema::{BenchmarkResult, CpuInfo, FleetReport, FleetSample, FrequencySample};

/// Timelines longer than this are thinned when printed.
pub const MAX_TIMELINE_ROWS: usize = 50;

/// Samples to print: all of them up to [`MAX_TIMELINE_ROWS`], otherwise
/// every `len / MAX_TIMELINE_ROWS`-th one plus the last.
pub fn timeline_rows(samples: &[FrequencySample]) -> Vec<&FrequencySample> {
    if samples.len() <= MAX_TIMELINE_ROWS {
        return samples.iter().collect();
    }
    let step = samples.len() / MAX_TIMELINE_ROWS;
    let mut rows: Vec<&FrequencySample> = samples.iter().step_by(step).collect();
    if let Some(last) = samples.last() {
        if rows.last().map(|r| std::ptr::eq(*r, last)) != Some(true) {
            rows.push(last);
        }
    }
    rows
}

pub fn write_result<W: Write>(w: &mut W, result: &BenchmarkResult) -> io::Result<()> {
    if !result.supported {
        writeln!(
            w,
            "The CPU does not support {} instructions. Skipped core {}.",
            result.workload, result.core_id
        )?;
        return Ok(());
    }
    let Some(stats) = result.stats else {
        writeln!(w, "No frequency measurements were taken on core {}!", result.core_id)?;
        return Ok(());
    };

    writeln!(w, "\nBenchmark Results:")?;
    writeln!(w, "  Instruction Set: {}", result.workload)?;
    writeln!(w, "  Core: {}", result.core_id)?;
    writeln!(w, "  Duration: {:.1} seconds", result.duration_ms as f64 / 1000.0)?;
    writeln!(w, "  Frequency Statistics:")?;
    writeln!(w, "    Minimum: {:.1} MHz", stats.min_mhz)?;
    writeln!(w, "    Maximum: {:.1} MHz", stats.max_mhz)?;
    writeln!(w, "    Average: {:.1} MHz", stats.avg_mhz)?;
    writeln!(w, "    Samples: {}", result.sample_count())?;

    writeln!(w, "\n  Frequency Timeline:")?;
    for s in timeline_rows(&result.samples) {
        writeln!(w, "    {}ms: {:.1} MHz", s.offset_ms, s.frequency_mhz)?;
    }
    Ok(())
}

/// One summary line per core; failures appear as "not available" rows.
pub fn summary_line(result: &BenchmarkResult) -> String {
    match result.stats {
        Some(s) => format!(
            "{:>5}  {:>9.1}  {:>9.1}  {:>9.1}  {:>7}",
            result.core_id,
            s.min_mhz,
            s.max_mhz,
            s.avg_mhz,
            result.sample_count()
        ),
        None if !result.supported => format!(
            "{:>5}  {:>31}  {:>7}",
            result.core_id, "not available (unsupported)", 0
        ),
        None => format!(
            "{:>5}  {:>31}  {:>7}",
            result.core_id, "not available (no samples)", 0
        ),
    }
}

pub fn write_fleet<W: Write>(w: &mut W, report: &FleetReport) -> io::Result<()> {
    writeln!(w, "\nFleet Results:")?;
    writeln!(w, "  Instruction Set: {}", report.workload)?;
    writeln!(w, "  Mode: {}", report.mode.as_str())?;
    writeln!(w, "  Duration per core: {:.1} seconds", report.duration_ms as f64 / 1000.0)?;
    writeln!(w, "  Wall time: {:.1} seconds", report.wall_time_ms as f64 / 1000.0)?;
    writeln!(w)?;
    writeln!(
        w,
        "{:>5}  {:>9}  {:>9}  {:>9}  {:>7}",
        "core", "min MHz", "max MHz", "avg MHz", "samples"
    )?;
    for result in report.results.values() {
        writeln!(w, "{}", summary_line(result))?;
    }

    let ok: Vec<&BenchmarkResult> = report.successful().collect();
    if !ok.is_empty() {
        let mean = ok.iter().filter_map(|r| r.avg_freq()).sum::<f64>() / ok.len() as f64;
        writeln!(w, "\n  {} of {} cores reported, mean of averages {:.1} MHz", ok.len(), report.core_count(), mean)?;
    } else {
        writeln!(w, "\n  0 of {} cores reported", report.core_count())?;
    }

    if let Some(timeline) = &report.fleet_timeline {
        writeln!(w, "\n  Fleet Timeline:")?;
        for row in timeline {
            writeln!(w, "    {}", monitor_line(row))?;
        }
    }
    Ok(())
}

pub fn monitor_line(row: &FleetSample) -> String {
    let per_core: Vec<String> = row.per_core_mhz.iter().map(|f| format!("{f:.0}")).collect();
    format!(
        "{:>7}ms  avg {:>7.1} MHz  [{}]",
        row.offset_ms,
        row.average_mhz,
        per_core.join(" ")
    )
}

pub fn write_cpu_info<W: Write>(w: &mut W, info: &CpuInfo) -> io::Result<()> {
    writeln!(w, "CPU Information:")?;
    writeln!(w, "  Model: {}", info.model)?;
    writeln!(w, "  Cores: {}", info.logical_cores)?;
    writeln!(w, "  Instruction Set Support:")?;
    for f in &info.features {
        let name = format!("{}:", f.name);
        writeln!(w, "    {name:<9}{}", if f.present { "Yes" } else { "No" })?;
    }
    writeln!(w, "  Workloads:")?;
    for (name, ok) in &info.workloads {
        let name = format!("{name}:");
        writeln!(w, "    {name:<12}{}", if *ok { "available" } else { "not available" })?;
    }
    writeln!(w, "  Current frequency of core 0: {:.1} MHz", info.core0_mhz)?;
    Ok(())
}

/// Prints one summary line per finished core. The lock keeps lines from
/// concurrently finishing cores whole.
pub struct LinePrinter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LinePrinter<W> {
    pub fn new(out: W) -> Self {
        LinePrinter {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> FleetObserver for LinePrinter<W> {
    fn core_finished(&self, result: &BenchmarkResult) {
        let line = summary_line(result);
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // Progress is best-effort; the final report is written separately.
        let _ = writeln!(out, "done {line}");
        let _ = out.flush();
    }
}
