//! CPU feature detection, affinity, core count, and frequency reads.
//!
//! `Platform` is the seam between the orchestration core and the machine.
//! `LinuxPlatform` backs it with procfs/sysfs and `sched_setaffinity`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::kernels;
use crate::schema::{CpuInfo, FeatureFlag};
use crate::WorkloadKind;

pub trait Platform: Sync {
    fn cpu_supports(&self, kind: WorkloadKind) -> bool;

    /// Bind the calling thread to `core_id`. An error here is fatal to the run.
    fn pin_current_thread_to(&self, core_id: usize) -> Result<()>;

    fn logical_core_count(&self) -> usize;

    /// Current frequency of `core_id` in MHz, 0.0 when it cannot be read.
    fn sample_frequency_mhz(&self, core_id: usize) -> f64;

    /// Burn `iterations` primitive operations of `kind` on the current thread.
    fn run_workload(&self, kind: WorkloadKind, iterations: u64);
}

/// Flags shown by `info`, in display order.
const LISTED_FLAGS: [(&str, &str); 6] = [
    ("SSE", "sse"),
    ("SSE2", "sse2"),
    ("AVX", "avx"),
    ("AVX2", "avx2"),
    ("AVX512F", "avx512f"),
    ("AMX", "amx_tile"),
];

#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    proc_root: PathBuf,
    sysfs_cpu_root: PathBuf,
    flags: HashSet<String>,
    core_count: usize,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys/devices/system/cpu")
    }

    /// Read procfs/sysfs from alternate roots.
    pub fn with_roots(proc_root: impl Into<PathBuf>, sysfs_cpu_root: impl Into<PathBuf>) -> Self {
        let proc_root = proc_root.into();
        let sysfs_cpu_root = sysfs_cpu_root.into();

        let flags = match fs::read_to_string(proc_root.join("cpuinfo")) {
            Ok(text) => parse_flags(&text),
            Err(e) => {
                debug!("cannot read cpuinfo under {}: {e}", proc_root.display());
                HashSet::new()
            }
        };

        // Online CPUs, not the affinity mask or cgroup quota of this process.
        let core_count = online_cpus()
            .or_else(|e| {
                debug!("sysconf online cpus failed: {e}, counting sysfs entries");
                count_sysfs_cpus(&sysfs_cpu_root)
            })
            .unwrap_or(1)
            .max(1);

        LinuxPlatform {
            proc_root,
            sysfs_cpu_root,
            flags,
            core_count,
        }
    }

    pub fn with_core_count(mut self, core_count: usize) -> Self {
        self.core_count = core_count.max(1);
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn model_name(&self) -> String {
        fs::read_to_string(self.proc_root.join("cpuinfo"))
            .ok()
            .and_then(|text| {
                text.lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split_once(':'))
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn cpu_info(&self) -> CpuInfo {
        let mut features: Vec<FeatureFlag> = LISTED_FLAGS
            .iter()
            .map(|(name, flag)| FeatureFlag {
                name: name.to_string(),
                present: self.has_flag(flag),
            })
            .collect();
        if let Some(amx) = features.iter_mut().find(|f| f.name == "AMX") {
            amx.present = self.has_amx();
        }

        let workloads: BTreeMap<String, bool> = WorkloadKind::ALL
            .iter()
            .map(|k| (k.display_name().to_string(), self.cpu_supports(*k)))
            .collect();

        CpuInfo {
            model: self.model_name(),
            logical_cores: self.core_count,
            features,
            workloads,
            core0_mhz: self.sample_frequency_mhz(0),
        }
    }

    fn has_amx(&self) -> bool {
        self.has_flag("amx_tile") || self.has_flag("amx_bf16")
    }

    fn cpuinfo_mhz(&self, core_id: usize) -> Option<f64> {
        let text = fs::read_to_string(self.proc_root.join("cpuinfo")).ok()?;
        parse_cpuinfo_mhz(&text, core_id)
    }

    fn sysfs_mhz(&self, core_id: usize) -> Option<f64> {
        let path = self
            .sysfs_cpu_root
            .join(format!("cpu{core_id}"))
            .join("cpufreq")
            .join("scaling_cur_freq");
        let khz: f64 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
        Some(khz / 1000.0)
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LinuxPlatform {
    fn cpu_supports(&self, kind: WorkloadKind) -> bool {
        match kind {
            // The 128-bit kernel falls back to SSE when AVX is absent.
            WorkloadKind::Avx128 => self.has_flag("sse2"),
            WorkloadKind::Avx256 => self.has_flag("avx2"),
            WorkloadKind::Avx512 => self.has_flag("avx512f"),
            WorkloadKind::Amx => self.has_amx(),
            WorkloadKind::BasicAdd => true,
        }
    }

    fn pin_current_thread_to(&self, core_id: usize) -> Result<()> {
        pin_to_cpu(core_id).map_err(|source| Error::Affinity { core_id, source })?;
        debug!("pinned to core {core_id}");
        Ok(())
    }

    fn logical_core_count(&self) -> usize {
        self.core_count
    }

    fn sample_frequency_mhz(&self, core_id: usize) -> f64 {
        let mhz = self
            .cpuinfo_mhz(core_id)
            .filter(|mhz| *mhz > 0.0)
            .or_else(|| self.sysfs_mhz(core_id))
            .unwrap_or(0.0);
        trace!("core {core_id}: {mhz:.1} MHz");
        mhz
    }

    fn run_workload(&self, kind: WorkloadKind, iterations: u64) {
        kernels::run(kind, iterations);
    }
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) -> io::Result<()> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }
    // SAFETY: cpu_set_t is plain data; CPU_SET is bounds-checked above.
    let ret = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(_cpu: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread affinity requires Linux",
    ))
}

#[cfg(target_os = "linux")]
fn online_cpus() -> io::Result<usize> {
    // SAFETY: sysconf has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(not(target_os = "linux"))]
fn online_cpus() -> io::Result<usize> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "online cpu count requires Linux"))
}

fn count_sysfs_cpus(root: &Path) -> io::Result<usize> {
    let count = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix("cpu")
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        })
        .count();
    if count == 0 {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no cpu entries"));
    }
    Ok(count)
}

/// Whitespace-separated tokens of the first `flags` line.
fn parse_flags(cpuinfo: &str) -> HashSet<String> {
    cpuinfo
        .lines()
        .find(|l| l.starts_with("flags"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_cpuinfo_mhz(cpuinfo: &str, core_id: usize) -> Option<f64> {
    let mut current: Option<usize> = None;
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => current = value.trim().parse().ok(),
            "cpu MHz" if current == Some(core_id) => return value.trim().parse().ok(),
            _ => {}
        }
    }
    None
}
