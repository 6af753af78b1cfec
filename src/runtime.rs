//! Process start time and host resource snapshots.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Disks, System};
use tracing::warn;
use utoipa::ToSchema;

const MB: u64 = 1024 * 1024;

/// Memory usage above this percentage reports `WARNING`.
pub const MEMORY_WARNING_PERCENT: u32 = 85;

/// Disk usage above this percentage reports `WARNING`.
pub const DISK_WARNING_PERCENT: u32 = 90;

/// Moment the process started, captured once in `main`.
#[derive(Debug, Clone, Copy)]
pub struct StartedAt {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl StartedAt {
    /// Capture the current moment.
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    /// Wall-clock start time.
    pub fn wall_clock(&self) -> DateTime<Utc> {
        self.wall
    }

    /// Time since start.
    pub fn uptime(&self) -> Duration {
        self.instant.elapsed()
    }

    /// Whole minutes since start.
    pub fn uptime_minutes(&self) -> u64 {
        self.uptime().as_secs() / 60
    }
}

impl Default for StartedAt {
    fn default() -> Self {
        Self::now()
    }
}

/// Point-in-time view of host resources.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub available_processors: usize,
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub free_memory_mb: u64,
    pub memory_usage_percent: u32,
    pub disk_total_mb: u64,
    pub disk_available_mb: u64,
    pub disk_usage_percent: u32,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub hostname: String,
    pub arch: String,
}

/// Percentage (0-100) of `used` over `total`; 0 when `total` is 0.
fn percent(used: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (used as f64 / total as f64) * 100.0;
    pct.clamp(0.0, 100.0).round() as u32
}

impl RuntimeSnapshot {
    /// Read current memory, disk and OS figures.
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let free = sys.available_memory();

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_available) = disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(t, a), d| {
                (t + d.total_space(), a + d.available_space())
            });

        Self {
            available_processors: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            total_memory_mb: total / MB,
            used_memory_mb: used / MB,
            free_memory_mb: free / MB,
            memory_usage_percent: percent(used, total),
            disk_total_mb: disk_total / MB,
            disk_available_mb: disk_available / MB,
            disk_usage_percent: percent(disk_total.saturating_sub(disk_available), disk_total),
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// [`capture`](Self::capture) on the blocking pool. A failed task yields an empty snapshot.
    pub async fn capture_async() -> Self {
        match tokio::task::spawn_blocking(Self::capture).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Host snapshot task failed");
                Self::default()
            }
        }
    }

    /// `UP` or `WARNING` for memory pressure.
    pub fn memory_status(&self) -> &'static str {
        if self.memory_usage_percent < MEMORY_WARNING_PERCENT {
            "UP"
        } else {
            "WARNING"
        }
    }

    /// `UP` or `WARNING` for disk usage. Hosts without visible disks report `UNKNOWN`.
    pub fn disk_status(&self) -> &'static str {
        if self.disk_total_mb == 0 {
            "UNKNOWN"
        } else if self.disk_usage_percent < DISK_WARNING_PERCENT {
            "UP"
        } else {
            "WARNING"
        }
    }
}
