//! Delivery counters and process figures reported as self gauges.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(target_os = "linux")]
use nix::unistd::{SysconfVar, sysconf};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn record_sent(&self, n: usize) {
        self.sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Resident set size of this process in bytes, 0 when unavailable.
#[cfg(target_os = "linux")]
pub(crate) fn resident_bytes() -> i64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let Some(pages) = statm
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<i64>().ok())
    else {
        return 0;
    };
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(page_size)) if page_size > 0 => pages.saturating_mul(page_size as i64),
        _ => 0,
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn resident_bytes() -> i64 {
    0
}
