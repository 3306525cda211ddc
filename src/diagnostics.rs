// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Opt-in instrumentation and the native allocation counters.
//!
//! All toggles default to off. A disabled toggle costs a single relaxed
//! atomic load at each instrumentation point.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Instant,
};
use tracing::{debug, trace};

static PERF_TIMING: AtomicBool = AtomicBool::new(false);
static ALLOCATION_TRACKING: AtomicBool = AtomicBool::new(false);
static LOG_DECODE: AtomicBool = AtomicBool::new(false);

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);
static TOTAL: AtomicU64 = AtomicU64::new(0);

pub const ENV_PERF: &str = "WUFFS_IMAGEIO_PERF";
pub const ENV_TRACK_ALLOCATIONS: &str = "WUFFS_IMAGEIO_TRACK_ALLOCATIONS";
pub const ENV_LOG_DECODE: &str = "WUFFS_IMAGEIO_LOG_DECODE";

/// Set of diagnostic toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Log the duration of each decode phase at `debug` level.
    pub perf_timing: bool,
    /// Emit a `trace` event per native allocation and track the peak.
    pub allocation_tracking: bool,
    /// Log one `info` line per successful decode.
    pub log_decode: bool,
}

impl Diagnostics {
    pub fn from_env() -> Self {
        Self {
            perf_timing: env_flag(ENV_PERF),
            allocation_tracking: env_flag(ENV_TRACK_ALLOCATIONS),
            log_decode: env_flag(ENV_LOG_DECODE),
        }
    }

    /// The toggles currently in effect.
    pub fn current() -> Self {
        Self {
            perf_timing: perf_timing_enabled(),
            allocation_tracking: allocation_tracking_enabled(),
            log_decode: log_decode_enabled(),
        }
    }

    /// Installs these toggles process-wide.
    pub fn apply(self) {
        PERF_TIMING.store(self.perf_timing, Ordering::Relaxed);
        ALLOCATION_TRACKING.store(self.allocation_tracking, Ordering::Relaxed);
        LOG_DECODE.store(self.log_decode, Ordering::Relaxed);
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[inline]
pub fn perf_timing_enabled() -> bool {
    PERF_TIMING.load(Ordering::Relaxed)
}

#[inline]
pub fn allocation_tracking_enabled() -> bool {
    ALLOCATION_TRACKING.load(Ordering::Relaxed)
}

#[inline]
pub fn log_decode_enabled() -> bool {
    LOG_DECODE.load(Ordering::Relaxed)
}

/// Native buffers allocated and not yet freed.
pub fn outstanding_native_allocations() -> usize {
    OUTSTANDING.load(Ordering::SeqCst)
}

/// Native buffers allocated since process start.
pub fn total_native_allocations() -> u64 {
    TOTAL.load(Ordering::SeqCst)
}

/// Highest outstanding count observed while tracking was enabled.
pub fn peak_native_allocations() -> usize {
    PEAK.load(Ordering::SeqCst)
}

pub(crate) fn record_alloc(handle: u64, len: usize) {
    let now = OUTSTANDING.fetch_add(1, Ordering::SeqCst) + 1;
    TOTAL.fetch_add(1, Ordering::Relaxed);
    if allocation_tracking_enabled() {
        PEAK.fetch_max(now, Ordering::SeqCst);
        trace!(handle, len, outstanding = now, "native alloc");
    }
}

pub(crate) fn record_free(handle: u64, len: usize) {
    let now = OUTSTANDING.fetch_sub(1, Ordering::SeqCst) - 1;
    if allocation_tracking_enabled() {
        trace!(handle, len, outstanding = now, "native free");
    }
}

/// Phase timer that only reads the clock when perf timing is on.
pub(crate) struct PhaseTimer {
    start: Option<Instant>,
}

impl PhaseTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: perf_timing_enabled().then(Instant::now),
        }
    }

    /// Logs the time since the last lap under `phase` and restarts.
    pub(crate) fn lap(&mut self, handle: u64, phase: &'static str) {
        if let Some(start) = self.start {
            let now = Instant::now();
            debug!(handle, phase, elapsed_us = (now - start).as_micros() as u64, "decode phase");
            self.start = Some(now);
        }
    }
}
