//! Process-wide profiler instances.
//!
//! Prefer passing an explicit [`StProfiler`] / [`MtProfiler`] to instrumented
//! code. These exist for call sites where threading one through is not
//! practical. Each is built on first access and lives until the process exits.

use std::sync::{Mutex, OnceLock};

use crate::{Clock, MonotonicClock, MtProfiler, Region, StProfiler};

static ST_PROFILER: OnceLock<Mutex<StProfiler>> = OnceLock::new();
static MT_PROFILER: OnceLock<MtProfiler> = OnceLock::new();
static CLOCK: OnceLock<MonotonicClock> = OnceLock::new();

/// The process-wide single-stream profiler.
///
/// The mutex lets it live in a `static`; lock it per call, and keep all
/// instrumentation on one logical stream or the tree structure is meaningless.
pub fn st_profiler() -> &'static Mutex<StProfiler> {
    ST_PROFILER.get_or_init(|| Mutex::new(StProfiler::new()))
}

pub fn mt_profiler() -> &'static MtProfiler {
    MT_PROFILER.get_or_init(MtProfiler::new)
}

/// Monotonic nanosecond clock shared by the region helpers below.
pub fn process_clock() -> &'static MonotonicClock {
    CLOCK.get_or_init(MonotonicClock::new)
}

pub fn st_region(
    name: &str,
    qualifier: Option<&str>,
) -> Region<'static, Mutex<StProfiler>, MonotonicClock> {
    Region::enter(st_profiler(), process_clock(), name, qualifier)
}

pub fn mt_region(
    name: &str,
    qualifier: Option<&str>,
) -> Region<'static, MtProfiler, MonotonicClock> {
    Region::enter(mt_profiler(), process_clock(), name, qualifier)
}

/// Nanoseconds on the process clock.
pub fn process_now() -> u64 {
    process_clock().now()
}
