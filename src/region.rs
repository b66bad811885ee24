//! RAII region guards.
//!
//! A [`Region`] starts a region when created and finishes it with the measured
//! duration when dropped, so early returns and unwinding still close it.

use std::sync::Mutex;

use crate::{Clock, MtProfiler, StProfiler};

/// Anything a region guard can report to.
pub trait Instrument {
    fn event_started(&self, region: &str, qualifier: Option<&str>);
    fn event_finished(&self, elapsed: u64);
}

impl Instrument for MtProfiler {
    fn event_started(&self, region: &str, qualifier: Option<&str>) {
        MtProfiler::event_started(self, region, qualifier);
    }

    fn event_finished(&self, elapsed: u64) {
        MtProfiler::event_finished(self, elapsed);
    }
}

// The lock is held per call only, never across the region.
impl Instrument for Mutex<StProfiler> {
    fn event_started(&self, region: &str, qualifier: Option<&str>) {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .event_started(region, qualifier);
    }

    fn event_finished(&self, elapsed: u64) {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .event_finished(elapsed);
    }
}

#[must_use = "dropping the region immediately records ~0; bind it with `let _region = ...`"]
pub struct Region<'a, P: Instrument + ?Sized, C: Clock + ?Sized> {
    profiler: &'a P,
    clock: &'a C,
    start: u64,
}

impl<'a, P: Instrument + ?Sized, C: Clock + ?Sized> Region<'a, P, C> {
    pub fn enter(profiler: &'a P, clock: &'a C, name: &str, qualifier: Option<&str>) -> Self {
        profiler.event_started(name, qualifier);
        Self {
            profiler,
            clock,
            start: clock.now(),
        }
    }
}

impl<P: Instrument + ?Sized, C: Clock + ?Sized> Drop for Region<'_, P, C> {
    fn drop(&mut self) {
        let elapsed = self.clock.now().saturating_sub(self.start);
        self.profiler.event_finished(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[test]
    fn region_charges_clock_delta() {
        let profiler = Mutex::new(StProfiler::new());
        let clock = ManualClock::new(100);
        {
            let _outer = Region::enter(&profiler, &clock, "outer", None);
            clock.advance(3);
            {
                let _inner = Region::enter(&profiler, &clock, "inner", Some("q"));
                clock.advance(4);
            }
            clock.advance(1);
        }
        let p = profiler.lock().expect("lock");
        assert!(p.tree().is_at_root());
        assert_eq!(p.tree().find(&["outer"]).map(|n| n.time()), Some(8));
        assert_eq!(p.tree().find(&["outer", "inner - q"]).map(|n| n.time()), Some(4));
    }

    #[test]
    fn early_return_still_finishes() {
        fn work(p: &MtProfiler, clock: &ManualClock, bail: bool) -> Option<u32> {
            let _region = Region::enter(p, clock, "work", None);
            clock.advance(2);
            if bail {
                return None;
            }
            clock.advance(5);
            Some(1)
        }

        let p = MtProfiler::new();
        let clock = ManualClock::new(0);
        assert_eq!(work(&p, &clock, true), None);
        assert_eq!(work(&p, &clock, false), Some(1));
        let node = p
            .with_current_tree(|t| t.find(&["work"]).map(|n| (n.count(), n.time())))
            .flatten();
        assert_eq!(node, Some((2, 9)));
        assert_eq!(p.with_current_tree(|t| t.is_at_root()), Some(true));
    }

    #[test]
    fn unwinding_still_finishes() {
        let p = MtProfiler::new();
        let clock = ManualClock::new(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _region = Region::enter(&p, &clock, "boom", None);
            clock.advance(6);
            panic!("region body failed");
        }));
        assert!(result.is_err());
        let node = p
            .with_current_tree(|t| t.find(&["boom"]).map(|n| (n.count(), n.time())))
            .flatten();
        assert_eq!(node, Some((1, 6)));
    }
}
