//! Multi-threaded profiler: one private call tree per thread.
//!
//! The registry lock covers membership (lookup, insert, clear) and full
//! traversal for reports. It is released before a thread touches its own tree,
//! so instrumentation never contends on it for longer than a map lookup.
//!
//! Each tree also sits behind its own mutex. Only the owning thread and the
//! occasional report or clear ever take it, and it keeps a reader from seeing a
//! torn node. It does not make reports linearizable with respect to what other
//! threads are doing:
//!
//! - a report taken while a thread has a region open shows that region with
//!   whatever it had accumulated before (a freshly created node shows count 0);
//! - a clear while a thread has a region open detaches that thread's tree; the
//!   thread's next finish finds no registry entry and is dropped, and its next
//!   start registers a fresh tree.
//!
//! Both are accepted: the profiler reports snapshots.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;

use crate::{
    CallTree, NodeId, ProfilerResult, Reporter, ThreadReport, children_total, collect_entries,
    region_key,
};

#[derive(Debug)]
struct ThreadSlot {
    seq: u64,
    label: String,
    tree: Mutex<CallTree>,
}

impl ThreadSlot {
    fn tree(&self) -> MutexGuard<'_, CallTree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_seq: u64,
    slots: HashMap<ThreadId, Arc<ThreadSlot>>,
}

#[derive(Debug, Default)]
pub struct MtProfiler {
    registry: Mutex<Registry>,
}

impl MtProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot_or_register(&self) -> Arc<ThreadSlot> {
        let current = std::thread::current();
        let mut registry = self.registry();
        if let Some(slot) = registry.slots.get(&current.id()) {
            return Arc::clone(slot);
        }
        let label = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };
        let seq = registry.next_seq;
        registry.next_seq += 1;
        tracing::debug!(thread = %label, "registering profiler thread");
        let slot = Arc::new(ThreadSlot {
            seq,
            label,
            tree: Mutex::new(CallTree::new()),
        });
        registry.slots.insert(current.id(), Arc::clone(&slot));
        slot
    }

    fn slot(&self) -> Option<Arc<ThreadSlot>> {
        let id = std::thread::current().id();
        self.registry().slots.get(&id).cloned()
    }

    pub fn event_started(&self, region: &str, qualifier: Option<&str>) {
        let slot = self.slot_or_register();
        slot.tree().enter(&region_key(region, qualifier));
    }

    pub fn event_finished(&self, elapsed: u64) {
        let Some(slot) = self.slot() else {
            tracing::debug!(elapsed, "region finished on unregistered thread; ignored");
            return;
        };
        if !slot.tree().exit(elapsed) {
            tracing::warn!(
                thread = %slot.label,
                elapsed,
                "region finished with no region open; charged to root"
            );
        }
    }

    /// Drops every thread's tree and forgets every thread.
    pub fn clear(&self) {
        let mut registry = self.registry();
        let open = registry
            .slots
            .values()
            .filter(|slot| !slot.tree().is_at_root())
            .count();
        if open > 0 {
            tracing::warn!(threads = open, "profiler cleared while regions were still open");
        }
        registry.slots.clear();
    }

    /// Number of threads currently registered.
    pub fn thread_count(&self) -> usize {
        self.registry().slots.len()
    }

    /// Runs `f` over a copy of the calling thread's tree, if the thread is
    /// registered. No lock is held while `f` runs, so it may call back into
    /// this profiler.
    pub fn with_current_tree<R>(&self, f: impl FnOnce(&CallTree) -> R) -> Option<R> {
        let tree = self.slot()?.tree().clone();
        Some(f(&tree))
    }

    /// Per-thread snapshots in registration order, up to `top` entries per
    /// level (`0` = all).
    pub fn report(&self, top: usize) -> Vec<ThreadReport> {
        let registry = self.registry();
        let mut slots = registry.slots.values().collect::<Vec<_>>();
        slots.sort_by_key(|slot| slot.seq);
        slots
            .into_iter()
            .map(|slot| {
                let tree = slot.tree();
                ThreadReport {
                    thread: slot.label.clone(),
                    total: children_total(&tree, NodeId::ROOT),
                    entries: collect_entries(&tree, NodeId::ROOT, top),
                }
            })
            .collect()
    }

    pub fn dump(&self, out: &mut dyn Write, top: usize) -> ProfilerResult<()> {
        self.dump_with(&Reporter::default(), out, top)
    }

    pub fn dump_with(
        &self,
        reporter: &Reporter,
        out: &mut dyn Write,
        top: usize,
    ) -> ProfilerResult<()> {
        reporter.write_threads(out, &self.report(top))
    }
}
