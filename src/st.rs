//! Single-threaded profiler: one call tree, one cursor.
//!
//! Every mutating method takes `&mut self`, so the borrow checker rules out
//! concurrent use. Share it across threads only behind a lock (as the
//! process-wide instance does) or use [`crate::MtProfiler`] instead.

use std::io::Write;

use crate::{
    CallTree, NodeId, ProfilerResult, ReportEntry, Reporter, collect_entries, region_key,
};

#[derive(Debug, Clone, Default)]
pub struct StProfiler {
    tree: CallTree,
}

impl StProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn event_started(&mut self, region: &str, qualifier: Option<&str>) {
        self.tree.enter(&region_key(region, qualifier));
    }

    pub fn event_finished(&mut self, elapsed: u64) {
        if !self.tree.exit(elapsed) {
            tracing::warn!(elapsed, "region finished with no region open; charged to root");
        }
    }

    /// Discards every statistic. Expected to be called with no region open.
    pub fn clear(&mut self) {
        if !self.tree.is_at_root() {
            tracing::warn!(
                open = self.tree.open_depth(),
                "profiler cleared while regions were still open"
            );
        }
        self.tree.clear();
    }

    /// Snapshot of up to `top` entries per level (`0` = all).
    pub fn report(&self, top: usize) -> Vec<ReportEntry> {
        collect_entries(&self.tree, NodeId::ROOT, top)
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
        reporter.write_entries(out, &self.report(top), 0)
    }
}
