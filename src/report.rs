//! Report snapshots and their text/JSON rendering.
//!
//! Every level of the tree is reported the same way: the siblings' times are
//! summed once, the siblings are sorted by descending time (ties keep key
//! order), at most `top` of them are kept, and each entry's percentage is its
//! share of that sibling sum. Percentages therefore add up to 100 at every
//! level independently when nothing is cut off.
//!
//! Trees are walked with an explicit work list, never by recursion, so a
//! report works at any nesting depth the tree itself could record.

use serde::{Deserialize, Serialize};

use std::io::Write;

use crate::{CallTree, Config, NodeId, ProfilerResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pretty,
    Json,
}

impl clap::ValueEnum for ReportFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

/// One reported region.
///
/// Reports are flat lists in display order: an entry's children follow it
/// directly and sit one `depth` deeper. Nothing in a report nests, so building,
/// printing, serializing and dropping one costs no stack per tree level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportEntry {
    pub name: String,
    pub depth: usize,
    pub count: u64,
    pub time: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadReport {
    pub thread: String,
    pub total: u64,
    pub entries: Vec<ReportEntry>,
}

struct Pending<'t> {
    id: NodeId,
    name: &'t str,
    depth: usize,
    percent: f64,
}

/// Snapshot of everything below `parent`, parents before their children.
///
/// `top == 0` keeps every entry.
pub fn collect_entries(tree: &CallTree, parent: NodeId, top: usize) -> Vec<ReportEntry> {
    let mut entries = Vec::new();
    let mut pending = Vec::new();
    push_level(tree, parent, 0, top, &mut pending);
    while let Some(next) = pending.pop() {
        let node = tree.node(next.id);
        entries.push(ReportEntry {
            name: next.name.to_string(),
            depth: next.depth,
            count: node.count(),
            time: node.time(),
            percent: next.percent,
        });
        push_level(tree, next.id, next.depth + 1, top, &mut pending);
    }
    entries
}

// Ranks the children of `parent` and pushes them so the first ranked pops first.
fn push_level<'t>(
    tree: &'t CallTree,
    parent: NodeId,
    depth: usize,
    top: usize,
    pending: &mut Vec<Pending<'t>>,
) {
    let total = children_total(tree, parent);
    let mut ranked = tree.node(parent).children().collect::<Vec<_>>();
    // Stable sort: equal times stay in key order.
    ranked.sort_by(|a, b| tree.node(b.1).time().cmp(&tree.node(a.1).time()));
    if top > 0 {
        ranked.truncate(top);
    }
    pending.extend(ranked.into_iter().rev().map(|(name, id)| Pending {
        id,
        name,
        depth,
        percent: percent_of(tree.node(id).time(), total),
    }));
}

/// Sibling total for the children of `parent`.
pub fn children_total(tree: &CallTree, parent: NodeId) -> u64 {
    tree.node(parent)
        .children()
        .map(|(_, id)| tree.node(id).time())
        .fold(0, u64::saturating_add)
}

fn percent_of(time: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    time as f64 / total as f64 * 100.0
}

/// Text layout settings for dumps.
#[derive(Debug, Clone)]
pub struct Reporter {
    indent: usize,
    unit: String,
}

impl Reporter {
    pub fn new(indent: usize, unit: impl Into<String>) -> Self {
        Self {
            indent,
            unit: unit.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.indent, config.unit.clone())
    }

    /// Writes `entries`, each indented `base_depth` levels past its own depth.
    pub fn write_entries(
        &self,
        out: &mut dyn Write,
        entries: &[ReportEntry],
        base_depth: usize,
    ) -> ProfilerResult<()> {
        for entry in entries {
            self.write_line(out, entry, base_depth.saturating_add(entry.depth))?;
        }
        Ok(())
    }

    /// Writes one section per thread: a header line, the thread's entries one
    /// level in, then a blank line.
    pub fn write_threads(
        &self,
        out: &mut dyn Write,
        threads: &[ThreadReport],
    ) -> ProfilerResult<()> {
        for thread in threads {
            writeln!(out, "Thread: {}", thread.thread)?;
            self.write_entries(out, &thread.entries, 1)?;
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn render_entries(&self, entries: &[ReportEntry]) -> ProfilerResult<String> {
        let mut buf = Vec::new();
        self.write_entries(&mut buf, entries, 0)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn render_threads(&self, threads: &[ThreadReport]) -> ProfilerResult<String> {
        let mut buf = Vec::new();
        self.write_threads(&mut buf, threads)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn write_line(
        &self,
        out: &mut dyn Write,
        entry: &ReportEntry,
        depth: usize,
    ) -> ProfilerResult<()> {
        writeln!(
            out,
            "{:pad$}{} [calls: {}] [time: {}{}] [{:.2}%]",
            "",
            entry.name,
            entry.count,
            entry.time,
            self.unit,
            entry.percent,
            pad = self.indent.saturating_mul(depth),
        )?;
        Ok(())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> CallTree {
        let mut tree = CallTree::new();
        for (key, time) in [("small", 10), ("big", 60), ("mid", 30)] {
            tree.enter(key);
            tree.exit(time);
        }
        tree.enter("big");
        tree.enter("inner");
        tree.exit(5);
        tree.exit(0);
        tree
    }

    fn names(entries: &[ReportEntry]) -> Vec<(&str, usize)> {
        entries.iter().map(|e| (e.name.as_str(), e.depth)).collect()
    }

    #[test]
    fn entries_sorted_by_descending_time() {
        let tree = sample_tree();
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        assert_eq!(
            names(&entries),
            vec![("big", 0), ("inner", 1), ("mid", 0), ("small", 0)]
        );
        assert_eq!(entries[0].count, 2);
    }

    #[test]
    fn percentages_are_relative_to_siblings() {
        let tree = sample_tree();
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        let sum: f64 = entries.iter().filter(|e| e.depth == 0).map(|e| e.percent).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((entries[0].percent - 60.0).abs() < 1e-9);
        // Sole child gets the whole level regardless of the grand total.
        assert!((entries[1].percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn top_limits_the_root_level() {
        let tree = sample_tree();
        let entries = collect_entries(&tree, NodeId::ROOT, 2);
        assert_eq!(names(&entries), vec![("big", 0), ("inner", 1), ("mid", 0)]);
    }

    #[test]
    fn top_limits_nested_levels() {
        let mut tree = CallTree::new();
        tree.enter("parent");
        for (key, time) in [("x", 1), ("y", 7), ("z", 4)] {
            tree.enter(key);
            tree.exit(time);
        }
        tree.exit(20);
        let entries = collect_entries(&tree, NodeId::ROOT, 2);
        assert_eq!(names(&entries), vec![("parent", 0), ("y", 1), ("z", 1)]);
        // The cut sibling still counts toward the level total.
        assert!((entries[1].percent - 7.0 / 12.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_key_order() {
        let mut tree = CallTree::new();
        for key in ["b", "c", "a"] {
            tree.enter(key);
            tree.exit(4);
        }
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        assert_eq!(names(&entries), vec![("a", 0), ("b", 0), ("c", 0)]);
    }

    #[test]
    fn zero_total_reports_zero_percent() {
        let mut tree = CallTree::new();
        tree.enter("idle");
        tree.exit(0);
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        assert_eq!(entries[0].percent, 0.0);
    }

    #[test]
    fn deep_chain_collects_every_level() {
        const DEPTH: usize = 100_000;
        let mut tree = CallTree::new();
        for _ in 0..DEPTH {
            tree.enter("R");
        }
        for _ in 0..DEPTH {
            tree.exit(1);
        }
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        assert_eq!(entries.len(), DEPTH);
        assert!(entries.iter().enumerate().all(|(i, e)| e.depth == i));
        assert_eq!(entries[DEPTH - 1].count, 1);

        let text = Reporter::new(0, "ns").render_entries(&entries).expect("render");
        assert_eq!(text.lines().count(), DEPTH);
        assert_eq!(text.lines().last(), Some("R [calls: 1] [time: 1ns] [100.00%]"));
    }

    #[test]
    fn text_indents_by_depth() {
        let tree = sample_tree();
        let entries = collect_entries(&tree, NodeId::ROOT, 1);
        let text = Reporter::new(2, "us").render_entries(&entries).expect("render");
        assert_eq!(
            text,
            "big [calls: 2] [time: 60us] [60.00%]\n  inner [calls: 1] [time: 5us] [100.00%]\n"
        );
    }

    #[test]
    fn thread_sections_have_headers() {
        let threads = vec![ThreadReport {
            thread: "worker".to_string(),
            total: 3,
            entries: vec![ReportEntry {
                name: "tick".to_string(),
                depth: 0,
                count: 1,
                time: 3,
                percent: 100.0,
            }],
        }];
        let text = Reporter::new(2, "ns").render_threads(&threads).expect("render");
        assert_eq!(text, "Thread: worker\n  tick [calls: 1] [time: 3ns] [100.00%]\n\n");
    }

    #[test]
    fn json_is_flat_with_depths() {
        let tree = sample_tree();
        let entries = collect_entries(&tree, NodeId::ROOT, 0);
        let json = serde_json::to_value(&entries).expect("json");
        assert_eq!(json[1]["name"], "inner");
        assert_eq!(json[1]["depth"], 1);
        assert!(json[0].get("children").is_none());
    }
}
