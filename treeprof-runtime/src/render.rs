//! Collective rendering of the timer tree.
//!
//! Every rank walks the tree depth-first in child-name order and takes part
//! in the reductions of every node; only the leader formats and writes. I/O
//! errors never cut the walk short, since the other ranks would be left
//! waiting in a reduction. The first one is kept and handed back instead.

use std::io::{self, Write};

use crate::block::{BlockId, TimerTree};
use crate::comm::Communicator;
#[cfg(debug_assertions)]
use crate::comm::ReduceOp;
#[cfg(debug_assertions)]
use crate::error::{ProfError, fatal};
use crate::stats::NodeStats;

const RULE: &str = "===================================================================================================================================================";

const RED: &str = "\x1b[0;31m";
const YELLOW: &str = "\x1b[0;33m";
const RESET: &str = "\x1b[0m";

/// Emphasis of a row. The hottest child of a `Hottest` row is `Hottest`
/// too, so the most expensive path is marked end to end; the hottest child
/// of any other row is `Hot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heat {
    Hottest = 0,
    Hot = 1,
    Plain = 2,
}

impl Heat {
    fn of_child(self, is_hottest: bool) -> Heat {
        match (is_hottest, self) {
            (true, Heat::Hottest) => Heat::Hottest,
            (true, _) => Heat::Hot,
            (false, _) => Heat::Plain,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Heat::Hottest => "!!",
            Heat::Hot => "! ",
            Heat::Plain => "  ",
        }
    }
}

/// Indentation prefix for a row at `level`. Level 1 rows are the top-level
/// regions and get no connector.
pub fn shifter(level: usize) -> String {
    let mut s = "|   ".repeat(level.saturating_sub(2));
    if level > 1 {
        s.push_str("|-> ");
    }
    s
}

/// One stdout row.
pub fn format_row(
    name: &str,
    level: usize,
    heat: Heat,
    stats: &NodeStats,
    total_time: f64,
    color: bool,
) -> String {
    let label = format!("{}{name}", shifter(level));
    let percent = stats.percent_of(total_time);
    let (pct, mean) = if color {
        match heat {
            Heat::Hottest => (
                format!("{RED}{percent:09.6}{RESET}"),
                format!("{RED}{:07.4}{RESET}", stats.mean_time),
            ),
            Heat::Hot => (
                format!("{YELLOW}{percent:09.6}{RESET}"),
                format!("{:07.4}", stats.mean_time),
            ),
            Heat::Plain => (format!("{percent:09.6}"), format!("{:07.4}", stats.mean_time)),
        }
    } else {
        (
            format!("{}{percent:09.6}", heat.marker()),
            format!("{:07.4}", stats.mean_time),
        )
    };
    format!(
        "{label:<60.60} {pct} % -> {mean} [s] +- {:07.4} [s] \t\t\t({:.4} [s/call], {} calls)\n",
        stats.ci90, stats.mean_time_per_call, stats.max_count
    )
}

/// Stdout row for a node no rank has run.
pub fn format_placeholder(name: &str, level: usize) -> String {
    let label = format!("{}{name}", shifter(level));
    format!("{label:<60.60}   ---------- % -> never called\n")
}

/// One sidecar row: `name;level;mean;percent;per_call;mean_count;min;max;std;min_count;max_count`.
pub fn sidecar_row(name: &str, level: usize, stats: Option<&NodeStats>, total_time: f64) -> String {
    match stats {
        Some(s) => format!(
            "{name};{level};{:.8};{:.8};{:.8};{:.0};{:.8};{:.8};{:.8};{};{}\n",
            s.mean_time,
            s.percent_of(total_time),
            s.mean_time_per_call,
            s.mean_count,
            s.min_time,
            s.max_time,
            s.std_time,
            s.min_count,
            s.max_count,
        ),
        None => format!(
            "{name};{level};{:.8};{:.8};{:.8};{:.0};{:.8};{:.8};{:.8};{};{}\n",
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0, 0
        ),
    }
}

pub fn header(label: &str, total_time: f64, color: bool) -> String {
    if color {
        format!(
            "{RULE}\n        PROFILER {label} --> total time = {YELLOW}{total_time:.4}{RESET} [s] \n\n"
        )
    } else {
        format!("{RULE}\n        PROFILER {label} --> total time = {total_time:.4} [s] \n\n")
    }
}

pub fn footer(color: bool) -> String {
    let mut s = format!("{RULE}\n");
    s.push_str("WARNING:\n");
    s.push_str("  - times are mean-time with their associated 90% CI\n");
    s.push_str("  - the percentage might not be consistent as they only reflect rank-0 timing\n");
    s.push_str("legend:\n");
    if color {
        s.push_str(&format!(
            "  - {RED}this indicates the most expensive step of the most expensive operation{RESET}\n"
        ));
        s.push_str(&format!(
            "  - {YELLOW}this indicates the most expensive step of the parent operation{RESET}\n"
        ));
    } else {
        s.push_str("  - !! the most expensive step of the most expensive operation\n");
        s.push_str("  - !  the most expensive step of the parent operation\n");
    }
    s.push_str(RULE);
    s.push('\n');
    s
}

/// Among the children of `id`, the ones with the largest and the smallest
/// accumulated time. The hottest must be strictly positive.
fn child_extremes(tree: &TimerTree, id: BlockId) -> (Option<BlockId>, Option<BlockId>) {
    let mut hottest: Option<(BlockId, f64)> = None;
    let mut coolest: Option<(BlockId, f64)> = None;
    for child in tree.get(id).children() {
        let t = tree.accumulated_time(child);
        if t > hottest.map_or(f64::MIN_POSITIVE, |(_, h)| h) {
            hottest = Some((child, t));
        }
        if coolest.is_none_or(|(_, c)| t < c) {
            coolest = Some((child, t));
        }
    }
    (hottest.map(|(b, _)| b), coolest.map(|(b, _)| b))
}

/// Recursive walk over a (frozen) tree.
pub struct Renderer<'a, C: Communicator + ?Sized> {
    tree: &'a TimerTree,
    comm: &'a C,
    total_time: f64,
    color: bool,
    out: &'a mut dyn Write,
    sidecar: Option<&'a mut dyn Write>,
    error: Option<io::Error>,
}

impl<'a, C: Communicator + ?Sized> Renderer<'a, C> {
    pub fn new(
        tree: &'a TimerTree,
        comm: &'a C,
        total_time: f64,
        color: bool,
        out: &'a mut dyn Write,
        sidecar: Option<&'a mut dyn Write>,
    ) -> Self {
        Self {
            tree,
            comm,
            total_time,
            color,
            out,
            sidecar,
            error: None,
        }
    }

    /// Render `id` and its subtree. Collective.
    pub fn display(&mut self, id: BlockId, level: usize, heat: Heat) {
        let tree = self.tree;
        let block = tree.get(id);
        let stats = NodeStats::gather(self.comm, block.call_count(), block.raw_time());

        // The root is a container. Its statistics are still reduced on every
        // rank, but it never gets a row, even if a caller timed it.
        if self.comm.is_leader() && id != TimerTree::ROOT {
            match &stats {
                Some(stats) => {
                    let row = format_row(
                        block.name(),
                        level,
                        heat,
                        stats,
                        self.total_time,
                        self.color,
                    );
                    self.write_out(&row);
                    self.write_sidecar(&sidecar_row(
                        block.name(),
                        level,
                        Some(stats),
                        self.total_time,
                    ));
                }
                None => {
                    self.write_out(&format_placeholder(block.name(), level));
                    self.write_sidecar(&sidecar_row(block.name(), level, None, self.total_time));
                }
            }
        }

        #[cfg(debug_assertions)]
        self.check_shape(id);

        let (hottest, coolest) = child_extremes(tree, id);
        tracing::trace!(
            rank = self.comm.rank(),
            block = block.name(),
            hottest = ?hottest.map(|b| tree.get(b).name()),
            coolest = ?coolest.map(|b| tree.get(b).name()),
            "child extremes"
        );
        for child in block.children() {
            self.display(child, level + 1, heat.of_child(Some(child) == hottest));
        }
    }

    /// Abort if the ranks disagree on the number of children of `id`.
    #[cfg(debug_assertions)]
    fn check_shape(&self, id: BlockId) {
        let block = self.tree.get(id);
        let local = block.child_count() as u64;
        let max = self.comm.all_reduce_u64(local, ReduceOp::Max);
        let min = self.comm.all_reduce_u64(local, ReduceOp::Min);
        if local != max || local != min {
            fatal(
                self.comm,
                ProfError::ChildCountMismatch {
                    name: block.name().to_owned(),
                    local,
                    min,
                    max,
                },
            );
        }
    }

    pub fn write_out(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            self.error.get_or_insert(e);
        }
    }

    fn write_sidecar(&mut self, text: &str) {
        if let Some(file) = self.sidecar.as_mut()
            && let Err(e) = file.write_all(text.as_bytes())
        {
            self.error.get_or_insert(e);
        }
    }

    /// First I/O error hit during the walk, if any.
    pub fn finish(self) -> Option<io::Error> {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;

    fn stats(mean: f64, count: u64) -> NodeStats {
        NodeStats::gather(&LocalComm::new(), count, mean).unwrap()
    }

    #[test]
    fn shifter_draws_connectors_below_top_level() {
        assert_eq!(shifter(0), "");
        assert_eq!(shifter(1), "");
        assert_eq!(shifter(2), "|-> ");
        assert_eq!(shifter(4), "|   |   |-> ");
    }

    #[test]
    fn heat_follows_the_hottest_spine() {
        assert_eq!(Heat::Hottest.of_child(true), Heat::Hottest);
        assert_eq!(Heat::Hot.of_child(true), Heat::Hot);
        assert_eq!(Heat::Plain.of_child(true), Heat::Hot);
        assert_eq!(Heat::Hottest.of_child(false), Heat::Plain);
    }

    #[test]
    fn plain_row_layout() {
        let row = format_row("solve", 2, Heat::Hottest, &stats(0.5, 2), 1.0, false);
        assert!(row.starts_with("|-> solve"), "{row}");
        assert!(row.contains("!!50.000000 % -> 00.5000 [s] +- 00.0000 [s]"), "{row}");
        assert!(row.contains("(0.2500 [s/call], 2 calls)"), "{row}");
        assert!(row.ends_with('\n'));
    }

    #[test]
    fn long_names_are_truncated_to_the_name_column() {
        let name = "x".repeat(100);
        let row = format_row(&name, 1, Heat::Plain, &stats(1.0, 1), 1.0, false);
        let (label, _) = row.split_at(60);
        assert_eq!(label, "x".repeat(60));
        assert_eq!(&row[60..61], " ");
    }

    #[test]
    fn color_row_uses_ansi_for_hot_rows() {
        let row = format_row("a", 1, Heat::Hottest, &stats(1.0, 1), 1.0, true);
        assert!(row.contains(RED));
        let row = format_row("a", 1, Heat::Hot, &stats(1.0, 1), 1.0, true);
        assert!(row.contains(YELLOW));
        let row = format_row("a", 1, Heat::Plain, &stats(1.0, 1), 1.0, true);
        assert!(!row.contains('\x1b'));
    }

    #[test]
    fn sidecar_rows() {
        let row = sidecar_row("A", 1, Some(&stats(0.01, 1)), 0.01);
        assert_eq!(
            row,
            "A;1;0.01000000;100.00000000;0.01000000;1;0.01000000;0.01000000;0.00000000;1;1\n"
        );
        let ghost = sidecar_row("B", 2, None, 0.01);
        assert_eq!(
            ghost,
            "B;2;0.00000000;0.00000000;0.00000000;0;0.00000000;0.00000000;0.00000000;0;0\n"
        );
    }

    #[test]
    fn hottest_child_must_have_positive_time() {
        let mut tree = TimerTree::new();
        tree.add_child(TimerTree::ROOT, "a");
        tree.add_child(TimerTree::ROOT, "b");
        let (hottest, coolest) = child_extremes(&tree, TimerTree::ROOT);
        assert_eq!(hottest, None);
        assert!(coolest.is_some());
    }

    #[test]
    fn timed_root_gets_no_row() {
        let mut tree = TimerTree::new();
        tree.get_mut(TimerTree::ROOT).start(0.0).unwrap();
        let a = tree.add_child(TimerTree::ROOT, "a");
        tree.get_mut(a).start(0.0).unwrap();
        tree.get_mut(a).stop(1.0).unwrap();
        tree.get_mut(TimerTree::ROOT).stop(2.0).unwrap();

        let comm = LocalComm::new();
        let mut out = Vec::new();
        let mut sidecar = Vec::new();
        let mut renderer = Renderer::new(
            &tree,
            &comm,
            2.0,
            false,
            &mut out,
            Some(&mut sidecar as &mut dyn Write),
        );
        renderer.display(TimerTree::ROOT, 0, Heat::Hottest);
        assert!(renderer.finish().is_none());

        let sidecar = String::from_utf8(sidecar).unwrap();
        assert_eq!(sidecar.lines().count(), 1, "{sidecar}");
        assert!(sidecar.starts_with("a;1;"), "{sidecar}");
        let out = String::from_utf8(out).unwrap();
        assert!(!out.lines().any(|l| l.starts_with("root")), "{out}");
    }

    #[test]
    fn child_extremes_pick_max_and_min() {
        let mut tree = TimerTree::new();
        let a = tree.add_child(TimerTree::ROOT, "a");
        let b = tree.add_child(TimerTree::ROOT, "b");
        let c = tree.add_child(TimerTree::ROOT, "c");
        for (id, dt) in [(a, 1.0), (b, 3.0), (c, 0.5)] {
            tree.get_mut(id).start(0.0).unwrap();
            tree.get_mut(id).stop(dt).unwrap();
        }
        assert_eq!(child_extremes(&tree, TimerTree::ROOT), (Some(b), Some(c)));
    }
}
