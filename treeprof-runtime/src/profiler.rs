//! The instrumentation facade.
//!
//! A `Profiler` owns the timer tree and a cursor on the block most recently
//! entered. Instrumented code moves the cursor with `init`/`leave` and times
//! the block under it with `start`/`stop`; stops are strictly LIFO. `disp`
//! is collective: every rank of the group must call it at the same point.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::{Deref, DerefMut};

use crate::block::{BlockId, TimerTree};
use crate::comm::{Communicator, LocalComm};
use crate::config::ProfilerConfig;
use crate::error::{ProfError, fatal};
use crate::render::{self, Heat, Renderer};

pub struct Profiler<C: Communicator = LocalComm> {
    name: String,
    tree: TimerTree,
    current: BlockId,
    comm: C,
    config: ProfilerConfig,
}

impl Profiler<LocalComm> {
    /// A profiler for a single process.
    pub fn local(name: &str) -> Self {
        Self::new(name, LocalComm::new())
    }
}

impl<C: Communicator> Profiler<C> {
    /// A profiler labelled `name`, configured from the environment.
    pub fn new(name: &str, comm: C) -> Self {
        Self::with_config(name, comm, ProfilerConfig::from_env())
    }

    pub fn with_config(name: &str, comm: C, config: ProfilerConfig) -> Self {
        Self {
            name: name.to_owned(),
            tree: TimerTree::new(),
            current: TimerTree::ROOT,
            comm,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn tree(&self) -> &TimerTree {
        &self.tree
    }

    /// Block under the cursor.
    pub fn current(&self) -> BlockId {
        self.current
    }

    pub fn current_name(&self) -> &str {
        self.tree.get(self.current).name()
    }

    /// Wall clock of the process group, in seconds.
    pub fn wtime(&self) -> f64 {
        self.comm.wtime()
    }

    /// Move the cursor to the child `name`, creating it on first use.
    pub fn init(&mut self, name: &str) {
        self.current = self.tree.add_child(self.current, name);
    }

    /// Start the block under the cursor. `name` is not checked here; the
    /// matching `stop` checks it.
    #[track_caller]
    pub fn start(&mut self, _name: &str) {
        let now = self.comm.wtime();
        if let Err(e) = self.tree.get_mut(self.current).start(now) {
            fatal(&self.comm, e);
        }
    }

    /// Stop the block under the cursor at `wtime`. The block must be `name`.
    #[track_caller]
    pub fn stop(&mut self, name: &str, wtime: f64) {
        let current = self.tree.get(self.current).name();
        if current != name {
            let err = ProfError::StopMismatch {
                requested: name.to_owned(),
                current: current.to_owned(),
            };
            fatal(&self.comm, err);
        }
        if let Err(e) = self.tree.get_mut(self.current).stop(wtime) {
            fatal(&self.comm, e);
        }
    }

    /// Move the cursor back to the parent block.
    #[track_caller]
    pub fn leave(&mut self, name: &str) {
        match self.tree.get(self.current).parent() {
            Some(parent) => self.current = parent,
            None => fatal(
                &self.comm,
                ProfError::LeavePastRoot {
                    name: name.to_owned(),
                },
            ),
        }
    }

    /// Accumulated time of the child `name` of the block under the cursor.
    #[track_caller]
    pub fn get_time(&self, name: &str) -> f64 {
        match self.tree.children_time(self.current, name) {
            Ok(t) => t,
            Err(e) => fatal(&self.comm, e),
        }
    }

    /// `init` then `start`.
    #[track_caller]
    pub fn enter(&mut self, name: &str) {
        self.init(name);
        self.start(name);
    }

    /// `stop` at the current time then `leave`.
    #[track_caller]
    pub fn exit(&mut self, name: &str) {
        let t = self.comm.wtime();
        self.stop(name, t);
        self.leave(name);
    }

    /// Create the child `name` without timing it, so every rank carries it
    /// in its tree even when only some of them run the region.
    pub fn init_leave(&mut self, name: &str) {
        self.tree.add_child(self.current, name);
    }

    /// Restart the block under the cursor without moving the cursor.
    #[track_caller]
    pub fn start_repeat(&mut self, name: &str) {
        self.start(name);
    }

    /// Stop the block under the cursor now, without moving the cursor.
    #[track_caller]
    pub fn stop_repeat(&mut self, name: &str) {
        let t = self.comm.wtime();
        self.stop(name, t);
    }

    /// Enter `name` for the lifetime of the returned guard.
    #[track_caller]
    pub fn scope(&mut self, name: &str) -> Scope<'_, C> {
        self.enter(name);
        Scope {
            prof: self,
            name: name.to_owned(),
        }
    }

    /// Print the report to stdout on the leader rank. Collective.
    pub fn disp(&mut self) {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.disp_to(&mut lock);
    }

    /// Render the report into `out` on the leader rank. Collective.
    ///
    /// Blocks still running are stopped for the duration of the report and
    /// resumed afterwards without counting a new call, so the report neither
    /// loses nor double counts their open interval.
    #[track_caller]
    pub fn disp_to(&mut self, out: &mut dyn Write) {
        let wtime = self.comm.wtime();
        let rank = self.comm.rank();
        let root_call = self.current == TimerTree::ROOT;

        self.comm.barrier();

        let frozen = self.freeze(wtime);
        if !root_call {
            tracing::warn!(
                rank,
                remaining = %self.tree.chain_names(self.current),
                "displaying profiler, but not all timers were stopped"
            );
        }

        let total_time = self.tree.accumulated_time(TimerTree::ROOT);
        let leader = self.comm.is_leader();
        let mut sidecar = if leader && self.config.sidecar {
            self.open_sidecar()
        } else {
            None
        };

        let color = self.config.color;
        let walk_error = {
            let sidecar_dyn = sidecar.as_mut().map(|w| w as &mut dyn Write);
            let mut renderer =
                Renderer::new(&self.tree, &self.comm, total_time, color, out, sidecar_dyn);
            if leader {
                renderer.write_out(&render::header(&self.name, total_time, color));
            }
            renderer.display(TimerTree::ROOT, 0, Heat::Hottest);
            if leader {
                renderer.write_out(&render::footer(color));
            }
            renderer.finish()
        };
        let flush_error = match sidecar.as_mut() {
            Some(file) => file.flush().err(),
            None => None,
        };
        if let Some(e) = walk_error.or(flush_error) {
            tracing::warn!(rank, error = %e, "failed to write the profiler report");
        }

        self.thaw(frozen);
        self.comm.barrier();
    }

    /// Stop every running block from the cursor up to the root at `wtime`.
    /// Returns them innermost first.
    #[track_caller]
    fn freeze(&mut self, wtime: f64) -> Vec<BlockId> {
        let mut frozen = Vec::new();
        let mut cursor = self.current;
        while let Some(parent) = self.tree.get(cursor).parent() {
            let block = self.tree.get_mut(cursor);
            if block.is_running() {
                if let Err(e) = block.stop(wtime) {
                    fatal(&self.comm, e);
                }
                frozen.push(cursor);
            }
            cursor = parent;
        }
        if cursor != TimerTree::ROOT {
            fatal(&self.comm, ProfError::CorruptCursor);
        }
        frozen
    }

    /// Reopen the blocks returned by `freeze`, outermost first.
    #[track_caller]
    fn thaw(&mut self, mut frozen: Vec<BlockId>) {
        let now = self.comm.wtime();
        while let Some(id) = frozen.pop() {
            if let Err(e) = self.tree.get_mut(id).resume(now) {
                fatal(&self.comm, e);
            }
        }
    }

    fn open_sidecar(&self) -> Option<BufWriter<File>> {
        let path = self.config.sidecar_path(&self.name);
        let opened = std::fs::create_dir_all(&self.config.report_dir).and_then(|()| File::create(&path));
        match opened {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                tracing::warn!(
                    rank = self.comm.rank(),
                    path = %path.display(),
                    error = %e,
                    "unable to open file for profiling"
                );
                None
            }
        }
    }
}

impl<C: Communicator> Drop for Profiler<C> {
    fn drop(&mut self) {
        if self.current != TimerTree::ROOT {
            tracing::warn!(
                rank = self.comm.rank(),
                remaining = %self.tree.chain_names(self.current),
                "destroying profiler, but not all timers were stopped"
            );
        }
    }
}

/// RAII region: entered by `Profiler::scope`, exited on drop.
///
/// Derefs to the profiler, so nested regions are opened from the guard.
#[must_use = "dropping the scope immediately records ~0s; bind it with `let mut scope = ...`"]
pub struct Scope<'p, C: Communicator> {
    prof: &'p mut Profiler<C>,
    name: String,
}

impl<C: Communicator> Scope<'_, C> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C: Communicator> Deref for Scope<'_, C> {
    type Target = Profiler<C>;

    fn deref(&self) -> &Profiler<C> {
        self.prof
    }
}

impl<C: Communicator> DerefMut for Scope<'_, C> {
    fn deref_mut(&mut self) -> &mut Profiler<C> {
        self.prof
    }
}

impl<C: Communicator> Drop for Scope<'_, C> {
    fn drop(&mut self) {
        // A fatal error is already unwinding; a second one would abort.
        if std::thread::panicking() {
            return;
        }
        self.prof.exit(&self.name);
    }
}
