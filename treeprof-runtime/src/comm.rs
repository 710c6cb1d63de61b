//! Process-group substrate consumed by the profiler.
//!
//! The profiler only needs a handful of collective primitives: rank and size
//! queries, a wall clock, a barrier, and single-value sum/min/max reductions.
//! `Communicator` captures exactly that surface so the same profiler runs on
//! a single process (`LocalComm`), on N threads standing in for N ranks
//! (`ThreadGroup`), or on a real MPI communicator (`mpi` feature).
//!
//! Every collective must be called by every rank in the same order. A rank
//! that skips one leaves its peers blocked forever; that is a usage contract,
//! not something the substrate guards against.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// Reduction applied by the `all_reduce_*` collectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn fold_f64(self, values: &[f64]) -> f64 {
        match self {
            ReduceOp::Sum => values.iter().sum(),
            ReduceOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ReduceOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn fold_u64(self, values: &[u64]) -> u64 {
        match self {
            ReduceOp::Sum => values.iter().sum(),
            ReduceOp::Min => values.iter().copied().min().unwrap_or(0),
            ReduceOp::Max => values.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Collective operations the profiler invokes on its process group.
pub trait Communicator {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Wall-clock time in seconds. Only differences are meaningful.
    fn wtime(&self) -> f64;

    fn barrier(&self);

    fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> f64;

    fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> u64;

    /// Tear down the whole group. Never returns.
    fn abort(&self, message: &str) -> !;

    /// True on the rank that formats and writes reports.
    fn is_leader(&self) -> bool {
        self.rank() == 0
    }
}

impl<C: Communicator + ?Sized> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }
    fn size(&self) -> usize {
        (**self).size()
    }
    fn wtime(&self) -> f64 {
        (**self).wtime()
    }
    fn barrier(&self) {
        (**self).barrier()
    }
    fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> f64 {
        (**self).all_reduce_f64(value, op)
    }
    fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> u64 {
        (**self).all_reduce_u64(value, op)
    }
    fn abort(&self, message: &str) -> ! {
        (**self).abort(message)
    }
}

/// A process group of exactly one process.
#[derive(Debug, Clone)]
pub struct LocalComm {
    epoch: Instant,
}

impl LocalComm {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for LocalComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn wtime(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn barrier(&self) {}

    fn all_reduce_f64(&self, value: f64, _op: ReduceOp) -> f64 {
        value
    }

    fn all_reduce_u64(&self, value: u64, _op: ReduceOp) -> u64 {
        value
    }

    fn abort(&self, message: &str) -> ! {
        panic!("{message}");
    }
}

#[derive(Clone, Copy)]
enum Scalar {
    F64(f64),
    U64(u64),
}

struct Rendezvous {
    generation: u64,
    arrived: usize,
    slots: Vec<Scalar>,
    result: Scalar,
    aborted: Option<String>,
    /// Rank that brought the group down first.
    origin: Option<usize>,
}

struct Shared {
    size: usize,
    epoch: Instant,
    state: Mutex<Rendezvous>,
    cvar: Condvar,
}

/// Builder for a group of in-process ranks, one per thread.
///
/// `ThreadGroup::spawn(n)` returns `n` communicators; hand one to each
/// thread. They behave like the ranks of an MPI world: collectives block
/// until every rank has contributed, and an abort on any rank brings down
/// every rank blocked in (or later entering) a collective.
pub struct ThreadGroup;

impl ThreadGroup {
    pub fn spawn(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a process group needs at least one rank");
        let shared = Arc::new(Shared {
            size,
            epoch: Instant::now(),
            state: Mutex::new(Rendezvous {
                generation: 0,
                arrived: 0,
                slots: vec![Scalar::U64(0); size],
                result: Scalar::U64(0),
                aborted: None,
                origin: None,
            }),
            cvar: Condvar::new(),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` on `size` scoped threads, one per rank, and return the
    /// per-rank results in rank order.
    ///
    /// A panic on any rank (including an abort) brings the group down and is
    /// re-raised on the caller with the payload of the rank that failed first.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(ThreadComm) -> T + Sync,
    {
        let comms = Self::spawn(size);
        let shared = Arc::clone(&comms[0].shared);
        let joined: Vec<std::thread::Result<T>> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let origin = shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .origin;
        let mut results = Vec::with_capacity(size);
        let mut failure = None;
        for (rank, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(v) => results.push(v),
                Err(payload) => {
                    if failure.is_none() || origin == Some(rank) {
                        failure = Some(payload);
                    }
                }
            }
        }
        if let Some(payload) = failure {
            std::panic::resume_unwind(payload);
        }
        results
    }
}

/// One rank of a `ThreadGroup`.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Mark the group as aborted and wake every rank blocked in a collective.
    /// Only the first call is recorded.
    fn poison(&self, message: &str) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.aborted.is_none() {
            state.aborted = Some(format!("rank {}: {message}", self.rank));
            state.origin = Some(self.rank);
        }
        self.shared.cvar.notify_all();
    }

    fn exchange(&self, value: Scalar, op: ReduceOp) -> Scalar {
        let shared = &*self.shared;
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(msg) = &state.aborted {
            let msg = msg.clone();
            drop(state);
            panic!("rank {}: process group aborted: {msg}", self.rank);
        }

        let generation = state.generation;
        state.slots[self.rank] = value;
        state.arrived += 1;

        if state.arrived == shared.size {
            state.result = match value {
                Scalar::F64(_) => {
                    let values: Vec<f64> = state
                        .slots
                        .iter()
                        .map(|s| match *s {
                            Scalar::F64(v) => v,
                            Scalar::U64(v) => v as f64,
                        })
                        .collect();
                    Scalar::F64(op.fold_f64(&values))
                }
                Scalar::U64(_) => {
                    let values: Vec<u64> = state
                        .slots
                        .iter()
                        .map(|s| match *s {
                            Scalar::U64(v) => v,
                            Scalar::F64(v) => v as u64,
                        })
                        .collect();
                    Scalar::U64(op.fold_u64(&values))
                }
            };
            state.arrived = 0;
            state.generation += 1;
            shared.cvar.notify_all();
            return state.result;
        }

        // The result of this generation stays in place until every rank,
        // including this one, has arrived at the next collective.
        while state.generation == generation {
            state = shared.cvar.wait(state).unwrap_or_else(|e| e.into_inner());
            if let Some(msg) = &state.aborted {
                let msg = msg.clone();
                drop(state);
                panic!("rank {}: process group aborted: {msg}", self.rank);
            }
        }
        state.result
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn wtime(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    fn barrier(&self) {
        self.exchange(Scalar::U64(0), ReduceOp::Sum);
    }

    fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> f64 {
        match self.exchange(Scalar::F64(value), op) {
            Scalar::F64(v) => v,
            Scalar::U64(v) => v as f64,
        }
    }

    fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> u64 {
        match self.exchange(Scalar::U64(value), op) {
            Scalar::U64(v) => v,
            Scalar::F64(v) => v as u64,
        }
    }

    fn abort(&self, message: &str) -> ! {
        self.poison(message);
        panic!("{message}");
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        // A rank unwinding out of its closure will never reach the next
        // collective; release the peers waiting for it.
        if std::thread::panicking() {
            self.poison("panicked");
        }
    }
}

#[cfg(feature = "mpi")]
mod mpi_comm {
    use super::{Communicator, ReduceOp};
    use mpi::collective::SystemOperation;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives};

    fn system_op(op: ReduceOp) -> SystemOperation {
        match op {
            ReduceOp::Sum => SystemOperation::sum(),
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Max => SystemOperation::max(),
        }
    }

    impl Communicator for SimpleCommunicator {
        fn rank(&self) -> usize {
            MpiCommunicator::rank(self) as usize
        }

        fn size(&self) -> usize {
            MpiCommunicator::size(self) as usize
        }

        fn wtime(&self) -> f64 {
            mpi::time()
        }

        fn barrier(&self) {
            CommunicatorCollectives::barrier(self);
        }

        fn all_reduce_f64(&self, value: f64, op: ReduceOp) -> f64 {
            let mut out = 0.0f64;
            self.all_reduce_into(&value, &mut out, system_op(op));
            out
        }

        fn all_reduce_u64(&self, value: u64, op: ReduceOp) -> u64 {
            let mut out = 0u64;
            self.all_reduce_into(&value, &mut out, system_op(op));
            out
        }

        fn abort(&self, message: &str) -> ! {
            use std::io::Write;
            println!("{message}");
            let _ = std::io::stdout().flush();
            MpiCommunicator::abort(self, 1)
        }
    }
}
