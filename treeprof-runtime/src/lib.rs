//! Hierarchical wall-clock profiler for groups of cooperating processes.
//!
//! Instrumented code opens and closes named, nested regions on a
//! [`Profiler`]; each region is a block of a call tree holding a call count
//! and an accumulated time. [`Profiler::disp`] reduces every block across the
//! process group (mean, min, max, 90% confidence interval) and prints an
//! indented report on rank 0, with the most expensive path highlighted, plus
//! a semicolon-delimited sidecar file.
//!
//! The process group is abstracted by [`Communicator`]: a single process
//! ([`LocalComm`]), threads standing in for ranks ([`ThreadGroup`]), or MPI
//! with the `mpi` feature.
//!
//! ```
//! use treeprof_runtime::{LocalComm, Profiler, ProfilerConfig};
//!
//! let config = ProfilerConfig { sidecar: false, ..ProfilerConfig::default() };
//! let mut prof = Profiler::with_config("example", LocalComm::new(), config);
//! {
//!     let mut solve = prof.scope("solve");
//!     let _assemble = solve.scope("assemble");
//! }
//! let mut report = Vec::new();
//! prof.disp_to(&mut report);
//! assert!(String::from_utf8(report).unwrap().contains("|-> assemble"));
//! ```

mod block;
mod comm;
mod config;
mod error;
mod macros;
mod profiler;
mod render;
mod stats;

pub use block::{BlockId, TimerBlock, TimerTree};
pub use comm::{Communicator, LocalComm, ReduceOp, ThreadComm, ThreadGroup};
pub use config::{DEFAULT_REPORT_DIR, ProfilerConfig};
pub use error::ProfError;
pub use profiler::{Profiler, Scope};
pub use render::{Heat, Renderer, footer, format_placeholder, format_row, header, shifter, sidecar_row};
pub use stats::{NodeStats, t_nu};
