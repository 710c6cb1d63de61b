use std::panic::Location;

use crate::comm::Communicator;

/// Usage-contract violations. Every one of them is fatal for the whole
/// process group: a rank that carried on would desynchronize the collective
/// report for all of its peers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfError {
    #[error("the block {name} has already been started")]
    AlreadyStarted { name: String },

    #[error("the block {name} is stopped without being started")]
    NotStarted { name: String },

    #[error("trying to stop {requested} which is not the most recent timer started = {current}")]
    StopMismatch { requested: String, current: String },

    #[error("you requested the time of {name} which is not a child of {parent}")]
    UnknownChild { name: String, parent: String },

    #[error("cannot leave {name}: the cursor is already at the root")]
    LeavePastRoot { name: String },

    #[error("TimerBlock {name}: nchildren do not match: local = {local}, max = {max}, min = {min}")]
    ChildCountMismatch {
        name: String,
        local: u64,
        min: u64,
        max: u64,
    },

    #[error("the freeze walk from the cursor did not end at the root")]
    CorruptCursor,
}

/// Report a contract violation and tear down the process group.
///
/// The message carries the rank and the caller's source location, the same
/// information an assertion failure would print.
#[track_caller]
pub(crate) fn fatal<C: Communicator + ?Sized>(comm: &C, err: ProfError) -> ! {
    let location = Location::caller();
    let rank = comm.rank();
    tracing::error!(rank, %location, "{err}");
    comm.abort(&format!(
        "[{rank} treeprof-assert] FAILED: {err} (at {location})"
    ))
}
