//! Reading and comparing the `<label>_time.csv` sidecars written by
//! `treeprof-runtime`.

pub mod error;
pub mod report;
