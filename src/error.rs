use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no treeprof reports found in {} -- run an instrumented program or `treeprof demo` first", .0.display())]
    NoReports(PathBuf),

    #[error("failed to read report file {}: {source}", path.display())]
    ReportReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid report data in {} line {line}: {reason}", path.display())]
    InvalidReportData {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("a process group needs at least one rank")]
    NoRanks,

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
