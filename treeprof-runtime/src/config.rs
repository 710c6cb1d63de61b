use std::path::PathBuf;

/// Default directory for report sidecars, relative to the working directory.
pub const DEFAULT_REPORT_DIR: &str = "./prof";

/// Output settings for `Profiler::disp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Directory receiving `<label>_time.csv`.
    pub report_dir: PathBuf,
    /// Render the heat index with ANSI colors instead of text markers.
    pub color: bool,
    /// Write the semicolon-delimited sidecar next to the stdout report.
    pub sidecar: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            color: false,
            sidecar: true,
        }
    }
}

impl ProfilerConfig {
    /// Defaults overridden by `TREEPROF_DIR`, `TREEPROF_COLOR` and
    /// `TREEPROF_SIDECAR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("TREEPROF_DIR").filter(|d| !d.is_empty()) {
            config.report_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("TREEPROF_COLOR") {
            config.color = parse_flag(&flag).unwrap_or(config.color);
        }
        if let Some(flag) = lookup("TREEPROF_SIDECAR") {
            config.sidecar = parse_flag(&flag).unwrap_or(config.sidecar);
        }
        config
    }

    /// Path of the sidecar for a profiler labelled `label`.
    pub fn sidecar_path(&self, label: &str) -> PathBuf {
        self.report_dir.join(format!("{label}_time.csv"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
