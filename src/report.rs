use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Suffix of the sidecar written by `Profiler::disp`.
pub const REPORT_SUFFIX: &str = "_time.csv";

/// A report loaded from a `<label>_time.csv` sidecar.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub label: String,
    pub rows: Vec<Row>,
}

/// One region of a report, in depth-first order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Row {
    pub name: String,
    pub level: usize,
    pub mean_s: f64,
    pub percent: f64,
    pub per_call_s: f64,
    pub mean_count: f64,
    pub min_s: f64,
    pub max_s: f64,
    pub std_s: f64,
    pub min_count: u64,
    pub max_count: u64,
}

impl Row {
    /// No rank ever ran this region.
    pub fn is_ghost(&self) -> bool {
        self.max_count == 0
    }
}

/// Read a report from its sidecar file. The label is the file name without
/// the `_time.csv` suffix.
pub fn load_report(path: &Path) -> Result<Report, Error> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::ReportReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let label = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(REPORT_SUFFIX).unwrap_or(n))
        .unwrap_or_default()
        .to_owned();
    let rows = parse_rows(&contents).map_err(|(line, reason)| Error::InvalidReportData {
        path: path.to_path_buf(),
        line,
        reason,
    })?;
    Ok(Report { label, rows })
}

/// Parse sidecar lines. Errors carry the 1-based line number.
fn parse_rows(contents: &str) -> Result<Vec<Row>, (usize, String)> {
    let mut rows: Vec<Row> = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let lineno = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_row(line).map_err(|reason| (lineno, reason))?;
        let max_level = rows.last().map_or(1, |prev| prev.level + 1);
        if row.level == 0 || row.level > max_level {
            return Err((
                lineno,
                format!("level {} cannot follow level {}", row.level, max_level - 1),
            ));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_row(line: &str) -> Result<Row, String> {
    // Region names may themselves contain ';', so split from the right.
    let mut fields: Vec<&str> = line.rsplitn(11, ';').collect();
    if fields.len() != 11 {
        return Err(format!("expected 11 fields, found {}", fields.len()));
    }
    fields.reverse();

    fn float(field: &str, what: &str) -> Result<f64, String> {
        field
            .trim()
            .parse()
            .map_err(|_| format!("{what} is not a number: {field:?}"))
    }
    fn int<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, String> {
        field
            .trim()
            .parse()
            .map_err(|_| format!("{what} is not an integer: {field:?}"))
    }

    Ok(Row {
        name: fields[0].to_owned(),
        level: int(fields[1], "level")?,
        mean_s: float(fields[2], "mean time")?,
        percent: float(fields[3], "percent")?,
        per_call_s: float(fields[4], "time per call")?,
        mean_count: float(fields[5], "mean count")?,
        min_s: float(fields[6], "min time")?,
        max_s: float(fields[7], "max time")?,
        std_s: float(fields[8], "std time")?,
        min_count: int(fields[9], "min count")?,
        max_count: int(fields[10], "max count")?,
    })
}

/// Full path of every row, `parent/child`, in file order.
pub fn region_paths(report: &Report) -> Vec<(String, &Row)> {
    let mut stack: Vec<&str> = Vec::new();
    report
        .rows
        .iter()
        .map(|row| {
            stack.truncate(row.level.saturating_sub(1));
            stack.push(&row.name);
            (stack.join("/"), row)
        })
        .collect()
}

/// Format a report as an indented text table in file (call-tree) order.
pub fn format_table(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("report: {}\n", report.label));
    out.push_str(&format!(
        "{:<44} {:>8} {:>10} {:>8} {:>10} {:>10} {:>10}\n",
        "Region", "Calls", "Mean", "%", "Min", "Max", "Std"
    ));
    out.push_str(&format!("{}\n", "-".repeat(106)));

    for row in &report.rows {
        let label = format!("{}{}", "  ".repeat(row.level.saturating_sub(1)), row.name);
        if row.is_ghost() {
            out.push_str(&format!("{label:<44} {:>8}\n", "never"));
            continue;
        }
        out.push_str(&format!(
            "{:<44} {:>8} {:>9.4}s {:>7.2}% {:>9.4}s {:>9.4}s {:>9.4}s\n",
            label, row.max_count, row.mean_s, row.percent, row.min_s, row.max_s, row.std_s
        ));
    }
    out
}

/// Show the change in mean time between two reports, matching regions by
/// their full path.
pub fn diff_reports(a: &Report, b: &Report) -> String {
    let a_map: BTreeMap<String, &Row> = region_paths(a).into_iter().collect();
    let b_map: BTreeMap<String, &Row> = region_paths(b).into_iter().collect();

    let mut paths: Vec<&str> = a_map
        .keys()
        .chain(b_map.keys())
        .map(String::as_str)
        .collect();
    paths.sort_unstable();
    paths.dedup();

    let mut out = String::new();
    out.push_str(&format!(
        "{:<52} {:>10} {:>10} {:>10}\n",
        "Region", "Before", "After", "Delta"
    ));
    out.push_str(&format!("{}\n", "-".repeat(86)));

    for path in paths {
        let before = a_map.get(path).map_or(0.0, |r| r.mean_s);
        let after = b_map.get(path).map_or(0.0, |r| r.mean_s);
        out.push_str(&format!(
            "{:<52} {:>9.4}s {:>9.4}s {:>+9.4}s\n",
            path,
            before,
            after,
            after - before
        ));
    }
    out
}

/// Find the most recently modified `*_time.csv` in `dir`.
pub fn latest_report(dir: &Path) -> Result<PathBuf, Error> {
    let entries = std::fs::read_dir(dir).map_err(|source| Error::ReportReadError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(REPORT_SUFFIX));
        if !is_report || !path.is_file() {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        if best.as_ref().is_none_or(|(_, t)| mtime > *t) {
            best = Some((path, mtime));
        }
    }
    best.map(|(p, _)| p)
        .ok_or_else(|| Error::NoReports(dir.to_path_buf()))
}
