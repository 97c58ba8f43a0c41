//! Artifact run-directory management (spec.md §6 supplement), grounded on
//! `examples/original_source/src/grinder/ops/artifacts.py`: every reconcile
//! run gets its own `{root}/YYYY-MM-DD/run_{ts_ms}/` directory holding a
//! fixed set of filenames, plus TTL-based cleanup of old date directories.
//!
//! `ts_ms` and `now_ts` are always supplied by the caller rather than read
//! from the wall clock here, matching spec.md §5's "no component reads
//! wall-clock time directly" — the orchestrator is the one place that reads
//! real time and passes it down.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const STDOUT_LOG: &str = "stdout.log";
pub const AUDIT_JSONL: &str = "audit.jsonl";
pub const METRICS_PROM: &str = "metrics.prom";
pub const METRICS_SUMMARY_JSON: &str = "metrics_summary.json";
pub const BUDGET_STATE_JSON: &str = "budget_state.json";

pub const DEFAULT_TTL_DAYS: u32 = 14;

/// Resolved paths for a single reconcile run's artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactRunDir {
    root: PathBuf,
    ttl_days: u32,
    run_dir: PathBuf,
}

/// Outcome of a [`ArtifactRunDir::cleanup_expired`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlCleanupResult {
    pub dirs_checked: u32,
    pub dirs_deleted: u32,
    pub oldest_date_deleted: Option<String>,
    pub errors: Vec<String>,
}

impl ArtifactRunDir {
    /// Derives the run directory for `ts_ms` under `root` as
    /// `root/YYYY-MM-DD/run_{ts_ms}` and creates it. `ts_ms` is the run's
    /// start timestamp, supplied by the caller.
    pub fn open(root: impl Into<PathBuf>, ttl_days: u32, ts_ms: i64) -> io::Result<Self> {
        let root = root.into();
        let date_str = date_from_ts_ms(ts_ms);
        let run_dir = root.join(&date_str).join(format!("run_{ts_ms}"));
        fs::create_dir_all(&run_dir)?;
        info!(path = %run_dir.display(), "artifact run directory created");
        Ok(Self { root, ttl_days, run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.run_dir.join(STDOUT_LOG)
    }

    pub fn audit_jsonl(&self) -> PathBuf {
        self.run_dir.join(AUDIT_JSONL)
    }

    pub fn metrics_prom(&self) -> PathBuf {
        self.run_dir.join(METRICS_PROM)
    }

    pub fn metrics_summary_json(&self) -> PathBuf {
        self.run_dir.join(METRICS_SUMMARY_JSON)
    }

    pub fn budget_state_json(&self) -> PathBuf {
        self.run_dir.join(BUDGET_STATE_JSON)
    }

    /// Writes a human-readable end-of-run summary to `stdout.log`.
    pub fn write_stdout_summary(&self, config_summary: &[(&str, String)], exit_code: i32) -> io::Result<()> {
        let mut lines = vec![
            "=".repeat(60),
            "  GRINDER RECONCILE RUN SUMMARY".to_string(),
            "=".repeat(60),
            String::new(),
            "Config:".to_string(),
        ];
        let mut sorted = config_summary.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in sorted {
            lines.push(format!("  {key}: {value}"));
        }
        lines.push(String::new());
        lines.push("Artifact Paths:".to_string());
        lines.push(format!("  run_dir: {}", self.run_dir.display()));
        lines.push(format!("  audit: {}", self.audit_jsonl().display()));
        lines.push(format!("  metrics: {}", self.metrics_prom().display()));
        lines.push(format!("  budget_state: {}", self.budget_state_json().display()));
        lines.push(String::new());
        lines.push("=".repeat(60));
        lines.push(format!("EXIT CODE: {exit_code}"));
        lines.push("=".repeat(60));

        fs::write(self.stdout_log(), lines.join("\n") + "\n")
    }

    /// Copies the live budget state file into this run's directory, if one
    /// exists. A missing source is not an error — a fresh deployment may not
    /// have written one yet.
    pub fn copy_budget_state(&self, source_path: &str) -> io::Result<bool> {
        let source = Path::new(source_path);
        if !source.exists() {
            debug!(path = source_path, "no budget state file to copy into run dir");
            return Ok(true);
        }
        fs::copy(source, self.budget_state_json())?;
        Ok(true)
    }

    /// Deletes date-named directories under `root` older than `now_ts - ttl_days`.
    /// `ttl_days == 0` disables cleanup entirely.
    pub fn cleanup_expired(&self, now_ts: i64) -> TtlCleanupResult {
        cleanup_old_runs(&self.root, self.ttl_days, now_ts)
    }
}

fn cleanup_old_runs(root: &Path, ttl_days: u32, now_ts: i64) -> TtlCleanupResult {
    let mut result = TtlCleanupResult::default();

    if ttl_days == 0 {
        debug!("artifact TTL cleanup disabled (ttl_days=0)");
        return result;
    }
    if !root.exists() {
        debug!(root = %root.display(), "artifact TTL cleanup skipped: root does not exist");
        return result;
    }

    let cutoff = now_ts - i64::from(ttl_days) * 86_400;

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            result.errors.push(format!("failed to scan {}: {e}", root.display()));
            return result;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for date_dir in dirs {
        let Some(name) = date_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(dir_ts) = epoch_seconds_from_date(name) else {
            continue;
        };
        result.dirs_checked += 1;

        if dir_ts < cutoff {
            if result.oldest_date_deleted.as_deref().is_none_or(|oldest| name < oldest) {
                result.oldest_date_deleted = Some(name.to_string());
            }
            let run_count = fs::read_dir(&date_dir)
                .map(|it| it.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count())
                .unwrap_or(0);
            match fs::remove_dir_all(&date_dir) {
                Ok(()) => {
                    result.dirs_deleted += run_count as u32;
                    info!(date_dir = %date_dir.display(), runs = run_count, "artifact TTL cleanup deleted date directory");
                }
                Err(e) => {
                    let msg = format!("failed to delete {}: {e}", date_dir.display());
                    error!("{msg}");
                    result.errors.push(msg);
                }
            }
        }
    }

    result
}

fn date_from_ts_ms(ts_ms: i64) -> String {
    let days = ts_ms.div_euclid(86_400_000);
    format_date(days)
}

fn epoch_seconds_from_date(date_str: &str) -> Option<i64> {
    let parts: Vec<&str> = date_str.splitn(3, '-').collect();
    if parts.len() != 3 {
        return None;
    }
    let year: i64 = parts[0].parse().ok()?;
    let month: i64 = parts[1].parse().ok()?;
    let day: i64 = parts[2].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(days_from_civil(year, month, day) * 86_400)
}

/// Civil-to-days conversion (Howard Hinnant's algorithm), used so this
/// module needs no wall-clock or calendar crate of its own.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn format_date(days_since_epoch: i64) -> String {
    let z = days_since_epoch + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn open_creates_date_and_run_subdirectories() {
        let root = tempdir().unwrap();
        let ts_ms = 1_800_000_000_000i64;
        let run = ArtifactRunDir::open(root.path(), 14, ts_ms).unwrap();
        assert!(run.run_dir().exists());
        assert!(run.run_dir().starts_with(root.path()));
        assert!(run.run_dir().to_string_lossy().contains(&format!("run_{ts_ms}")));
    }

    #[test]
    fn fixed_filenames_are_under_run_dir() {
        let root = tempdir().unwrap();
        let run = ArtifactRunDir::open(root.path(), 14, 1_800_000_000_000).unwrap();
        assert_eq!(run.stdout_log(), run.run_dir().join(STDOUT_LOG));
        assert_eq!(run.audit_jsonl(), run.run_dir().join(AUDIT_JSONL));
        assert_eq!(run.metrics_prom(), run.run_dir().join(METRICS_PROM));
        assert_eq!(run.metrics_summary_json(), run.run_dir().join(METRICS_SUMMARY_JSON));
        assert_eq!(run.budget_state_json(), run.run_dir().join(BUDGET_STATE_JSON));
    }

    #[test]
    fn write_stdout_summary_produces_readable_file() {
        let root = tempdir().unwrap();
        let run = ArtifactRunDir::open(root.path(), 14, 1_800_000_000_000).unwrap();
        run.write_stdout_summary(&[("safe_mode", "paper".to_string())], 0).unwrap();
        let contents = fs::read_to_string(run.stdout_log()).unwrap();
        assert!(contents.contains("safe_mode: paper"));
        assert!(contents.contains("EXIT CODE: 0"));
    }

    #[test]
    fn copy_budget_state_is_noop_when_source_missing() {
        let root = tempdir().unwrap();
        let run = ArtifactRunDir::open(root.path(), 14, 1_800_000_000_000).unwrap();
        assert!(run.copy_budget_state("/nonexistent/budget.json").unwrap());
        assert!(!run.budget_state_json().exists());
    }

    #[test]
    fn cleanup_expired_removes_only_directories_past_ttl() {
        let root = tempdir().unwrap();
        let ttl_days = 14;
        let now_ts_ms = 1_800_000_000_000i64;
        let now_ts = now_ts_ms / 1000;

        let old_ts_ms = now_ts_ms - 30 * DAY_MS;
        let recent_ts_ms = now_ts_ms - 1 * DAY_MS;

        let old_run = ArtifactRunDir::open(root.path(), ttl_days, old_ts_ms).unwrap();
        let recent_run = ArtifactRunDir::open(root.path(), ttl_days, recent_ts_ms).unwrap();

        let result = ArtifactRunDir::open(root.path(), ttl_days, now_ts_ms)
            .unwrap()
            .cleanup_expired(now_ts);

        assert!(result.dirs_deleted >= 1);
        assert!(!old_run.run_dir().exists());
        assert!(recent_run.run_dir().exists());
    }

    #[test]
    fn cleanup_disabled_when_ttl_zero() {
        let root = tempdir().unwrap();
        let now_ts_ms = 1_800_000_000_000i64;
        let old_ts_ms = now_ts_ms - 365 * DAY_MS;
        let old_run = ArtifactRunDir::open(root.path(), 0, old_ts_ms).unwrap();

        let result = ArtifactRunDir::open(root.path(), 0, now_ts_ms)
            .unwrap()
            .cleanup_expired(now_ts_ms / 1000);

        assert_eq!(result.dirs_deleted, 0);
        assert!(old_run.run_dir().exists());
    }

    #[test]
    fn date_from_ts_roundtrips_through_civil_conversion() {
        assert_eq!(date_from_ts_ms(1_800_000_000_000), "2027-01-15");
    }
}
