//! Persistence boundary for workflow state and final reports.
//!
//! Layout under the storage root:
//!
//! ```text
//! sessions/workflow_<key>.json      latest state, replaced atomically
//! sessions/workflow_<key>.lock      advisory lock held while a run executes
//! reports/workflow_report_<key>_<YYYYmmdd_HHMMSS>[_<n>].json
//! ```
//!
//! `<key>` is the percent-encoded subject id (see [`subject_key`]), so
//! distinct subjects never share a file.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::manager::FinalResults;
use super::state::WorkflowState;
use crate::errors::StoreError;

/// Held for the length of a run; dropping it lets the next run in.
pub type RunLock = Box<dyn Send>;

/// Loads and saves the single latest state record per subject.
pub trait StateStore: Send + Sync {
    fn save_state(&self, state: &WorkflowState) -> Result<(), StoreError>;

    /// The persisted state, or a fresh unstarted one when none exists.
    fn load_state(&self, subject_id: &str) -> Result<WorkflowState, StoreError>;

    /// Keep other processes off `subject_id` while a run executes.
    fn acquire_run(&self, _subject_id: &str) -> Result<RunLock, StoreError> {
        Ok(Box::new(()))
    }
}

/// Writes immutable final-result reports.
pub trait ReportStore: Send + Sync {
    fn save_report(
        &self,
        subject_id: &str,
        at: DateTime<Utc>,
        results: &FinalResults,
    ) -> Result<PathBuf, StoreError>;
}

/// JSON-file implementation of both stores.
#[derive(Debug, Clone)]
pub struct FileStore {
    sessions_dir: PathBuf,
    reports_dir: PathBuf,
}

/// Exclusive advisory lock on one subject; released on drop.
#[derive(Debug)]
pub struct SubjectLock {
    file: fs::File,
    path: PathBuf,
}

impl SubjectLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SubjectLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    pub fn new(sessions_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    /// Store rooted at `root`, using its `sessions/` and `reports/` children.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("sessions"), root.join("reports"))
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn state_path(&self, subject_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("workflow_{}.json", subject_key(subject_id)))
    }

    fn lock_path(&self, subject_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("workflow_{}.lock", subject_key(subject_id)))
    }

    /// Take the cross-process lock for `subject_id` without blocking.
    pub fn lock_subject(&self, subject_id: &str) -> Result<SubjectLock, StoreError> {
        ensure_dir(&self.sessions_dir)?;
        let path = self.lock_path(subject_id);
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive().map_err(|_| StoreError::Locked {
            subject: subject_id.to_string(),
        })?;
        Ok(SubjectLock { file, path })
    }

    /// Report files for `subject_id`, most recent first.
    pub fn list_reports(&self, subject_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        if !self.reports_dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("workflow_report_{}_", subject_key(subject_id));
        let entries = fs::read_dir(&self.reports_dir).map_err(|source| StoreError::Read {
            path: self.reports_dir.clone(),
            source,
        })?;

        let mut reports: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(&prefix))
                    .is_some_and(is_report_suffix)
            })
            .collect();
        reports.sort();
        reports.reverse();
        Ok(reports)
    }

    pub fn load_report(&self, path: &Path) -> Result<FinalResults, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl StateStore for FileStore {
    fn save_state(&self, state: &WorkflowState) -> Result<(), StoreError> {
        ensure_dir(&self.sessions_dir)?;
        let path = self.state_path(state.subject_id());
        let json = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;

        // Write beside the target, then rename over it.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), status = %state.status(), "saved workflow state");
        Ok(())
    }

    fn load_state(&self, subject_id: &str) -> Result<WorkflowState, StoreError> {
        let path = self.state_path(subject_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(WorkflowState::new(subject_id));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let state: WorkflowState =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if state.subject_id() != subject_id {
            return Err(StoreError::Invalid {
                path,
                reason: format!(
                    "record belongs to subject '{}', not '{}'",
                    state.subject_id(),
                    subject_id
                ),
            });
        }
        state
            .validate()
            .map_err(|reason| StoreError::Invalid { path, reason })?;
        Ok(state)
    }

    fn acquire_run(&self, subject_id: &str) -> Result<RunLock, StoreError> {
        Ok(Box::new(self.lock_subject(subject_id)?))
    }
}

impl ReportStore for FileStore {
    fn save_report(
        &self,
        subject_id: &str,
        at: DateTime<Utc>,
        results: &FinalResults,
    ) -> Result<PathBuf, StoreError> {
        ensure_dir(&self.reports_dir)?;
        let json = serde_json::to_string_pretty(results).map_err(StoreError::Serialize)?;
        let stem = format!(
            "workflow_report_{}_{}",
            subject_key(subject_id),
            at.format("%Y%m%d_%H%M%S")
        );

        // Reports are never overwritten; same-second reports get a suffix.
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, attempt)
            };
            let path = self.reports_dir.join(name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())
                        .map_err(|source| StoreError::Write {
                            path: path.clone(),
                            source,
                        })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(StoreError::Write { path, source }),
            }
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|source| StoreError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

/// Injective, path-safe encoding of a subject id for file and directory names.
///
/// Everything outside the URL-unreserved set is percent-encoded, so `/`
/// and `%` never appear raw. Ids made only of dots are encoded fully so
/// they cannot name `.` or `..`; the empty id becomes a lone `%`, which no
/// other id encodes to.
pub fn subject_key(subject_id: &str) -> String {
    let encoded = urlencoding::encode(subject_id);
    if encoded.is_empty() {
        return "%".to_string();
    }
    if encoded.chars().all(|c| c == '.') {
        return encoded.replace('.', "%2E");
    }
    encoded.into_owned()
}

/// `<YYYYmmdd>_<HHMMSS>[_<n>].json`, the part of a report name after the subject.
fn is_report_suffix(rest: &str) -> bool {
    let Some(stem) = rest.strip_suffix(".json") else {
        return false;
    };
    let digits = |s: &str, len: Option<usize>| {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && len.is_none_or(|l| s.len() == l)
    };
    let parts: Vec<&str> = stem.split('_').collect();
    match parts.as_slice() {
        [date, time] => digits(date, Some(8)) && digits(time, Some(6)),
        [date, time, n] => digits(date, Some(8)) && digits(time, Some(6)) && digits(n, None),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::state::WorkflowStatus;
    use seoflow_common::{PhaseId, PhaseOutput, Profile};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (FileStore, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        (FileStore::under(dir.path()), dir)
    }

    #[test]
    fn test_load_missing_state_is_fresh() {
        let (store, _dir) = setup();
        let state = store.load_state("u1").unwrap();
        assert_eq!(state.status(), WorkflowStatus::NotStarted);
        assert_eq!(state.subject_id(), "u1");
    }

    #[test]
    fn test_save_then_load_roundtrips() {
        let (store, _dir) = setup();
        let mut state = WorkflowState::started("u1", vec!["a".into()], Profile::new());
        state.begin_phase(PhaseId::Tuning).unwrap();
        state
            .complete_phase(PhaseOutput::success(PhaseId::Tuning, json!({"final_keywords": ["a"]})))
            .unwrap();
        store.save_state(&state).unwrap();

        let loaded = store.load_state("u1").unwrap();
        assert_eq!(loaded, state);
        assert!(!store.state_path("u1").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let (store, _dir) = setup();
        let first = WorkflowState::started("u1", vec!["a".into()], Profile::new());
        store.save_state(&first).unwrap();
        let second = WorkflowState::started("u1", vec!["b".into()], Profile::new());
        store.save_state(&second).unwrap();
        assert_eq!(store.load_state("u1").unwrap().initial_keywords(), &["b"]);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let (store, _dir) = setup();
        fs::create_dir_all(store.sessions_dir()).unwrap();
        fs::write(store.state_path("u1"), "{ not json").unwrap();
        assert!(matches!(
            store.load_state("u1"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        let (store, _dir) = setup();
        let mut value = serde_json::to_value(WorkflowState::new("u1")).unwrap();
        value["status"] = json!("completed");
        fs::create_dir_all(store.sessions_dir()).unwrap();
        fs::write(store.state_path("u1"), value.to_string()).unwrap();
        assert!(matches!(
            store.load_state("u1"),
            Err(StoreError::Invalid { .. })
        ));
    }

    #[test]
    fn test_subject_id_is_encoded_in_paths() {
        let (store, _dir) = setup();
        let path = store.state_path("../evil/user");
        assert_eq!(path.parent().unwrap(), store.sessions_dir());
        assert!(path.ends_with("workflow_..%2Fevil%2Fuser.json"));
    }

    #[test]
    fn test_subject_key_is_injective_and_path_safe() {
        assert_ne!(subject_key("john.doe"), subject_key("john_doe"));
        assert_ne!(subject_key("a/b"), subject_key("a%2Fb"));
        assert_eq!(subject_key(".."), "%2E%2E");
        assert_eq!(subject_key("."), "%2E");
        assert_eq!(subject_key(""), "%");
        assert_eq!(subject_key("acme-co_1"), "acme-co_1");
    }

    #[test]
    fn test_similar_subjects_do_not_share_state() {
        let (store, _dir) = setup();
        let state = WorkflowState::started("john.doe", vec!["secret kw".into()], Profile::new());
        store.save_state(&state).unwrap();

        assert_ne!(store.state_path("john.doe"), store.state_path("john_doe"));
        let other = store.load_state("john_doe").unwrap();
        assert_eq!(other.subject_id(), "john_doe");
        assert_eq!(other.status(), WorkflowStatus::NotStarted);
        assert!(other.initial_keywords().is_empty());
    }

    #[test]
    fn test_record_for_another_subject_is_rejected() {
        let (store, _dir) = setup();
        let state = WorkflowState::started("u2", vec!["a".into()], Profile::new());
        fs::create_dir_all(store.sessions_dir()).unwrap();
        fs::write(
            store.state_path("u1"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();
        match store.load_state("u1") {
            Err(StoreError::Invalid { reason, .. }) => assert!(reason.contains("'u2'")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_reports_are_listed_per_exact_subject() {
        let (store, _dir) = setup();
        let at = Utc::now();
        store
            .save_report("u1_x", at, &FinalResults::rejected("u1_x", "x"))
            .unwrap();
        assert!(store.list_reports("u1").unwrap().is_empty());

        let own = store
            .save_report("u1", at, &FinalResults::rejected("u1", "own"))
            .unwrap();
        assert_eq!(store.list_reports("u1").unwrap(), vec![own]);
        assert_eq!(store.list_reports("u1_x").unwrap().len(), 1);
    }

    #[test]
    fn test_report_suffix_grammar() {
        assert!(is_report_suffix("20261018_180332.json"));
        assert!(is_report_suffix("20261018_180332_2.json"));
        assert!(!is_report_suffix("x_20261018_180332.json"));
        assert!(!is_report_suffix("20261018_180332_20261019_101010.json"));
        assert!(!is_report_suffix("20261018_180332.json.tmp"));
    }

    #[test]
    fn test_reports_are_never_overwritten() {
        let (store, _dir) = setup();
        let results = FinalResults::rejected("u1", "boom");
        let at = Utc::now();
        let first = store.save_report("u1", at, &results).unwrap();
        let second = store.save_report("u1", at, &results).unwrap();
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("workflow_report_u1_"));
        assert_eq!(store.list_reports("u1").unwrap().len(), 2);
        assert!(store.list_reports("u2").unwrap().is_empty());

        let loaded = store.load_report(&first).unwrap();
        assert_eq!(loaded.rejected.as_deref(), Some("boom"));
    }

    #[test]
    fn test_subject_lock_is_exclusive() {
        let (store, _dir) = setup();
        let held = store.lock_subject("u1").unwrap();
        assert!(matches!(
            store.lock_subject("u1"),
            Err(StoreError::Locked { .. })
        ));
        assert!(store.lock_subject("u2").is_ok());
        drop(held);
        assert!(store.lock_subject("u1").is_ok());
    }

    #[test]
    fn test_acquire_run_holds_subject_lock() {
        let (store, _dir) = setup();
        let run = store.acquire_run("u1").unwrap();
        assert!(store.acquire_run("u1").is_err());
        drop(run);
        assert!(store.acquire_run("u1").is_ok());
    }
}
