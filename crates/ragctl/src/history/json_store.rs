//! Directory of JSON documents, one `<run_id>.json` per run
//!
//! Records are written to a temporary file in the same directory, synced and
//! renamed over the destination, so a crash never leaves a half-written run.
//! Id claims are empty marker files under `.claims/` created with `create_new`.
//! A marker is removed once its record is saved; from then on the record
//! itself holds the id.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::run_id::is_valid_run_id;
use super::store::{sort_chronologically, HistoryStore};
use crate::error::{Error, Result};
use crate::types::PipelineRun;

const CLAIMS_DIR: &str = ".claims";
const RECORD_EXTENSION: &str = "json";

/// JSON-file history store
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    dir: PathBuf,
}

impl JsonHistoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `run_id`
    pub fn record_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", run_id, RECORD_EXTENSION))
    }

    fn claims_dir(&self) -> PathBuf {
        self.dir.join(CLAIMS_DIR)
    }

    fn release_claim(&self, run_id: &str) {
        match fs::remove_file(self.claims_dir().join(run_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove claim marker for {}: {}", run_id, e),
        }
    }

    fn read_record(&self, path: &Path, run_id: &str) -> Result<PipelineRun> {
        let bytes = fs::read(path)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_record(run_id, e.to_string()))?;
        let run = PipelineRun::from_value(value)?;
        if run.run_id != run_id {
            return Err(Error::invalid_record(
                run_id,
                format!("record is stored under the wrong id (contains '{}')", run.run_id),
            ));
        }
        Ok(run)
    }
}

impl HistoryStore for JsonHistoryStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn claim_run_id(&self, run_id: &str) -> Result<bool> {
        if !is_valid_run_id(run_id) {
            return Err(Error::validation(format!("invalid run id '{}'", run_id)));
        }
        let claims = self.claims_dir();
        fs::create_dir_all(&claims)?;
        let marker = claims.join(run_id);
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        // Checked after the marker exists: a saver writes the record before
        // dropping its marker
        if self.record_path(run_id).exists() {
            self.release_claim(run_id);
            return Ok(false);
        }
        Ok(true)
    }

    fn save_run(&self, run: &PipelineRun) -> Result<()> {
        if !is_valid_run_id(&run.run_id) {
            return Err(Error::validation(format!("invalid run id '{}'", run.run_id)));
        }
        run.validate()?;

        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec_pretty(run)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(&run.run_id))
            .map_err(|e| Error::Io(e.error))?;
        self.release_claim(&run.run_id);

        tracing::debug!("Saved run {} to {}", run.run_id, self.dir.display());
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        if !is_valid_run_id(run_id) {
            return Ok(None);
        }
        let path = self.record_path(run_id);
        match self.read_record(&path, run_id) {
            Ok(run) => Ok(Some(run)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_runs(&self) -> Result<Vec<PipelineRun>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION)
            {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self.read_record(&path, run_id) {
                Ok(run) => runs.push(run),
                Err(e) => tracing::warn!("Skipping unreadable history record {}: {}", path.display(), e),
            }
        }

        sort_chronologically(&mut runs);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OperatingMode;
    use crate::types::{FileResult, FileStatus, Metadata, PipelineStatus, RunConfig};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonHistoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(tmp.path().join("history")).unwrap();
        (tmp, store)
    }

    fn finished_run(run_id: &str, second: u32, success: usize, failed: usize) -> PipelineRun {
        let mut run = PipelineRun::new(run_id, success + failed, OperatingMode::AutoContinue, RunConfig::new());
        run.timestamp = Utc.with_ymd_and_hms(2025, 1, 30, 12, 0, second).unwrap();
        run.start().unwrap();
        for i in 0..success {
            run.record(FileResult::success(
                Path::new(&format!("/data/ok{}.txt", i)),
                1,
                0.1,
                Metadata::new(),
            ))
            .unwrap();
        }
        for i in 0..failed {
            run.record(FileResult::failed(
                Path::new(&format!("/data/bad{}.txt", i)),
                "Parse error",
                "ParseError",
                0.1,
            ))
            .unwrap();
        }
        run.finish(1.0).unwrap();
        run
    }

    #[test]
    fn test_creates_directory() {
        let (_tmp, store) = store();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_create_run_is_not_persisted() {
        let (_tmp, store) = store();
        let run = store.create_run(10, OperatingMode::Interactive, RunConfig::new()).unwrap();

        assert!(run.run_id.starts_with("run_"));
        assert_eq!(run.total_files, 10);
        assert_eq!(run.mode, OperatingMode::Interactive);
        assert_eq!(run.status, PipelineStatus::Initializing);
        assert!(store.get_run(&run.run_id).unwrap().is_none());
        assert!(store.list_runs().unwrap().is_empty());
    }

    #[test]
    fn test_create_run_ids_are_unique() {
        let (_tmp, store) = store();
        let ids: Vec<String> = (0..5)
            .map(|_| store.create_run(1, OperatingMode::AutoContinue, RunConfig::new()).unwrap().run_id)
            .collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_save_releases_claim_marker() {
        let (_tmp, store) = store();
        let mut run = store.create_run(1, OperatingMode::AutoContinue, RunConfig::new()).unwrap();
        assert!(store.claims_dir().join(&run.run_id).exists());

        run.start().unwrap();
        run.record(FileResult::success(Path::new("a.txt"), 1, 0.1, Metadata::new())).unwrap();
        run.finish(0.1).unwrap();
        store.save_run(&run).unwrap();

        assert_eq!(fs::read_dir(store.claims_dir()).unwrap().count(), 0);
        assert!(!store.claim_run_id(&run.run_id).unwrap());
        assert_eq!(fs::read_dir(store.claims_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_claim_refuses_persisted_id() {
        let (_tmp, store) = store();
        store.save_run(&finished_run("run_saved", 0, 1, 0)).unwrap();
        assert!(!store.claim_run_id("run_saved").unwrap());
        assert!(store.claim_run_id("run_fresh").unwrap());
        assert!(!store.claim_run_id("run_fresh").unwrap());
    }

    #[test]
    fn test_save_writes_record_file() {
        let (_tmp, store) = store();
        let run = finished_run("run_20250130_120000", 0, 5, 0);
        store.save_run(&run).unwrap();

        let path = store.record_path(&run.run_id);
        assert!(path.exists());
        let data: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(data["run_id"], "run_20250130_120000");
        assert_eq!(data["status"], "done");
        assert_eq!(data["files"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_save_overwrites() {
        let (_tmp, store) = store();
        let mut run = PipelineRun::new("run_x", 1, OperatingMode::AutoContinue, RunConfig::new());
        store.save_run(&run).unwrap();
        run.start().unwrap();
        run.record(FileResult::success(Path::new("a.txt"), 2, 0.1, Metadata::new())).unwrap();
        run.finish(0.1).unwrap();
        store.save_run(&run).unwrap();

        let loaded = store.get_run("run_x").unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(store.list_runs().unwrap().len(), 1);
    }

    #[test]
    fn test_save_rejects_invalid_run() {
        let (_tmp, store) = store();
        let mut run = finished_run("run_bad", 0, 1, 0);
        run.success = 5;
        assert!(store.save_run(&run).is_err());
        assert!(!store.record_path("run_bad").exists());
    }

    #[test]
    fn test_save_recreates_missing_directory() {
        let (_tmp, store) = store();
        fs::remove_dir_all(store.dir()).unwrap();
        store.save_run(&finished_run("run_again", 0, 1, 0)).unwrap();
        assert!(store.get_run("run_again").unwrap().is_some());
    }

    #[test]
    fn test_get_run_missing_and_invalid_ids() {
        let (_tmp, store) = store();
        assert!(store.get_run("nonexistent_run").unwrap().is_none());
        assert!(store.get_run("../outside").unwrap().is_none());
    }

    #[test]
    fn test_get_run_corrupt_record_is_an_error() {
        let (_tmp, store) = store();
        fs::write(store.record_path("run_corrupt"), b"{not json").unwrap();
        assert!(matches!(
            store.get_run("run_corrupt"),
            Err(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_list_runs_chronological_and_skips_garbage() {
        let (_tmp, store) = store();
        assert!(store.list_runs().unwrap().is_empty());

        for (id, second) in [("run_c", 2), ("run_a", 0), ("run_b", 1)] {
            store.save_run(&finished_run(id, second, 1, 0)).unwrap();
        }
        fs::write(store.record_path("run_garbage"), b"[]").unwrap();
        fs::write(store.dir().join("notes.txt"), b"ignore me").unwrap();

        let ids: Vec<String> = store.list_runs().unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["run_a", "run_b", "run_c"]);
    }

    #[test]
    fn test_last_failed_run() {
        let (_tmp, store) = store();
        assert!(store.get_last_failed_run().unwrap().is_none());

        store.save_run(&finished_run("run_1", 0, 2, 1)).unwrap();
        store.save_run(&finished_run("run_2", 1, 3, 2)).unwrap();
        store.save_run(&finished_run("run_3", 2, 4, 0)).unwrap();

        let last = store.get_last_failed_run().unwrap().unwrap();
        assert_eq!(last.run_id, "run_2");
        assert_eq!(store.latest_run().unwrap().unwrap().run_id, "run_3");
    }

    #[test]
    fn test_last_failed_run_absent_when_all_clean() {
        let (_tmp, store) = store();
        for i in 0..4 {
            store.save_run(&finished_run(&format!("run_{}", i), i, 3, 0)).unwrap();
        }
        assert!(store.get_last_failed_run().unwrap().is_none());
    }

    #[test]
    fn test_failed_files_in_order() {
        let (_tmp, store) = store();
        let mut run = PipelineRun::new("run_mixed", 4, OperatingMode::AutoContinue, RunConfig::new());
        run.start().unwrap();
        run.record(FileResult::failed(Path::new("/d/one.txt"), "e1", "ParseError", 0.1)).unwrap();
        run.record(FileResult::success(Path::new("/d/two.txt"), 1, 0.1, Metadata::new())).unwrap();
        run.record(FileResult::skipped(Path::new("/d/three.txt"), "auto-skip: e3")).unwrap();
        run.record(FileResult::failed(Path::new("/d/four.txt"), "e4", "ParseError", 0.1)).unwrap();
        run.finish(0.4).unwrap();
        store.save_run(&run).unwrap();

        let failed = store.get_failed_files("run_mixed").unwrap();
        let names: Vec<&str> = failed.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["one.txt", "three.txt", "four.txt"]);
        assert!(failed.iter().all(|f| f.status != FileStatus::Success));

        assert!(store.get_failed_files("run_unknown").unwrap().is_empty());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_tmp, store) = store();
        store.save_run(&finished_run("run_clean", 0, 1, 0)).unwrap();
        let stray: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) != Some("json"))
            .collect();
        assert!(stray.is_empty());
    }
}
