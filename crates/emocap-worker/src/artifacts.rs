//! On-disk artifact pruning for capture and audio directories.
//!
//! Deletion is best effort: files may appear or vanish under us while a
//! writer is active, and a failed delete is logged and skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::metrics;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a"];

/// A pruned directory and the file types it owns.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    pub name: String,
    pub path: PathBuf,
    pub extensions: &'static [&'static str],
}

impl ArtifactDir {
    pub fn images(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "pictures".to_string(),
            path: path.into(),
            extensions: IMAGE_EXTENSIONS,
        }
    }

    pub fn audio(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "voices".to_string(),
            path: path.into(),
            extensions: AUDIO_EXTENSIONS,
        }
    }

    fn owns(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Owned files, oldest first.
    fn list(&self) -> Vec<ArtifactFile> {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.path.display(), error = %e, "Artifact directory unreadable");
                return Vec::new();
            }
        };

        let mut files: Vec<ArtifactFile> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.owns(path))
            .filter_map(|path| {
                let meta = std::fs::metadata(&path).ok()?;
                Some(ArtifactFile {
                    modified: meta.modified().ok()?,
                    size: meta.len(),
                    path,
                })
            })
            .collect();
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        files
    }
}

#[derive(Debug, Clone)]
struct ArtifactFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Per-directory result of a prune.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub expired: usize,
    pub over_cap: usize,
    pub bytes_freed: u64,
}

impl PruneReport {
    pub fn deleted(&self) -> usize {
        self.expired + self.over_cap
    }
}

/// Running totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactStats {
    pub sweeps: u64,
    pub files_deleted: BTreeMap<String, u64>,
    pub bytes_freed: u64,
    pub last_sweep: Option<DateTime<Utc>>,
}

/// Current contents of a directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryStats {
    pub name: String,
    pub files: usize,
    pub total_bytes: u64,
    pub oldest_age: Option<Duration>,
    pub newest_age: Option<Duration>,
}

pub struct ArtifactGovernor {
    dirs: Vec<ArtifactDir>,
    max_age: Duration,
    max_files: usize,
    sweep_interval: Duration,
    stats: Mutex<ArtifactStats>,
}

impl ArtifactGovernor {
    pub fn new(dirs: Vec<ArtifactDir>, max_age: Duration, max_files: usize, sweep_interval: Duration) -> Self {
        Self {
            dirs,
            max_age,
            max_files,
            sweep_interval,
            stats: Mutex::new(ArtifactStats::default()),
        }
    }

    /// Capture and audio directories from the worker config.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            vec![
                ArtifactDir::images(&config.capture_dir),
                ArtifactDir::audio(&config.audio_dir),
            ],
            config.artifact_max_age,
            config.artifact_max_files,
            config.artifact_sweep_interval,
        )
    }

    pub fn dirs(&self) -> &[ArtifactDir] {
        &self.dirs
    }

    /// Age rule then count rule, for every directory. Blocking.
    pub fn sweep(&self, now: SystemTime) -> BTreeMap<String, PruneReport> {
        let mut reports = BTreeMap::new();
        for dir in &self.dirs {
            let report = self.prune_dir(dir, now);
            metrics::record_artifacts_deleted(&dir.name, report.deleted(), report.bytes_freed);
            reports.insert(dir.name.clone(), report);
        }

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.sweeps += 1;
        stats.last_sweep = Some(Utc::now());
        for (name, report) in &reports {
            *stats.files_deleted.entry(name.clone()).or_default() += report.deleted() as u64;
            stats.bytes_freed += report.bytes_freed;
        }

        let deleted: usize = reports.values().map(PruneReport::deleted).sum();
        if deleted > 0 {
            let freed: u64 = reports.values().map(|r| r.bytes_freed).sum();
            info!(
                deleted = deleted,
                freed_mb = freed as f64 / 1024.0 / 1024.0,
                "Artifact sweep complete"
            );
        }
        reports
    }

    fn prune_dir(&self, dir: &ArtifactDir, now: SystemTime) -> PruneReport {
        let mut report = PruneReport::default();
        let mut remaining = Vec::new();

        for file in dir.list() {
            let age = now.duration_since(file.modified).unwrap_or(Duration::ZERO);
            if age > self.max_age {
                if remove(&file) {
                    report.expired += 1;
                    report.bytes_freed += file.size;
                }
            } else {
                remaining.push(file);
            }
        }

        let overflow = remaining.len().saturating_sub(self.max_files);
        for file in remaining.iter().take(overflow) {
            if remove(file) {
                report.over_cap += 1;
                report.bytes_freed += file.size;
            }
        }
        report
    }

    /// Keep only the `keep` newest files in each directory. Blocking.
    pub fn emergency_prune(&self, keep: usize) -> usize {
        let mut deleted = 0;
        for dir in &self.dirs {
            let files = dir.list();
            let overflow = files.len().saturating_sub(keep);
            let mut freed = 0;
            let mut removed = 0;
            for file in files.iter().take(overflow) {
                if remove(file) {
                    removed += 1;
                    freed += file.size;
                }
            }
            if removed > 0 {
                warn!(dir = %dir.path.display(), deleted = removed, kept = keep, "Emergency prune");
            }
            metrics::record_artifacts_deleted(&dir.name, removed, freed);
            deleted += removed;
        }
        deleted
    }

    pub fn directory_stats(&self, now: SystemTime) -> Vec<DirectoryStats> {
        self.dirs
            .iter()
            .map(|dir| {
                let files = dir.list();
                let age = |f: &ArtifactFile| now.duration_since(f.modified).unwrap_or(Duration::ZERO);
                DirectoryStats {
                    name: dir.name.clone(),
                    files: files.len(),
                    total_bytes: files.iter().map(|f| f.size).sum(),
                    oldest_age: files.first().map(age),
                    newest_age: files.last().map(age),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> ArtifactStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sweep on a fixed cadence until shutdown. The first sweep runs at once.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let governor = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || governor.sweep(SystemTime::now())).await {
                        warn!(error = %e, "Artifact sweep task failed");
                    }
                }
            }
        }
        debug!("Artifact governor stopped");
    }
}

fn remove(file: &ArtifactFile) -> bool {
    match std::fs::remove_file(&file.path) {
        Ok(()) => {
            debug!(path = %file.path.display(), "Deleted artifact");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %file.path.display(), error = %e, "Failed to delete artifact");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str, age: Duration, now: SystemTime) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(now - age).unwrap();
        path
    }

    fn governor(root: &Path, max_files: usize) -> ArtifactGovernor {
        ArtifactGovernor::new(
            vec![ArtifactDir::images(root.join("pictures")), ArtifactDir::audio(root.join("voice"))],
            Duration::from_secs(24 * 3600),
            max_files,
            Duration::from_secs(1800),
        )
    }

    #[test]
    fn test_age_then_count() {
        let root = tempfile::tempdir().unwrap();
        let pictures = root.path().join("pictures");
        std::fs::create_dir_all(&pictures).unwrap();
        let now = SystemTime::now();

        let old = touch(&pictures, "old.jpg", Duration::from_secs(25 * 3600), now);
        let a = touch(&pictures, "a.jpg", Duration::from_secs(300), now);
        let b = touch(&pictures, "b.png", Duration::from_secs(200), now);
        let c = touch(&pictures, "c.JPEG", Duration::from_secs(100), now);
        let notes = touch(&pictures, "notes.txt", Duration::from_secs(48 * 3600), now);

        let reports = governor(root.path(), 2).sweep(now);
        let report = &reports["pictures"];
        assert_eq!(report.expired, 1);
        assert_eq!(report.over_cap, 1);
        assert_eq!(report.bytes_freed, 200);

        assert!(!old.exists());
        assert!(!a.exists());
        assert!(b.exists() && c.exists());
        assert!(notes.exists(), "foreign files are left alone");
        assert_eq!(reports["voices"], PruneReport::default());
    }

    #[test]
    fn test_stats_accumulate() {
        let root = tempfile::tempdir().unwrap();
        let voice = root.path().join("voice");
        std::fs::create_dir_all(&voice).unwrap();
        let now = SystemTime::now();
        touch(&voice, "voice_x.wav", Duration::from_secs(30 * 3600), now);

        let governor = governor(root.path(), 100);
        governor.sweep(now);
        governor.sweep(now);

        let stats = governor.stats();
        assert_eq!(stats.sweeps, 2);
        assert_eq!(stats.files_deleted["voices"], 1);
        assert_eq!(stats.bytes_freed, 100);
        assert!(stats.last_sweep.is_some());
    }

    #[test]
    fn test_emergency_prune_keeps_newest() {
        let root = tempfile::tempdir().unwrap();
        let pictures = root.path().join("pictures");
        std::fs::create_dir_all(&pictures).unwrap();
        let now = SystemTime::now();
        for i in 0..5u64 {
            touch(&pictures, &format!("m{}.jpg", i), Duration::from_secs(100 - i * 10), now);
        }

        let governor = governor(root.path(), 100);
        assert_eq!(governor.emergency_prune(2), 3);
        assert!(pictures.join("m3.jpg").exists());
        assert!(pictures.join("m4.jpg").exists());
        assert!(!pictures.join("m0.jpg").exists());

        let stats = governor.directory_stats(now);
        assert_eq!(stats[0].files, 2);
        assert_eq!(stats[0].total_bytes, 200);
        assert_eq!(stats[1].files, 0);
        assert_eq!(stats[1].oldest_age, None);
    }

    #[test]
    fn test_missing_directories_are_fine() {
        let root = tempfile::tempdir().unwrap();
        let reports = governor(&root.path().join("nowhere"), 1).sweep(SystemTime::now());
        assert!(reports.values().all(|r| r.deleted() == 0));
    }
}
