//! Integrity-checked self-update.
//!
//! Each tracked file is compared against its remote copy by SHA-256 and
//! overwritten in full when the two differ.
//!
//! ```text
//!   for each tracked path:
//!     local digest ──┐
//!                    ├── equal ──▶ unchanged
//!     GET + digest ──┘── differ ─▶ overwrite, count
//!          │
//!          └── fetch failed / empty ─▶ untouched, count as failed, continue
//! ```
//!
//! Files are never deleted and never rolled back.  When anything was
//! replaced the cycle reports `restart_required`; the caller decides when
//! to actually restart.

pub mod digest;
pub mod http;

use std::path::{Component, Path, PathBuf};

use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{Connector, TrafficStats};
use crate::config::UpdateConfig;
use crate::error::IntegrityError;

use self::digest::Digest;

/// A file kept in sync with the remote origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Relative to the update root and to the remote base URL.
    pub path: String,
    /// Digest seen during the last cycle; informational only, the local
    /// file is rehashed every cycle.
    pub last_observed: Option<Digest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCycleResult {
    pub files_updated: usize,
    pub restart_required: bool,
    pub files_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStatus {
    pub enabled: bool,
    pub last_check_secs: u64,
    /// Never negative; zero once a check is due.
    pub secs_until_next_check: u64,
}

enum FileOutcome {
    Unchanged,
    Updated,
}

pub struct UpdateManager<C: Connector> {
    connector: C,
    config: UpdateConfig,
    root: PathBuf,
    files: Vec<TrackedFile>,
    last_check_secs: u64,
    traffic: TrafficStats,
}

impl<C: Connector> UpdateManager<C> {
    /// `root` is the local directory tracked paths are resolved against.
    pub fn new(connector: C, config: UpdateConfig, root: impl Into<PathBuf>) -> Self {
        let files = config
            .files
            .iter()
            .map(|p| TrackedFile { path: p.clone(), last_observed: None })
            .collect();
        Self {
            connector,
            config,
            root: root.into(),
            files,
            last_check_secs: 0,
            traffic: TrafficStats::default(),
        }
    }

    pub fn tracked(&self) -> &[TrackedFile] {
        &self.files
    }

    /// Bytes moved since the previous call.
    pub fn take_traffic(&mut self) -> TrafficStats {
        core::mem::take(&mut self.traffic)
    }

    /// Reconcile every tracked file if the check interval has elapsed (or
    /// `force` is set).
    pub fn check_and_update(&mut self, now_secs: u64, force: bool) -> UpdateCycleResult {
        if !force && !self.is_due(now_secs) {
            return UpdateCycleResult::default();
        }
        self.last_check_secs = now_secs;

        if !self.config.enabled {
            return UpdateCycleResult::default();
        }

        info!("OTA: checking {} file(s)", self.files.len());
        let mut result = UpdateCycleResult::default();
        for i in 0..self.files.len() {
            match self.reconcile(i) {
                Ok(FileOutcome::Unchanged) => {}
                Ok(FileOutcome::Updated) => result.files_updated += 1,
                Err(e) => {
                    warn!("OTA: {} left untouched: {}", self.files[i].path, e);
                    result.files_failed += 1;
                }
            }
        }
        result.restart_required = result.files_updated > 0;

        info!(
            "OTA: cycle done, updated={} failed={} restart={}",
            result.files_updated, result.files_failed, result.restart_required
        );
        result
    }

    /// Whether a non-forced check would run at `now_secs`.  A clock that
    /// went backwards counts as due.
    pub fn is_due(&self, now_secs: u64) -> bool {
        now_secs < self.last_check_secs
            || now_secs - self.last_check_secs >= u64::from(self.config.check_interval_secs)
    }

    /// Countdown to the next check.
    ///
    /// A clock observed to have gone backwards re-anchors the last check to
    /// `now_secs`, restarting the full interval.
    pub fn get_status(&mut self, now_secs: u64) -> UpdateStatus {
        if now_secs < self.last_check_secs {
            warn!("OTA: clock went backwards ({} < {}), re-anchoring", now_secs, self.last_check_secs);
            self.last_check_secs = now_secs;
        }
        let elapsed = now_secs - self.last_check_secs;
        UpdateStatus {
            enabled: self.config.enabled,
            last_check_secs: self.last_check_secs,
            secs_until_next_check: u64::from(self.config.check_interval_secs).saturating_sub(elapsed),
        }
    }

    // ── Internal ──────────────────────────────────────────────────

    fn reconcile(&mut self, index: usize) -> Result<FileOutcome, IntegrityError> {
        let rel = self.files[index].path.clone();
        let local_path = resolve(&self.root, &rel)?;
        let local = digest::file_digest(&local_path);

        let url = http::join_url(&self.config.base_url, &rel);
        let body = http::fetch(
            &mut self.connector,
            &url,
            Duration::from_millis(u64::from(self.config.fetch_timeout_ms)),
            self.config.max_body_bytes,
            &mut self.traffic,
        )?;
        if body.is_empty() {
            return Err(IntegrityError::EmptyBody);
        }
        let remote = digest::digest(&body);

        if local == Some(remote) {
            self.files[index].last_observed = Some(remote);
            return Ok(FileOutcome::Unchanged);
        }

        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| IntegrityError::WriteFailed)?;
        }
        std::fs::write(&local_path, &body).map_err(|e| {
            warn!("OTA: write {} failed: {}", local_path.display(), e);
            IntegrityError::WriteFailed
        })?;

        info!(
            "OTA: {} updated ({} -> {}, {} bytes)",
            rel,
            local.as_ref().map_or_else(|| String::from("none"), digest::short_hex),
            digest::short_hex(&remote),
            body.len()
        );
        self.files[index].last_observed = Some(remote);
        Ok(FileOutcome::Updated)
    }
}

/// Join `rel` onto `root`, refusing anything that could escape it.
fn resolve(root: &Path, rel: &str) -> Result<PathBuf, IntegrityError> {
    let path = Path::new(rel);
    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return Err(IntegrityError::InvalidPath);
    }
    if components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        Ok(root.join(path))
    } else {
        Err(IntegrityError::InvalidPath)
    }
}
