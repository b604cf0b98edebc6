//! Optional age-based cleanup of generated artifacts
//!
//! Disabled by default; when enabled, a background task periodically deletes
//! artifacts older than the configured age from the public root. Artifacts
//! are otherwise kept forever.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::config::SweepSettings;

use super::postprocess::ARTIFACT_PREFIX;

/// Spawn the sweep loop. The handle is detached; the task runs for the
/// lifetime of the process.
pub fn spawn(settings: SweepSettings, public_dir: PathBuf) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(settings.interval_secs.max(1));
    let max_age = Duration::from_secs(settings.max_age_secs);

    tokio::spawn(async move {
        info!(
            dir = %public_dir.display(),
            max_age_secs = max_age.as_secs(),
            interval_secs = interval.as_secs(),
            "Artifact sweep enabled"
        );
        loop {
            tokio::time::sleep(interval).await;
            match sweep_once(&public_dir, max_age) {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Swept aged artifacts"),
                Err(e) => warn!(error = %e, "Artifact sweep pass failed"),
            }
        }
    })
}

/// Delete artifacts older than `max_age`. Returns how many were removed.
pub fn sweep_once(public_dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(public_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(ARTIFACT_PREFIX) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age {
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}
