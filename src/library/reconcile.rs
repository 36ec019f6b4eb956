// Storage reconciler: bottom-up sweep of a device subtree
//
// Removes directories left empty by dedup skips (the speculative "today" partition,
// for instance) and temp files orphaned by a crash mid-download. The device root itself
// is never removed. Failures are logged and the sweep moves on.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use super::commit::is_partial_file;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dirs_removed: usize,
    pub partials_removed: usize,
    pub failures: usize,
}

/// Sweep `device_root`. Children are visited before their parent, so removing the last
/// child of a directory lets the directory itself go in the same pass.
pub fn sweep(device_root: &Path, stale_after: Duration) -> SweepReport {
    let mut report = SweepReport::default();

    if !device_root.is_dir() {
        return report;
    }

    let now = SystemTime::now();

    for entry in WalkDir::new(device_root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Error walking {}: {}", device_root.display(), e);
                report.failures += 1;
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            match is_empty_dir(path) {
                Ok(true) => match fs::remove_dir(path) {
                    Ok(()) => {
                        log::debug!("Removed empty directory: {}", path.display());
                        report.dirs_removed += 1;
                    }
                    Err(e) => {
                        log::warn!("Error removing directory {}: {}", path.display(), e);
                        report.failures += 1;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Error reading directory {}: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        } else if entry.file_type().is_file() && is_partial_file(&entry.file_name().to_string_lossy()) {
            let stale = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age >= stale_after)
                .unwrap_or(false);
            if !stale {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    log::info!("Removed orphaned partial download: {}", path.display());
                    report.partials_removed += 1;
                }
                Err(e) => {
                    log::warn!("Error removing partial download {}: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        }
    }

    report
}

fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}
