// Ingestion engine (pull path)
//
// One cycle per device: list the trailing window, then for each event resolve its path,
// ask the dedup gate, and download-and-commit what is missing. A failed event is logged
// and retried on the next cycle, since its path still does not exist. The cycle ends
// with a reconciler sweep of the device subtree.
//
// Two events can resolve to the same file name: a second event within the same local
// second, or an event in the repeated hour when DST falls back. The first one to land
// keeps the path; later ones are counted as collisions, logged at warn, and not fetched.
//
// Callers must not run two cycles for the same device at once.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Settings;
use crate::device::{CameraEvent, Device, DeviceGateway};
use crate::error::{DoorcamError, Result};
use crate::library::{self, gate, paths, reconcile, CommittedClip, GateDecision, SweepReport};

/// Per-device outcome of one cycle. Reported, then discarded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncCycleResult {
    pub device_id: String,
    pub device_name: String,
    pub seen: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Skips caused by another event claiming the same file name. Included in `skipped`.
    pub collisions: usize,
    /// The device's family is not synced; nothing was touched.
    pub unsupported: bool,
    #[serde(skip)]
    pub sweep: SweepReport,
}

enum EventOutcome {
    Downloaded(CommittedClip),
    Skipped,
    /// The path was taken by a different event while this one was in flight.
    LostRace,
}

/// Run one sync cycle for `device` as of `now`.
///
/// Returns an error only when the cycle cannot start (partition directory or listing
/// failure). Per-event failures are counted in the result.
pub fn sync_device(
    gateway: &dyn DeviceGateway,
    device: &Device,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<SyncCycleResult> {
    let mut result = SyncCycleResult {
        device_id: device.device_id.clone(),
        device_name: device.device_name.clone(),
        ..Default::default()
    };

    log::info!("Syncing: {}", device.device_id);
    if !device.family.is_supported() {
        log::info!(
            "{} is a {:?} device, which is not synced, skipping...",
            device.device_id,
            device.family
        );
        result.unsupported = true;
        return Ok(result);
    }

    // Today's partition is created up front; the sweep removes it again if nothing lands
    let today = paths::today_dir(&settings.storage_root, &device.device_name, now, settings.timezone);
    fs::create_dir_all(&today)?;

    let events = match gateway.list_events(device, now, settings.window_minutes()) {
        Ok(events) => events,
        Err(e) => {
            result.sweep = sweep_device(device, settings);
            return Err(e);
        }
    };
    result.seen = events.len();
    log::info!("[{}] Received {} camera events", device.device_id, events.len());

    // Paths resolved so far this cycle, and which event resolved them first
    let mut claimed: HashMap<PathBuf, &str> = HashMap::new();

    for event in &events {
        let location = paths::resolve(&settings.storage_root, &device.device_name, event.start_time, settings.timezone);
        let path = location.path();

        if let Some(first) = claimed.get(&path) {
            log::warn!(
                "[{}] CameraEvent ({}) resolves to {} already claimed by event {}; not downloaded",
                device.device_id,
                event.event_id,
                path.display(),
                first
            );
            result.skipped += 1;
            result.collisions += 1;
            continue;
        }
        claimed.insert(path.clone(), &event.event_id);

        match process_event(gateway, device, settings, event, &path) {
            Ok(EventOutcome::Downloaded(clip)) => {
                log::info!(
                    "[{}] Saved {} successfully ({} bytes, {})",
                    device.device_id,
                    clip.path.display(),
                    clip.bytes,
                    clip.hash
                );
                result.downloaded += 1;
            }
            Ok(EventOutcome::Skipped) => {
                result.skipped += 1;
            }
            Ok(EventOutcome::LostRace) => {
                log::warn!(
                    "[{}] CameraEvent ({}) lost {} to another writer; not downloaded",
                    device.device_id,
                    event.event_id,
                    path.display()
                );
                result.skipped += 1;
                result.collisions += 1;
            }
            Err(e) => {
                log::warn!(
                    "[{}] Failed to download event {}: {}",
                    device.device_id,
                    event.event_id,
                    e
                );
                result.failed += 1;
            }
        }
    }

    result.sweep = sweep_device(device, settings);

    log::info!(
        "[{}] Downloaded: {}, skipped (already downloaded): {}, failed: {}",
        device.device_id,
        result.downloaded,
        result.skipped,
        result.failed
    );
    if result.collisions > 0 {
        log::warn!(
            "[{}] {} event(s) shared a file name with another event and were not saved",
            device.device_id,
            result.collisions
        );
    }

    Ok(result)
}

fn process_event(
    gateway: &dyn DeviceGateway,
    device: &Device,
    settings: &Settings,
    event: &CameraEvent,
    path: &Path,
) -> Result<EventOutcome> {
    if gate::check(path) == GateDecision::Skip {
        log::debug!("CameraEvent ({}) already saved at {}, skipping..", event.event_id, path.display());
        return Ok(EventOutcome::Skipped);
    }

    log::debug!("Downloading camera event: {} -> {}", event.event_id, path.display());
    let mut reader = gateway.get_bytes(device, event)?;

    let mut options = settings.commit_options();
    options.modified = Some(SystemTime::from(event.start_time));

    match library::commit_clip(path, &mut reader, &options) {
        Ok(clip) => Ok(EventOutcome::Downloaded(clip)),
        Err(DoorcamError::AlreadyPresent(_)) => Ok(EventOutcome::LostRace),
        Err(e) => Err(e),
    }
}

/// Reconcile the device's subtree, leaving the device root in place.
pub fn sweep_device(device: &Device, settings: &Settings) -> SweepReport {
    let root = paths::device_root(&settings.storage_root, &device.device_name);
    let report = reconcile::sweep(&root, settings.stale_partial_after);
    if report.dirs_removed > 0 || report.partials_removed > 0 || report.failures > 0 {
        log::debug!(
            "[{}] Sweep removed {} empty directories, {} partial downloads ({} failures)",
            device.device_id,
            report.dirs_removed,
            report.partials_removed,
            report.failures
        );
    }
    report
}

#[cfg(test)]
mod tests;
