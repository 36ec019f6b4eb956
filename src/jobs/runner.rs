// Job runner - one sync pass over every registered device

use std::thread;
use chrono::Utc;
use serde::Serialize;

use crate::config::Settings;
use crate::device::{Device, DeviceGateway};
use crate::error::Result;
use crate::ingest::{self, SyncCycleResult};

/// One line of a machine-readable sync summary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DeviceReport {
    Synced(SyncCycleResult),
    Failed {
        device_id: String,
        device_name: String,
        error: String,
    },
}

/// Flatten `sync_all` output into serializable per-device reports.
pub fn summarize(results: &[(Device, Result<SyncCycleResult>)]) -> Vec<DeviceReport> {
    results
        .iter()
        .map(|(device, outcome)| match outcome {
            Ok(result) => DeviceReport::Synced(result.clone()),
            Err(e) => DeviceReport::Failed {
                device_id: device.device_id.clone(),
                device_name: device.device_name.clone(),
                error: e.to_string(),
            },
        })
        .collect()
}

/// Run one cycle for each device. Devices run concurrently; each device's own cycle is
/// sequential. Results come back in registry order.
pub fn sync_all(
    gateway: &dyn DeviceGateway,
    devices: &[Device],
    settings: &Settings,
) -> Vec<(Device, Result<SyncCycleResult>)> {
    log::info!("Syncing all camera devices");

    thread::scope(|scope| {
        let handles: Vec<_> = devices
            .iter()
            .map(|device| {
                let handle = thread::Builder::new()
                    .name(format!("sync-{}", device.device_id))
                    .spawn_scoped(scope, move || ingest::sync_device(gateway, device, settings, Utc::now()));
                (device, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(device, handle)| {
                let outcome = match handle {
                    Ok(h) => h.join().unwrap_or_else(|_| {
                        Err(crate::error::DoorcamError::Other(format!(
                            "sync of {} panicked",
                            device.device_id
                        )))
                    }),
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = &outcome {
                    log::error!("[{}] Sync cycle failed: {}", device.device_id, e);
                }
                (device.clone(), outcome)
            })
            .collect()
    })
}
