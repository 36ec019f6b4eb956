// Background sync workers -- one long-lived thread per device.
//
// Each thread runs a cycle, then sleeps for the sync interval. A device only ever has
// its own thread syncing it, so two cycles for the same device never overlap.
// A panicking cycle is caught and logged so the thread keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use chrono::Utc;

use crate::config::Settings;
use crate::constants::WORKER_SHUTDOWN_POLL_MS;
use crate::device::{Device, DeviceGateway};
use crate::error::Result;
use crate::ingest;

pub struct SyncWorkers {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncWorkers {
    /// Stop all workers and wait for in-flight cycles to finish.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if handle.join().is_err() {
                log::error!("Sync worker exited with a panic");
            }
        }
    }
}

/// Spawn one sync thread per device.
pub fn spawn_workers(
    gateway: Arc<dyn DeviceGateway>,
    devices: Vec<Device>,
    settings: Arc<Settings>,
    interval: Duration,
) -> Result<SyncWorkers> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(devices.len());

    for device in devices {
        let gateway = Arc::clone(&gateway);
        let settings = Arc::clone(&settings);
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name(format!("sync-{}", device.device_id))
            .spawn(move || worker_loop(gateway, device, settings, interval, flag))?;
        handles.push(handle);
    }

    Ok(SyncWorkers { shutdown, handles })
}

fn worker_loop(
    gateway: Arc<dyn DeviceGateway>,
    device: Device,
    settings: Arc<Settings>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ingest::sync_device(gateway.as_ref(), &device, &settings, Utc::now())
        }));

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                log::error!("[{}] Sync cycle failed: {}", device.device_id, e);
            }
            Err(_) => {
                log::error!("[{}] Sync cycle panicked (recovered)", device.device_id);
            }
        }

        sleep_unless_shutdown(interval, &shutdown);
    }
    log::debug!("[{}] Sync worker stopped", device.device_id);
}

/// Block the calling thread until `flag` is set.
pub fn wait_for_shutdown(flag: &AtomicBool) {
    let step = Duration::from_millis(WORKER_SHUTDOWN_POLL_MS);
    while !flag.load(Ordering::Relaxed) {
        std::thread::sleep(step);
    }
}

/// Sleep for `interval`, waking early if shutdown is requested.
fn sleep_unless_shutdown(interval: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + interval;
    let step = Duration::from_millis(WORKER_SHUTDOWN_POLL_MS);
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}
