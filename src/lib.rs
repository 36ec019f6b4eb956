// Doorcam Sync - library entry point

pub mod constants;
pub mod error;
pub mod config;
pub mod device;
pub mod library;
pub mod hash;
pub mod ingest;
pub mod jobs;
pub mod webhook;

pub use config::Settings;
pub use device::{CameraEvent, Device, DeviceFamily, DeviceGateway};
pub use error::{DoorcamError, Result};
pub use ingest::{sync_device, SyncCycleResult};
