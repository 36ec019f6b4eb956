// Runtime settings and the device registry
//
// Values come from the environment or command line (see cli.rs) and are read-only
// once built. An invalid timezone or an empty window is a startup error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use chrono_tz::Tz;

use crate::constants::{
    DEFAULT_RETENTION_MARGIN_MINUTES, DEFAULT_RETENTION_MINUTES, STALE_PARTIAL_SECONDS,
};
use crate::device::Device;
use crate::error::{DoorcamError, Result};
use crate::library::{CommitOptions, Ownership};

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage_root: PathBuf,
    pub timezone: Tz,
    /// How far back the upstream keeps events.
    pub retention_minutes: u32,
    /// Extra lookback on top of retention; events are not purged exactly on the mark.
    pub retention_margin_minutes: u32,
    pub owner: Option<Ownership>,
    pub stale_partial_after: Duration,
}

impl Settings {
    pub fn new(storage_root: impl Into<PathBuf>, timezone: &str) -> Result<Self> {
        Ok(Self {
            storage_root: storage_root.into(),
            timezone: parse_timezone(timezone)?,
            retention_minutes: DEFAULT_RETENTION_MINUTES,
            retention_margin_minutes: DEFAULT_RETENTION_MARGIN_MINUTES,
            owner: None,
            stale_partial_after: Duration::from_secs(STALE_PARTIAL_SECONDS),
        })
    }

    pub fn with_window(mut self, retention_minutes: u32, margin_minutes: u32) -> Result<Self> {
        if retention_minutes == 0 && margin_minutes == 0 {
            return Err(DoorcamError::Config("trailing window must be at least one minute".to_string()));
        }
        self.retention_minutes = retention_minutes;
        self.retention_margin_minutes = margin_minutes;
        Ok(self)
    }

    /// PUID/PGID only take effect when both are given.
    pub fn with_owner(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.owner = match (uid, gid) {
            (Some(uid), Some(gid)) => Some(Ownership { uid, gid }),
            _ => None,
        };
        self
    }

    /// Width of the trailing poll window in minutes.
    pub fn window_minutes(&self) -> u32 {
        self.retention_minutes.saturating_add(self.retention_margin_minutes)
    }

    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            modified: None,
            owner: self.owner,
        }
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name.trim()).map_err(|_| DoorcamError::InvalidTimezone(name.to_string()))
}

/// Load the device registry: a JSON array of `{device_id, device_name, family}`.
pub fn load_devices(path: &Path) -> Result<Vec<Device>> {
    let content = std::fs::read_to_string(path)?;
    parse_devices(&content)
}

pub fn parse_devices(json: &str) -> Result<Vec<Device>> {
    let devices: Vec<Device> = serde_json::from_str(json)?;

    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for device in &devices {
        device.validate()?;
        if !ids.insert(device.device_id.as_str()) {
            return Err(DoorcamError::Config(format!("duplicate device id '{}'", device.device_id)));
        }
        // Two devices with one name would share a subtree and each other's clips
        if !names.insert(device.device_name.as_str()) {
            return Err(DoorcamError::Config(format!("duplicate device name '{}'", device.device_name)));
        }
    }

    Ok(devices)
}
