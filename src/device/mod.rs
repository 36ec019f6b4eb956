// Camera devices and the gateway that lists and serves their events

pub mod http;

use std::io::Read;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::{DoorcamError, Result};

pub use http::HttpGateway;

/// Hardware family of a device. Only some families are synced by the pull path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Doorbell,
    Camera,
    #[serde(other)]
    Unknown,
}

impl DeviceFamily {
    /// Whether the pull path knows how to sync this family.
    pub fn is_supported(&self) -> bool {
        matches!(self, DeviceFamily::Doorbell)
    }
}

/// A registered device. Identity only; no mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub device_id: String,
    pub device_name: String,
    pub family: DeviceFamily,
}

impl Device {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>, family: DeviceFamily) -> Result<Self> {
        let device = Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            family,
        };
        device.validate()?;
        Ok(device)
    }

    /// The display name becomes a directory under the storage root, so it must be a
    /// single path component.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(DoorcamError::InvalidDevice("empty device id".to_string()));
        }
        if !is_safe_component(&self.device_name) {
            return Err(DoorcamError::InvalidDevice(format!(
                "device name '{}' is not a valid directory name",
                self.device_name
            )));
        }
        Ok(())
    }
}

/// Check that a string can be used as one path component without escaping its parent.
pub fn is_safe_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains('/')
        && !value.contains('\\')
        && !value.contains('\0')
}

/// One event reported by a device. Lives only for the duration of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEvent {
    pub event_id: String,
    pub start_time: DateTime<Utc>,
    /// Opaque handle the gateway uses to fetch the payload (a URL for the HTTP gateway).
    pub locator: String,
}

/// Narrow interface onto the vendor device API.
pub trait DeviceGateway: Send + Sync {
    /// List events that started within `[end_time - duration_minutes, end_time]`.
    fn list_events(
        &self,
        device: &Device,
        end_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Vec<CameraEvent>>;

    /// Open the raw clip bytes of an event as a stream.
    fn get_bytes(&self, device: &Device, event: &CameraEvent) -> Result<Box<dyn Read + Send>>;
}
