// Webhook receiver (push path)
//
// A delivery names a device and a remote clip URL. The clip is downloaded in full and
// committed under the storage root as doorbell_<device_id>_<YYYYMMDD_HHMMSS>.mp4, stamped
// with the time the request was processed. There is no dedup here: every accepted
// delivery is a write attempt. Failures never escape; they are returned as data.

pub mod server;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::device::is_safe_component;
use crate::error::{DoorcamError, Result};
use crate::library::{self, paths, CommitOptions, CommittedClip};

pub use server::{start_server, WebhookServer};

/// Body of a push delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoorbellEvent {
    pub event_id: String,
    pub device_id: String,
    pub video_url: String,
}

/// What the endpoint answers, success or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WebhookResponse {
    Success { saved_to: String },
    Error { message: String },
}

/// Where pushed clips are fetched from.
pub trait ClipSource: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// Fetches clips over HTTP(S).
pub struct HttpClipSource {
    agent: Agent,
}

impl HttpClipSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(timeout)
                .timeout_read(timeout)
                .build(),
        }
    }
}

impl ClipSource for HttpClipSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self.agent.get(url).call()?;
        let reader: Box<dyn Read + Send> = response.into_reader();
        Ok(reader)
    }
}

pub struct WebhookReceiver {
    storage_root: PathBuf,
    timezone: Tz,
    commit_options: CommitOptions,
    source: Arc<dyn ClipSource>,
}

impl WebhookReceiver {
    pub fn new(storage_root: impl Into<PathBuf>, timezone: Tz, commit_options: CommitOptions, source: Arc<dyn ClipSource>) -> Self {
        Self {
            storage_root: storage_root.into(),
            timezone,
            commit_options,
            source,
        }
    }

    /// Handle one delivery received at `received_at`.
    pub fn receive(&self, event: &DoorbellEvent, received_at: DateTime<Utc>) -> WebhookResponse {
        match self.save(event, received_at) {
            Ok(clip) => {
                log::info!(
                    "[{}] Saved pushed event {} to {} ({} bytes)",
                    event.device_id,
                    event.event_id,
                    clip.path.display(),
                    clip.bytes
                );
                WebhookResponse::Success {
                    saved_to: clip.path.display().to_string(),
                }
            }
            Err(e) => {
                log::warn!("[{}] Failed to save pushed event {}: {}", event.device_id, event.event_id, e);
                WebhookResponse::Error { message: e.to_string() }
            }
        }
    }

    fn save(&self, event: &DoorbellEvent, received_at: DateTime<Utc>) -> Result<CommittedClip> {
        if !is_safe_component(&event.device_id) {
            return Err(DoorcamError::InvalidDevice(format!(
                "device id '{}' cannot be used in a file name",
                event.device_id
            )));
        }
        if event.video_url.trim().is_empty() {
            return Err(DoorcamError::Other("video_url is empty".to_string()));
        }

        let file_name = paths::push_file_name(&event.device_id, received_at, self.timezone);
        let dest = self.storage_root.join(file_name);

        let mut reader = self.source.open(&event.video_url)?;
        library::commit_clip(&dest, &mut reader, &self.commit_options)
    }
}
