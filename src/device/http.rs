// HTTP JSON adapter for the device gateway
//
// Endpoints consumed:
//   GET {base}/devices/{device_id}/events?end_time=<rfc3339>&duration_minutes=<n>
//       -> [{"event_id": "...", "start_time": "<rfc3339>", "video_url": "..."}]
//   GET <video_url> -> raw clip bytes

use std::io::Read;
use std::time::Duration;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use ureq::Agent;
use url::Url;

use super::{CameraEvent, Device, DeviceGateway};
use crate::error::{DoorcamError, Result};

/// Event record as returned by the gateway listing endpoint.
#[derive(Debug, Deserialize)]
struct EventRecord {
    event_id: String,
    start_time: DateTime<Utc>,
    video_url: String,
}

pub struct HttpGateway {
    base_url: String,
    token: Option<String>,
    agent: Agent,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            agent,
        }
    }

    /// The device id is pushed as one encoded path segment, so reserved characters
    /// in it cannot redirect the request to another device.
    fn events_url(&self, device: &Device) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DoorcamError::Config(format!("Invalid gateway URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| DoorcamError::Config(format!("Gateway URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push("devices")
            .push(&device.device_id)
            .push("events");
        Ok(url)
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }
}

impl DeviceGateway for HttpGateway {
    fn list_events(
        &self,
        device: &Device,
        end_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Vec<CameraEvent>> {
        let request = self
            .agent
            .get(self.events_url(device)?.as_str())
            .query("end_time", &end_time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .query("duration_minutes", &duration_minutes.to_string());

        let response = self.authorized(request).call()?;
        let records: Vec<EventRecord> = serde_json::from_reader(response.into_reader())
            .map_err(|e| DoorcamError::Gateway(format!("Malformed event listing: {}", e)))?;

        Ok(records
            .into_iter()
            .map(|r| CameraEvent {
                event_id: r.event_id,
                start_time: r.start_time,
                locator: r.video_url,
            })
            .collect())
    }

    fn get_bytes(&self, _device: &Device, event: &CameraEvent) -> Result<Box<dyn Read + Send>> {
        let request = self.agent.get(&event.locator);
        let response = self.authorized(request).call()?;
        let reader: Box<dyn Read + Send> = response.into_reader();
        Ok(reader)
    }
}
