// HTTP front end for the webhook receiver
//
// Endpoints:
//   POST /doorbell-event  -> 200 {"status":"success",...} or 200 {"status":"error",...}
//                            422 when the body is not a delivery
//   GET  /health          -> 200 {"status":"ok"}

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use chrono::Utc;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};

use super::{DoorbellEvent, WebhookReceiver, WebhookResponse};
use crate::constants::{HEALTH_ROUTE, MAX_WEBHOOK_BODY_BYTES, WEBHOOK_EVENT_ROUTE};
use crate::error::{DoorcamError, Result};

pub struct WebhookServer {
    server: Arc<Server>,
    stopping: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WebhookServer {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Stop accepting requests and wait for workers to finish the ones in hand.
    pub fn shutdown(self) {
        self.stopping.store(true, Ordering::Relaxed);
        for _ in 0..self.handles.len() {
            self.server.unblock();
        }
        for handle in self.handles {
            if handle.join().is_err() {
                log::error!("Webhook worker exited with a panic");
            }
        }
    }
}

/// Bind `addr` and serve deliveries on `workers` threads.
pub fn start_server(addr: &str, receiver: Arc<WebhookReceiver>, workers: usize) -> Result<WebhookServer> {
    let server = Server::http(addr)
        .map_err(|e| DoorcamError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    let server = Arc::new(server);
    let stopping = Arc::new(AtomicBool::new(false));

    if let Some(bound) = server.server_addr().to_ip() {
        log::info!("Webhook server listening on {}", bound);
    }

    let mut handles = Vec::new();
    for i in 0..workers.max(1) {
        let server = Arc::clone(&server);
        let receiver = Arc::clone(&receiver);
        let stopping = Arc::clone(&stopping);
        let handle = std::thread::Builder::new()
            .name(format!("webhook-{}", i))
            .spawn(move || serve(&server, &receiver, &stopping))?;
        handles.push(handle);
    }

    Ok(WebhookServer { server, stopping, handles })
}

fn serve(server: &Server, receiver: &WebhookReceiver, stopping: &AtomicBool) {
    loop {
        match server.recv() {
            Ok(request) => handle_request(request, receiver),
            Err(e) => {
                if stopping.load(Ordering::Relaxed) {
                    return;
                }
                log::warn!("Webhook server receive error: {}", e);
            }
        }
    }
}

fn handle_request(mut request: Request, receiver: &WebhookReceiver) {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    let method = request.method().clone();

    let response = match (&method, path.as_str()) {
        (Method::Post, WEBHOOK_EVENT_ROUTE) => match read_event(&mut request) {
            Ok(event) => {
                log::debug!("Received doorbell event {} for {}", event.event_id, event.device_id);
                json_response(200, &receiver.receive(&event, Utc::now()))
            }
            Err(e) => {
                log::warn!("Rejected webhook body: {}", e);
                json_response(422, &WebhookResponse::Error { message: e.to_string() })
            }
        },
        (Method::Get, HEALTH_ROUTE) => json_response(200, &serde_json::json!({"status": "ok"})),
        _ => json_response(404, &WebhookResponse::Error { message: "not found".to_string() }),
    };

    if let Err(e) = request.respond(response) {
        log::warn!("Failed to send webhook response: {}", e);
    }
}

fn read_event(request: &mut Request) -> Result<DoorbellEvent> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_WEBHOOK_BODY_BYTES)
        .read_to_end(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

fn json_response<T: Serialize>(status: u16, body: &T) -> Response<Cursor<Vec<u8>>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::from_data(payload).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CommitOptions;
    use crate::webhook::ClipSource;
    use chrono_tz::Tz;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticSource;

    impl ClipSource for StaticSource {
        fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
            if url.ends_with(".mp4") {
                Ok(Box::new(Cursor::new(b"pushed clip".to_vec())))
            } else {
                Err(DoorcamError::Http(format!("{}: status code 404", url)))
            }
        }
    }

    fn start(root: &std::path::Path) -> (WebhookServer, String) {
        let receiver = Arc::new(WebhookReceiver::new(root, Tz::UTC, CommitOptions::default(), Arc::new(StaticSource)));
        let server = start_server("127.0.0.1:0", receiver, 2).unwrap();
        let base = format!("http://{}", server.local_addr().unwrap());
        (server, base)
    }

    fn agent() -> ureq::Agent {
        ureq::AgentBuilder::new().timeout(Duration::from_secs(10)).build()
    }

    #[test]
    fn test_post_event_saves_clip() {
        let tmp = TempDir::new().unwrap();
        let (server, base) = start(tmp.path());

        let body = r#"{"event_id":"e1","device_id":"DEVICE_1","video_url":"http://cdn/e1.mp4"}"#;
        let response = agent()
            .post(&format!("{}/doorbell-event", base))
            .set("Content-Type", "application/json")
            .send_string(body)
            .unwrap();
        assert_eq!(response.status(), 200);
        let parsed: WebhookResponse = serde_json::from_reader(response.into_reader()).unwrap();

        match parsed {
            WebhookResponse::Success { saved_to } => {
                assert_eq!(std::fs::read(&saved_to).unwrap(), b"pushed clip");
            }
            other => panic!("expected success, got {:?}", other),
        }
        server.shutdown();
    }

    #[test]
    fn test_download_failure_is_still_200() {
        let tmp = TempDir::new().unwrap();
        let (server, base) = start(tmp.path());

        let body = r#"{"event_id":"e1","device_id":"DEVICE_1","video_url":"http://cdn/gone"}"#;
        let response = agent().post(&format!("{}/doorbell-event", base)).send_string(body).unwrap();
        assert_eq!(response.status(), 200);
        let parsed: WebhookResponse = serde_json::from_reader(response.into_reader()).unwrap();

        assert!(matches!(parsed, WebhookResponse::Error { .. }));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        server.shutdown();
    }

    #[test]
    fn test_malformed_body_and_unknown_route() {
        let tmp = TempDir::new().unwrap();
        let (server, base) = start(tmp.path());

        match agent().post(&format!("{}/doorbell-event", base)).send_string("{not json") {
            Err(ureq::Error::Status(code, _)) => assert_eq!(code, 422),
            other => panic!("expected 422, got {:?}", other.map(|r| r.status())),
        }
        match agent().get(&format!("{}/nope", base)).call() {
            Err(ureq::Error::Status(code, _)) => assert_eq!(code, 404),
            other => panic!("expected 404, got {:?}", other.map(|r| r.status())),
        }
        let health = agent().get(&format!("{}/health", base)).call().unwrap();
        assert_eq!(health.status(), 200);
        server.shutdown();
    }
}
