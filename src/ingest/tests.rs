// Sync cycle scenarios against an in-memory gateway

use super::*;
use crate::device::DeviceFamily;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Clone)]
enum Payload {
    Bytes(Vec<u8>),
    /// Stream breaks after a few bytes, like a dropped connection
    Truncated,
    /// The fetch itself fails
    Unavailable,
}

struct FakeGateway {
    events: Vec<CameraEvent>,
    payloads: Mutex<HashMap<String, Payload>>,
    fetched: Mutex<Vec<String>>,
    listings: Mutex<Vec<(DateTime<Utc>, u32)>>,
    list_error: bool,
}

impl FakeGateway {
    fn new(events: &[(&str, &str)]) -> Self {
        let mut payloads = HashMap::new();
        let events = events
            .iter()
            .map(|(id, start)| {
                payloads.insert(id.to_string(), Payload::Bytes(format!("clip {}", id).into_bytes()));
                CameraEvent {
                    event_id: id.to_string(),
                    start_time: start.parse().unwrap(),
                    locator: format!("mem://{}", id),
                }
            })
            .collect();
        Self {
            events,
            payloads: Mutex::new(payloads),
            fetched: Mutex::new(Vec::new()),
            listings: Mutex::new(Vec::new()),
            list_error: false,
        }
    }

    fn set_payload(&self, event_id: &str, payload: Payload) {
        self.payloads.lock().unwrap().insert(event_id.to_string(), payload);
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

struct BrokenStream {
    sent: bool,
}

impl Read for BrokenStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended early"));
        }
        self.sent = true;
        let n = buf.len().min(8);
        buf[..n].fill(1);
        Ok(n)
    }
}

impl DeviceGateway for FakeGateway {
    fn list_events(&self, _device: &Device, end_time: DateTime<Utc>, duration_minutes: u32) -> Result<Vec<CameraEvent>> {
        self.listings.lock().unwrap().push((end_time, duration_minutes));
        if self.list_error {
            return Err(DoorcamError::Gateway("listing unavailable".to_string()));
        }
        Ok(self.events.clone())
    }

    fn get_bytes(&self, _device: &Device, event: &CameraEvent) -> Result<Box<dyn Read + Send>> {
        self.fetched.lock().unwrap().push(event.event_id.clone());
        let payload = self.payloads.lock().unwrap().get(&event.event_id).cloned();
        match payload {
            Some(Payload::Bytes(bytes)) => Ok(Box::new(io::Cursor::new(bytes))),
            Some(Payload::Truncated) => Ok(Box::new(BrokenStream { sent: false })),
            Some(Payload::Unavailable) | None => Err(DoorcamError::Http("503 Service Unavailable".to_string())),
        }
    }
}

fn doorbell() -> Device {
    Device::new("DEVICE_A1", "Front Door", DeviceFamily::Doorbell).unwrap()
}

fn settings(root: &Path) -> Settings {
    Settings::new(root, "America/Los_Angeles").unwrap()
}

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Every file under `root`, relative, sorted, with contents.
fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

const NOW: &str = "2024-03-05T03:00:00Z";

#[test]
fn test_second_cycle_downloads_nothing() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[
        ("e1", "2024-03-05T01:00:00Z"),
        ("e2", "2024-03-05T02:10:00Z"),
    ]);

    let first = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();
    assert_eq!((first.seen, first.downloaded, first.skipped, first.failed), (2, 2, 0, 0));
    let after_first = snapshot(tmp.path());

    let second = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();
    assert_eq!((second.seen, second.downloaded, second.skipped, second.failed), (2, 0, 2, 0));
    assert_eq!(snapshot(tmp.path()), after_first);
    assert_eq!(gateway.fetched(), vec!["e1".to_string(), "e2".to_string()]);
}

#[test]
fn test_existing_clip_is_never_refetched_or_overwritten() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let existing = tmp.path().join("Front Door/2024/03/04/Front Door_2024-03-04_06-10-00pm.mp4");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"kept").unwrap();

    let gateway = FakeGateway::new(&[("e2", "2024-03-05T02:10:00Z")]);
    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.downloaded, 0);
    assert!(gateway.fetched().is_empty());
    assert_eq!(std::fs::read(&existing).unwrap(), b"kept");
}

#[test]
fn test_clip_lands_in_local_date_partition() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[("e2", "2024-03-05T02:10:00Z")]);

    sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    let expected = tmp.path().join("Front Door/2024/03/04/Front Door_2024-03-04_06-10-00pm.mp4");
    assert_eq!(std::fs::read(&expected).unwrap(), b"clip e2");
}

#[test]
fn test_clip_mtime_is_event_start() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[("e2", "2024-03-05T02:10:00Z")]);

    sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    let clip = tmp.path().join("Front Door/2024/03/04/Front Door_2024-03-04_06-10-00pm.mp4");
    let modified: DateTime<Utc> = std::fs::metadata(&clip).unwrap().modified().unwrap().into();
    assert_eq!(modified, utc("2024-03-05T02:10:00Z"));
}

#[test]
fn test_interrupted_download_is_retried_next_cycle() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[
        ("e1", "2024-03-05T01:00:00Z"),
        ("e2", "2024-03-05T02:10:00Z"),
    ]);
    gateway.set_payload("e1", Payload::Truncated);

    let first = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();
    assert_eq!((first.downloaded, first.skipped, first.failed), (1, 0, 1));

    let e1_path = tmp.path().join("Front Door/2024/03/04/Front Door_2024-03-04_05-00-00pm.mp4");
    assert!(!e1_path.exists(), "no partial clip at the final path");
    let leftovers: Vec<_> = snapshot(tmp.path())
        .into_iter()
        .filter(|(p, _)| p.to_string_lossy().contains(".partial-"))
        .collect();
    assert!(leftovers.is_empty(), "temp file must not survive a failed download");

    gateway.set_payload("e1", Payload::Bytes(b"clip e1".to_vec()));
    let second = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();
    assert_eq!((second.downloaded, second.skipped, second.failed), (1, 1, 0));
    assert_eq!(std::fs::read(&e1_path).unwrap(), b"clip e1");
}

#[test]
fn test_fetch_failure_does_not_abort_cycle() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[
        ("e1", "2024-03-05T01:00:00Z"),
        ("e2", "2024-03-05T01:30:00Z"),
        ("e3", "2024-03-05T02:10:00Z"),
    ]);
    gateway.set_payload("e2", Payload::Unavailable);

    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!((result.seen, result.downloaded, result.failed), (3, 2, 1));
    assert_eq!(gateway.fetched(), vec!["e1".to_string(), "e2".to_string(), "e3".to_string()]);
}

#[test]
fn test_unsupported_device_has_no_side_effects() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[("e1", "2024-03-05T01:00:00Z")]);
    let camera = Device::new("CAM_9", "Garage", DeviceFamily::Camera).unwrap();

    let result = sync_device(&gateway, &camera, &settings, utc(NOW)).unwrap();

    assert!(result.unsupported);
    assert_eq!(result.seen, 0);
    assert!(gateway.listings.lock().unwrap().is_empty());
    assert!(!tmp.path().join("Garage").exists());
}

#[test]
fn test_listing_uses_trailing_window() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path()).with_window(120, 15).unwrap();
    let gateway = FakeGateway::new(&[]);

    sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!(*gateway.listings.lock().unwrap(), vec![(utc(NOW), 135)]);
}

#[test]
fn test_empty_today_partition_is_swept() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    // Local "today" is 2024-03-05 but the only event is from the evening before
    let now = utc("2024-03-05T09:00:00Z");
    let gateway = FakeGateway::new(&[("e2", "2024-03-05T02:10:00Z")]);

    let result = sync_device(&gateway, &doorbell(), &settings, now).unwrap();

    assert_eq!(result.downloaded, 1);
    assert!(!tmp.path().join("Front Door/2024/03/05").exists());
    assert!(tmp.path().join("Front Door/2024/03/04").is_dir());
    assert_eq!(result.sweep.dirs_removed, 1);
}

#[test]
fn test_no_events_keeps_device_root() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[]);

    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!(result.seen, 0);
    let root = tmp.path().join("Front Door");
    assert!(root.is_dir());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}

#[test]
fn test_same_second_events_collide() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[
        ("first", "2024-03-05T02:10:00.200Z"),
        ("second", "2024-03-05T02:10:00.700Z"),
    ]);

    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!((result.downloaded, result.skipped, result.collisions), (1, 1, 1));
    assert_eq!(gateway.fetched(), vec!["first".to_string()]);
    let clip = tmp.path().join("Front Door/2024/03/04/Front Door_2024-03-04_06-10-00pm.mp4");
    assert_eq!(std::fs::read(&clip).unwrap(), b"clip first");
}

#[test]
fn test_repeated_dst_hour_collides_and_keeps_first_clip() {
    // 01:30 PDT and 01:30 PST on the night clocks fall back
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let gateway = FakeGateway::new(&[
        ("pdt", "2024-11-03T08:30:00Z"),
        ("pst", "2024-11-03T09:30:00Z"),
    ]);

    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();

    assert_eq!((result.downloaded, result.skipped, result.collisions), (1, 1, 1));
    assert_eq!(gateway.fetched(), vec!["pdt".to_string()]);
    let clip = tmp.path().join("Front Door/2024/11/03/Front Door_2024-11-03_01-30-00am.mp4");
    assert_eq!(std::fs::read(&clip).unwrap(), b"clip pdt");

    // Still reported on the next cycle, and the kept clip is untouched
    let again = sync_device(&gateway, &doorbell(), &settings, utc(NOW)).unwrap();
    assert_eq!((again.downloaded, again.skipped, again.collisions), (0, 2, 1));
    assert_eq!(std::fs::read(&clip).unwrap(), b"clip pdt");
}

#[test]
fn test_listing_failure_is_reported() {
    let tmp = TempDir::new().unwrap();
    let settings = settings(tmp.path());
    let mut gateway = FakeGateway::new(&[]);
    gateway.list_error = true;

    let result = sync_device(&gateway, &doorbell(), &settings, utc(NOW));

    assert!(matches!(result, Err(DoorcamError::Gateway(_))));
    // The speculative partition was swept on the way out
    assert_eq!(std::fs::read_dir(tmp.path().join("Front Door")).unwrap().count(), 0);
}
