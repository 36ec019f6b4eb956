// Path resolution for stored clips
//
// Layout: <root>/<device>/<YYYY>/<MM>/<DD>/<device>_<YYYY-MM-DD>_<hh-mm-ss><am|pm>.mp4
// The date partitions and file name use the local calendar of the configured timezone.

use std::path::{Path, PathBuf};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;

use crate::constants::{CLIP_EXTENSION, CLIP_TIME_FORMAT, PUSH_FILENAME_PREFIX, PUSH_TIME_FORMAT};

/// Where a clip lives on disk. The full path is the clip's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipLocation {
    pub directory: PathBuf,
    pub file_name: String,
}

impl ClipLocation {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Root of one device's subtree.
pub fn device_root(storage_root: &Path, device_name: &str) -> PathBuf {
    storage_root.join(device_name)
}

/// Partition directory for a local calendar date.
pub fn partition_dir<T: TimeZone>(storage_root: &Path, device_name: &str, local: &DateTime<T>) -> PathBuf {
    device_root(storage_root, device_name)
        .join(local.year().to_string())
        .join(format!("{:02}", local.month()))
        .join(format!("{:02}", local.day()))
}

/// Partition directory for "today" as seen from `tz`.
pub fn today_dir(storage_root: &Path, device_name: &str, now: DateTime<Utc>, tz: Tz) -> PathBuf {
    partition_dir(storage_root, device_name, &now.with_timezone(&tz))
}

/// Canonical clip file name for an event that started at `local`.
pub fn clip_file_name<T: TimeZone>(device_name: &str, local: &DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    format!("{}_{}.{}", device_name, local.format(CLIP_TIME_FORMAT), CLIP_EXTENSION)
}

/// Resolve where a pulled event's clip belongs. Conversion to the local timezone
/// happens before partitioning, so an event near midnight UTC lands under its local date.
pub fn resolve(storage_root: &Path, device_name: &str, start_time: DateTime<Utc>, tz: Tz) -> ClipLocation {
    let local = start_time.with_timezone(&tz);
    ClipLocation {
        directory: partition_dir(storage_root, device_name, &local),
        file_name: clip_file_name(device_name, &local),
    }
}

/// File name for a clip delivered through the webhook, stamped with the receipt time.
pub fn push_file_name(device_id: &str, received_at: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{}_{}_{}.{}",
        PUSH_FILENAME_PREFIX,
        device_id,
        received_at.with_timezone(&tz).format(PUSH_TIME_FORMAT),
        CLIP_EXTENSION
    )
}
