// Doorcam Sync Constants
// The on-disk layout values are a durable interface. Do not change them without a migration.

// Library layout
pub const CLIP_EXTENSION: &str = "mp4";
pub const CLIP_TIME_FORMAT: &str = "%Y-%m-%d_%I-%M-%S%P";
pub const PUSH_FILENAME_PREFIX: &str = "doorbell";
pub const PUSH_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

// Temp files written next to their final path, renamed into place on commit
pub const TEMP_FILE_PREFIX: &str = ".partial-";
pub const TEMP_FILE_SUFFIX: &str = ".tmp";
pub const STALE_PARTIAL_SECONDS: u64 = 3600;
pub const CLIP_FILE_MODE: u32 = 0o644;

// Hashing
pub const HASH_ALGORITHM: &str = "blake3";
pub const COPY_CHUNK_SIZE: usize = 65_536; // 64KB

// Defaults for the configuration surface
pub const DEFAULT_STORAGE_PATH: &str = "./videos";
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
pub const DEFAULT_RETENTION_MINUTES: u32 = 180; // 3 hrs of upstream event history
pub const DEFAULT_RETENTION_MARGIN_MINUTES: u32 = 60; // events linger past the retention mark
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

// Webhook server
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_WEBHOOK_WORKERS: usize = 4;
pub const WEBHOOK_EVENT_ROUTE: &str = "/doorbell-event";
pub const HEALTH_ROUTE: &str = "/health";
pub const MAX_WEBHOOK_BODY_BYTES: u64 = 65_536;

// Worker polling
pub const WORKER_SHUTDOWN_POLL_MS: u64 = 250;
