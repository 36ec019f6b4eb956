// Job system module
//
// runner: a single pass over every device (the `sync` command).
// worker: long-lived per-device threads on a fixed interval (the `serve` command).

pub mod runner;
pub mod worker;

pub use runner::{summarize, sync_all, DeviceReport};
pub use worker::{spawn_workers, wait_for_shutdown, SyncWorkers};
