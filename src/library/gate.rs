// Dedup gate: the filesystem is the only record of what has been downloaded

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// A clip already exists at the resolved path.
    Skip,
    /// Nothing at the resolved path yet.
    Download,
}

/// Decide whether an event still needs downloading. Read-only.
///
/// An unreadable path counts as absent; the no-clobber commit still refuses to
/// overwrite if it turns out a clip was there after all.
pub fn check(path: &Path) -> GateDecision {
    if is_materialized(path) {
        GateDecision::Skip
    } else {
        GateDecision::Download
    }
}

pub fn is_materialized(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}
