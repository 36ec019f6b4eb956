// Clip library on disk: layout, dedup gate, atomic commits and cleanup
//
// There is no index besides the directory tree. A clip's resolved path is its primary
// key, and a path that names a file is never written again.

pub mod paths;
pub mod gate;
pub mod commit;
pub mod reconcile;

pub use commit::{commit_clip, CommitOptions, CommittedClip, Ownership};
pub use gate::GateDecision;
pub use paths::ClipLocation;
pub use reconcile::SweepReport;
