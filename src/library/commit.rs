// Atomic clip commits
//
// A clip is streamed into a hidden temp file in its destination directory, synced,
// then renamed into place without clobbering. The rename is the commit point: readers
// see either no file or the complete clip. On any failure before the rename the temp
// file is dropped and removed.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::constants::{CLIP_FILE_MODE, TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
use crate::error::{DoorcamError, Result};
use crate::hash::copy_hashed;

/// Owner applied to committed clips (PUID/PGID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Modification time stamped on the committed clip.
    pub modified: Option<SystemTime>,
    pub owner: Option<Ownership>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedClip {
    pub path: PathBuf,
    pub bytes: u64,
    pub hash: String,
}

/// Stream `reader` to `dest` atomically. Fails with `AlreadyPresent` if a file
/// already exists at `dest`; the existing file is left untouched.
pub fn commit_clip<R: Read + ?Sized>(dest: &Path, reader: &mut R, options: &CommitOptions) -> Result<CommittedClip> {
    let dir = dest
        .parent()
        .ok_or_else(|| DoorcamError::Other(format!("No parent directory for {}", dest.display())))?;
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(TEMP_FILE_SUFFIX)
        .tempfile_in(dir)?;

    // Temp files are created owner-only; clips are meant to be shared
    set_clip_permissions(temp.as_file())?;
    let digest = copy_hashed(reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    if let Err(e) = temp.persist_noclobber(dest) {
        // `e.file` is dropped here, which removes the temp file
        return Err(match e.error.kind() {
            io::ErrorKind::AlreadyExists => DoorcamError::AlreadyPresent(dest.to_path_buf()),
            _ => DoorcamError::Io(e.error),
        });
    }

    if let Err(e) = fsync_dir(dir) {
        log::warn!("Failed to sync directory {}: {}", dir.display(), e);
    }

    apply_metadata(dest, options);

    Ok(CommittedClip {
        path: dest.to_path_buf(),
        bytes: digest.bytes,
        hash: digest.hash,
    })
}

/// Best-effort metadata after the commit; the clip is already durable at this point.
fn apply_metadata(dest: &Path, options: &CommitOptions) {
    if let Some(modified) = options.modified {
        if let Err(e) = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified)) {
            log::warn!("Failed to set modification time on {}: {}", dest.display(), e);
        }
    }

    if let Some(owner) = options.owner {
        if let Err(e) = set_owner(dest, owner) {
            log::warn!("Failed to set owner {}:{} on {}: {}", owner.uid, owner.gid, dest.display(), e);
        }
    }
}

#[cfg(unix)]
fn set_clip_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(CLIP_FILE_MODE))
}

#[cfg(not(unix))]
fn set_clip_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_owner(path: &Path, owner: Ownership) -> io::Result<()> {
    std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
}

#[cfg(not(unix))]
fn set_owner(_path: &Path, _owner: Ownership) -> io::Result<()> {
    Ok(())
}

/// Sync a directory so a rename inside it survives power loss.
#[cfg(unix)]
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Whether a file name looks like one of our in-flight temp files.
pub fn is_partial_file(name: &str) -> bool {
    name.starts_with(TEMP_FILE_PREFIX) && name.ends_with(TEMP_FILE_SUFFIX)
}
