// Hashing module using BLAKE3

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use crate::constants::{COPY_CHUNK_SIZE, HASH_ALGORITHM};
use crate::error::Result;

/// Digest and length of a stream that was copied through `copy_hashed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDigest {
    pub bytes: u64,
    pub hash: String,
}

/// Copy `reader` into `writer` in chunks, hashing the bytes as they pass.
/// Format of the hash: "blake3:full:<hex>"
pub fn copy_hashed<R: Read + ?Sized, W: Write + ?Sized>(reader: &mut R, writer: &mut W) -> Result<StreamDigest> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut bytes = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..bytes_read]);
        writer.write_all(&buffer[..bytes_read])?;
        bytes += bytes_read as u64;
    }

    Ok(StreamDigest {
        bytes,
        hash: format_hash(&hasher.finalize()),
    })
}

/// Compute full BLAKE3 hash of entire file
pub fn compute_full_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let digest = copy_hashed(&mut file, &mut std::io::sink())?;
    Ok(digest.hash)
}

fn format_hash(hash: &blake3::Hash) -> String {
    format!("{}:full:{}", HASH_ALGORITHM, hash.to_hex())
}
