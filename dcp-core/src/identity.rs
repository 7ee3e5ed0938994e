//! Identifiers and file digests

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

/// Size of the buffer used when streaming a file through the digest
const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Generates a fresh random identifier
pub fn make_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Computes the base64-encoded SHA-1 digest of a file, as carried by
/// PackingList `Hash` elements.
pub fn make_digest(path: impl AsRef<Path>) -> Result<String> {
    make_digest_with_progress(path, None)
}

/// Like [`make_digest`], reporting the fraction of bytes hashed so far
pub fn make_digest_with_progress(
    path: impl AsRef<Path>,
    mut progress: Option<&mut dyn FnMut(f32)>,
) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .map_err(|e| Error::file("could not open file to compute digest", path, e))?;
    let total = file.metadata().map(|m| m.len()).unwrap_or(0);

    let mut sha = Sha1::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut done: u64 = 0;
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| Error::file("could not read file to compute digest", path, e))?;
        if read == 0 {
            break;
        }
        sha.update(&buffer[..read]);
        done += read as u64;
        if let Some(report) = progress.as_mut() {
            if total > 0 {
                report((done as f64 / total as f64).min(1.0) as f32);
            }
        }
    }

    Ok(BASE64.encode(sha.finalize()))
}

/// Hex SHA-1 of an in-memory payload; used for per-frame hashes
pub fn frame_hash(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
