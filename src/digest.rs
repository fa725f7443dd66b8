use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::config;
use crate::error::{Result, SyncError};

/// md5 + sha256 fingerprints of one file, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub md5: String,
    pub sha256: String,
}

// In-memory counterpart of digest_file; the sync path always digests the
// bytes on disk, so this is exercised from tests.
#[allow(dead_code)]
pub fn digest_bytes(bytes: &[u8]) -> FileDigests {
    FileDigests {
        md5: hex::encode(Md5::digest(bytes)),
        sha256: hex::encode(Sha256::digest(bytes)),
    }
}

/// Compute both digests in a single pass over the file.
pub fn digest_file(path: &Path) -> Result<FileDigests> {
    let mut file = File::open(path).map_err(|e| SyncError::io(path, e))?;

    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();

    let mut buffer = vec![0u8; config::hashing::CHUNK_BYTES];
    loop {
        let n = file.read(&mut buffer).map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        md5.update(&buffer[..n]);
        sha256.update(&buffer[..n]);
    }

    Ok(FileDigests {
        md5: hex::encode(md5.finalize()),
        sha256: hex::encode(sha256.finalize()),
    })
}

/// True iff the stored digests are present and both agree with `actual`.
/// Empty stored values never match; they mean "never verified".
pub fn matches(stored_md5: &str, stored_sha256: &str, actual: &FileDigests) -> bool {
    !stored_md5.is_empty()
        && !stored_sha256.is_empty()
        && stored_md5.trim().eq_ignore_ascii_case(&actual.md5)
        && stored_sha256.trim().eq_ignore_ascii_case(&actual.sha256)
}
