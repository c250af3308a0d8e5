//! Package tree checksum.
//!
//! Used to report a digest of the committed package; two runs on identical
//! inputs produce the same digest.

use crate::bundler::{Result, error::ErrorExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Calculates the SHA-256 checksum of a directory tree.
///
/// # Algorithm
///
/// 1. Recursively collect all files and symlinks using walkdir
/// 2. Sort paths lexicographically for deterministic order
/// 3. For each file: hash(relative_path + file_content); for each
///    symlink: hash(relative_path + link target)
/// 4. Return final combined hash, hex encoded
pub async fn calculate_directory_sha256(dir_path: &Path) -> Result<String> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(dir_path).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    for entry in entries {
        // Include relative path in hash (preserves directory structure)
        if let Ok(rel_path) = entry.path().strip_prefix(dir_path) {
            hasher.update(rel_path.to_string_lossy().as_bytes());
            hasher.update([0]);
        }

        if entry.file_type().is_symlink() {
            let target = tokio::fs::read_link(entry.path())
                .await
                .fs_context("reading link for hash calculation", entry.path())?;
            hasher.update(target.to_string_lossy().as_bytes());
            continue;
        }

        let mut file = tokio::fs::File::open(entry.path())
            .await
            .fs_context("opening file for hashing", entry.path())?;

        loop {
            let n = file
                .read(&mut buffer)
                .await
                .fs_context("reading file for hash calculation", entry.path())?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
