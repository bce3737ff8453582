use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Chunk size for streaming file hashes. Media files can be hundreds of
/// megabytes; the whole file must never be resident just to hash it.
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of a byte slice, hex encoded.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's content, hex encoded.
///
/// Reads in fixed-size chunks so memory stays bounded regardless of file
/// size. The result is the content address used to deduplicate media assets
/// across imports.
pub async fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buf)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_bytes(b"hello");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Known vector
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn file_hash_matches_bytes_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"some media content").unwrap();

        let from_file = hash_file(file.path()).await.unwrap();
        assert_eq!(from_file, hash_bytes(b"some media content"));
    }

    #[tokio::test]
    async fn file_hash_is_stable_across_reads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = vec![7u8; 3 * HASH_CHUNK_SIZE + 11];
        file.write_all(&content).unwrap();

        let first = hash_file(file.path()).await.unwrap();
        let second = hash_file(file.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, hash_bytes(&content));
    }
}
