// src/watch/hash.rs

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Remembers the last manifest content hash so touch-only or duplicate
/// notify events do not cause a redundant sync.
#[derive(Debug, Default, Clone)]
pub struct ManifestFingerprint {
    last: Option<String>,
}

impl ManifestFingerprint {
    /// Seed with the hash of the manifest that was already applied.
    pub fn seeded(hash: impl Into<String>) -> Self {
        Self {
            last: Some(hash.into()),
        }
    }

    /// Record `hash`; returns `true` if it differs from the previous one.
    pub fn update(&mut self, hash: &str) -> bool {
        if self.last.as_deref() == Some(hash) {
            debug!(hash = %hash, "manifest content unchanged");
            return false;
        }
        self.last = Some(hash.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fingerprint_detects_content_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[task.a]\ncommand = \"true\"\n").unwrap();
        let first = compute_file_hash(file.path()).unwrap();

        let mut fp = ManifestFingerprint::seeded(first.clone());
        assert!(!fp.update(&first));

        write!(file, "# edit\n").unwrap();
        let second = compute_file_hash(file.path()).unwrap();
        assert_ne!(first, second);
        assert!(fp.update(&second));
        assert!(!fp.update(&second));
    }
}
