use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// A stored object with its public URL.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Path relative to the storage root, also the URL path suffix.
    pub rel_path: String,
    /// Publicly reachable URL (storage root is served under the public
    /// base, e.g. `/photos`).
    pub url: String,
    /// SHA-256 content digest, recorded with the entry.
    pub checksum: String,
}

/// Filesystem-backed object store for photo content.
///
/// Layout: `<root>/<job_id>/<category_id>/<file>`. Files are written once
/// and never rewritten; history rows keep referencing them forever.
#[derive(Debug, Clone)]
pub struct PhotoStorage {
    root: PathBuf,
    public_base: String,
}

impl PhotoStorage {
    pub fn new<P: Into<PathBuf>>(root: P, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store one object and return its location and digest.
    pub fn store(
        &self,
        job_id: &str,
        category_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> std::io::Result<StoredObject> {
        let dir = self.root.join(sanitize(job_id)).join(sanitize(category_id));
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(file_name);
        std::fs::write(&path, bytes)?;

        let rel_path = format!(
            "{}/{}/{}",
            sanitize(job_id),
            sanitize(category_id),
            file_name
        );
        let url = format!("{}/{}", self.public_base, rel_path);
        let checksum = format!("{:x}", Sha256::digest(bytes));

        log::debug!("Stored {} ({} bytes)", rel_path, bytes.len());
        Ok(StoredObject {
            rel_path,
            url,
            checksum,
        })
    }

    /// Public URL for a stored relative path.
    pub fn url_for(&self, rel_path: &str) -> String {
        format!("{}/{}", self.public_base, rel_path)
    }
}

/// Identifiers become directory names; keep them path-safe.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
