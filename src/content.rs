// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::ContentError;

const PARTIAL_SUFFIX: &str = ".partial";

/// Working directory holding acquired files, addressed by filename
///
/// Files only ever appear at their final name through [`ContentStore::promote`],
/// so existence of a final name means the file is complete.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open the store, creating the directory if needed
    ///
    /// Leftover `.partial` files from interrupted runs are removed; the number
    /// removed is returned alongside the store.
    pub fn open(root: &Path) -> Result<(Self, usize), ContentError> {
        let store = Self {
            root: root.to_path_buf(),
        };

        if !root.exists() {
            std::fs::create_dir_all(root).map_err(|e| ContentError::CreateDirectoryFailed {
                path: root.to_path_buf(),
                source: e,
            })?;
            return Ok((store, 0));
        }

        let entries = std::fs::read_dir(root).map_err(|e| ContentError::ReadDirectoryFailed {
            path: root.to_path_buf(),
            source: e,
        })?;

        let mut partial_files_cleaned = 0;

        for entry in entries {
            let entry = entry.map_err(|e| ContentError::ReadDirectoryFailed {
                path: root.to_path_buf(),
                source: e,
            })?;

            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));

            if is_partial && std::fs::remove_file(&path).is_ok() {
                partial_files_cleaned += 1;
            }
        }

        Ok((store, partial_files_cleaned))
    }

    /// Final location of a file
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Scratch location a file is written to before being promoted
    pub fn partial_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{PARTIAL_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Size in bytes of a stored file
    pub async fn size(&self, name: &str) -> Result<u64, ContentError> {
        let path = self.path(name);
        tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .map_err(|e| ContentError::ReadFailed { path, source: e })
    }

    pub async fn read(&self, name: &str) -> Result<Bytes, ContentError> {
        let path = self.path(name);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| ContentError::ReadFailed { path, source: e })
    }

    /// Write a whole file, going through the partial path
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<(), ContentError> {
        let partial = self.partial_path(name);
        if let Err(e) = tokio::fs::write(&partial, data).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ContentError::WriteFailed {
                path: partial,
                source: e,
            });
        }
        self.promote(name).await
    }

    /// Copy an external file into the store under `name`
    pub async fn import(&self, source: &Path, name: &str) -> Result<(), ContentError> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| ContentError::ReadFailed {
                path: source.to_path_buf(),
                source: e,
            })?;
        self.write(name, &data).await
    }

    /// Atomically move the partial file for `name` to its final path
    pub async fn promote(&self, name: &str) -> Result<(), ContentError> {
        let from = self.partial_path(name);
        let to = self.path(name);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| ContentError::RenameFailed {
                from,
                to,
                source: e,
            })
    }

    /// Remove the partial file for `name`, if any
    pub async fn discard_partial(&self, name: &str) {
        let _ = tokio::fs::remove_file(self.partial_path(name)).await;
    }

    /// Remove a stored file; returns whether it existed
    pub async fn remove(&self, name: &str) -> Result<bool, ContentError> {
        let path = self.path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ContentError::RemoveFailed { path, source: e }),
        }
    }

    /// Hex encoded SHA-256 of a stored file
    pub async fn digest(&self, name: &str) -> Result<String, ContentError> {
        let path = self.path(name);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ContentError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| ContentError::ReadFailed {
                    path: path.clone(),
                    source: e,
                })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_nonexistent_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mirror");

        assert!(!root.exists());
        let (_store, cleaned) = ContentStore::open(&root).unwrap();
        assert!(root.exists());
        assert_eq!(cleaned, 0);
    }

    #[test]
    fn open_cleans_up_partial_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("m1.mp3.partial"), b"half").unwrap();
        std::fs::write(dir.path().join("m2.jpg.partial"), b"half").unwrap();
        std::fs::write(dir.path().join("m3.mp3"), b"complete").unwrap();

        let (store, cleaned) = ContentStore::open(dir.path()).unwrap();

        assert_eq!(cleaned, 2);
        assert!(!dir.path().join("m1.mp3.partial").exists());
        assert!(store.exists("m3.mp3"));
    }

    #[tokio::test]
    async fn partial_file_is_invisible_until_promoted() {
        let dir = tempdir().unwrap();
        let (store, _) = ContentStore::open(dir.path()).unwrap();

        std::fs::write(store.partial_path("m1.mp3"), b"audio").unwrap();
        assert!(!store.exists("m1.mp3"));

        store.promote("m1.mp3").await.unwrap();
        assert!(store.exists("m1.mp3"));
        assert!(!store.partial_path("m1.mp3").exists());
    }

    #[tokio::test]
    async fn write_then_read_and_size() {
        let dir = tempdir().unwrap();
        let (store, _) = ContentStore::open(dir.path()).unwrap();

        store.write("podcast.xml", b"<rss/>").await.unwrap();

        assert_eq!(store.size("podcast.xml").await.unwrap(), 6);
        assert_eq!(&store.read("podcast.xml").await.unwrap()[..], b"<rss/>");
    }

    #[tokio::test]
    async fn remove_reports_whether_file_existed() {
        let dir = tempdir().unwrap();
        let (store, _) = ContentStore::open(dir.path()).unwrap();
        store.write("m1.jpg", b"img").await.unwrap();

        assert!(store.remove("m1.jpg").await.unwrap());
        assert!(!store.remove("m1.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn digest_is_sha256_hex() {
        let dir = tempdir().unwrap();
        let (store, _) = ContentStore::open(dir.path()).unwrap();
        store.write("empty.png", b"").await.unwrap();

        assert_eq!(
            store.digest("empty.png").await.unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
