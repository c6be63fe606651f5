use super::HostFs;
use crate::error::{RomVfsError, RomVfsResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// In-memory host filesystem. Keys are separator-normalized path strings,
/// compared exactly; hierarchy is tracked so listings and existence checks
/// behave like the disk implementation.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
}

fn key(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(key: &str) -> Option<String> {
    key.rsplit_once('/').map(|(parent, _)| {
        if parent.is_empty() {
            "/".to_string()
        } else {
            parent.to_string()
        }
    })
}

fn is_direct_child(candidate: &str, dir: &str) -> bool {
    let rest = match dir {
        "/" => candidate.strip_prefix('/'),
        _ => candidate
            .strip_prefix(dir)
            .and_then(|r| r.strip_prefix('/')),
    };
    rest.is_some_and(|r| !r.is_empty() && !r.contains('/'))
}

impl MemoryFs {
    pub fn new() -> MemoryFs {
        MemoryFs::default()
    }

    fn record_ancestors(&self, key: &str) {
        let mut dirs = self.dirs.lock();
        let mut current = parent_of(key);
        while let Some(dir) = current {
            if !dirs.insert(dir.clone()) {
                break;
            }
            current = parent_of(&dir);
        }
    }
}

impl HostFs for MemoryFs {
    async fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(&key(path))
    }

    async fn directory_exists(&self, path: &Path) -> bool {
        let k = key(path);
        k == "/" || self.dirs.lock().contains(&k)
    }

    async fn create_directory(&self, path: &Path) -> RomVfsResult<()> {
        let k = key(path);
        self.dirs.lock().insert(k.clone());
        self.record_ancestors(&k);
        Ok(())
    }

    async fn read_all_bytes(&self, path: &Path) -> RomVfsResult<Vec<u8>> {
        self.files
            .lock()
            .get(&key(path))
            .cloned()
            .ok_or_else(|| RomVfsError::NotFound(path.display().to_string()))
    }

    async fn write_all_bytes(&self, path: &Path, bytes: &[u8]) -> RomVfsResult<()> {
        let k = key(path);
        self.files.lock().insert(k.clone(), bytes.to_vec());
        self.record_ancestors(&k);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> RomVfsResult<()> {
        self.files
            .lock()
            .remove(&key(path))
            .map(|_| ())
            .ok_or_else(|| RomVfsError::NotFound(path.display().to_string()))
    }

    async fn delete_directory(&self, path: &Path) -> RomVfsResult<()> {
        let k = key(path);
        let prefix = format!("{k}/");
        self.files.lock().retain(|f, _| !f.starts_with(&prefix));
        self.dirs
            .lock()
            .retain(|d| *d != k && !d.starts_with(&prefix));
        Ok(())
    }

    fn temp_directory(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }

    async fn files_in(&self, path: &Path) -> RomVfsResult<Vec<PathBuf>> {
        let dir = key(path);
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|f| is_direct_child(f, &dir))
            .map(PathBuf::from)
            .collect())
    }

    async fn directories_in(&self, path: &Path) -> RomVfsResult<Vec<PathBuf>> {
        let dir = key(path);
        Ok(self
            .dirs
            .lock()
            .iter()
            .filter(|d| is_direct_child(d, &dir))
            .map(PathBuf::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn files_imply_ancestor_directories() {
        let fs = MemoryFs::new();
        fs.write_all_bytes(Path::new("/tmp/scratch/RomFS/a/b.txt"), b"hi")
            .await
            .unwrap();

        assert!(fs.file_exists(Path::new("/tmp/scratch/RomFS/a/b.txt")).await);
        assert!(fs.directory_exists(Path::new("/tmp/scratch/RomFS/a")).await);
        assert!(fs.directory_exists(Path::new("/tmp/scratch")).await);

        let files = fs.files_in(Path::new("/tmp/scratch/RomFS/a")).await.unwrap();
        assert_eq!(files, vec![PathBuf::from("/tmp/scratch/RomFS/a/b.txt")]);

        let dirs = fs.directories_in(Path::new("/tmp/scratch/RomFS")).await.unwrap();
        assert_eq!(dirs, vec![PathBuf::from("/tmp/scratch/RomFS/a")]);
    }

    #[tokio::test]
    async fn delete_directory_removes_subtree() {
        let fs = MemoryFs::new();
        fs.write_all_bytes(Path::new("/s/RomFS/a/b.txt"), b"x")
            .await
            .unwrap();
        fs.write_all_bytes(Path::new("/s/other.bin"), b"y").await.unwrap();

        fs.delete_directory(Path::new("/s/RomFS")).await.unwrap();
        assert!(!fs.file_exists(Path::new("/s/RomFS/a/b.txt")).await);
        assert!(!fs.directory_exists(Path::new("/s/RomFS/a")).await);
        assert!(fs.file_exists(Path::new("/s/other.bin")).await);
    }
}
