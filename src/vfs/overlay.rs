use crate::error::RomVfsResult;
use crate::host::HostFs;
use crate::vfs::path::{fold_key, parent, segments};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static SCRATCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// What the overlay knows about a path, before the backing container is
/// consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRead {
    /// Logically deleted; the backing entry must not shine through.
    Deleted,
    /// Overridden by scratch bytes.
    Bytes(Vec<u8>),
    /// The overlay has no opinion.
    Unknown,
}

struct ScratchState {
    root: Option<PathBuf>,
    supplied: bool,
}

/// Copy-on-write state over the read-only backing view: a blacklist of
/// logically deleted paths plus a scratch directory mirroring the VFS
/// hierarchy for written bytes.
pub struct Overlay<H: HostFs> {
    host: Arc<H>,
    scratch: Mutex<ScratchState>,
    blacklist: Mutex<HashSet<String>>,
}

impl<H: HostFs> Overlay<H> {
    pub fn new(host: Arc<H>) -> Overlay<H> {
        Overlay {
            host,
            scratch: Mutex::new(ScratchState {
                root: None,
                supplied: false,
            }),
            blacklist: Mutex::new(HashSet::new()),
        }
    }

    /// Overlay whose scratch directory is owned by the caller; dispose
    /// leaves it in place. Used for pre-extracted directory sources.
    pub fn with_supplied_scratch(host: Arc<H>, root: PathBuf) -> Overlay<H> {
        Overlay {
            host,
            scratch: Mutex::new(ScratchState {
                root: Some(root),
                supplied: true,
            }),
            blacklist: Mutex::new(HashSet::new()),
        }
    }

    fn scratch_root(&self) -> Option<PathBuf> {
        self.scratch.lock().root.clone()
    }

    /// Scratch location for a normalized VFS path, if scratch exists.
    fn scratch_path(&self, normalized: &str) -> Option<PathBuf> {
        let root = self.scratch_root()?;
        let mut location = root;
        for segment in segments(normalized) {
            location.push(segment);
        }
        Some(location)
    }

    /// Allocates the scratch directory on first use.
    async fn ensure_scratch(&self) -> RomVfsResult<PathBuf> {
        if let Some(root) = self.scratch_root() {
            return Ok(root);
        }
        let sequence = SCRATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let root = self.host.temp_directory().join(format!(
            "rom-vfs-{}-{sequence}",
            std::process::id()
        ));
        self.host.create_directory(&root).await?;
        log::debug!("allocated overlay scratch at {}", root.display());
        self.scratch.lock().root = Some(root.clone());
        Ok(root)
    }

    pub fn is_blacklisted(&self, normalized: &str) -> bool {
        self.blacklist.lock().contains(&fold_key(normalized))
    }

    pub async fn write(&self, normalized: &str, bytes: &[u8]) -> RomVfsResult<()> {
        let root = self.ensure_scratch().await?;
        let mut location = root;
        for segment in segments(normalized) {
            location.push(segment);
        }
        if let Some(dir) = location.parent() {
            self.host.create_directory(dir).await?;
        }
        self.host.write_all_bytes(&location, bytes).await?;

        // Publish only after the bytes are durable.
        let mut blacklist = self.blacklist.lock();
        blacklist.remove(&fold_key(normalized));
        let mut ancestor = parent(normalized);
        while ancestor != "/" {
            blacklist.remove(&fold_key(&ancestor));
            ancestor = parent(&ancestor);
        }
        Ok(())
    }

    pub async fn delete(&self, normalized: &str) -> RomVfsResult<()> {
        self.blacklist.lock().insert(fold_key(normalized));
        if let Some(location) = self.scratch_path(normalized) {
            if self.host.file_exists(&location).await {
                self.host.delete_file(&location).await?;
            }
        }
        Ok(())
    }

    pub async fn delete_directory(&self, normalized: &str) -> RomVfsResult<()> {
        self.blacklist.lock().insert(fold_key(normalized));
        if let Some(location) = self.scratch_path(normalized) {
            if self.host.directory_exists(&location).await {
                self.host.delete_directory(&location).await?;
            }
        }
        Ok(())
    }

    pub async fn create_directory(&self, normalized: &str) -> RomVfsResult<()> {
        let mut location = self.ensure_scratch().await?;
        for segment in segments(normalized) {
            location.push(segment);
        }
        self.host.create_directory(&location).await?;
        self.blacklist.lock().remove(&fold_key(normalized));
        Ok(())
    }

    pub async fn read(&self, normalized: &str) -> RomVfsResult<OverlayRead> {
        if self.is_blacklisted(normalized) {
            return Ok(OverlayRead::Deleted);
        }
        if let Some(location) = self.scratch_path(normalized) {
            if self.host.file_exists(&location).await {
                return Ok(OverlayRead::Bytes(self.host.read_all_bytes(&location).await?));
            }
        }
        Ok(OverlayRead::Unknown)
    }

    pub async fn has_file(&self, normalized: &str) -> bool {
        if self.is_blacklisted(normalized) {
            return false;
        }
        match self.scratch_path(normalized) {
            Some(location) => self.host.file_exists(&location).await,
            None => false,
        }
    }

    pub async fn has_directory(&self, normalized: &str) -> bool {
        if self.is_blacklisted(normalized) {
            return false;
        }
        match self.scratch_path(normalized) {
            Some(location) => self.host.directory_exists(&location).await,
            None => false,
        }
    }

    /// Names of scratch files directly under a VFS directory.
    pub async fn files_in(&self, normalized: &str) -> RomVfsResult<Vec<String>> {
        self.children(normalized, false).await
    }

    /// Names of scratch directories directly under a VFS directory.
    pub async fn directories_in(&self, normalized: &str) -> RomVfsResult<Vec<String>> {
        self.children(normalized, true).await
    }

    async fn children(&self, normalized: &str, dirs: bool) -> RomVfsResult<Vec<String>> {
        let Some(location) = self.scratch_path(normalized) else {
            return Ok(Vec::new());
        };
        let listed = if dirs {
            self.host.directories_in(&location).await?
        } else {
            self.host.files_in(&location).await?
        };
        Ok(listed
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    /// Deletes the scratch directory unless the caller supplied it.
    pub async fn dispose(&self) -> RomVfsResult<()> {
        let (root, supplied) = {
            let state = self.scratch.lock();
            (state.root.clone(), state.supplied)
        };
        if let Some(root) = root {
            if !supplied && self.host.directory_exists(&root).await {
                log::debug!("removing overlay scratch at {}", root.display());
                self.host.delete_directory(&root).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;

    fn overlay() -> Overlay<MemoryFs> {
        Overlay::new(Arc::new(MemoryFs::new()))
    }

    #[tokio::test]
    async fn write_then_read_returns_bytes() {
        let overlay = overlay();
        overlay.write("/RomFS/a/b.txt", b"hello").await.unwrap();
        assert_eq!(
            overlay.read("/RomFS/a/b.txt").await.unwrap(),
            OverlayRead::Bytes(b"hello".to_vec())
        );
        assert_eq!(
            overlay.files_in("/RomFS/a").await.unwrap(),
            vec!["b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn delete_then_write_resurrects() {
        let overlay = overlay();
        overlay.delete("/RomFS/foo.dat").await.unwrap();
        assert_eq!(
            overlay.read("/RomFS/foo.dat").await.unwrap(),
            OverlayRead::Deleted
        );
        assert_eq!(overlay.read("/ROMFS/FOO.DAT").await.unwrap(), OverlayRead::Deleted);

        overlay.write("/RomFS/foo.dat", &[1, 2, 3]).await.unwrap();
        assert_eq!(
            overlay.read("/RomFS/foo.dat").await.unwrap(),
            OverlayRead::Bytes(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn delete_removes_scratch_copy() {
        let overlay = overlay();
        overlay.write("/x.bin", b"1").await.unwrap();
        overlay.delete("/x.bin").await.unwrap();
        assert_eq!(overlay.read("/x.bin").await.unwrap(), OverlayRead::Deleted);
        assert!(overlay.files_in("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn supplied_scratch_survives_dispose() {
        let host = Arc::new(MemoryFs::new());
        let root = PathBuf::from("/source-tree");
        host.write_all_bytes(&root.join("a.bin"), b"x").await.unwrap();

        let overlay = Overlay::with_supplied_scratch(Arc::clone(&host), root.clone());
        assert_eq!(
            overlay.read("/a.bin").await.unwrap(),
            OverlayRead::Bytes(b"x".to_vec())
        );
        overlay.dispose().await.unwrap();
        assert!(host.file_exists(&root.join("a.bin")).await);
    }

    #[tokio::test]
    async fn lazy_scratch_is_removed_on_dispose() {
        let host = Arc::new(MemoryFs::new());
        let overlay = Overlay::new(Arc::clone(&host));
        overlay.write("/RomFS/n.bin", b"n").await.unwrap();

        let scratch_root = overlay.scratch_root().unwrap();
        assert!(host.directory_exists(&scratch_root).await);
        overlay.dispose().await.unwrap();
        assert!(!host.directory_exists(&scratch_root).await);
    }
}
