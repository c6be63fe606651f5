use super::HostFs;
use crate::error::RomVfsResult;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Host filesystem backed by the real disk through `tokio::fs`.
#[derive(Debug, Default, Clone)]
pub struct DiskFs;

impl HostFs for DiskFs {
    async fn file_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn directory_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn create_directory(&self, path: &Path) -> RomVfsResult<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_all_bytes(&self, path: &Path) -> RomVfsResult<Vec<u8>> {
        Ok(fs::read(path).await?)
    }

    async fn write_all_bytes(&self, path: &Path, bytes: &[u8]) -> RomVfsResult<()> {
        fs::write(path, bytes).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> RomVfsResult<()> {
        fs::remove_file(path).await?;
        Ok(())
    }

    async fn delete_directory(&self, path: &Path) -> RomVfsResult<()> {
        fs::remove_dir_all(path).await?;
        Ok(())
    }

    fn temp_directory(&self) -> PathBuf {
        std::env::temp_dir()
    }

    async fn files_in(&self, path: &Path) -> RomVfsResult<Vec<PathBuf>> {
        self.children(path, false).await
    }

    async fn directories_in(&self, path: &Path) -> RomVfsResult<Vec<PathBuf>> {
        self.children(path, true).await
    }
}

impl DiskFs {
    async fn children(&self, path: &Path, dirs: bool) -> RomVfsResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() == dirs {
                entries.push(entry.path());
            }
        }

        entries.sort();
        Ok(entries)
    }
}
