use crate::error::RomVfsResult;
use std::path::{Path, PathBuf};

mod disk;
mod memory;

pub use disk::DiskFs;
pub use memory::MemoryFs;

/// Host filesystem capability injected into the VFS. The overlay scratch
/// directory and extraction output go through this seam, so a real disk
/// and an in-memory map are interchangeable.
pub trait HostFs: Send + Sync {
    fn file_exists(&self, path: &Path) -> impl std::future::Future<Output = bool> + Send;

    fn directory_exists(&self, path: &Path) -> impl std::future::Future<Output = bool> + Send;

    /// Creates `path` and any missing ancestors.
    fn create_directory(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = RomVfsResult<()>> + Send;

    fn read_all_bytes(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = RomVfsResult<Vec<u8>>> + Send;

    fn write_all_bytes(
        &self,
        path: &Path,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = RomVfsResult<()>> + Send;

    fn delete_file(&self, path: &Path) -> impl std::future::Future<Output = RomVfsResult<()>> + Send;

    /// Deletes `path` and everything under it.
    fn delete_directory(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = RomVfsResult<()>> + Send;

    fn temp_directory(&self) -> PathBuf;

    /// Direct child files of `path`. Missing directories yield an empty list.
    fn files_in(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = RomVfsResult<Vec<PathBuf>>> + Send;

    /// Direct child directories of `path`. Missing directories yield an
    /// empty list.
    fn directories_in(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = RomVfsResult<Vec<PathBuf>>> + Send;
}
