use super::{check_window, ByteAccessor};
use crate::error::RomVfsResult;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Accessor backed by an open file handle. Reads seek under a mutex, so
/// callers observe single-reader semantics.
pub struct FileAccessor {
    file: Mutex<File>,
    window: u64,
}

impl FileAccessor {
    pub fn open(path: &Path) -> RomVfsResult<FileAccessor> {
        let file = File::open(path)?;
        let window = file.metadata()?.len();
        Ok(FileAccessor {
            file: Mutex::new(file),
            window,
        })
    }
}

impl ByteAccessor for FileAccessor {
    fn len(&self) -> u64 {
        self.window
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RomVfsResult<()> {
        check_window(offset, buf.len() as u64, self.window)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn is_thread_safe(&self) -> bool {
        false
    }
}
