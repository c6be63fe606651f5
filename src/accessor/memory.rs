use super::{check_window, ByteAccessor, ByteAccessorMut};
use crate::error::RomVfsResult;
use parking_lot::RwLock;
use std::sync::Arc;

/// Read-only accessor over an owned byte buffer.
#[derive(Clone)]
pub struct MemoryAccessor {
    bytes: Arc<[u8]>,
}

impl MemoryAccessor {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> MemoryAccessor {
        MemoryAccessor {
            bytes: bytes.into(),
        }
    }
}

impl ByteAccessor for MemoryAccessor {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RomVfsResult<()> {
        check_window(offset, buf.len() as u64, self.bytes.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Writable in-memory accessor. The window is fixed at construction;
/// writes only overwrite bytes already inside it.
#[derive(Clone)]
pub struct SharedMemoryAccessor {
    bytes: Arc<RwLock<Vec<u8>>>,
    window: u64,
}

impl SharedMemoryAccessor {
    pub fn new(bytes: Vec<u8>) -> SharedMemoryAccessor {
        let window = bytes.len() as u64;
        SharedMemoryAccessor {
            bytes: Arc::new(RwLock::new(bytes)),
            window,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl ByteAccessor for SharedMemoryAccessor {
    fn len(&self) -> u64 {
        self.window
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RomVfsResult<()> {
        check_window(offset, buf.len() as u64, self.window)?;
        let bytes = self.bytes.read();
        let start = offset as usize;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn is_thread_safe(&self) -> bool {
        true
    }
}

impl ByteAccessorMut for SharedMemoryAccessor {
    fn write_at(&self, offset: u64, data: &[u8]) -> RomVfsResult<()> {
        check_window(offset, data.len() as u64, self.window)?;
        let mut bytes = self.bytes.write();
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
