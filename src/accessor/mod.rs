use crate::error::{RomVfsError, RomVfsResult};
use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

mod file;
mod memory;

pub use file::FileAccessor;
pub use memory::{MemoryAccessor, SharedMemoryAccessor};

/// Random-access read over a window of bytes. Every read is bounds-checked
/// against the window; a read past the end fails instead of truncating.
pub trait ByteAccessor: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `buf` from `offset`. Implementations must reject reads that
    /// escape the window with `OutOfRange`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RomVfsResult<()>;

    /// Whether concurrent `read_at` calls may proceed without external
    /// serialization.
    fn is_thread_safe(&self) -> bool;
}

pub(crate) fn check_window(offset: u64, len: u64, window: u64) -> RomVfsResult<()> {
    if offset.checked_add(len).map_or(true, |end| end > window) {
        return Err(RomVfsError::OutOfRange {
            offset,
            len,
            window,
        });
    }
    Ok(())
}

/// Bounded typed reads, implemented once in terms of `read_at`.
pub trait ByteAccessorExt: ByteAccessor {
    fn read_u8(&self, offset: u64) -> RomVfsResult<u8> {
        let mut buf = [0u8; 1];
        self.read_at(offset, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_le(&self, offset: u64) -> RomVfsResult<u16> {
        let mut buf = [0u8; 2];
        self.read_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    fn read_u32_le(&self, offset: u64) -> RomVfsResult<u32> {
        let mut buf = [0u8; 4];
        self.read_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_u64_le(&self, offset: u64) -> RomVfsResult<u64> {
        let mut buf = [0u8; 8];
        self.read_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    fn read_vec(&self, offset: u64, len: u64) -> RomVfsResult<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// ASCII string of known length, trimmed at the first NUL.
    fn read_ascii(&self, offset: u64, len: u64) -> RomVfsResult<String> {
        let bytes = self.read_vec(offset, len)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// UTF-16LE string of `units` code units.
    fn read_utf16_le(&self, offset: u64, units: u64) -> RomVfsResult<String> {
        let bytes = self.read_vec(offset, units * 2)?;
        let code_units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();
        Ok(String::from_utf16_lossy(&code_units))
    }
}

impl<T: ByteAccessor + ?Sized> ByteAccessorExt for T {}

/// A logical `[base, base + len)` window over a shared accessor. Slicing is
/// offset arithmetic only; no bytes are copied and nested slices compose
/// into a single offset against the root accessor's store.
#[derive(Clone)]
pub struct Region {
    source: Arc<dyn ByteAccessor>,
    base: u64,
    window: u64,
}

impl Region {
    pub fn whole(source: Arc<dyn ByteAccessor>) -> Region {
        let window = source.len();
        Region {
            source,
            base: 0,
            window,
        }
    }

    pub fn slice(&self, offset: u64, len: u64) -> RomVfsResult<Region> {
        check_window(offset, len, self.window)?;
        Ok(Region {
            source: Arc::clone(&self.source),
            base: self.base + offset,
            window: len,
        })
    }
}

impl ByteAccessor for Region {
    fn len(&self) -> u64 {
        self.window
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> RomVfsResult<()> {
        check_window(offset, buf.len() as u64, self.window)?;
        self.source.read_at(self.base + offset, buf)
    }

    fn is_thread_safe(&self) -> bool {
        self.source.is_thread_safe()
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("base", &self.base)
            .field("window", &self.window)
            .finish()
    }
}

/// A mutable variant that additionally accepts writes.
pub trait ByteAccessorMut: ByteAccessor {
    fn write_at(&self, offset: u64, bytes: &[u8]) -> RomVfsResult<()>;
}
