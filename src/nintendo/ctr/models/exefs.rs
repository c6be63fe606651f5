use crate::accessor::{ByteAccessor, ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{EXEFS_HEADER_SIZE, EXEFS_MAX_ENTRIES, EXEFS_NAME_SIZE};
use crate::util::eq_fold_ascii;
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// ExeFS header: 10 file descriptors, 0x20 reserved bytes, then the 10
/// SHA-256 hashes stored in reverse descriptor order.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct ExeFsHeader {
    #[br(count = EXEFS_MAX_ENTRIES)]
    pub descriptors: Vec<ExeFsFileEntry>,

    #[br(count = 0x20)]
    pub reserved: Vec<u8>,

    #[br(count = EXEFS_MAX_ENTRIES)]
    pub hashes: Vec<[u8; 0x20]>,
}

#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct ExeFsFileEntry {
    pub fname: [u8; EXEFS_NAME_SIZE],
    pub offset: u32,
    pub size: u32,
}

/// A decoded descriptor slot. `hash` pairs the entry with the header hash
/// that covers its payload.
#[derive(Debug, Clone)]
pub struct ExeFsEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub hash: [u8; 0x20],
}

#[derive(Clone)]
pub struct ExeFs {
    region: Region,
    entries: Vec<ExeFsEntry>,
}

impl ExeFs {
    /// ExeFS has no magic; the probe validates descriptor-table shape:
    /// at least one named slot, ASCII names, payloads inside the window.
    pub fn probe(region: &Region) -> bool {
        if region.len() < EXEFS_HEADER_SIZE {
            return false;
        }
        let Ok(bytes) = region.read_vec(0, EXEFS_HEADER_SIZE) else {
            return false;
        };
        let Ok(header) = ExeFsHeader::read(&mut Cursor::new(&bytes)) else {
            return false;
        };

        let mut named = 0usize;
        for descriptor in &header.descriptors {
            if descriptor.fname.iter().all(|b| *b == 0) {
                continue;
            }
            let name_end = descriptor
                .fname
                .iter()
                .position(|b| *b == 0)
                .unwrap_or(EXEFS_NAME_SIZE);
            if descriptor.fname[..name_end]
                .iter()
                .any(|b| !b.is_ascii_graphic())
            {
                return false;
            }
            if descriptor.fname[name_end..].iter().any(|b| *b != 0) {
                return false;
            }
            let end = EXEFS_HEADER_SIZE as u128
                + descriptor.offset as u128
                + descriptor.size as u128;
            if end > region.len() as u128 {
                return false;
            }
            named += 1;
        }
        named > 0
    }

    pub fn load(region: Region) -> RomVfsResult<ExeFs> {
        let bytes = region.read_vec(0, EXEFS_HEADER_SIZE)?;
        let header = ExeFsHeader::read(&mut Cursor::new(&bytes))?;

        let mut entries = Vec::new();
        for (index, descriptor) in header.descriptors.iter().enumerate() {
            if descriptor.fname.iter().all(|b| *b == 0) {
                continue;
            }
            let name_end = descriptor
                .fname
                .iter()
                .position(|b| *b == 0)
                .unwrap_or(EXEFS_NAME_SIZE);
            let name = String::from_utf8_lossy(&descriptor.fname[..name_end]).into_owned();
            entries.push(ExeFsEntry {
                name,
                offset: descriptor.offset,
                size: descriptor.size,
                hash: header.hashes[EXEFS_MAX_ENTRIES - 1 - index],
            });
        }

        log::debug!("ExeFS decoded with {} file(s)", entries.len());
        Ok(ExeFs { region, entries })
    }

    pub fn entries(&self) -> &[ExeFsEntry] {
        &self.entries
    }

    /// Case-insensitive lookup by file name.
    pub fn entry(&self, name: &str) -> Option<&ExeFsEntry> {
        self.entries.iter().find(|e| eq_fold_ascii(&e.name, name))
    }

    pub fn file_region(&self, name: &str) -> RomVfsResult<Region> {
        let entry = self
            .entry(name)
            .ok_or_else(|| RomVfsError::NotFound(name.to_string()))?;
        self.region
            .slice(EXEFS_HEADER_SIZE + entry.offset as u64, entry.size as u64)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::accessor::MemoryAccessor;
    use sha2::{Digest, Sha256};
    use std::sync::Arc;

    /// One-file ExeFS with a correct reverse-order hash slot.
    pub fn exefs_image(name: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 0x200 + crate::util::align(payload.len() as u64, 0x200) as usize];
        image[..name.len()].copy_from_slice(name);
        image[8..12].copy_from_slice(&0u32.to_le_bytes());
        image[12..16].copy_from_slice(&(payload.len() as u32).to_le_bytes());

        let digest = Sha256::digest(payload);
        // Descriptor 0's hash lives in the last hash slot.
        image[0xC0 + 9 * 0x20..0xC0 + 10 * 0x20].copy_from_slice(&digest);

        image[0x200..0x200 + payload.len()].copy_from_slice(payload);
        image
    }

    #[test]
    fn decodes_entries_and_hash_pairing() {
        let payload = vec![0x5A; 0x1234];
        let region = Region::whole(Arc::new(MemoryAccessor::new(exefs_image(b"code.bin", &payload))));
        assert!(ExeFs::probe(&region));

        let exefs = ExeFs::load(region).unwrap();
        let entry = exefs.entry("CODE.BIN").unwrap();
        assert_eq!(entry.size, 0x1234);
        assert_eq!(entry.hash, <[u8; 0x20]>::from(Sha256::digest(&payload)));

        let data = exefs.file_region("code.bin").unwrap();
        assert_eq!(data.len(), 0x1234);
        assert_eq!(data.read_vec(0, 4).unwrap(), vec![0x5A; 4]);
    }

    #[test]
    fn probe_rejects_junk() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(vec![0xFFu8; 0x400])));
        assert!(!ExeFs::probe(&region));

        let empty = Region::whole(Arc::new(MemoryAccessor::new(vec![0u8; 0x400])));
        assert!(!ExeFs::probe(&empty));
    }
}
