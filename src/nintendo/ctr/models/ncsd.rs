use crate::accessor::{ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{
    CTR_MEDIA_UNIT_SIZE, MAGIC_OFFSET, NCSD_HEADER_SIZE, NCSD_MAGIC,
};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// NCSD header: RSA signature, magic at 0x100, media descriptors and the
/// table of 8 partition windows in media units.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct NcsdHeader {
    #[br(count = 0x100)]
    pub signature: Vec<u8>,

    pub magic: [u8; 4],

    /// Image size in media units.
    pub image_size: u32,

    pub media_id: u64,

    /// Filesystem type per partition, one byte each.
    pub partition_fs_types: u64,

    /// Crypt type per partition, one byte each.
    pub partition_crypt_types: u64,

    #[br(count = 8)]
    pub partition_table: Vec<NcsdPartitionEntry>,
}

#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct NcsdPartitionEntry {
    /// Offset in media units.
    pub offset: u32,

    /// Length in media units.
    pub length: u32,
}

impl NcsdHeader {
    /// Cheap format probe; never errors on a non-matching input.
    pub fn probe(region: &Region) -> bool {
        region
            .read_vec(MAGIC_OFFSET, 4)
            .map(|magic| magic == NCSD_MAGIC)
            .unwrap_or(false)
    }

    pub fn load(region: &Region) -> RomVfsResult<NcsdHeader> {
        let bytes = region.read_vec(0, NCSD_HEADER_SIZE)?;
        let header = NcsdHeader::read(&mut Cursor::new(&bytes))?;
        if &header.magic != NCSD_MAGIC {
            return Err(RomVfsError::InvalidFormat(
                "NCSD magic missing at 0x100".to_string(),
            ));
        }
        Ok(header)
    }

    /// Byte window of partition `index`, or `None` for an empty slot.
    /// A slot that escapes the image is inconsistent.
    pub fn partition_region(&self, region: &Region, index: usize) -> RomVfsResult<Option<Region>> {
        let Some(entry) = self.partition_table.get(index) else {
            return Ok(None);
        };
        if entry.length == 0 {
            return Ok(None);
        }
        let offset = entry.offset as u64 * CTR_MEDIA_UNIT_SIZE;
        let length = entry.length as u64 * CTR_MEDIA_UNIT_SIZE;
        region.slice(offset, length).map(Some).map_err(|_| {
            RomVfsError::InvalidFormat(format!("NCSD partition {index} overflows the image"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{ByteAccessor, MemoryAccessor};
    use std::sync::Arc;

    fn ncsd_image() -> Vec<u8> {
        let mut image = vec![0u8; 0x2000];
        image[0x100..0x104].copy_from_slice(NCSD_MAGIC);
        // Partition 0 at media unit 2, 8 units long.
        image[0x120..0x124].copy_from_slice(&2u32.to_le_bytes());
        image[0x124..0x128].copy_from_slice(&8u32.to_le_bytes());
        image
    }

    fn region_of(image: Vec<u8>) -> Region {
        Region::whole(Arc::new(MemoryAccessor::new(image)))
    }

    #[test]
    fn probe_requires_magic() {
        assert!(NcsdHeader::probe(&region_of(ncsd_image())));
        assert!(!NcsdHeader::probe(&region_of(vec![0u8; 0x200])));
        assert!(!NcsdHeader::probe(&region_of(vec![0u8; 8])));
    }

    #[test]
    fn partition_windows_scale_by_media_unit() {
        let region = region_of(ncsd_image());
        let header = NcsdHeader::load(&region).unwrap();

        let partition = header.partition_region(&region, 0).unwrap().unwrap();
        assert_eq!(partition.len(), 8 * 0x200);
        assert!(header.partition_region(&region, 1).unwrap().is_none());
        assert!(header.partition_region(&region, 8).unwrap().is_none());
    }

    #[test]
    fn overflowing_slot_is_invalid() {
        let mut image = ncsd_image();
        image[0x124..0x128].copy_from_slice(&0x100u32.to_le_bytes());
        let region = region_of(image);
        let header = NcsdHeader::load(&region).unwrap();
        assert!(matches!(
            header.partition_region(&region, 0),
            Err(RomVfsError::InvalidFormat(_))
        ));
    }
}
