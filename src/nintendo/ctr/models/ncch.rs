use crate::accessor::{ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{
    CTR_MEDIA_UNIT_SIZE, EXHEADER_REGION_SIZE, MAGIC_OFFSET, NCCH_HEADER_SIZE, NCCH_MAGIC,
};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// NCCH partition header. Region offsets and sizes are in media units;
/// an absent region carries offset 0.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct NcchHeader {
    #[br(count = 0x100)]
    pub signature: Vec<u8>,

    pub magic: [u8; 4],

    /// Content size in media units.
    pub content_size: u32,

    pub partition_id: u64,
    pub maker_code: [u8; 2],
    pub version: u16,
    pub content_lock_seed_hash: u32,
    pub program_id: u64,

    #[br(count = 0x10)]
    pub reserved1: Vec<u8>,

    #[br(count = 0x20)]
    pub logo_hash: Vec<u8>,

    pub product_code: [u8; 0x10],

    #[br(count = 0x20)]
    pub exheader_hash: Vec<u8>,

    /// Declared ExHeader size in bytes (not media units).
    pub exheader_size: u32,

    pub reserved2: u32,
    pub flags: [u8; 8],

    pub plain_offset: u32,
    pub plain_size: u32,
    pub logo_offset: u32,
    pub logo_size: u32,
    pub exefs_offset: u32,
    pub exefs_size: u32,
    pub exefs_hash_region_size: u32,
    pub reserved3: u32,
    pub romfs_offset: u32,
    pub romfs_size: u32,
    pub romfs_hash_region_size: u32,
    pub reserved4: u32,

    #[br(count = 0x20)]
    pub exefs_superblock_hash: Vec<u8>,

    #[br(count = 0x20)]
    pub romfs_superblock_hash: Vec<u8>,
}

impl NcchHeader {
    pub fn probe(region: &Region) -> bool {
        region
            .read_vec(MAGIC_OFFSET, 4)
            .map(|magic| magic == NCCH_MAGIC)
            .unwrap_or(false)
    }

    pub fn load(region: &Region) -> RomVfsResult<NcchHeader> {
        let bytes = region.read_vec(0, NCCH_HEADER_SIZE)?;
        let header = NcchHeader::read(&mut Cursor::new(&bytes))?;
        if &header.magic != NCCH_MAGIC {
            return Err(RomVfsError::InvalidFormat(
                "NCCH magic missing at 0x100".to_string(),
            ));
        }
        Ok(header)
    }

    /// ExHeader sits right after the header: system control info plus the
    /// access descriptor.
    pub fn exheader_region(&self, partition: &Region) -> RomVfsResult<Option<Region>> {
        if self.exheader_size == 0 {
            return Ok(None);
        }
        self.checked_slice(partition, "ExHeader", NCCH_HEADER_SIZE, EXHEADER_REGION_SIZE)
    }

    pub fn plain_region(&self, partition: &Region) -> RomVfsResult<Option<Region>> {
        self.media_unit_region(partition, "plain region", self.plain_offset, self.plain_size)
    }

    pub fn logo_region(&self, partition: &Region) -> RomVfsResult<Option<Region>> {
        self.media_unit_region(partition, "logo", self.logo_offset, self.logo_size)
    }

    pub fn exefs_region(&self, partition: &Region) -> RomVfsResult<Option<Region>> {
        self.media_unit_region(partition, "ExeFS", self.exefs_offset, self.exefs_size)
    }

    pub fn romfs_region(&self, partition: &Region) -> RomVfsResult<Option<Region>> {
        self.media_unit_region(partition, "RomFS", self.romfs_offset, self.romfs_size)
    }

    fn media_unit_region(
        &self,
        partition: &Region,
        what: &str,
        offset: u32,
        size: u32,
    ) -> RomVfsResult<Option<Region>> {
        if offset == 0 || size == 0 {
            return Ok(None);
        }
        self.checked_slice(
            partition,
            what,
            offset as u64 * CTR_MEDIA_UNIT_SIZE,
            size as u64 * CTR_MEDIA_UNIT_SIZE,
        )
    }

    fn checked_slice(
        &self,
        partition: &Region,
        what: &str,
        offset: u64,
        size: u64,
    ) -> RomVfsResult<Option<Region>> {
        partition.slice(offset, size).map(Some).map_err(|_| {
            RomVfsError::InvalidFormat(format!("NCCH {what} overflows the partition"))
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::accessor::{ByteAccessor, MemoryAccessor};
    use std::sync::Arc;

    /// Minimal NCCH image: header + ExHeader + one-media-unit ExeFS window.
    pub fn ncch_image() -> Vec<u8> {
        let mut image = vec![0u8; 0x1400];
        image[0x100..0x104].copy_from_slice(NCCH_MAGIC);
        image[0x180..0x184].copy_from_slice(&0x400u32.to_le_bytes());
        // ExeFS at media unit 5, one unit.
        image[0x1A0..0x1A4].copy_from_slice(&5u32.to_le_bytes());
        image[0x1A4..0x1A8].copy_from_slice(&1u32.to_le_bytes());
        image
    }

    #[test]
    fn regions_resolve_in_media_units() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(ncch_image())));
        let header = NcchHeader::load(&region).unwrap();

        let exheader = header.exheader_region(&region).unwrap().unwrap();
        assert_eq!(exheader.len(), 0x800);

        let exefs = header.exefs_region(&region).unwrap().unwrap();
        assert_eq!(exefs.len(), 0x200);

        assert!(header.romfs_region(&region).unwrap().is_none());
        assert!(header.plain_region(&region).unwrap().is_none());
    }

    #[test]
    fn overflowing_region_is_invalid() {
        let mut image = ncch_image();
        image[0x1A4..0x1A8].copy_from_slice(&0x1000u32.to_le_bytes());
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));
        let header = NcchHeader::load(&region).unwrap();
        assert!(header.exefs_region(&region).is_err());
    }
}
