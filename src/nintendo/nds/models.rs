use crate::accessor::{ByteAccessor, ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

pub const NDS_HEADER_SIZE: u64 = 0x200;
pub const NDS_BANNER_SIZE: u64 = 0x840;
pub const ARM9_FOOTER_MAGIC: u32 = 0x2106_C0DE;
pub const ARM9_FOOTER_SIZE: u64 = 12;

/// Root directory id in the filename table; child directories count up
/// from it.
pub const FNT_ROOT_DIR_ID: u16 = 0xF000;

/// DS cartridge header, modeled through the checksummed prefix; the
/// remainder of the 0x200 bytes is reserved or debugger-only.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct NdsHeader {
    pub game_title: [u8; 12],
    pub game_code: [u8; 4],
    pub maker_code: [u8; 2],
    pub unit_code: u8,
    pub encryption_seed_select: u8,
    pub device_capacity: u8,
    pub reserved1: [u8; 7],
    pub reserved2: u8,
    pub region: u8,
    pub rom_version: u8,
    pub autostart: u8,

    pub arm9_rom_offset: u32,
    pub arm9_entry_address: u32,
    pub arm9_ram_address: u32,
    pub arm9_size: u32,
    pub arm7_rom_offset: u32,
    pub arm7_entry_address: u32,
    pub arm7_ram_address: u32,
    pub arm7_size: u32,

    pub fnt_offset: u32,
    pub fnt_size: u32,
    pub fat_offset: u32,
    pub fat_size: u32,

    pub arm9_overlay_offset: u32,
    pub arm9_overlay_size: u32,
    pub arm7_overlay_offset: u32,
    pub arm7_overlay_size: u32,

    pub normal_card_control: u32,
    pub secure_card_control: u32,

    pub icon_banner_offset: u32,
    pub secure_area_checksum: u16,
    pub secure_area_delay: u16,
    pub arm9_autoload: u32,
    pub arm7_autoload: u32,
    pub secure_area_disable: u64,

    pub total_used_rom_size: u32,
    pub header_size: u32,
}

impl NdsHeader {
    pub fn load(region: &Region) -> RomVfsResult<NdsHeader> {
        let bytes = region.read_vec(0, NDS_HEADER_SIZE)?;
        Ok(NdsHeader::read(&mut Cursor::new(&bytes))?)
    }
}

/// One `(start, end)` window in the file allocation table.
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct FatEntry {
    pub start: u32,
    pub end: u32,
}

impl FatEntry {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Reads the FAT as `(start, end)` pairs; `end` comes from the second
/// word of each pair.
pub fn parse_fat(region: &Region, offset: u32, size: u32) -> RomVfsResult<Vec<FatEntry>> {
    if size % 8 != 0 {
        return Err(RomVfsError::InvalidFormat(
            "FAT size is not a multiple of 8".to_string(),
        ));
    }
    let mut entries = Vec::with_capacity(size as usize / 8);
    let mut cursor = offset as u64;
    let end = offset as u64 + size as u64;
    while cursor < end {
        let start = region.read_u32_le(cursor)?;
        let stop = region.read_u32_le(cursor + 4)?;
        if stop < start || stop as u64 > region.len() {
            return Err(RomVfsError::InvalidFormat(format!(
                "FAT entry at {cursor:#x} escapes the image"
            )));
        }
        entries.push(FatEntry { start, end: stop });
        cursor += 8;
    }
    Ok(entries)
}

/// A named child in a filename-table directory.
#[derive(Debug, Clone)]
pub enum FntChild {
    File { name: String, file_id: u16 },
    Dir { name: String, dir_index: usize },
}

#[derive(Debug, Clone)]
pub struct FntDir {
    pub first_file_id: u16,
    pub children: Vec<FntChild>,
}

/// Walks the filename table: 8-byte main entries, then per-directory
/// sub-tables of length-prefixed names. Directory index 0 is the root.
pub fn parse_fnt(region: &Region, offset: u32, size: u32) -> RomVfsResult<Vec<FntDir>> {
    if size < 8 {
        return Err(RomVfsError::InvalidFormat(
            "FNT is too small for a main table entry".to_string(),
        ));
    }
    let base = offset as u64;

    // The root entry stores the total directory count in its parent field.
    let dir_count = region.read_u16_le(base + 6)? as usize;
    if dir_count == 0 || dir_count > 0x1000 || (dir_count as u64) * 8 > size as u64 {
        return Err(RomVfsError::InvalidFormat(format!(
            "FNT directory count {dir_count} is inconsistent"
        )));
    }

    let mut dirs = Vec::with_capacity(dir_count);
    for index in 0..dir_count {
        let entry = base + index as u64 * 8;
        let sub_table_offset = region.read_u32_le(entry)?;
        let first_file_id = region.read_u16_le(entry + 4)?;
        let children = parse_sub_table(region, base + sub_table_offset as u64, first_file_id)?;
        dirs.push(FntDir {
            first_file_id,
            children,
        });
    }
    Ok(dirs)
}

fn parse_sub_table(
    region: &Region,
    mut cursor: u64,
    first_file_id: u16,
) -> RomVfsResult<Vec<FntChild>> {
    let mut children = Vec::new();
    let mut file_id = first_file_id;

    loop {
        let length = region.read_u8(cursor)?;
        cursor += 1;
        match length {
            0 => break,
            0x80 => {
                return Err(RomVfsError::InvalidFormat(
                    "FNT sub-table uses reserved length 0x80".to_string(),
                ))
            }
            1..=0x7F => {
                let name = region.read_ascii(cursor, length as u64)?;
                cursor += length as u64;
                children.push(FntChild::File { name, file_id });
                file_id = file_id.wrapping_add(1);
            }
            0x81..=0xFF => {
                let name_length = (length - 0x80) as u64;
                let name = region.read_ascii(cursor, name_length)?;
                cursor += name_length;
                let dir_id = region.read_u16_le(cursor)?;
                cursor += 2;
                if dir_id < FNT_ROOT_DIR_ID {
                    return Err(RomVfsError::InvalidFormat(format!(
                        "FNT sub-directory id {dir_id:#x} below the root id"
                    )));
                }
                children.push(FntChild::Dir {
                    name,
                    dir_index: (dir_id - FNT_ROOT_DIR_ID) as usize,
                });
            }
        }
    }
    Ok(children)
}

/// 32-byte overlay table record.
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct OverlayTableEntry {
    pub overlay_id: u32,
    pub ram_address: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    pub static_init_start: u32,
    pub static_init_end: u32,
    pub file_id: u32,
    pub reserved: u32,
}

pub fn parse_overlay_table(
    region: &Region,
    offset: u32,
    size: u32,
) -> RomVfsResult<Vec<OverlayTableEntry>> {
    if size % 32 != 0 {
        return Err(RomVfsError::InvalidFormat(
            "overlay table size is not a multiple of 32".to_string(),
        ));
    }
    let bytes = region.read_vec(offset as u64, size as u64)?;
    let mut cursor = Cursor::new(&bytes);
    let mut entries = Vec::with_capacity(size as usize / 32);
    for _ in 0..size / 32 {
        entries.push(OverlayTableEntry::read(&mut cursor)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::MemoryAccessor;
    use std::sync::Arc;

    fn region_of(bytes: Vec<u8>) -> Region {
        Region::whole(Arc::new(MemoryAccessor::new(bytes)))
    }

    #[test]
    fn fat_reads_start_and_end_pairs() {
        let mut image = vec![0u8; 0x40];
        image[0x10..0x14].copy_from_slice(&0x20u32.to_le_bytes());
        image[0x14..0x18].copy_from_slice(&0x28u32.to_le_bytes());
        let fat = parse_fat(&region_of(image), 0x10, 8).unwrap();
        assert_eq!(fat.len(), 1);
        assert_eq!(fat[0].start, 0x20);
        assert_eq!(fat[0].end, 0x28);
        assert_eq!(fat[0].len(), 8);
    }

    #[test]
    fn fat_entry_escaping_image_is_invalid() {
        let mut image = vec![0u8; 0x20];
        image[0x10..0x14].copy_from_slice(&0x08u32.to_le_bytes());
        image[0x14..0x18].copy_from_slice(&0xFF00u32.to_le_bytes());
        assert!(parse_fat(&region_of(image), 0x10, 8).is_err());
    }

    /// FNT with root { "data.bin", sub/ { "b.txt" } }.
    fn fnt_image() -> Vec<u8> {
        let mut image = vec![0u8; 0x100];
        // Main table: root and one sub-directory.
        image[0x00..0x04].copy_from_slice(&0x10u32.to_le_bytes());
        image[0x04..0x06].copy_from_slice(&0u16.to_le_bytes());
        image[0x06..0x08].copy_from_slice(&2u16.to_le_bytes());
        image[0x08..0x0C].copy_from_slice(&0x20u32.to_le_bytes());
        image[0x0C..0x0E].copy_from_slice(&1u16.to_le_bytes());
        image[0x0E..0x10].copy_from_slice(&0xF000u16.to_le_bytes());

        // Root sub-table.
        image[0x10] = 8;
        image[0x11..0x19].copy_from_slice(b"data.bin");
        image[0x19] = 0x83;
        image[0x1A..0x1D].copy_from_slice(b"sub");
        image[0x1D..0x1F].copy_from_slice(&0xF001u16.to_le_bytes());
        image[0x1F] = 0;

        // Sub-directory sub-table.
        image[0x20] = 5;
        image[0x21..0x26].copy_from_slice(b"b.txt");
        image[0x26] = 0;
        image
    }

    #[test]
    fn fnt_walk_assigns_file_ids() {
        let dirs = parse_fnt(&region_of(fnt_image()), 0, 0x30).unwrap();
        assert_eq!(dirs.len(), 2);

        match &dirs[0].children[..] {
            [FntChild::File { name, file_id }, FntChild::Dir { name: dir_name, dir_index }] => {
                assert_eq!(name, "data.bin");
                assert_eq!(*file_id, 0);
                assert_eq!(dir_name, "sub");
                assert_eq!(*dir_index, 1);
            }
            other => panic!("unexpected root children: {other:?}"),
        }

        match &dirs[1].children[..] {
            [FntChild::File { name, file_id }] => {
                assert_eq!(name, "b.txt");
                assert_eq!(*file_id, 1);
            }
            other => panic!("unexpected sub children: {other:?}"),
        }
    }

    #[test]
    fn fnt_reserved_length_is_invalid() {
        let mut image = fnt_image();
        image[0x10] = 0x80;
        assert!(matches!(
            parse_fnt(&region_of(image), 0, 0x30),
            Err(RomVfsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn overlay_table_decodes_records() {
        let mut image = vec![0u8; 0x40];
        image[0..4].copy_from_slice(&7u32.to_le_bytes());
        image[24..28].copy_from_slice(&3u32.to_le_bytes());
        let entries = parse_overlay_table(&region_of(image), 0, 0x20).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].overlay_id, 7);
        assert_eq!(entries[0].file_id, 3);
    }
}
