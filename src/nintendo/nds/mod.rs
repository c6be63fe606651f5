use crate::accessor::{ByteAccessor, ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::util::eq_fold_ascii;

pub mod models;

use models::{
    parse_fat, parse_fnt, parse_overlay_table, FatEntry, FntChild, FntDir, NdsHeader,
    OverlayTableEntry, ARM9_FOOTER_MAGIC, ARM9_FOOTER_SIZE, NDS_BANNER_SIZE, NDS_HEADER_SIZE,
};

/// Entry index into the cartridge file tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdsEntry {
    Dir(usize),
    File(u16),
}

/// Decoded DS cartridge: header, FAT, filename table and overlay tables.
pub struct NdsCartridge {
    region: Region,
    pub header: NdsHeader,
    pub fat: Vec<FatEntry>,
    pub dirs: Vec<FntDir>,
    pub arm9_overlays: Vec<OverlayTableEntry>,
    pub arm7_overlays: Vec<OverlayTableEntry>,
}

impl NdsCartridge {
    /// DS cartridges carry no magic; the probe validates that the code
    /// and table windows declared by the header sit inside the image.
    pub fn probe(region: &Region) -> bool {
        let Ok(header) = NdsHeader::load(region) else {
            return false;
        };
        let len = region.len();
        let window_ok = |offset: u32, size: u32| offset as u64 + size as u64 <= len;

        header.arm9_rom_offset as u64 >= NDS_HEADER_SIZE
            && header.arm9_size > 0
            && window_ok(header.arm9_rom_offset, header.arm9_size)
            && window_ok(header.arm7_rom_offset, header.arm7_size)
            && window_ok(header.fat_offset, header.fat_size)
            && window_ok(header.fnt_offset, header.fnt_size)
            && header.fat_size % 8 == 0
    }

    pub fn load(region: Region) -> RomVfsResult<NdsCartridge> {
        let header = NdsHeader::load(&region)?;
        let fat = parse_fat(&region, header.fat_offset, header.fat_size)?;
        let dirs = parse_fnt(&region, header.fnt_offset, header.fnt_size)?;

        let arm9_overlays = if header.arm9_overlay_size > 0 {
            parse_overlay_table(&region, header.arm9_overlay_offset, header.arm9_overlay_size)?
        } else {
            Vec::new()
        };
        let arm7_overlays = if header.arm7_overlay_size > 0 {
            parse_overlay_table(&region, header.arm7_overlay_offset, header.arm7_overlay_size)?
        } else {
            Vec::new()
        };

        log::debug!(
            "NDS cartridge decoded: {} file(s), {} dir(s), {} + {} overlay(s)",
            fat.len(),
            dirs.len(),
            arm9_overlays.len(),
            arm7_overlays.len()
        );

        Ok(NdsCartridge {
            region,
            header,
            fat,
            dirs,
            arm9_overlays,
            arm7_overlays,
        })
    }

    pub fn header_region(&self) -> RomVfsResult<Region> {
        self.region.slice(0, NDS_HEADER_SIZE)
    }

    /// ARM9 binary; extended past the declared size when the footer magic
    /// follows it.
    pub fn arm9_region(&self) -> RomVfsResult<Region> {
        let offset = self.header.arm9_rom_offset as u64;
        let mut size = self.header.arm9_size as u64;
        if self
            .region
            .read_u32_le(offset + size)
            .map(|magic| magic == ARM9_FOOTER_MAGIC)
            .unwrap_or(false)
        {
            size += ARM9_FOOTER_SIZE;
        }
        self.region.slice(offset, size)
    }

    pub fn arm7_region(&self) -> RomVfsResult<Region> {
        self.region
            .slice(self.header.arm7_rom_offset as u64, self.header.arm7_size as u64)
    }

    pub fn arm9_overlay_table_region(&self) -> RomVfsResult<Option<Region>> {
        self.table_region(self.header.arm9_overlay_offset, self.header.arm9_overlay_size)
    }

    pub fn arm7_overlay_table_region(&self) -> RomVfsResult<Option<Region>> {
        self.table_region(self.header.arm7_overlay_offset, self.header.arm7_overlay_size)
    }

    fn table_region(&self, offset: u32, size: u32) -> RomVfsResult<Option<Region>> {
        if size == 0 {
            return Ok(None);
        }
        self.region.slice(offset as u64, size as u64).map(Some)
    }

    pub fn banner_region(&self) -> RomVfsResult<Option<Region>> {
        if self.header.icon_banner_offset == 0 {
            return Ok(None);
        }
        self.region
            .slice(self.header.icon_banner_offset as u64, NDS_BANNER_SIZE)
            .map(Some)
    }

    pub fn file_region(&self, file_id: u16) -> RomVfsResult<Region> {
        let entry = self
            .fat
            .get(file_id as usize)
            .ok_or_else(|| RomVfsError::NotFound(format!("FAT id {file_id}")))?;
        self.region.slice(entry.start as u64, entry.len())
    }

    /// Case-insensitive lookup under the filename-table root.
    pub fn resolve(&self, segments: &[&str]) -> Option<NdsEntry> {
        let mut current = 0usize;
        for (position, segment) in segments.iter().enumerate() {
            let dir = self.dirs.get(current)?;
            let is_last = position == segments.len() - 1;
            let mut next = None;
            for child in &dir.children {
                match child {
                    FntChild::Dir { name, dir_index } if eq_fold_ascii(name, segment) => {
                        next = Some(NdsEntry::Dir(*dir_index));
                        break;
                    }
                    FntChild::File { name, file_id } if is_last && eq_fold_ascii(name, segment) => {
                        next = Some(NdsEntry::File(*file_id));
                        break;
                    }
                    _ => {}
                }
            }
            match next? {
                NdsEntry::Dir(index) => current = index,
                file @ NdsEntry::File(_) => return Some(file),
            }
        }
        Some(NdsEntry::Dir(current))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::accessor::MemoryAccessor;
    use std::sync::Arc;

    /// Cartridge with arm9/arm7, a FAT backing `data.bin`, `sub/b.txt`
    /// and one ARM9 overlay, plus a banner.
    pub fn nds_image(with_arm9_footer: bool) -> Vec<u8> {
        let mut image = vec![0u8; 0x800];
        image[..4].copy_from_slice(b"GAME");

        let set_u32 = |image: &mut Vec<u8>, offset: usize, value: u32| {
            image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        };

        // ARM9 at 0x400 (0x100 bytes), ARM7 at 0x500 (0x80 bytes).
        set_u32(&mut image, 0x20, 0x400);
        set_u32(&mut image, 0x2C, 0x100);
        set_u32(&mut image, 0x30, 0x500);
        set_u32(&mut image, 0x3C, 0x80);

        // FNT at 0x600, FAT at 0x700.
        set_u32(&mut image, 0x40, 0x600);
        set_u32(&mut image, 0x44, 0x30);
        set_u32(&mut image, 0x48, 0x700);
        set_u32(&mut image, 0x4C, 0x18);

        // One ARM9 overlay table entry at 0x760.
        set_u32(&mut image, 0x50, 0x760);
        set_u32(&mut image, 0x54, 0x20);

        // Banner at 0x7A0; grow the image to cover its 0x840 bytes.
        let banner_offset = 0x7A0u32;
        set_u32(&mut image, 0x68, banner_offset);
        image.resize(banner_offset as usize + 0x840, 0);

        if with_arm9_footer {
            set_u32(&mut image, 0x500, ARM9_FOOTER_MAGIC);
        }

        // FNT: root { data.bin, sub/ { b.txt } }.
        let fnt = 0x600;
        set_u32(&mut image, fnt, 0x10);
        image[fnt + 4..fnt + 6].copy_from_slice(&0u16.to_le_bytes());
        image[fnt + 6..fnt + 8].copy_from_slice(&2u16.to_le_bytes());
        set_u32(&mut image, fnt + 8, 0x20);
        image[fnt + 0xC..fnt + 0xE].copy_from_slice(&1u16.to_le_bytes());
        image[fnt + 0xE..fnt + 0x10].copy_from_slice(&0xF000u16.to_le_bytes());
        image[fnt + 0x10] = 8;
        image[fnt + 0x11..fnt + 0x19].copy_from_slice(b"data.bin");
        image[fnt + 0x19] = 0x83;
        image[fnt + 0x1A..fnt + 0x1D].copy_from_slice(b"sub");
        image[fnt + 0x1D..fnt + 0x1F].copy_from_slice(&0xF001u16.to_le_bytes());
        image[fnt + 0x20] = 5;
        image[fnt + 0x21..fnt + 0x26].copy_from_slice(b"b.txt");

        // FAT: file 0 at 0x780 (8 bytes), file 1 at 0x788 (4 bytes),
        // file 2 (overlay) at 0x790 (8 bytes).
        let fat = 0x700;
        set_u32(&mut image, fat, 0x780);
        set_u32(&mut image, fat + 4, 0x788);
        set_u32(&mut image, fat + 8, 0x788);
        set_u32(&mut image, fat + 0xC, 0x78C);
        set_u32(&mut image, fat + 0x10, 0x790);
        set_u32(&mut image, fat + 0x14, 0x798);

        // Overlay 0 maps to FAT file 2.
        let ovl = 0x760;
        set_u32(&mut image, ovl, 0);
        set_u32(&mut image, ovl + 0x18, 2);

        image[0x780..0x788].copy_from_slice(b"DATAFILE");
        image[0x788..0x78C].copy_from_slice(b"BTXT");
        image[0x790..0x798].copy_from_slice(b"OVERLAY0");
        image
    }

    fn cartridge(with_footer: bool) -> NdsCartridge {
        let region = Region::whole(Arc::new(MemoryAccessor::new(nds_image(with_footer))));
        NdsCartridge::load(region).unwrap()
    }

    #[test]
    fn probe_accepts_consistent_header() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(nds_image(false))));
        assert!(NdsCartridge::probe(&region));
        let junk = Region::whole(Arc::new(MemoryAccessor::new(vec![0u8; 0x400])));
        assert!(!NdsCartridge::probe(&junk));
    }

    #[test]
    fn arm9_footer_extends_the_window() {
        let plain = cartridge(false);
        assert_eq!(plain.arm9_region().unwrap().len(), 0x100);

        let footered = cartridge(true);
        assert_eq!(footered.arm9_region().unwrap().len(), 0x100 + 12);
    }

    #[test]
    fn tree_resolution_reaches_nested_files() {
        let cart = cartridge(false);
        assert_eq!(cart.resolve(&["data.bin"]), Some(NdsEntry::File(0)));
        assert_eq!(cart.resolve(&["SUB", "B.TXT"]), Some(NdsEntry::File(1)));
        assert_eq!(cart.resolve(&["sub"]), Some(NdsEntry::Dir(1)));
        assert_eq!(cart.resolve(&["missing"]), None);

        let data = cart.file_region(1).unwrap();
        assert_eq!(data.read_vec(0, 4).unwrap(), b"BTXT");
    }

    #[test]
    fn overlays_map_through_the_fat() {
        let cart = cartridge(false);
        assert_eq!(cart.arm9_overlays.len(), 1);
        let region = cart.file_region(cart.arm9_overlays[0].file_id as u16).unwrap();
        assert_eq!(region.read_vec(0, 8).unwrap(), b"OVERLAY0");
        assert!(cart.arm7_overlay_table_region().unwrap().is_none());
        assert_eq!(cart.banner_region().unwrap().unwrap().len(), 0x840);
    }
}
