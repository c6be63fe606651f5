use crate::accessor::{ByteAccessor, ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{IVFC_MAGIC, IVFC_VERSION, ROMFS_NO_ENTRY};
use crate::util::{align, eq_fold_ascii};
use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;
use std::io::Cursor;

/// IVFC wrapper header. Only Level 3 holds the file tree; levels 1/2 are
/// the hash chain over it.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct IvfcHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub master_hash_size: u32,

    pub lv1_logical_offset: u64,
    pub lv1_hash_data_size: u64,
    pub lv1_block_size_log2: u32,
    pub reserved1: u32,

    pub lv2_logical_offset: u64,
    pub lv2_hash_data_size: u64,
    pub lv2_block_size_log2: u32,
    pub reserved2: u32,

    pub lv3_logical_offset: u64,
    pub lv3_hash_data_size: u64,
    pub lv3_block_size_log2: u32,

    pub reserved3: [u8; 8],
    pub optional_info_size: u32,
}

/// Level 3 region table: five sections, offsets relative to Level 3.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct Level3Header {
    pub header_length: u32,
    pub dir_hash_offset: u32,
    pub dir_hash_length: u32,
    pub dir_meta_offset: u32,
    pub dir_meta_length: u32,
    pub file_hash_offset: u32,
    pub file_hash_length: u32,
    pub file_meta_offset: u32,
    pub file_meta_length: u32,
    pub file_data_offset: u32,
}

#[derive(Debug, Clone)]
pub struct RomFsDirNode {
    pub name: String,
    pub parent: usize,
    pub dirs: Vec<usize>,
    pub files: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct RomFsFileNode {
    pub name: String,
    pub parent: usize,
    pub data_offset: u64,
    pub data_size: u64,
}

/// Entry index into a [`RomFs`] tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomFsEntry {
    Dir(usize),
    File(usize),
}

/// In-memory index over a RomFS image. Nodes are stored in pre-order;
/// index 0 is the nameless root directory.
#[derive(Clone)]
pub struct RomFs {
    pub dirs: Vec<RomFsDirNode>,
    pub files: Vec<RomFsFileNode>,
    file_data: Region,
}

impl RomFs {
    pub fn probe(region: &Region) -> bool {
        let magic_ok = region
            .read_vec(0, 4)
            .map(|magic| magic == IVFC_MAGIC)
            .unwrap_or(false);
        magic_ok
            && region
                .read_u32_le(4)
                .map(|version| version == IVFC_VERSION)
                .unwrap_or(false)
    }

    pub fn load(region: Region) -> RomVfsResult<RomFs> {
        let header_bytes = region.read_vec(0, 0x5C)?;
        let ivfc = IvfcHeader::read(&mut Cursor::new(&header_bytes))?;
        if &ivfc.magic != IVFC_MAGIC || ivfc.version != IVFC_VERSION {
            return Err(RomVfsError::InvalidFormat(
                "IVFC magic or version mismatch".to_string(),
            ));
        }

        let block = 1u64 << ivfc.lv3_block_size_log2;
        let lv3_offset = align(0x60 + ivfc.master_hash_size as u64, block);
        if lv3_offset >= region.len() {
            return Err(RomVfsError::InvalidFormat(
                "RomFS level 3 offset past end".to_string(),
            ));
        }
        let lv3 = region.slice(lv3_offset, region.len() - lv3_offset)?;

        let lv3_header_bytes = lv3.read_vec(0, 0x28)?;
        let lv3_header = Level3Header::read(&mut Cursor::new(&lv3_header_bytes))?;
        Self::from_level3(&lv3, &lv3_header)
    }

    /// Builds the index from an already-located Level 3 payload.
    pub fn from_level3(lv3: &Region, header: &Level3Header) -> RomVfsResult<RomFs> {
        let dir_meta = lv3.read_vec(header.dir_meta_offset as u64, header.dir_meta_length as u64)?;
        let file_meta =
            lv3.read_vec(header.file_meta_offset as u64, header.file_meta_length as u64)?;
        let file_data_offset = header.file_data_offset as u64;
        if file_data_offset > lv3.len() {
            return Err(RomVfsError::InvalidFormat(
                "RomFS file data offset past end".to_string(),
            ));
        }
        let file_data = lv3.slice(file_data_offset, lv3.len() - file_data_offset)?;

        let mut index = RomFs {
            dirs: Vec::new(),
            files: Vec::new(),
            file_data,
        };
        let mut visited = HashSet::new();
        index.walk_dir(&dir_meta, &file_meta, 0, 0, &mut visited)?;

        log::debug!(
            "RomFS decoded: {} dir(s), {} file(s)",
            index.dirs.len(),
            index.files.len()
        );
        Ok(index)
    }

    fn walk_dir(
        &mut self,
        dir_meta: &[u8],
        file_meta: &[u8],
        meta_offset: u32,
        parent: usize,
        visited: &mut HashSet<u32>,
    ) -> RomVfsResult<usize> {
        if !visited.insert(meta_offset) {
            return Err(RomVfsError::InvalidFormat(
                "RomFS directory chain loops".to_string(),
            ));
        }

        let base = meta_offset as usize;
        let name_length = meta_read_u32(dir_meta, base + 0x14)? as usize;
        let name = meta_read_name(dir_meta, base + 0x18, name_length)?;
        let first_child = meta_read_u32(dir_meta, base + 0x08)?;
        let first_file = meta_read_u32(dir_meta, base + 0x0C)?;

        let dir_index = self.dirs.len();
        self.dirs.push(RomFsDirNode {
            name,
            parent,
            dirs: Vec::new(),
            files: Vec::new(),
        });

        let mut file_offset = first_file;
        while file_offset != ROMFS_NO_ENTRY {
            let fbase = file_offset as usize;
            let name_length = meta_read_u32(file_meta, fbase + 0x1C)? as usize;
            let name = meta_read_name(file_meta, fbase + 0x20, name_length)?;
            let data_offset = meta_read_u64(file_meta, fbase + 0x08)?;
            let data_size = meta_read_u64(file_meta, fbase + 0x10)?;

            let file_index = self.files.len();
            self.files.push(RomFsFileNode {
                name,
                parent: dir_index,
                data_offset,
                data_size,
            });
            self.dirs[dir_index].files.push(file_index);

            file_offset = meta_read_u32(file_meta, fbase + 0x04)?;
        }

        let mut child_offset = first_child;
        while child_offset != ROMFS_NO_ENTRY {
            let child = self.walk_dir(dir_meta, file_meta, child_offset, dir_index, visited)?;
            self.dirs[dir_index].dirs.push(child);
            child_offset = meta_read_u32(dir_meta, child_offset as usize + 0x04)?;
        }

        Ok(dir_index)
    }

    /// Case-insensitive per-segment lookup from the root.
    pub fn resolve(&self, segments: &[&str]) -> Option<RomFsEntry> {
        let mut current = 0usize;
        for (position, segment) in segments.iter().enumerate() {
            let dir = &self.dirs[current];
            if let Some(&child) = dir
                .dirs
                .iter()
                .find(|&&d| eq_fold_ascii(&self.dirs[d].name, segment))
            {
                current = child;
                continue;
            }
            let is_last = position == segments.len() - 1;
            if is_last {
                if let Some(&file) = dir
                    .files
                    .iter()
                    .find(|&&f| eq_fold_ascii(&self.files[f].name, segment))
                {
                    return Some(RomFsEntry::File(file));
                }
            }
            return None;
        }
        Some(RomFsEntry::Dir(current))
    }

    pub fn file_region(&self, file_index: usize) -> RomVfsResult<Region> {
        let node = &self.files[file_index];
        self.file_data.slice(node.data_offset, node.data_size)
    }
}

fn meta_read_u32(table: &[u8], offset: usize) -> RomVfsResult<u32> {
    let end = offset
        .checked_add(4)
        .filter(|end| *end <= table.len())
        .ok_or_else(|| RomVfsError::InvalidFormat("RomFS metadata offset past end".to_string()))?;
    Ok(LittleEndian::read_u32(&table[offset..end]))
}

fn meta_read_u64(table: &[u8], offset: usize) -> RomVfsResult<u64> {
    let end = offset
        .checked_add(8)
        .filter(|end| *end <= table.len())
        .ok_or_else(|| RomVfsError::InvalidFormat("RomFS metadata offset past end".to_string()))?;
    Ok(LittleEndian::read_u64(&table[offset..end]))
}

fn meta_read_name(table: &[u8], offset: usize, byte_length: usize) -> RomVfsResult<String> {
    let end = offset
        .checked_add(byte_length)
        .filter(|end| *end <= table.len())
        .ok_or_else(|| RomVfsError::InvalidFormat("RomFS name runs past end".to_string()))?;
    let units: Vec<u16> = table[offset..end]
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::accessor::MemoryAccessor;
    use std::sync::Arc;

    /// Hand-laid minimal image: root directory holding one file `a` with
    /// payload `DATA`, level 3 at 0x1000.
    pub fn tiny_romfs() -> Vec<u8> {
        let mut lv3 = Vec::new();

        let dir_hash_offset = 0x28u32;
        let dir_meta_offset = dir_hash_offset + 4;
        let dir_meta_length = 0x18u32;
        let file_hash_offset = dir_meta_offset + dir_meta_length;
        let file_meta_offset = file_hash_offset + 4;
        let file_meta_length = 0x20 + 4u32;
        let file_data_offset = file_meta_offset + file_meta_length;

        for value in [
            0x28u32,
            dir_hash_offset,
            4,
            dir_meta_offset,
            dir_meta_length,
            file_hash_offset,
            4,
            file_meta_offset,
            file_meta_length,
            file_data_offset,
        ] {
            lv3.extend_from_slice(&value.to_le_bytes());
        }

        // Single-bucket directory hash table pointing at the root.
        lv3.extend_from_slice(&0u32.to_le_bytes());
        // Root directory metadata.
        for value in [0u32, ROMFS_NO_ENTRY, ROMFS_NO_ENTRY, 0, ROMFS_NO_ENTRY, 0] {
            lv3.extend_from_slice(&value.to_le_bytes());
        }
        // Single-bucket file hash table.
        lv3.extend_from_slice(&0u32.to_le_bytes());
        // File metadata for `a`.
        lv3.extend_from_slice(&0u32.to_le_bytes());
        lv3.extend_from_slice(&ROMFS_NO_ENTRY.to_le_bytes());
        lv3.extend_from_slice(&0u64.to_le_bytes());
        lv3.extend_from_slice(&4u64.to_le_bytes());
        lv3.extend_from_slice(&ROMFS_NO_ENTRY.to_le_bytes());
        lv3.extend_from_slice(&2u32.to_le_bytes());
        lv3.extend_from_slice(&(b'a' as u16).to_le_bytes());
        lv3.extend_from_slice(&0u16.to_le_bytes());
        lv3.extend_from_slice(b"DATA");

        let mut image = vec![0u8; 0x1000];
        let ivfc = IvfcHeader {
            magic: *IVFC_MAGIC,
            version: IVFC_VERSION,
            master_hash_size: 0x20,
            lv1_logical_offset: 0,
            lv1_hash_data_size: 0x20,
            lv1_block_size_log2: 0x0C,
            reserved1: 0,
            lv2_logical_offset: 0x1000,
            lv2_hash_data_size: 0x20,
            lv2_block_size_log2: 0x0C,
            reserved2: 0,
            lv3_logical_offset: 0x2000,
            lv3_hash_data_size: lv3.len() as u64,
            lv3_block_size_log2: 0x0C,
            reserved3: [0; 8],
            optional_info_size: 0,
        };
        let mut cursor = Cursor::new(&mut image[..]);
        ivfc.write(&mut cursor).unwrap();
        image.extend_from_slice(&lv3);
        image
    }

    #[test]
    fn probe_checks_magic_and_version() {
        let good = Region::whole(Arc::new(MemoryAccessor::new(tiny_romfs())));
        assert!(RomFs::probe(&good));

        let mut bad = tiny_romfs();
        bad[4] = 1;
        let bad = Region::whole(Arc::new(MemoryAccessor::new(bad)));
        assert!(!RomFs::probe(&bad));
    }

    #[test]
    fn decodes_tree_and_file_data() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(tiny_romfs())));
        let romfs = RomFs::load(region).unwrap();

        assert_eq!(romfs.dirs.len(), 1);
        assert_eq!(romfs.files.len(), 1);
        assert_eq!(romfs.files[0].name, "a");

        let entry = romfs.resolve(&["A"]).unwrap();
        let RomFsEntry::File(index) = entry else {
            panic!("expected file entry");
        };
        let data = romfs.file_region(index).unwrap();
        assert_eq!(data.read_vec(0, 4).unwrap(), b"DATA");
        assert!(romfs.resolve(&["missing"]).is_none());
    }
}
