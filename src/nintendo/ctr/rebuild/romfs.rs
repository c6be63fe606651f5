use crate::accessor::{ByteAccessor, ByteAccessorExt};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{
    IVFC_BLOCK_SIZE, IVFC_MAGIC, IVFC_VERSION, ROMFS_DATA_ALIGN, ROMFS_NO_ENTRY,
};
use crate::nintendo::ctr::models::romfs::{IvfcHeader, Level3Header, RomFs};
use crate::util::{align, largest_prime_at_most};
use binrw::BinWrite;
use sha2::{Digest, Sha256};
use std::io::Cursor;

const DATA_SIZE_LIMIT: u64 = 1 << 56;

/// Source tree handed to the RomFS serializer.
#[derive(Debug, Clone, Default)]
pub struct RomFsTreeDir {
    pub name: String,
    pub dirs: Vec<RomFsTreeDir>,
    pub files: Vec<RomFsTreeFile>,
}

#[derive(Debug, Clone)]
pub struct RomFsTreeFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RomFsTreeDir {
    /// Root for a tree assembled by hand or from a VFS walk.
    pub fn root() -> RomFsTreeDir {
        RomFsTreeDir::default()
    }

    /// Reassembles a source tree from a decoded index, reading every
    /// file's payload.
    pub fn from_index(romfs: &RomFs) -> RomVfsResult<RomFsTreeDir> {
        fn convert(romfs: &RomFs, dir_index: usize) -> RomVfsResult<RomFsTreeDir> {
            let node = &romfs.dirs[dir_index];
            let mut dir = RomFsTreeDir {
                name: node.name.clone(),
                dirs: Vec::new(),
                files: Vec::new(),
            };
            for &file_index in &node.files {
                let file = &romfs.files[file_index];
                let region = romfs.file_region(file_index)?;
                dir.files.push(RomFsTreeFile {
                    name: file.name.clone(),
                    bytes: region.read_vec(0, region.len())?,
                });
            }
            for &child in &node.dirs {
                dir.dirs.push(convert(romfs, child)?);
            }
            Ok(dir)
        }
        convert(romfs, 0)
    }
}

/// Flattened pre-order records carrying everything the tables need.
struct FlatDir {
    name: String,
    parent: usize,
    children: Vec<usize>,
    files: Vec<usize>,
    meta_offset: u32,
}

struct FlatFile {
    name: String,
    parent: usize,
    bytes_index: usize,
    data_offset: u64,
    meta_offset: u32,
}

fn utf16_key(name: &str) -> Vec<u16> {
    name.encode_utf16().collect()
}

fn name_table_bytes(name: &str) -> Vec<u8> {
    let units = utf16_key(name);
    let mut bytes = Vec::with_capacity(align(units.len() as u64 * 2, 4) as usize);
    for unit in units {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
}

/// Bucket hash for directory/file names: seeded with the parent's
/// metadata offset, folded over UTF-16 code units.
fn name_hash(parent_offset: u32, name: &str) -> u32 {
    let mut hash = parent_offset;
    for unit in name.encode_utf16() {
        hash = (hash >> 5) ^ (hash << 27) ^ unit as u32;
    }
    hash
}

fn bucket_count(entries: usize) -> u32 {
    largest_prime_at_most((entries as u32 / 2).max(3))
}

/// Serializes a tree into RomFS bytes: Level 3 tables with hash buckets
/// and 16-byte-aligned payloads, wrapped in the IVFC hash tree.
pub fn build_romfs(root: &RomFsTreeDir) -> RomVfsResult<Vec<u8>> {
    let (dirs, files, payloads) = flatten(root)?;
    let level3 = build_level3(dirs, files, &payloads)?;
    wrap_ivfc(&level3)
}

/// Pre-order flattening; sibling lists sorted by UTF-16 code units,
/// duplicates rejected.
fn flatten(root: &RomFsTreeDir) -> RomVfsResult<(Vec<FlatDir>, Vec<FlatFile>, Vec<Vec<u8>>)> {
    let mut dirs: Vec<FlatDir> = Vec::new();
    let mut files: Vec<FlatFile> = Vec::new();
    let mut payloads: Vec<Vec<u8>> = Vec::new();

    fn visit(
        source: &RomFsTreeDir,
        parent: usize,
        dirs: &mut Vec<FlatDir>,
        files: &mut Vec<FlatFile>,
        payloads: &mut Vec<Vec<u8>>,
    ) -> RomVfsResult<usize> {
        let dir_index = dirs.len();
        dirs.push(FlatDir {
            name: source.name.clone(),
            parent,
            children: Vec::new(),
            files: Vec::new(),
            meta_offset: 0,
        });

        let mut file_order: Vec<&RomFsTreeFile> = source.files.iter().collect();
        file_order.sort_by_key(|f| utf16_key(&f.name));
        for pair in file_order.windows(2) {
            if utf16_key(&pair[0].name) == utf16_key(&pair[1].name) {
                return Err(RomVfsError::InvalidTree(pair[1].name.clone()));
            }
        }
        for file in file_order {
            let file_index = files.len();
            payloads.push(file.bytes.clone());
            files.push(FlatFile {
                name: file.name.clone(),
                parent: dir_index,
                bytes_index: payloads.len() - 1,
                data_offset: 0,
                meta_offset: 0,
            });
            dirs[dir_index].files.push(file_index);
        }

        let mut dir_order: Vec<&RomFsTreeDir> = source.dirs.iter().collect();
        dir_order.sort_by_key(|d| utf16_key(&d.name));
        for pair in dir_order.windows(2) {
            if utf16_key(&pair[0].name) == utf16_key(&pair[1].name) {
                return Err(RomVfsError::InvalidTree(pair[1].name.clone()));
            }
        }
        for child in dir_order {
            if dirs[dir_index]
                .files
                .iter()
                .any(|&f| utf16_key(&files[f].name) == utf16_key(&child.name))
            {
                return Err(RomVfsError::InvalidTree(child.name.clone()));
            }
            let child_index = visit(child, dir_index, dirs, files, payloads)?;
            dirs[dir_index].children.push(child_index);
        }

        Ok(dir_index)
    }

    visit(root, 0, &mut dirs, &mut files, &mut payloads)?;
    Ok((dirs, files, payloads))
}

fn build_level3(
    mut dirs: Vec<FlatDir>,
    mut files: Vec<FlatFile>,
    payloads: &[Vec<u8>],
) -> RomVfsResult<Vec<u8>> {
    // Metadata offsets accumulate in pre-order id order.
    let mut offset = 0u32;
    for dir in dirs.iter_mut() {
        dir.meta_offset = offset;
        offset += 0x18 + name_table_bytes(&dir.name).len() as u32;
    }
    let dir_meta_length = offset;

    let mut offset = 0u32;
    for file in files.iter_mut() {
        file.meta_offset = offset;
        offset += 0x20 + name_table_bytes(&file.name).len() as u32;
    }
    let file_meta_length = offset;

    // Payload packing, each file aligned up to 16 bytes.
    let mut data_offset = 0u64;
    for file in files.iter_mut() {
        file.data_offset = data_offset;
        data_offset = align(data_offset + payloads[file.bytes_index].len() as u64, ROMFS_DATA_ALIGN);
    }
    if data_offset > DATA_SIZE_LIMIT {
        return Err(RomVfsError::SizeLimit);
    }

    // Hash buckets chain by prepending, in id order.
    let dir_buckets = bucket_count(dirs.len());
    let mut dir_hash_table = vec![ROMFS_NO_ENTRY; dir_buckets as usize];
    let mut dir_hash_links = vec![ROMFS_NO_ENTRY; dirs.len()];
    for (index, dir) in dirs.iter().enumerate() {
        let seed = dirs[dir.parent].meta_offset;
        let bucket = (name_hash(seed, &dir.name) % dir_buckets) as usize;
        dir_hash_links[index] = dir_hash_table[bucket];
        dir_hash_table[bucket] = dir.meta_offset;
    }

    let file_buckets = bucket_count(files.len());
    let mut file_hash_table = vec![ROMFS_NO_ENTRY; file_buckets as usize];
    let mut file_hash_links = vec![ROMFS_NO_ENTRY; files.len()];
    for (index, file) in files.iter().enumerate() {
        let seed = dirs[file.parent].meta_offset;
        let bucket = (name_hash(seed, &file.name) % file_buckets) as usize;
        file_hash_links[index] = file_hash_table[bucket];
        file_hash_table[bucket] = file.meta_offset;
    }

    // Section layout, each 4-byte aligned.
    let header_length = 0x28u32;
    let dir_hash_offset = align(header_length as u64, 4) as u32;
    let dir_hash_length = dir_buckets * 4;
    let dir_meta_offset = align((dir_hash_offset + dir_hash_length) as u64, 4) as u32;
    let file_hash_offset = align((dir_meta_offset + dir_meta_length) as u64, 4) as u32;
    let file_hash_length = file_buckets * 4;
    let file_meta_offset = align((file_hash_offset + file_hash_length) as u64, 4) as u32;
    let file_data_offset = align((file_meta_offset + file_meta_length) as u64, ROMFS_DATA_ALIGN) as u32;

    let header = Level3Header {
        header_length,
        dir_hash_offset,
        dir_hash_length,
        dir_meta_offset,
        dir_meta_length,
        file_hash_offset,
        file_hash_length,
        file_meta_offset,
        file_meta_length,
        file_data_offset,
    };

    let mut level3 = Vec::new();
    header.write(&mut Cursor::new(&mut level3))?;

    level3.resize(dir_hash_offset as usize, 0);
    for bucket in &dir_hash_table {
        level3.extend_from_slice(&bucket.to_le_bytes());
    }

    level3.resize(dir_meta_offset as usize, 0);
    for (index, dir) in dirs.iter().enumerate() {
        let parent_offset = dirs[dir.parent].meta_offset;
        let sibling = {
            let siblings = &dirs[dir.parent].children;
            siblings
                .iter()
                .position(|&d| d == index)
                .and_then(|position| siblings.get(position + 1))
                .map(|&next| dirs[next].meta_offset)
                .unwrap_or(ROMFS_NO_ENTRY)
        };
        let first_child = dir
            .children
            .first()
            .map(|&c| dirs[c].meta_offset)
            .unwrap_or(ROMFS_NO_ENTRY);
        let first_file = dir
            .files
            .first()
            .map(|&f| files[f].meta_offset)
            .unwrap_or(ROMFS_NO_ENTRY);
        let name = name_table_bytes(&dir.name);

        for value in [
            parent_offset,
            sibling,
            first_child,
            first_file,
            dir_hash_links[index],
            (utf16_key(&dir.name).len() * 2) as u32,
        ] {
            level3.extend_from_slice(&value.to_le_bytes());
        }
        level3.extend_from_slice(&name);
    }

    level3.resize(file_hash_offset as usize, 0);
    for bucket in &file_hash_table {
        level3.extend_from_slice(&bucket.to_le_bytes());
    }

    level3.resize(file_meta_offset as usize, 0);
    for (index, file) in files.iter().enumerate() {
        let parent_offset = dirs[file.parent].meta_offset;
        let sibling = {
            let siblings = &dirs[file.parent].files;
            siblings
                .iter()
                .position(|&f| f == index)
                .and_then(|position| siblings.get(position + 1))
                .map(|&next| files[next].meta_offset)
                .unwrap_or(ROMFS_NO_ENTRY)
        };

        level3.extend_from_slice(&parent_offset.to_le_bytes());
        level3.extend_from_slice(&sibling.to_le_bytes());
        level3.extend_from_slice(&file.data_offset.to_le_bytes());
        level3.extend_from_slice(&(payloads[file.bytes_index].len() as u64).to_le_bytes());
        level3.extend_from_slice(&file_hash_links[index].to_le_bytes());
        level3.extend_from_slice(&((utf16_key(&file.name).len() * 2) as u32).to_le_bytes());
        level3.extend_from_slice(&name_table_bytes(&file.name));
    }

    level3.resize(file_data_offset as usize, 0);
    for file in &files {
        let target = file_data_offset as u64 + file.data_offset;
        level3.resize(target as usize, 0);
        level3.extend_from_slice(&payloads[file.bytes_index]);
    }

    Ok(level3)
}

fn hash_blocks(data: &[u8]) -> Vec<u8> {
    let mut hashes = Vec::with_capacity(data.len().div_ceil(IVFC_BLOCK_SIZE as usize) * 0x20);
    for block in data.chunks(IVFC_BLOCK_SIZE as usize) {
        if block.len() == IVFC_BLOCK_SIZE as usize {
            hashes.extend_from_slice(&Sha256::digest(block));
        } else {
            let mut padded = block.to_vec();
            padded.resize(IVFC_BLOCK_SIZE as usize, 0);
            hashes.extend_from_slice(&Sha256::digest(&padded));
        }
    }
    hashes
}

fn pad_to_block(mut data: Vec<u8>) -> Vec<u8> {
    data.resize(align(data.len() as u64, IVFC_BLOCK_SIZE) as usize, 0);
    data
}

/// Wraps a Level 3 payload in its IVFC hash tree: level 2 hashes level 3,
/// level 1 hashes level 2, and the master hashes level 1.
fn wrap_ivfc(level3: &[u8]) -> RomVfsResult<Vec<u8>> {
    let lv3_size = level3.len() as u64;
    let lv3_padded = pad_to_block(level3.to_vec());

    let lv2 = hash_blocks(&lv3_padded);
    let lv2_size = lv2.len() as u64;
    let lv2_padded = pad_to_block(lv2);

    let lv1 = hash_blocks(&lv2_padded);
    let lv1_size = lv1.len() as u64;
    let lv1_padded = pad_to_block(lv1);

    let master = hash_blocks(&lv1_padded);

    let lv1_logical = 0u64;
    let lv2_logical = align(lv1_size, IVFC_BLOCK_SIZE);
    let lv3_logical = lv2_logical + align(lv2_size, IVFC_BLOCK_SIZE);

    let header = IvfcHeader {
        magic: *IVFC_MAGIC,
        version: IVFC_VERSION,
        master_hash_size: master.len() as u32,
        lv1_logical_offset: lv1_logical,
        lv1_hash_data_size: lv1_size,
        lv1_block_size_log2: IVFC_BLOCK_SIZE.trailing_zeros(),
        reserved1: 0,
        lv2_logical_offset: lv2_logical,
        lv2_hash_data_size: lv2_size,
        lv2_block_size_log2: IVFC_BLOCK_SIZE.trailing_zeros(),
        reserved2: 0,
        lv3_logical_offset: lv3_logical,
        lv3_hash_data_size: lv3_size,
        lv3_block_size_log2: IVFC_BLOCK_SIZE.trailing_zeros(),
        reserved3: [0; 8],
        optional_info_size: 0,
    };

    let mut output = Vec::new();
    header.write(&mut Cursor::new(&mut output))?;
    output.resize(0x60, 0);
    output.extend_from_slice(&master);

    // Level 3 begins at the next block boundary after the master hashes.
    output.resize(align(output.len() as u64, IVFC_BLOCK_SIZE) as usize, 0);
    output.extend_from_slice(&lv3_padded);
    output.extend_from_slice(&lv1_padded);
    output.extend_from_slice(&lv2_padded);
    Ok(output)
}
