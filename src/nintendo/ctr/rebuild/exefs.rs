use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::{EXEFS_HEADER_SIZE, EXEFS_MAX_ENTRIES, EXEFS_NAME_SIZE};
use crate::nintendo::ctr::models::exefs::{ExeFsFileEntry, ExeFsHeader};
use crate::util::align_media_unit;
use binrw::BinWrite;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Serializes an ordered file list back into ExeFS bytes: descriptors,
/// reserved bytes, payload hashes in reverse descriptor order, then the
/// media-unit-aligned payload blocks.
pub fn build_exefs(files: &[(String, Vec<u8>)]) -> RomVfsResult<Vec<u8>> {
    if files.len() > EXEFS_MAX_ENTRIES {
        return Err(RomVfsError::ExeFsCapacity);
    }

    let mut descriptors = vec![
        ExeFsFileEntry {
            fname: [0; EXEFS_NAME_SIZE],
            offset: 0,
            size: 0,
        };
        EXEFS_MAX_ENTRIES
    ];
    let mut hashes = vec![[0u8; 0x20]; EXEFS_MAX_ENTRIES];

    let mut offset = 0u64;
    for (index, (name, bytes)) in files.iter().enumerate() {
        if name.len() > EXEFS_NAME_SIZE || name.is_empty() {
            return Err(RomVfsError::ExeFsCapacity);
        }
        let mut fname = [0u8; EXEFS_NAME_SIZE];
        fname[..name.len()].copy_from_slice(name.as_bytes());

        descriptors[index] = ExeFsFileEntry {
            fname,
            offset: offset as u32,
            size: bytes.len() as u32,
        };
        hashes[EXEFS_MAX_ENTRIES - 1 - index] = Sha256::digest(bytes).into();
        offset = align_media_unit(offset + bytes.len() as u64);
    }

    let header = ExeFsHeader {
        descriptors,
        reserved: vec![0; 0x20],
        hashes,
    };

    let mut output = Vec::with_capacity((EXEFS_HEADER_SIZE + offset) as usize);
    header.write(&mut Cursor::new(&mut output))?;
    debug_assert_eq!(output.len() as u64, EXEFS_HEADER_SIZE);

    for (index, (_, bytes)) in files.iter().enumerate() {
        let target = EXEFS_HEADER_SIZE + header.descriptors[index].offset as u64;
        output.resize(target as usize, 0);
        output.extend_from_slice(bytes);
    }
    output.resize((EXEFS_HEADER_SIZE + offset) as usize, 0);
    Ok(output)
}
