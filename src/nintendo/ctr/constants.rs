pub const NCSD_MAGIC: &[u8; 4] = b"NCSD";
pub const NCCH_MAGIC: &[u8; 4] = b"NCCH";
pub const IVFC_MAGIC: &[u8; 4] = b"IVFC";
pub const IVFC_VERSION: u32 = 0x10000;

pub const MAGIC_OFFSET: u64 = 0x100;

/// NCSD/NCCH offsets and lengths are expressed in media units.
pub const CTR_MEDIA_UNIT_SIZE: u64 = 0x200;

pub const NCSD_HEADER_SIZE: u64 = 0x200;
pub const NCCH_HEADER_SIZE: u64 = 0x200;

/// The on-disk ExHeader region: system control info plus access descriptor.
pub const EXHEADER_REGION_SIZE: u64 = 0x800;

pub const EXEFS_HEADER_SIZE: u64 = 0x200;
pub const EXEFS_MAX_ENTRIES: usize = 10;
pub const EXEFS_NAME_SIZE: usize = 8;

pub const CIA_HEADER_SIZE: u32 = 0x2020;

/// Link value marking an absent child/sibling/bucket in RomFS metadata.
pub const ROMFS_NO_ENTRY: u32 = 0xFFFF_FFFF;
pub const ROMFS_DATA_ALIGN: u64 = 16;
pub const IVFC_BLOCK_SIZE: u64 = 0x1000;

/// Named NCSD slots; unnamed slots are exposed by index only.
pub const CTR_NCSD_PARTITIONS: [Option<&str>; 8] = [
    Some("RomFS"),
    Some("Manual"),
    Some("DownloadPlay"),
    None,
    None,
    None,
    Some("N3DSUpdate"),
    Some("O3DSUpdate"),
];
