use crate::accessor::{ByteAccessorExt, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::constants::CIA_HEADER_SIZE;
use crate::util::align_64;
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct CiaHeader {
    pub header_size: u32,
    pub cia_type: u16,
    pub version: u16,
    pub cert_chain_size: u32,
    pub ticket_size: u32,
    pub tmd_size: u32,
    pub meta_size: u32,
    pub content_size: u64,
    #[br(count = 0x2000)]
    pub content_index: Vec<u8>,
}

/// Byte count of the signature-plus-padding block a signed TMD carries
/// before its header. Nothing is verified; the block is only skipped.
fn signature_body_len(kind: u32) -> usize {
    match kind {
        // RSA-4096, RSA-2048, ECDSA; SHA-1 and SHA-256 flavors share sizes.
        0x010000 | 0x010003 => 0x200 + 0x3C,
        0x010001 | 0x010004 => 0x100 + 0x3C,
        0x010002 | 0x010005 => 0x3C + 0x40,
        _ => 0,
    }
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(big)]
pub struct TmdSignature {
    #[br(assert(signature_body_len(kind) != 0, "unknown TMD signature type"))]
    pub kind: u32,
    #[br(count = signature_body_len(kind))]
    pub body: Vec<u8>,
}

/// Title metadata, trimmed to what content location needs: the signature
/// is consumed for its size, the info records are skipped as raw bytes.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(big)]
pub struct TitleMetadata {
    pub signature_data: TmdSignature,
    pub header: TitleMetadataHeader,

    /// 64 content info records, 0x24 bytes each; hashes only, skipped.
    #[br(count = 0x900)]
    pub content_info_records: Vec<u8>,

    #[br(count = header.content_count)]
    pub content_chunk_records: Vec<ContentChunkRecord>,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(big)]
pub struct TitleMetadataHeader {
    #[br(count = 0x40)]
    pub signature_issuer: Vec<u8>,
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    pub reserved1: u8,
    pub system_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    #[brw(little)]
    pub save_data_size: u32,
    #[brw(little)]
    pub srl_private_save_data_size: u32,
    pub reserved2: u32,
    pub srl_flag: u8,
    #[br(count = 0x31)]
    pub reserved3: Vec<u8>,
    pub access_rights: u32,
    pub title_version: u16,
    pub content_count: u16,
    pub boot_content: u16,
    pub padding: u16,
    #[br(count = 0x20)]
    pub content_info_records_hash: Vec<u8>,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(big)]
pub struct ContentChunkRecord {
    pub content_id: u32,
    pub content_index: u16,
    pub content_type: u16,
    pub content_size: u64,
    #[br(count = 0x20)]
    pub hash: Vec<u8>,
}

/// Title ID category marking add-on content; such containers expose
/// partitions by index only.
const TITLE_CATEGORY_DLC: u16 = 0x008C;

#[derive(Debug, Clone)]
pub struct Cia {
    pub header: CiaHeader,
    pub tmd: TitleMetadata,
}

impl Cia {
    /// CIA carries no magic; the probe keys on the fixed header size.
    pub fn probe(region: &Region) -> bool {
        region
            .read_u32_le(0)
            .map(|size| size == CIA_HEADER_SIZE)
            .unwrap_or(false)
    }

    pub fn load(region: &Region) -> RomVfsResult<Cia> {
        let header_bytes = region.read_vec(0, CIA_HEADER_SIZE as u64)?;
        let header = CiaHeader::read(&mut Cursor::new(&header_bytes))?;
        if header.header_size != CIA_HEADER_SIZE {
            return Err(RomVfsError::InvalidFormat(
                "CIA header size mismatch".to_string(),
            ));
        }

        let tmd_offset = {
            let cert = align_64(header.header_size as u64);
            let ticket = align_64(cert + header.cert_chain_size as u64);
            align_64(ticket + header.ticket_size as u64)
        };
        let tmd_bytes = region.read_vec(tmd_offset, header.tmd_size as u64)?;
        let tmd = TitleMetadata::read(&mut Cursor::new(&tmd_bytes))
            .map_err(|e| RomVfsError::InvalidFormat(format!("CIA title metadata: {e}")))?;

        log::debug!(
            "CIA decoded: title {:#018x}, {} content(s)",
            tmd.header.title_id,
            tmd.header.content_count
        );
        Ok(Cia { header, tmd })
    }

    pub fn is_dlc(&self) -> bool {
        ((self.tmd.header.title_id >> 32) & 0xFFFF) as u16 == TITLE_CATEGORY_DLC
    }

    fn content_start(&self) -> u64 {
        let mut offset = align_64(self.header.header_size as u64);
        offset = align_64(offset + self.header.cert_chain_size as u64);
        offset = align_64(offset + self.header.ticket_size as u64);
        align_64(offset + self.header.tmd_size as u64)
    }

    /// Content windows in TMD-declared order, each holding one NCCH.
    pub fn content_regions(&self, region: &Region) -> RomVfsResult<Vec<Region>> {
        let mut regions = Vec::new();
        let mut offset = self.content_start();
        for chunk in &self.tmd.content_chunk_records {
            let content = region.slice(offset, chunk.content_size).map_err(|_| {
                RomVfsError::InvalidFormat(format!(
                    "CIA content {} overflows the archive",
                    chunk.content_index
                ))
            })?;
            regions.push(content);
            offset += chunk.content_size;
        }
        Ok(regions)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::accessor::{ByteAccessor, MemoryAccessor};
    use std::sync::Arc;

    fn tmd_bytes(content_sizes: &[u64], title_id: u64) -> Vec<u8> {
        let tmd = TitleMetadata {
            signature_data: TmdSignature {
                kind: 0x010004,
                body: vec![0; 0x100 + 0x3C],
            },
            header: TitleMetadataHeader {
                signature_issuer: vec![0; 0x40],
                version: 1,
                ca_crl_version: 0,
                signer_crl_version: 0,
                reserved1: 0,
                system_version: 0,
                title_id,
                title_type: 0x40,
                group_id: 0,
                save_data_size: 0,
                srl_private_save_data_size: 0,
                reserved2: 0,
                srl_flag: 0,
                reserved3: vec![0; 0x31],
                access_rights: 0,
                title_version: 0,
                content_count: content_sizes.len() as u16,
                boot_content: 0,
                padding: 0,
                content_info_records_hash: vec![0; 0x20],
            },
            content_info_records: vec![0; 0x900],
            content_chunk_records: content_sizes
                .iter()
                .enumerate()
                .map(|(index, size)| ContentChunkRecord {
                    content_id: index as u32,
                    content_index: index as u16,
                    content_type: 0,
                    content_size: *size,
                    hash: vec![0; 0x20],
                })
                .collect(),
        };

        let mut buf = Vec::new();
        tmd.write(&mut Cursor::new(&mut buf)).unwrap();
        buf
    }

    /// CIA with no certificates or ticket and the given content blobs.
    pub fn cia_image(contents: &[Vec<u8>], title_id: u64) -> Vec<u8> {
        let sizes: Vec<u64> = contents.iter().map(|c| c.len() as u64).collect();
        let tmd = tmd_bytes(&sizes, title_id);

        let header = CiaHeader {
            header_size: CIA_HEADER_SIZE,
            cia_type: 0,
            version: 0,
            cert_chain_size: 0,
            ticket_size: 0,
            tmd_size: tmd.len() as u32,
            meta_size: 0,
            content_size: sizes.iter().sum(),
            content_index: vec![0; 0x2000],
        };

        let mut image = Vec::new();
        header.write(&mut Cursor::new(&mut image)).unwrap();
        image.resize(align_64(image.len() as u64) as usize, 0);
        image.extend_from_slice(&tmd);
        image.resize(align_64(image.len() as u64) as usize, 0);
        for content in contents {
            image.extend_from_slice(content);
        }
        image
    }

    #[test]
    fn locates_contents_in_declared_order() {
        let contents = vec![vec![0xAA; 0x200], vec![0xBB; 0x400]];
        let image = cia_image(&contents, 0x0004000000030000);
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));

        assert!(Cia::probe(&region));
        let cia = Cia::load(&region).unwrap();
        assert!(!cia.is_dlc());

        let regions = cia.content_regions(&region).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].len(), 0x200);
        assert_eq!(regions[1].len(), 0x400);
        assert_eq!(regions[1].read_vec(0, 2).unwrap(), vec![0xBB, 0xBB]);
    }

    #[test]
    fn dlc_category_is_detected() {
        let image = cia_image(&[vec![0; 0x200]], 0x0004008C00030000);
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));
        assert!(Cia::load(&region).unwrap().is_dlc());
    }

    #[test]
    fn probe_rejects_other_headers() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(vec![0u8; 0x40])));
        assert!(!Cia::probe(&region));
    }
}
