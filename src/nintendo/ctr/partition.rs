use crate::accessor::Region;
use crate::error::RomVfsResult;
use crate::nintendo::ctr::constants::NCCH_HEADER_SIZE;
use crate::nintendo::ctr::models::exefs::ExeFs;
use crate::nintendo::ctr::models::ncch::NcchHeader;
use crate::nintendo::ctr::models::romfs::RomFs;

/// One decoded NCCH partition. Synthetic partitions (a bare ExeFS or
/// RomFS input) have no header and exactly one populated sub-region.
pub struct NcchPartition {
    pub header: Option<NcchHeader>,
    pub header_region: Option<Region>,
    pub exheader: Option<Region>,
    pub plain_region: Option<Region>,
    pub logo: Option<Region>,
    pub exefs: Option<ExeFs>,
    pub romfs: Option<RomFs>,
}

impl NcchPartition {
    pub fn load(region: Region) -> RomVfsResult<NcchPartition> {
        let header = NcchHeader::load(&region)?;
        let header_region = region.slice(0, NCCH_HEADER_SIZE)?;
        let exheader = header.exheader_region(&region)?;
        let plain_region = header.plain_region(&region)?;
        let logo = header.logo_region(&region)?;
        let exefs = header
            .exefs_region(&region)?
            .map(ExeFs::load)
            .transpose()?;
        let romfs = header
            .romfs_region(&region)?
            .map(RomFs::load)
            .transpose()?;

        Ok(NcchPartition {
            header: Some(header),
            header_region: Some(header_region),
            exheader,
            plain_region,
            logo,
            exefs,
            romfs,
        })
    }

    pub fn from_exefs(exefs: ExeFs) -> NcchPartition {
        NcchPartition {
            header: None,
            header_region: None,
            exheader: None,
            plain_region: None,
            logo: None,
            exefs: Some(exefs),
            romfs: None,
        }
    }

    pub fn from_romfs(romfs: RomFs) -> NcchPartition {
        NcchPartition {
            header: None,
            header_region: None,
            exheader: None,
            plain_region: None,
            logo: None,
            exefs: None,
            romfs: Some(romfs),
        }
    }
}

/// Uniform view over 1..8 NCCH partitions, whatever container they came
/// from. Empty and out-of-range slots read as `None`.
pub struct PartitionContainer {
    pub partitions: Vec<Option<NcchPartition>>,
    pub is_dlc: bool,
    /// Full NCSD header window when the source was a CCI.
    pub ncsd_header: Option<Region>,
}

impl PartitionContainer {
    pub fn single(partition: NcchPartition) -> PartitionContainer {
        PartitionContainer {
            partitions: vec![Some(partition)],
            is_dlc: false,
            ncsd_header: None,
        }
    }

    pub fn partition(&self, index: usize) -> Option<&NcchPartition> {
        self.partitions.get(index).and_then(|p| p.as_ref())
    }

    /// Indices of populated slots, in order.
    pub fn present(&self) -> impl Iterator<Item = usize> + '_ {
        self.partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some())
            .map(|(index, _)| index)
    }
}
