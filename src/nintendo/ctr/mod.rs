use crate::accessor::Region;
use crate::error::{RomVfsError, RomVfsResult};
use crate::nintendo::ctr::models::cia::Cia;
use crate::nintendo::ctr::models::exefs::ExeFs;
use crate::nintendo::ctr::models::ncch::NcchHeader;
use crate::nintendo::ctr::models::ncsd::NcsdHeader;
use crate::nintendo::ctr::models::romfs::RomFs;
use crate::nintendo::ctr::partition::{NcchPartition, PartitionContainer};

pub mod constants;
pub mod models;
pub mod partition;
pub mod rebuild;

use constants::NCSD_HEADER_SIZE;

/// Opens any supported 3DS container. Probes run in fixed order and the
/// first match wins; extensions are never consulted.
pub fn open_container(region: &Region) -> RomVfsResult<PartitionContainer> {
    if NcsdHeader::probe(region) {
        log::debug!("probe matched NCSD");
        return open_ncsd(region);
    }
    if Cia::probe(region) {
        log::debug!("probe matched CIA");
        return open_cia(region);
    }
    if NcchHeader::probe(region) {
        log::debug!("probe matched bare NCCH");
        return Ok(PartitionContainer::single(NcchPartition::load(
            region.clone(),
        )?));
    }
    if RomFs::probe(region) {
        log::debug!("probe matched bare RomFS");
        return Ok(PartitionContainer::single(NcchPartition::from_romfs(
            RomFs::load(region.clone())?,
        )));
    }
    if ExeFs::probe(region) {
        log::debug!("probe matched bare ExeFS");
        return Ok(PartitionContainer::single(NcchPartition::from_exefs(
            ExeFs::load(region.clone())?,
        )));
    }
    Err(RomVfsError::UnsupportedFormat)
}

fn open_ncsd(region: &Region) -> RomVfsResult<PartitionContainer> {
    let header = NcsdHeader::load(region)?;
    let mut partitions = Vec::with_capacity(8);
    for index in 0..8 {
        let partition = header
            .partition_region(region, index)?
            .map(NcchPartition::load)
            .transpose()?;
        partitions.push(partition);
    }

    Ok(PartitionContainer {
        partitions,
        is_dlc: false,
        ncsd_header: Some(region.slice(0, NCSD_HEADER_SIZE)?),
    })
}

fn open_cia(region: &Region) -> RomVfsResult<PartitionContainer> {
    let cia = Cia::load(region)?;
    let is_dlc = cia.is_dlc();

    let mut partitions = Vec::new();
    for content in cia.content_regions(region)? {
        partitions.push(Some(NcchPartition::load(content)?));
    }

    Ok(PartitionContainer {
        partitions,
        is_dlc,
        ncsd_header: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::MemoryAccessor;
    use std::sync::Arc;

    #[test]
    fn unknown_input_is_unsupported() {
        let region = Region::whole(Arc::new(MemoryAccessor::new(vec![0u8; 0x400])));
        assert!(matches!(
            open_container(&region),
            Err(RomVfsError::UnsupportedFormat)
        ));
    }

    #[test]
    fn bare_ncch_wraps_into_single_partition() {
        let image = crate::nintendo::ctr::models::ncch::tests::ncch_image();
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));
        let container = open_container(&region).unwrap();
        assert_eq!(container.partitions.len(), 1);
        assert!(container.partition(0).is_some());
        assert!(container.partition(1).is_none());
        assert!(!container.is_dlc);
    }

    #[test]
    fn cia_contents_become_partitions() {
        let ncch = crate::nintendo::ctr::models::ncch::tests::ncch_image();
        let image =
            crate::nintendo::ctr::models::cia::tests::cia_image(&[ncch], 0x0004000000030000);
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));

        let container = open_container(&region).unwrap();
        assert!(!container.is_dlc);
        assert!(container.ncsd_header.is_none());
        let partition = container.partition(0).unwrap();
        assert!(partition.exefs.is_some());
    }

    #[test]
    fn dlc_cia_is_flagged() {
        let ncch = crate::nintendo::ctr::models::ncch::tests::ncch_image();
        let image =
            crate::nintendo::ctr::models::cia::tests::cia_image(&[ncch], 0x0004008C00030000);
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));
        assert!(open_container(&region).unwrap().is_dlc);
    }

    #[test]
    fn bare_romfs_wraps_into_synthetic_partition() {
        let image = crate::nintendo::ctr::models::romfs::tests::tiny_romfs();
        let region = Region::whole(Arc::new(MemoryAccessor::new(image)));
        let container = open_container(&region).unwrap();
        let partition = container.partition(0).unwrap();
        assert!(partition.header.is_none());
        assert!(partition.romfs.is_some());
        assert!(partition.exefs.is_none());
    }
}
