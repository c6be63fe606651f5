use crate::accessor::{ByteAccessor, ByteAccessorExt, MemoryAccessor, Region};
use crate::error::{RomVfsError, RomVfsResult};
use crate::host::HostFs;
use crate::nintendo::ctr;
use crate::nintendo::ctr::constants::CTR_NCSD_PARTITIONS;
use crate::nintendo::ctr::partition::PartitionContainer;
use crate::nintendo::ctr::rebuild::exefs::build_exefs;
use crate::nintendo::ctr::rebuild::romfs::{build_romfs, RomFsTreeDir, RomFsTreeFile};
use crate::nintendo::nds::{NdsCartridge, NdsEntry};
use crate::progress::{CancelToken, ExtractStatus, ProgressAggregator};
use crate::util::{eq_fold_ascii, fold_ascii};
use async_recursion::async_recursion;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

pub mod overlay;
pub mod path;

use overlay::{Overlay, OverlayRead};
use path::{file_name, join, normalize, segments};

/// Decoded backing image behind the overlay. A pre-extracted directory
/// source has no backing at all; every entry lives in the overlay.
pub enum RomBacking {
    Ctr(PartitionContainer),
    Nds(NdsCartridge),
    None,
}

/// Top-level slot of the 3DS namespace, after alias resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtrSlot {
    NcsdHeader,
    Header(usize),
    ExHeader(usize),
    PlainRegion(usize),
    Logo(usize),
    ExeFs(usize),
    RomFs(usize),
}

/// A ROM opened as a virtual file system: the decoded container below,
/// the copy-on-write overlay above, one POSIX-like tree in front.
pub struct Rom<H: HostFs> {
    host: Arc<H>,
    backing: RomBacking,
    overlay: Overlay<H>,
    cwd: RwLock<String>,
}

impl<H: HostFs> Rom<H> {
    /// Opens a source path: a directory short-circuits to a pure overlay,
    /// anything else is read and probed. Extensions are never consulted.
    pub async fn open(host: Arc<H>, source: &Path) -> RomVfsResult<Rom<H>> {
        if host.directory_exists(source).await {
            log::debug!("opening {} as a pre-extracted tree", source.display());
            return Ok(Rom {
                host: Arc::clone(&host),
                backing: RomBacking::None,
                overlay: Overlay::with_supplied_scratch(host, source.to_path_buf()),
                cwd: RwLock::new("/".to_string()),
            });
        }
        let bytes = host.read_all_bytes(source).await?;
        Self::from_accessor(host, Arc::new(MemoryAccessor::new(bytes)))
    }

    /// Opens an already-constructed byte accessor.
    pub fn from_accessor(host: Arc<H>, accessor: Arc<dyn ByteAccessor>) -> RomVfsResult<Rom<H>> {
        let region = Region::whole(accessor);
        let backing = match ctr::open_container(&region) {
            Ok(container) => RomBacking::Ctr(container),
            Err(RomVfsError::UnsupportedFormat) => {
                if NdsCartridge::probe(&region) {
                    log::debug!("probe matched NDS cartridge");
                    RomBacking::Nds(NdsCartridge::load(region)?)
                } else {
                    return Err(RomVfsError::UnsupportedFormat);
                }
            }
            Err(other) => return Err(other),
        };

        Ok(Rom {
            host: Arc::clone(&host),
            backing,
            overlay: Overlay::new(host),
            cwd: RwLock::new("/".to_string()),
        })
    }

    pub fn backing(&self) -> &RomBacking {
        &self.backing
    }

    pub fn current_directory(&self) -> String {
        self.cwd.read().clone()
    }

    pub fn set_current_directory(&self, path: &str) {
        let normalized = normalize(path, &self.cwd.read());
        *self.cwd.write() = normalized;
    }

    fn normalize(&self, path: &str) -> String {
        normalize(path, &self.cwd.read())
    }

    // ----- reads ---------------------------------------------------------

    pub async fn read_all_bytes(&self, path: &str) -> RomVfsResult<Vec<u8>> {
        let normalized = self.normalize(path);
        match self.overlay.read(&normalized).await? {
            OverlayRead::Deleted => Err(RomVfsError::NotFound(normalized)),
            OverlayRead::Bytes(bytes) => Ok(bytes),
            OverlayRead::Unknown => {
                let region = self
                    .backing_file(&normalized)?
                    .ok_or(RomVfsError::NotFound(normalized))?;
                region.read_vec(0, region.len())
            }
        }
    }

    pub async fn get_file_length(&self, path: &str) -> RomVfsResult<u64> {
        let normalized = self.normalize(path);
        match self.overlay.read(&normalized).await? {
            OverlayRead::Deleted => Err(RomVfsError::NotFound(normalized)),
            OverlayRead::Bytes(bytes) => Ok(bytes.len() as u64),
            OverlayRead::Unknown => {
                let region = self
                    .backing_file(&normalized)?
                    .ok_or(RomVfsError::NotFound(normalized))?;
                Ok(region.len())
            }
        }
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        let normalized = self.normalize(path);
        if self.overlay.is_blacklisted(&normalized) {
            return false;
        }
        if self.overlay.has_file(&normalized).await {
            return true;
        }
        matches!(self.backing_file(&normalized), Ok(Some(_)))
    }

    pub async fn directory_exists(&self, path: &str) -> bool {
        let normalized = self.normalize(path);
        if normalized == "/" {
            return true;
        }
        if self.overlay.is_blacklisted(&normalized) {
            return false;
        }
        if self.overlay.has_directory(&normalized).await {
            return true;
        }
        self.backing_dir_exists(&normalized)
    }

    // ----- writes --------------------------------------------------------

    pub async fn write_all_bytes(&self, path: &str, bytes: &[u8]) -> RomVfsResult<()> {
        let normalized = self.normalize(path);
        // A file deeper than one level under ExeFS would imply a directory.
        self.reject_inside_exefs(&normalized, 2)?;
        self.overlay.write(&normalized, bytes).await
    }

    pub async fn delete_file(&self, path: &str) -> RomVfsResult<()> {
        let normalized = self.normalize(path);
        if !self.file_exists(&normalized).await {
            return Err(RomVfsError::NotFound(normalized));
        }
        self.overlay.delete(&normalized).await
    }

    pub async fn delete_directory(&self, path: &str) -> RomVfsResult<()> {
        let normalized = self.normalize(path);
        if !self.directory_exists(&normalized).await {
            return Err(RomVfsError::NotFound(normalized));
        }
        self.overlay.delete_directory(&normalized).await
    }

    pub async fn create_directory(&self, path: &str) -> RomVfsResult<()> {
        let normalized = self.normalize(path);
        self.reject_inside_exefs(&normalized, 1)?;
        self.overlay.create_directory(&normalized).await
    }

    /// ExeFS is a flat namespace: files sit directly under it and it
    /// holds no directories.
    fn reject_inside_exefs(&self, normalized: &str, max_depth: usize) -> RomVfsResult<()> {
        let segs = segments(normalized);
        if segs.len() > max_depth {
            if let RomBacking::Ctr(container) = &self.backing {
                if let Some(CtrSlot::ExeFs(_)) = parse_ctr_slot(segs[0], container.is_dlc) {
                    return Err(RomVfsError::NotSupported(
                        "ExeFS holds no directories".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Releases the overlay scratch directory (unless caller-supplied).
    pub async fn dispose(&self) -> RomVfsResult<()> {
        self.overlay.dispose().await
    }

    // ----- enumeration ---------------------------------------------------

    pub async fn get_files(
        &self,
        path: &str,
        pattern: &str,
        top_directory_only: bool,
    ) -> RomVfsResult<Vec<String>> {
        let dir = self.normalize(path);
        if !self.directory_exists(&dir).await {
            return Err(RomVfsError::NotFound(dir));
        }
        let regex = path::compile_pattern(pattern)?;
        let mut found = Vec::new();
        self.collect_files(&dir, &regex, top_directory_only, &mut found)
            .await?;
        Ok(found)
    }

    pub async fn get_directories(
        &self,
        path: &str,
        top_directory_only: bool,
    ) -> RomVfsResult<Vec<String>> {
        let dir = self.normalize(path);
        if !self.directory_exists(&dir).await {
            return Err(RomVfsError::NotFound(dir));
        }
        let mut found = Vec::new();
        self.collect_directories(&dir, top_directory_only, &mut found)
            .await?;
        Ok(found)
    }

    #[async_recursion]
    async fn collect_files(
        &self,
        dir: &str,
        pattern: &Regex,
        top_directory_only: bool,
        found: &mut Vec<String>,
    ) -> RomVfsResult<()> {
        let (files, dirs) = self.merged_children(dir).await?;
        for name in files {
            if pattern.is_match(&name) {
                found.push(join(dir, &name));
            }
        }
        if !top_directory_only {
            for name in dirs {
                let child = join(dir, &name);
                self.collect_files(&child, pattern, top_directory_only, found)
                    .await?;
            }
        }
        Ok(())
    }

    #[async_recursion]
    async fn collect_directories(
        &self,
        dir: &str,
        top_directory_only: bool,
        found: &mut Vec<String>,
    ) -> RomVfsResult<()> {
        let (_, dirs) = self.merged_children(dir).await?;
        for name in dirs {
            let child = join(dir, &name);
            found.push(format!("{child}/"));
            if !top_directory_only {
                self.collect_directories(&child, top_directory_only, found)
                    .await?;
            }
        }
        Ok(())
    }

    /// Union of backing and overlay children: backing entries keep their
    /// order, blacklisted ones drop out, scratch entries shadow backing
    /// entries case-insensitively and append otherwise.
    async fn merged_children(&self, dir: &str) -> RomVfsResult<(Vec<String>, Vec<String>)> {
        let backing = self.backing_children(dir);
        let scratch_files = self.overlay.files_in(dir).await?;
        let scratch_dirs = self.overlay.directories_in(dir).await?;

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        if let Some((backing_files, _)) = &backing {
            for name in backing_files {
                let full = join(dir, name);
                if self.overlay.is_blacklisted(&full) {
                    continue;
                }
                if seen.insert(fold_ascii(name)) {
                    files.push(name.clone());
                }
            }
        }
        for name in scratch_files {
            if seen.insert(fold_ascii(&name)) {
                files.push(name);
            }
        }

        let mut dirs = Vec::new();
        let mut seen = HashSet::new();
        if let Some((_, backing_dirs)) = &backing {
            for name in backing_dirs {
                let full = join(dir, name);
                if self.overlay.is_blacklisted(&full) {
                    continue;
                }
                if seen.insert(fold_ascii(name)) {
                    dirs.push(name.clone());
                }
            }
        }
        for name in scratch_dirs {
            if seen.insert(fold_ascii(&name)) {
                dirs.push(name);
            }
        }

        Ok((files, dirs))
    }

    // ----- backing resolution --------------------------------------------

    fn backing_file(&self, normalized: &str) -> RomVfsResult<Option<Region>> {
        let segs = segments(normalized);
        if segs.is_empty() {
            return Ok(None);
        }
        match &self.backing {
            RomBacking::Ctr(container) => ctr_file(container, &segs),
            RomBacking::Nds(cartridge) => nds_file(cartridge, &segs),
            RomBacking::None => Ok(None),
        }
    }

    fn backing_dir_exists(&self, normalized: &str) -> bool {
        let segs = segments(normalized);
        match &self.backing {
            RomBacking::Ctr(container) => ctr_dir_exists(container, &segs),
            RomBacking::Nds(cartridge) => nds_dir_exists(cartridge, &segs),
            RomBacking::None => false,
        }
    }

    /// Direct children names of a backing directory, or `None` when the
    /// backing has no such directory.
    fn backing_children(&self, normalized: &str) -> Option<(Vec<String>, Vec<String>)> {
        let segs = segments(normalized);
        match &self.backing {
            RomBacking::Ctr(container) => ctr_children(container, &segs),
            RomBacking::Nds(cartridge) => nds_children(cartridge, &segs),
            RomBacking::None => None,
        }
    }

    // ----- extraction ----------------------------------------------------

    /// Writes the whole tree (overlay included) to the host filesystem in
    /// the canonical extraction layout. Cancellation is checked between
    /// files; partial output stays in place.
    pub async fn extract_to(
        &self,
        out: &Path,
        aggregator: &ProgressAggregator,
        cancel: &CancelToken,
    ) -> RomVfsResult<ExtractStatus> {
        self.host.create_directory(out).await?;
        for dir in self.get_directories("/", false).await? {
            let relative = dir.trim_matches('/');
            self.host.create_directory(&out.join(relative)).await?;
        }

        // One progress token per top-level area.
        let mut areas: HashMap<String, Vec<String>> = HashMap::new();
        for file in self.get_files("/", "*", false).await? {
            let top = segments(&file)
                .first()
                .map(|s| s.to_string())
                .unwrap_or_default();
            let key = if segments(&file).len() == 1 {
                String::new()
            } else {
                top
            };
            areas.entry(key).or_default().push(file);
        }

        let tasks = areas.into_values().map(|list| {
            let token = aggregator.attach();
            async move {
                token.set_total(list.len() as u64);
                aggregator.refresh();
                for file in &list {
                    if cancel.is_cancelled() {
                        return Ok::<bool, RomVfsError>(false);
                    }
                    let bytes = self.read_all_bytes(file).await?;
                    let relative = file.trim_start_matches('/');
                    self.host
                        .write_all_bytes(&out.join(relative), &bytes)
                        .await?;
                    token.increment();
                    aggregator.refresh();
                }
                token.complete();
                aggregator.refresh();
                Ok(true)
            }
        });

        let results = futures::future::join_all(tasks).await;
        let mut status = ExtractStatus::Completed;
        for completed in results {
            if !completed? {
                status = ExtractStatus::Cancelled;
            }
        }
        Ok(status)
    }

    // ----- rebuild -------------------------------------------------------

    /// Serializes the (possibly overlayed) ExeFS of a partition back into
    /// container bytes.
    pub async fn rebuild_exefs(&self, partition: usize) -> RomVfsResult<Vec<u8>> {
        let dir = self.ctr_area_path(CtrSlot::ExeFs(partition))?;
        let mut files = Vec::new();
        for path in self.get_files(&dir, "*", true).await? {
            let bytes = self.read_all_bytes(&path).await?;
            files.push((file_name(&path).to_string(), bytes));
        }
        tokio::task::spawn_blocking(move || build_exefs(&files)).await?
    }

    /// Serializes the (possibly overlayed) RomFS of a partition back into
    /// container bytes, hash tree included.
    pub async fn rebuild_romfs(&self, partition: usize) -> RomVfsResult<Vec<u8>> {
        let dir = self.ctr_area_path(CtrSlot::RomFs(partition))?;
        let mut root = self.collect_tree(&dir).await?;
        root.name = String::new();
        tokio::task::spawn_blocking(move || build_romfs(&root)).await?
    }

    fn ctr_area_path(&self, slot: CtrSlot) -> RomVfsResult<String> {
        let RomBacking::Ctr(container) = &self.backing else {
            return Err(RomVfsError::NotSupported(
                "rebuild targets a 3DS container".to_string(),
            ));
        };
        match slot {
            CtrSlot::ExeFs(i) => Ok(format!("/{}", exefs_dir_name(i))),
            CtrSlot::RomFs(i) => Ok(format!("/{}", romfs_dir_name(i, container.is_dlc))),
            _ => Err(RomVfsError::NotSupported(
                "only ExeFS and RomFS rebuild".to_string(),
            )),
        }
    }

    #[async_recursion]
    async fn collect_tree(&self, dir: &str) -> RomVfsResult<RomFsTreeDir> {
        let (files, dirs) = self.merged_children(dir).await?;
        let mut tree = RomFsTreeDir {
            name: file_name(dir).to_string(),
            dirs: Vec::new(),
            files: Vec::new(),
        };
        for name in files {
            let bytes = self.read_all_bytes(&join(dir, &name)).await?;
            tree.files.push(RomFsTreeFile { name, bytes });
        }
        for name in dirs {
            tree.dirs.push(self.collect_tree(&join(dir, &name)).await?);
        }
        Ok(tree)
    }
}

// ----- 3DS namespace ------------------------------------------------------

fn suffix_of(index: usize) -> String {
    if index == 0 {
        String::new()
    } else {
        format!("-{index}")
    }
}

fn exefs_dir_name(index: usize) -> String {
    format!("ExeFS{}", suffix_of(index))
}

fn romfs_dir_name(index: usize, is_dlc: bool) -> String {
    if is_dlc {
        return format!("RomFS-{index}");
    }
    match CTR_NCSD_PARTITIONS.get(index).copied().flatten() {
        Some(name) => name.to_string(),
        None => format!("RomFS-{index}"),
    }
}

/// Parses `<stem><ext>` as slot 0 or `<stem>-<i><ext>` as slot `i`.
fn parse_indexed(folded: &str, stem: &str, ext: &str) -> Option<usize> {
    let body = folded.strip_suffix(ext)?;
    if body == stem {
        return Some(0);
    }
    body.strip_prefix(stem)?.strip_prefix('-')?.parse().ok()
}

fn parse_ctr_slot(name: &str, is_dlc: bool) -> Option<CtrSlot> {
    let folded = fold_ascii(name);

    if folded == "ncsdheader.bin" {
        return Some(CtrSlot::NcsdHeader);
    }
    if let Some(i) = parse_indexed(&folded, "header", ".bin") {
        return Some(CtrSlot::Header(i));
    }
    if let Some(i) = parse_indexed(&folded, "exheader", ".bin") {
        return Some(CtrSlot::ExHeader(i));
    }
    if let Some(i) = parse_indexed(&folded, "plainregion", ".txt") {
        return Some(CtrSlot::PlainRegion(i));
    }
    if let Some(i) = parse_indexed(&folded, "logo", ".bin") {
        return Some(CtrSlot::Logo(i));
    }
    if let Some(i) = parse_indexed(&folded, "exefs", "") {
        return Some(CtrSlot::ExeFs(i));
    }
    if let Some(i) = parse_indexed(&folded, "romfs", "") {
        // DLC containers synthesize the indexed form only.
        if is_dlc && folded == "romfs" {
            return None;
        }
        return Some(CtrSlot::RomFs(i));
    }
    if !is_dlc {
        let alias = match folded.as_str() {
            "manual" => Some(1),
            "downloadplay" => Some(2),
            "n3dsupdate" => Some(6),
            "o3dsupdate" => Some(7),
            _ => None,
        };
        if let Some(i) = alias {
            return Some(CtrSlot::RomFs(i));
        }
    }
    None
}

fn ctr_file(container: &PartitionContainer, segs: &[&str]) -> RomVfsResult<Option<Region>> {
    let Some(slot) = parse_ctr_slot(segs[0], container.is_dlc) else {
        return Ok(None);
    };

    match slot {
        CtrSlot::NcsdHeader if segs.len() == 1 => Ok(container.ncsd_header.clone()),
        CtrSlot::Header(i) if segs.len() == 1 => Ok(container
            .partition(i)
            .and_then(|p| p.header_region.clone())),
        CtrSlot::ExHeader(i) if segs.len() == 1 => {
            Ok(container.partition(i).and_then(|p| p.exheader.clone()))
        }
        CtrSlot::PlainRegion(i) if segs.len() == 1 => {
            Ok(container.partition(i).and_then(|p| p.plain_region.clone()))
        }
        CtrSlot::Logo(i) if segs.len() == 1 => {
            Ok(container.partition(i).and_then(|p| p.logo.clone()))
        }
        CtrSlot::ExeFs(i) if segs.len() == 2 => {
            let Some(exefs) = container.partition(i).and_then(|p| p.exefs.as_ref()) else {
                return Ok(None);
            };
            if exefs.entry(segs[1]).is_none() {
                return Ok(None);
            }
            exefs.file_region(segs[1]).map(Some)
        }
        CtrSlot::RomFs(i) if segs.len() >= 2 => {
            let Some(romfs) = container.partition(i).and_then(|p| p.romfs.as_ref()) else {
                return Ok(None);
            };
            match romfs.resolve(&segs[1..]) {
                Some(crate::nintendo::ctr::models::romfs::RomFsEntry::File(index)) => {
                    romfs.file_region(index).map(Some)
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn ctr_dir_exists(container: &PartitionContainer, segs: &[&str]) -> bool {
    if segs.is_empty() {
        return true;
    }
    let Some(slot) = parse_ctr_slot(segs[0], container.is_dlc) else {
        return false;
    };
    match slot {
        CtrSlot::ExeFs(i) => {
            segs.len() == 1 && container.partition(i).is_some_and(|p| p.exefs.is_some())
        }
        CtrSlot::RomFs(i) => {
            let Some(romfs) = container.partition(i).and_then(|p| p.romfs.as_ref()) else {
                return false;
            };
            segs.len() == 1
                || matches!(
                    romfs.resolve(&segs[1..]),
                    Some(crate::nintendo::ctr::models::romfs::RomFsEntry::Dir(_))
                )
        }
        _ => false,
    }
}

fn ctr_children(
    container: &PartitionContainer,
    segs: &[&str],
) -> Option<(Vec<String>, Vec<String>)> {
    if segs.is_empty() {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        if container.ncsd_header.is_some() {
            files.push("NcsdHeader.bin".to_string());
        }
        for index in container.present() {
            let Some(partition) = container.partition(index) else {
                continue;
            };
            let suffix = suffix_of(index);
            if partition.header_region.is_some() {
                files.push(format!("Header{suffix}.bin"));
            }
            if partition.exheader.is_some() {
                files.push(format!("ExHeader{suffix}.bin"));
            }
            if partition.plain_region.is_some() {
                files.push(format!("PlainRegion{suffix}.txt"));
            }
            if partition.logo.is_some() {
                files.push(format!("Logo{suffix}.bin"));
            }
            if partition.exefs.is_some() {
                dirs.push(exefs_dir_name(index));
            }
            if partition.romfs.is_some() {
                dirs.push(romfs_dir_name(index, container.is_dlc));
            }
        }
        return Some((files, dirs));
    }

    let slot = parse_ctr_slot(segs[0], container.is_dlc)?;
    match slot {
        CtrSlot::ExeFs(i) if segs.len() == 1 => {
            let exefs = container.partition(i)?.exefs.as_ref()?;
            let files = exefs.entries().iter().map(|e| e.name.clone()).collect();
            Some((files, Vec::new()))
        }
        CtrSlot::RomFs(i) => {
            let romfs = container.partition(i)?.romfs.as_ref()?;
            let entry = romfs.resolve(&segs[1..])?;
            let crate::nintendo::ctr::models::romfs::RomFsEntry::Dir(dir_index) = entry else {
                return None;
            };
            let node = &romfs.dirs[dir_index];
            let files = node
                .files
                .iter()
                .map(|&f| romfs.files[f].name.clone())
                .collect();
            let dirs = node
                .dirs
                .iter()
                .map(|&d| romfs.dirs[d].name.clone())
                .collect();
            Some((files, dirs))
        }
        _ => None,
    }
}

// ----- DS namespace -------------------------------------------------------

fn nds_overlay_file_name(overlay_id: u32) -> String {
    format!("overlay_{overlay_id:04}.bin")
}

fn nds_file(cartridge: &NdsCartridge, segs: &[&str]) -> RomVfsResult<Option<Region>> {
    let folded = fold_ascii(segs[0]);
    if segs.len() == 1 {
        return match folded.as_str() {
            "header.bin" => cartridge.header_region().map(Some),
            "arm9.bin" => cartridge.arm9_region().map(Some),
            "arm7.bin" => cartridge.arm7_region().map(Some),
            "y9.bin" => cartridge.arm9_overlay_table_region(),
            "y7.bin" => cartridge.arm7_overlay_table_region(),
            "banner.bin" => cartridge.banner_region(),
            _ => Ok(None),
        };
    }

    match folded.as_str() {
        "data" => match cartridge.resolve(&segs[1..]) {
            Some(NdsEntry::File(file_id)) => cartridge.file_region(file_id).map(Some),
            _ => Ok(None),
        },
        "overlay" | "overlay7" if segs.len() == 2 => {
            let table = if folded == "overlay" {
                &cartridge.arm9_overlays
            } else {
                &cartridge.arm7_overlays
            };
            for entry in table {
                if eq_fold_ascii(&nds_overlay_file_name(entry.overlay_id), segs[1]) {
                    return cartridge.file_region(entry.file_id as u16).map(Some);
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn nds_dir_exists(cartridge: &NdsCartridge, segs: &[&str]) -> bool {
    if segs.is_empty() {
        return true;
    }
    let folded = fold_ascii(segs[0]);
    match folded.as_str() {
        "data" => {
            segs.len() == 1
                || matches!(cartridge.resolve(&segs[1..]), Some(NdsEntry::Dir(_)))
        }
        "overlay" => segs.len() == 1 && !cartridge.arm9_overlays.is_empty(),
        "overlay7" => segs.len() == 1 && !cartridge.arm7_overlays.is_empty(),
        _ => false,
    }
}

fn nds_children(cartridge: &NdsCartridge, segs: &[&str]) -> Option<(Vec<String>, Vec<String>)> {
    use crate::nintendo::nds::models::FntChild;

    if segs.is_empty() {
        let mut files = vec![
            "header.bin".to_string(),
            "arm9.bin".to_string(),
            "arm7.bin".to_string(),
        ];
        if cartridge.header.arm9_overlay_size > 0 {
            files.push("y9.bin".to_string());
        }
        if cartridge.header.arm7_overlay_size > 0 {
            files.push("y7.bin".to_string());
        }
        if cartridge.header.icon_banner_offset > 0 {
            files.push("banner.bin".to_string());
        }

        let mut dirs = vec!["data".to_string()];
        if !cartridge.arm9_overlays.is_empty() {
            dirs.push("overlay".to_string());
        }
        if !cartridge.arm7_overlays.is_empty() {
            dirs.push("overlay7".to_string());
        }
        return Some((files, dirs));
    }

    let folded = fold_ascii(segs[0]);
    match folded.as_str() {
        "data" => {
            let NdsEntry::Dir(dir_index) = cartridge.resolve(&segs[1..])? else {
                return None;
            };
            let mut files = Vec::new();
            let mut dirs = Vec::new();
            for child in &cartridge.dirs[dir_index].children {
                match child {
                    FntChild::File { name, .. } => files.push(name.clone()),
                    FntChild::Dir { name, .. } => dirs.push(name.clone()),
                }
            }
            Some((files, dirs))
        }
        "overlay" if segs.len() == 1 => Some((
            cartridge
                .arm9_overlays
                .iter()
                .map(|e| nds_overlay_file_name(e.overlay_id))
                .collect(),
            Vec::new(),
        )),
        "overlay7" if segs.len() == 1 => Some((
            cartridge
                .arm7_overlays
                .iter()
                .map(|e| nds_overlay_file_name(e.overlay_id))
                .collect(),
            Vec::new(),
        )),
        _ => None,
    }
}
