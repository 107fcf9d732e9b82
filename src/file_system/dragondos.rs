/*
    dragonfox

    src/file_system/dragondos.rs

    DragonDos: directory and allocation bitmap on track 20, directory entries chained via a
    continuation pointer when a file needs more than four extents (§4.4.2). Free space is a
    sector bitmap; DragonDos always reserves exactly two tracks' worth of sectors (36) for the
    bitmap and directory regardless of disk geometry, which is what produces the literal free
    totals in §8 S6.
*/
use bitflags::bitflags;
use log::{debug, trace, warn};

use crate::disk_image::Disk;
use crate::file_format::{DragonFileHeader, FILE_TYPE_BASIC, FILE_TYPE_MACHINE_CODE};
use crate::file_system::{File, FileInfo, FileSystem, FileType};
use crate::DiskImageError;

const DIRECTORY_TRACK: u16 = 20;
const DIRECTORY_HEAD: u8 = 0;
const SECTORS_PER_TRACK: u8 = 18;
const ENTRY_SIZE: usize = 27;
const ENTRIES_PER_SECTOR: usize = 9;
const MAX_EXTENTS: usize = 4;

bitflags! {
    /// Directory entry flag byte (§4.4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct DirFlags: u8 {
        const IN_USE       = 0x01;
        const CONTINUATION = 0x80;
    }
}

fn bitmap_track_head(heads: u8) -> (u16, u8) {
    if heads > 1 {
        (DIRECTORY_TRACK, 1)
    } else {
        (DIRECTORY_TRACK + 1, 0)
    }
}

/// An extent's on-disk encoding packs track and head into one byte: `logical_track = track +
/// head * tracks_per_side`, since side 2 never exceeds track 79 and the product always fits a
/// u8. This is the same "track doubles as side selector" convention several 8-bit disk formats
/// use to avoid a fourth extent byte.
#[derive(Clone, Copy, Debug)]
struct Extent {
    track: u16,
    head: u8,
    sector: u8,
    count: u8,
}

#[derive(Clone, Debug)]
struct DirEntry {
    sector: u8,
    slot: usize,
    name: [u8; 8],
    ext: [u8; 3],
    flags: DirFlags,
    extents: [Extent; MAX_EXTENTS],
    last_sector_bytes: u8,
    continuation: Option<(u8, usize)>,
}

impl DirEntry {
    fn display_name(&self) -> String {
        let name = String::from_utf8_lossy(&self.name).trim_end().to_string();
        let ext = String::from_utf8_lossy(&self.ext).trim_end().to_string();
        if ext.is_empty() {
            name
        } else {
            format!("{name}.{ext}")
        }
    }
}

pub struct DragonDosFileSystem<'a> {
    disk: &'a mut Disk,
}

impl<'a> DragonDosFileSystem<'a> {
    pub fn mount(disk: &'a mut Disk) -> Self {
        Self { disk }
    }

    fn tracks_per_side(&self) -> u16 {
        self.disk.geometry().tracks
    }

    fn decode_logical_track(&self, logical: u8) -> (u16, u8) {
        let tracks = self.tracks_per_side();
        (logical as u16 % tracks, (logical as u16 / tracks) as u8)
    }

    fn encode_logical_track(&self, track: u16, head: u8) -> u8 {
        (track + head as u16 * self.tracks_per_side()) as u8
    }

    fn bitmap_location(&self) -> (u16, u8) {
        bitmap_track_head(self.disk.geometry().heads)
    }

    fn read_bitmap(&mut self) -> Result<Vec<u8>, DiskImageError> {
        let (track, head) = self.bitmap_location();
        let mut bitmap = Vec::new();
        for s in 1..=2u8 {
            bitmap.extend(self.disk.read_sector(track, head, s)?);
        }
        Ok(bitmap)
    }

    fn write_bitmap(&mut self, bitmap: &[u8]) -> Result<(), DiskImageError> {
        let (track, head) = self.bitmap_location();
        self.disk.write_sector(track, head, 1, &bitmap[0..256])?;
        self.disk.write_sector(track, head, 2, &bitmap[256..512])
    }

    fn sector_bit_index(&self, track: u16, head: u8, sector: u8) -> usize {
        let heads = self.disk.geometry().heads as usize;
        (track as usize * heads + head as usize) * SECTORS_PER_TRACK as usize + (sector as usize - 1)
    }

    /// Initialize a fresh DragonDos filesystem: reserve the directory and bitmap tracks, clear
    /// the directory, and mark every other sector free.
    pub fn format(disk: &'a mut Disk) -> Result<(), DiskImageError> {
        let geom = disk.geometry();
        let mut fs = DragonDosFileSystem { disk };
        let mut bitmap = vec![0u8; 512];
        let (bitmap_track, bitmap_head) = bitmap_track_head(geom.heads);
        for sector in 1..=SECTORS_PER_TRACK {
            let idx = fs.sector_bit_index(DIRECTORY_TRACK, DIRECTORY_HEAD, sector);
            set_bit(&mut bitmap, idx, true);
            let idx = fs.sector_bit_index(bitmap_track, bitmap_head, sector);
            set_bit(&mut bitmap, idx, true);
        }
        fs.write_bitmap(&bitmap)?;
        let empty = vec![0u8; 256];
        for s in 1..=SECTORS_PER_TRACK {
            fs.disk.write_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, s, &empty)?;
        }
        debug!("DragonDos format: reserved directory track {DIRECTORY_TRACK} + bitmap track {bitmap_track}");
        Ok(())
    }

    fn read_directory(&mut self) -> Result<Vec<DirEntry>, DiskImageError> {
        let mut entries = Vec::new();
        for s in 1..=SECTORS_PER_TRACK {
            let sector = self.disk.read_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, s)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = slot * ENTRY_SIZE;
                let raw = &sector[base..base + ENTRY_SIZE];
                let flags = DirFlags::from_bits_truncate(raw[11]);
                if !flags.contains(DirFlags::IN_USE) {
                    continue;
                }
                let mut name = [0u8; 8];
                name.copy_from_slice(&raw[0..8]);
                let mut ext = [0u8; 3];
                ext.copy_from_slice(&raw[8..11]);
                let mut extents = [Extent {
                    track: 0,
                    head: 0,
                    sector: 0,
                    count: 0,
                }; MAX_EXTENTS];
                for (i, e) in extents.iter_mut().enumerate() {
                    let eb = &raw[12 + i * 3..15 + i * 3];
                    let (track, head) = self.decode_logical_track(eb[0]);
                    *e = Extent {
                        track,
                        head,
                        sector: eb[1],
                        count: eb[2],
                    };
                }
                let continuation = if flags.contains(DirFlags::CONTINUATION) {
                    Some((raw[25], raw[26] as usize))
                } else {
                    None
                };
                entries.push(DirEntry {
                    sector: s,
                    slot,
                    name,
                    ext,
                    flags,
                    extents,
                    last_sector_bytes: raw[24],
                    continuation,
                });
            }
        }
        trace!("DragonDos directory: {} live entries", entries.len());
        Ok(entries)
    }

    fn find_entry(&mut self, name: &str) -> Result<DirEntry, DiskImageError> {
        self.read_directory()?
            .into_iter()
            .find(|e| e.display_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| DiskImageError::FileNotFound(name.to_string()))
    }

    /// Walk an entry's continuation chain, head first, following each entry's continuation
    /// pointer until one carries none.
    fn collect_chain(&mut self, entry: &DirEntry) -> Result<Vec<DirEntry>, DiskImageError> {
        let mut chain = vec![entry.clone()];
        let mut current = entry.clone();
        while let Some((sector, slot)) = current.continuation {
            current = self.read_entry_at(sector, slot)?;
            chain.push(current.clone());
        }
        Ok(chain)
    }

    /// Every extent across an entry's continuation chain, in order.
    fn collect_extents(&mut self, entry: &DirEntry) -> Result<Vec<Extent>, DiskImageError> {
        let chain = self.collect_chain(entry)?;
        Ok(chain
            .iter()
            .flat_map(|e| e.extents.iter().filter(|ext| ext.count > 0).copied())
            .collect())
    }

    fn read_entry_at(&mut self, sector: u8, slot: usize) -> Result<DirEntry, DiskImageError> {
        self.read_directory()?
            .into_iter()
            .find(|e| e.sector == sector && e.slot == slot)
            .ok_or_else(|| DiskImageError::ConsistencyError(format!("dangling continuation -> sector {sector} slot {slot}")))
    }

    fn read_extents_data(&mut self, extents: &[Extent], last_sector_bytes: u8) -> Result<Vec<u8>, DiskImageError> {
        let mut data = Vec::new();
        let total_sectors: usize = extents.iter().map(|e| e.count as usize).sum();
        let mut seen = 0usize;
        for extent in extents {
            for i in 0..extent.count {
                seen += 1;
                let bytes = self.disk.read_sector(extent.track, extent.head, extent.sector + i)?;
                if seen == total_sectors && last_sector_bytes != 0 {
                    data.extend_from_slice(&bytes[..last_sector_bytes as usize]);
                } else {
                    data.extend_from_slice(&bytes);
                }
            }
        }
        Ok(data)
    }

    fn find_free_sectors(&mut self, count: usize) -> Result<Vec<(u16, u8, u8)>, DiskImageError> {
        let bitmap = self.read_bitmap()?;
        let geom = self.disk.geometry();
        let mut found = Vec::new();
        'outer: for track in 0..geom.tracks {
            for head in 0..geom.heads {
                for sector in 1..=geom.sectors_per_track {
                    let idx = self.sector_bit_index(track, head, sector);
                    if !get_bit(&bitmap, idx) {
                        found.push((track, head, sector));
                        if found.len() == count {
                            break 'outer;
                        }
                    }
                }
            }
        }
        if found.len() < count {
            return Err(DiskImageError::FilesystemFull);
        }
        Ok(found)
    }

    /// Scan the directory for `count` unused slots, in sector/slot order. Does not reserve them -
    /// the caller must write all of them before any intervening directory write could race it.
    fn find_free_slots(&mut self, count: usize) -> Result<Vec<(u8, usize)>, DiskImageError> {
        let mut found = Vec::new();
        for s in 1..=SECTORS_PER_TRACK {
            let sector = self.disk.read_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, s)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = slot * ENTRY_SIZE;
                if !DirFlags::from_bits_truncate(sector[base + 11]).contains(DirFlags::IN_USE) {
                    found.push((s, slot));
                    if found.len() == count {
                        return Ok(found);
                    }
                }
            }
        }
        Err(DiskImageError::FilesystemFull)
    }

    /// Write a file's extents as a chain of directory entries, one per `MAX_EXTENTS`-sized chunk,
    /// each continuation entry flagged `DirFlags::CONTINUATION` and pointing at the next slot in
    /// the chain (§4.4.2). Only the head entry carries the file's name and `last_sector_bytes`;
    /// continuation entries carry a blank name and are skipped by `list_files`/`check`.
    fn write_directory_entry(
        &mut self,
        name: &str,
        extents: &[(u16, u8, u8, u8)],
        last_sector_bytes: u8,
    ) -> Result<(), DiskImageError> {
        let chunks: Vec<&[(u16, u8, u8, u8)]> = extents.chunks(MAX_EXTENTS).collect();
        let slots = self.find_free_slots(chunks.len())?;
        let (name8, ext3) = split_name(name);
        const BLANK8: [u8; 8] = [b' '; 8];
        const BLANK3: [u8; 3] = [b' '; 3];

        for (i, &(sector, slot)) in slots.iter().enumerate() {
            let is_head = i == 0;
            let next = slots.get(i + 1).copied();

            let mut flags = DirFlags::IN_USE;
            if next.is_some() {
                flags |= DirFlags::CONTINUATION;
            }

            let mut raw_sector = self.disk.read_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, sector)?;
            let base = slot * ENTRY_SIZE;
            let (n8, e3) = if is_head { (name8, ext3) } else { (BLANK8, BLANK3) };
            raw_sector[base..base + 8].copy_from_slice(&n8);
            raw_sector[base + 8..base + 11].copy_from_slice(&e3);
            raw_sector[base + 11] = flags.bits();
            for j in 0..MAX_EXTENTS {
                let (logical_track, sec, count) = chunks[i]
                    .get(j)
                    .map(|&(track, head, sec, count)| (self.encode_logical_track(track, head), sec, count))
                    .unwrap_or((0, 0, 0));
                raw_sector[base + 12 + j * 3] = logical_track;
                raw_sector[base + 13 + j * 3] = sec;
                raw_sector[base + 14 + j * 3] = count;
            }
            raw_sector[base + 24] = if is_head { last_sector_bytes } else { 0 };
            let (next_sector, next_slot) = next.unwrap_or((0, 0));
            raw_sector[base + 25] = next_sector;
            raw_sector[base + 26] = next_slot as u8;

            self.disk.write_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, sector, &raw_sector)?;
        }
        Ok(())
    }
}

impl<'a> FileSystem for DragonDosFileSystem<'a> {
    fn list_files(&mut self) -> Result<Vec<String>, DiskImageError> {
        Ok(self
            .read_directory()?
            .iter()
            .map(DirEntry::display_name)
            .filter(|n| !n.is_empty())
            .collect())
    }

    fn file_exists(&mut self, name: &str) -> Result<bool, DiskImageError> {
        Ok(self.find_entry(name).is_ok())
    }

    fn read_file(&mut self, name: &str) -> Result<File, DiskImageError> {
        let entry = self.find_entry(name)?;
        let extents = self.collect_extents(&entry)?;
        let raw = self.read_extents_data(&extents, entry.last_sector_bytes)?;

        let (info, data) = match raw.first() {
            Some(0x55) if raw.len() >= 9 => {
                let (header, payload) = DragonFileHeader::decode(&raw)?;
                let file_type = match header.file_type {
                    FILE_TYPE_BASIC => FileType::Basic,
                    FILE_TYPE_MACHINE_CODE => FileType::MachineCode,
                    _ => FileType::Unknown,
                };
                (
                    FileInfo {
                        name: entry.display_name(),
                        size: payload.len(),
                        file_type,
                        is_ascii: file_type == FileType::Basic,
                        load_address: Some(header.load_address),
                        exec_address: Some(header.exec_address),
                    },
                    payload.to_vec(),
                )
            }
            _ => (
                FileInfo {
                    name: entry.display_name(),
                    size: raw.len(),
                    file_type: FileType::Data,
                    is_ascii: false,
                    load_address: None,
                    exec_address: None,
                },
                raw,
            ),
        };
        debug!("DragonDos read_file {name}: {} bytes", data.len());
        Ok(File { info, data })
    }

    fn write_file(&mut self, name: &str, file: &File) -> Result<(), DiskImageError> {
        if !self.disk.writable() {
            return Err(DiskImageError::NotWriteable);
        }
        if !self.is_valid_filename(name) {
            return Err(DiskImageError::InvalidFilename(name.to_string()));
        }
        if self.file_exists(name)? {
            return Err(DiskImageError::FileExists(name.to_string()));
        }

        let on_disk = match file.info.file_type {
            FileType::Basic | FileType::MachineCode => {
                let header = DragonFileHeader {
                    file_type: if file.info.file_type == FileType::Basic {
                        FILE_TYPE_BASIC
                    } else {
                        FILE_TYPE_MACHINE_CODE
                    },
                    load_address: file.info.load_address.unwrap_or(0),
                    length: file.data.len() as u16,
                    exec_address: file.info.exec_address.unwrap_or(0),
                };
                let mut bytes = header.encode().to_vec();
                bytes.extend_from_slice(&file.data);
                bytes
            }
            _ => file.data.clone(),
        };

        let sectors_needed = on_disk.len().div_ceil(256).max(1);
        let free_sectors = self.find_free_sectors(sectors_needed)?;
        let extents = sectors_to_extents(&free_sectors);

        let mut bitmap = self.read_bitmap()?;
        for &(track, head, sector) in &free_sectors {
            let idx = self.sector_bit_index(track, head, sector);
            set_bit(&mut bitmap, idx, true);
        }
        self.write_bitmap(&bitmap)?;

        for (chunk, &(track, head, sector)) in on_disk.chunks(256).zip(free_sectors.iter()) {
            let mut buf = vec![0u8; 256];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.disk.write_sector(track, head, sector, &buf)?;
        }

        let last_sector_bytes = on_disk.len() % 256;
        self.write_directory_entry(name, &extents, last_sector_bytes as u8)
    }

    fn delete_file(&mut self, name: &str) -> Result<(), DiskImageError> {
        if !self.disk.writable() {
            return Err(DiskImageError::NotWriteable);
        }
        let entry = self.find_entry(name)?;
        let chain = self.collect_chain(&entry)?;
        let extents: Vec<Extent> = chain
            .iter()
            .flat_map(|e| e.extents.iter().filter(|ext| ext.count > 0).copied())
            .collect();
        let mut bitmap = self.read_bitmap()?;
        for extent in &extents {
            for i in 0..extent.count {
                let idx = self.sector_bit_index(extent.track, extent.head, extent.sector + i);
                set_bit(&mut bitmap, idx, false);
            }
        }
        self.write_bitmap(&bitmap)?;

        for link in &chain {
            let mut sector = self.disk.read_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, link.sector)?;
            sector[link.slot * ENTRY_SIZE + 11] = 0;
            self.disk.write_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, link.sector, &sector)?;
        }
        warn!("DragonDos delete_file {name}: sectors released across {} directory entries", chain.len());
        Ok(())
    }

    fn rename_file(&mut self, old: &str, new: &str) -> Result<(), DiskImageError> {
        if !self.is_valid_filename(new) {
            return Err(DiskImageError::InvalidFilename(new.to_string()));
        }
        let entry = self.find_entry(old)?;
        let (name8, ext3) = split_name(new);
        let mut sector = self.disk.read_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, entry.sector)?;
        let base = entry.slot * ENTRY_SIZE;
        sector[base..base + 8].copy_from_slice(&name8);
        sector[base + 8..base + 11].copy_from_slice(&ext3);
        self.disk.write_sector(DIRECTORY_TRACK, DIRECTORY_HEAD, entry.sector, &sector)
    }

    fn free(&mut self) -> Result<usize, DiskImageError> {
        let bitmap = self.read_bitmap()?;
        let geom = self.disk.geometry();
        let total = geom.sector_count();
        let mut free_count = 0usize;
        for i in 0..total {
            if !get_bit(&bitmap, i) {
                free_count += 1;
            }
        }
        Ok(free_count * 256)
    }

    fn is_valid_filename(&self, name: &str) -> bool {
        !name.is_empty() && name.len() <= 12 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    }

    fn check(&mut self) -> Result<(), DiskImageError> {
        let entries = self.read_directory()?;
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if entry.display_name().is_empty() {
                // Continuation-only slot; its extents are already covered by the head entry's chain.
                continue;
            }
            let extents = self.collect_extents(entry)?;
            for extent in &extents {
                for i in 0..extent.count {
                    let idx = self.sector_bit_index(extent.track, extent.head, extent.sector + i);
                    if !seen.insert(idx) {
                        return Err(DiskImageError::ConsistencyError(format!(
                            "{}: sector overlaps another file's extent",
                            entry.display_name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn get_file_info(&mut self, name: &str) -> Result<FileInfo, DiskImageError> {
        Ok(self.read_file(name)?.info)
    }

    fn is_sector_allocated(&mut self, track: u16, head: u8, sector: u8) -> Result<bool, DiskImageError> {
        let idx = self.sector_bit_index(track, head, sector);
        Ok(get_bit(&self.read_bitmap()?, idx))
    }
}

fn sectors_to_extents(sectors: &[(u16, u8, u8)]) -> Vec<(u16, u8, u8, u8)> {
    let mut extents: Vec<(u16, u8, u8, u8)> = Vec::new();
    for &(track, head, sector) in sectors {
        if let Some(last) = extents.last_mut() {
            if last.0 == track && last.1 == head && last.2 as u16 + last.3 as u16 == sector as u16 && last.3 < 255 {
                last.3 += 1;
                continue;
            }
        }
        extents.push((track, head, sector, 1));
    }
    extents
}

fn set_bit(bitmap: &mut [u8], idx: usize, value: bool) {
    if value {
        bitmap[idx / 8] |= 1 << (idx % 8);
    } else {
        bitmap[idx / 8] &= !(1 << (idx % 8));
    }
}

fn get_bit(bitmap: &[u8], idx: usize) -> bool {
    bitmap[idx / 8] & (1 << (idx % 8)) != 0
}

fn split_name(name: &str) -> ([u8; 8], [u8; 3]) {
    let mut name8 = [b' '; 8];
    let mut ext3 = [b' '; 3];
    let upper = name.to_ascii_uppercase();
    let mut parts = upper.splitn(2, '.');
    let base = parts.next().unwrap_or("");
    let ext = parts.next().unwrap_or("");
    for (i, c) in base.bytes().take(8).enumerate() {
        name8[i] = c;
    }
    for (i, c) in ext.bytes().take(3).enumerate() {
        ext3[i] = c;
    }
    (name8, ext3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_image::MemoryDisk;
    use crate::ChsGeometry;

    fn new_disk(heads: u8, tracks: u16) -> Disk {
        Disk::Memory(MemoryDisk::new(ChsGeometry::new(heads, tracks, SECTORS_PER_TRACK, 256)))
    }

    /// S6: freshly formatted disks report the literal free totals.
    #[test]
    fn fresh_disk_free_space_matches_worked_examples() {
        let cases: [(u8, u16, usize); 4] =
            [(1, 40, 175_104), (2, 40, 359_424), (1, 80, 359_424), (2, 80, 728_064)];
        for (heads, tracks, expected_free) in cases {
            let mut disk = new_disk(heads, tracks);
            DragonDosFileSystem::format(&mut disk).unwrap();
            let mut fs = DragonDosFileSystem::mount(&mut disk);
            assert_eq!(fs.free().unwrap(), expected_free, "heads={heads} tracks={tracks}");
        }
    }

    #[test]
    fn write_read_round_trip_with_header() {
        let mut disk = new_disk(1, 40);
        DragonDosFileSystem::format(&mut disk).unwrap();
        let mut fs = DragonDosFileSystem::mount(&mut disk);
        let file = File {
            info: FileInfo {
                name: "TEST.BIN".into(),
                size: 4,
                file_type: FileType::MachineCode,
                is_ascii: false,
                load_address: Some(0x2000),
                exec_address: Some(0x2000),
            },
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        fs.write_file("TEST.BIN", &file).unwrap();
        let back = fs.read_file("test.bin").unwrap();
        assert_eq!(back.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(back.info.load_address, Some(0x2000));
        assert!(fs.check().is_ok());
    }

    /// A file spanning enough sectors to force non-contiguous extents beyond `MAX_EXTENTS` must
    /// chain into a continuation directory entry, not error out.
    #[test]
    fn write_read_round_trip_with_continuation_chain() {
        let mut disk = new_disk(2, 40);
        DragonDosFileSystem::format(&mut disk).unwrap();
        let mut fs = DragonDosFileSystem::mount(&mut disk);

        // Force fragmentation by reserving alternating sectors ahead of time, so the eventual
        // free-sector scan for the real file can't coalesce more than a couple of sectors per run.
        {
            let mut bitmap = fs.read_bitmap().unwrap();
            let geom = fs.disk.geometry();
            'outer: for track in 0..geom.tracks {
                if track == DIRECTORY_TRACK || track == DIRECTORY_TRACK + 1 {
                    continue;
                }
                for head in 0..geom.heads {
                    for sector in 1..=geom.sectors_per_track {
                        if sector % 2 == 0 {
                            let idx = fs.sector_bit_index(track, head, sector);
                            set_bit(&mut bitmap, idx, true);
                        }
                    }
                }
                if track > 5 {
                    break 'outer;
                }
            }
            fs.write_bitmap(&bitmap).unwrap();
        }

        let data = vec![0x7Eu8; 256 * 10];
        let file = File {
            info: FileInfo {
                name: "BIGFILE.BIN".into(),
                size: data.len(),
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data,
        };
        fs.write_file("BIGFILE.BIN", &file).unwrap();

        let entry = fs.find_entry("BIGFILE.BIN").unwrap();
        let chain = fs.collect_chain(&entry).unwrap();
        assert!(chain.len() > 1, "expected a continuation chain for a fragmented 10-sector file");

        let names = fs.list_files().unwrap();
        assert_eq!(names.iter().filter(|n| *n == "BIGFILE.BIN").count(), 1);
        assert!(!names.iter().any(|n| n.is_empty()));

        let back = fs.read_file("BIGFILE.BIN").unwrap();
        assert_eq!(back.data, vec![0x7Eu8; 256 * 10]);
        assert!(fs.check().is_ok());

        fs.delete_file("BIGFILE.BIN").unwrap();
        assert!(!fs.file_exists("BIGFILE.BIN").unwrap());
        assert!(fs.check().is_ok());
    }
}
