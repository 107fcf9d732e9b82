/*
    dragonfox

    src/file_system/flex.rs

    Flex: directory sectors form a linked list starting at linear sector-index 5, each holding a
    next-directory-sector pointer and ten 24-byte entries; each file is itself a chain of sectors
    whose first two bytes hold the next sector's address (§4.4.3).

    Flex's 2-byte sector addresses have no separate head field. As with DragonDos, a "logical
    track" doubles as the side selector: `logical_track = track + head * tracks_per_side`.
    `free()`/`check()` are a must-implement Open Question (DESIGN.md decision (a)): Flex keeps no
    allocation bitmap of its own, so free space is derived by walking every file's chain and
    subtracting the visited sectors from the disk's total.
*/
use log::{debug, trace, warn};

use crate::disk_image::Disk;
use crate::file_system::{File, FileInfo, FileSystem, FileType};
use crate::DiskImageError;

const FIRST_DIRECTORY_LSN: u32 = 5;
const ENTRIES_PER_SECTOR: usize = 10;
const ENTRY_SIZE: usize = 24;
const ENTRY_BASE_OFFSET: usize = 16;
const DATA_PAYLOAD: usize = 254;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct LogicalSector {
    logical_track: u8,
    sector: u8,
}

impl LogicalSector {
    fn is_terminal(&self) -> bool {
        self.logical_track == 0 && self.sector == 0
    }
}

#[derive(Clone, Debug)]
struct DirEntry {
    dir_lsn: u32,
    slot: usize,
    name: [u8; 8],
    ext: [u8; 3],
    start: LogicalSector,
    end: LogicalSector,
    sector_count: u16,
    random_access: bool,
    month: u8,
    day: u8,
    year_offset: u8,
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

pub struct FlexFileSystem<'a> {
    disk: &'a mut Disk,
}

impl<'a> FlexFileSystem<'a> {
    pub fn mount(disk: &'a mut Disk) -> Self {
        Self { disk }
    }

    fn tracks_per_side(&self) -> u16 {
        self.disk.geometry().tracks
    }

    /// Linear 1-based sector index to physical CHS, interleaved across heads (§4.4.3).
    fn lsn_to_chs(&self, lsn: u32) -> (u16, u8, u8) {
        let geom = self.disk.geometry();
        let spt = geom.sectors_per_track as u32;
        let heads = geom.heads as u32;
        let idx0 = lsn - 1;
        let track = (idx0 / (spt * heads)) as u16;
        let rem = idx0 % (spt * heads);
        let sector = (rem / heads + 1) as u8;
        let head = (rem % heads) as u8;
        (track, head, sector)
    }

    fn logical_to_chs(&self, ls: LogicalSector) -> (u16, u8, u8) {
        let tracks = self.tracks_per_side();
        let track = ls.logical_track as u16 % tracks;
        let head = (ls.logical_track as u16 / tracks) as u8;
        (track, head, ls.sector)
    }

    fn chs_to_logical(&self, track: u16, head: u8, sector: u8) -> LogicalSector {
        let tracks = self.tracks_per_side();
        LogicalSector {
            logical_track: (track + head as u16 * tracks) as u8,
            sector,
        }
    }

    fn read_directory(&mut self) -> Result<Vec<DirEntry>, DiskImageError> {
        let mut entries = Vec::new();
        let mut lsn = FIRST_DIRECTORY_LSN;
        loop {
            let (track, head, sector) = self.lsn_to_chs(lsn);
            let raw = self.disk.read_sector(track, head, sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = ENTRY_BASE_OFFSET + slot * ENTRY_SIZE;
                let e = &raw[base..base + ENTRY_SIZE];
                if e[0] == 0x00 {
                    continue;
                }
                let mut name = [0u8; 8];
                name.copy_from_slice(&e[0..8]);
                let mut ext = [0u8; 3];
                ext.copy_from_slice(&e[8..11]);
                entries.push(DirEntry {
                    dir_lsn: lsn,
                    slot,
                    name,
                    ext,
                    start: LogicalSector {
                        logical_track: e[11],
                        sector: e[12],
                    },
                    end: LogicalSector {
                        logical_track: e[13],
                        sector: e[14],
                    },
                    sector_count: u16::from_be_bytes([e[15], e[16]]),
                    random_access: e[17] != 0,
                    month: e[18],
                    day: e[19],
                    year_offset: e[20],
                });
            }
            let next_lsn = u16::from_be_bytes([raw[0], raw[1]]);
            if next_lsn == 0 {
                break;
            }
            lsn = next_lsn as u32;
        }
        trace!("Flex directory: {} live entries", entries.len());
        Ok(entries)
    }

    fn find_entry(&mut self, name: &str) -> Result<DirEntry, DiskImageError> {
        self.read_directory()?
            .into_iter()
            .find(|e| e.display_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| DiskImageError::FileNotFound(name.to_string()))
    }

    fn chain_from(&mut self, start: LogicalSector) -> Result<Vec<LogicalSector>, DiskImageError> {
        let mut chain = Vec::new();
        let mut current = start;
        loop {
            chain.push(current);
            let (track, head, sector) = self.logical_to_chs(current);
            let bytes = self.disk.read_sector(track, head, sector)?;
            let next = LogicalSector {
                logical_track: bytes[0],
                sector: bytes[1],
            };
            if next.is_terminal() {
                break;
            }
            current = next;
        }
        Ok(chain)
    }

    fn read_chain_data(&mut self, start: LogicalSector) -> Result<Vec<u8>, DiskImageError> {
        let chain = self.chain_from(start)?;
        let mut data = Vec::new();
        for ls in chain {
            let (track, head, sector) = self.logical_to_chs(ls);
            let bytes = self.disk.read_sector(track, head, sector)?;
            data.extend_from_slice(&bytes[2..2 + DATA_PAYLOAD]);
        }
        // File length isn't stored per-byte; trailing NUL padding in the final sector is
        // trimmed by the caller if it cares (directory records a sector count, not a byte count).
        Ok(data)
    }

    fn write_directory_entry(&mut self, entry_bytes: &[u8; ENTRY_SIZE]) -> Result<(), DiskImageError> {
        let mut lsn = FIRST_DIRECTORY_LSN;
        loop {
            let (track, head, sector) = self.lsn_to_chs(lsn);
            let mut raw = self.disk.read_sector(track, head, sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = ENTRY_BASE_OFFSET + slot * ENTRY_SIZE;
                if raw[base] == 0x00 {
                    raw[base..base + ENTRY_SIZE].copy_from_slice(entry_bytes);
                    return self.disk.write_sector(track, head, sector, &raw);
                }
            }
            let next_lsn = u16::from_be_bytes([raw[0], raw[1]]);
            if next_lsn == 0 {
                return Err(DiskImageError::FilesystemFull);
            }
            lsn = next_lsn as u32;
        }
    }
}

impl<'a> FileSystem for FlexFileSystem<'a> {
    fn list_files(&mut self) -> Result<Vec<String>, DiskImageError> {
        Ok(self.read_directory()?.iter().map(DirEntry::display_name).collect())
    }

    fn file_exists(&mut self, name: &str) -> Result<bool, DiskImageError> {
        Ok(self.find_entry(name).is_ok())
    }

    fn read_file(&mut self, name: &str) -> Result<File, DiskImageError> {
        let entry = self.find_entry(name)?;
        let data = self.read_chain_data(entry.start)?;
        debug!("Flex read_file {name}: {} bytes across {} sectors", data.len(), entry.sector_count);
        Ok(File {
            info: FileInfo {
                name: entry.display_name(),
                size: data.len(),
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data,
        })
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

        let used = self.used_sectors()?;
        let chunks: Vec<&[u8]> = if file.data.is_empty() {
            vec![&[]]
        } else {
            file.data.chunks(DATA_PAYLOAD).collect()
        };

        let geom = self.disk.geometry();
        let mut free_iter = (0..geom.tracks)
            .flat_map(|t| (0..geom.heads).flat_map(move |h| (1..=geom.sectors_per_track).map(move |s| (t, h, s))))
            .filter(|&(t, h, s)| !used.contains(&self.chs_to_logical(t, h, s)) && t != 0);

        let mut allocated = Vec::new();
        for _ in &chunks {
            let (t, h, s) = free_iter.next().ok_or(DiskImageError::FilesystemFull)?;
            allocated.push(self.chs_to_logical(t, h, s));
        }
        drop(free_iter);

        for (i, chunk) in chunks.iter().enumerate() {
            let next = if i + 1 < allocated.len() {
                allocated[i + 1]
            } else {
                LogicalSector {
                    logical_track: 0,
                    sector: 0,
                }
            };
            let (track, head, sector) = self.logical_to_chs(allocated[i]);
            let mut buf = vec![0u8; 256];
            buf[0] = next.logical_track;
            buf[1] = next.sector;
            buf[2..2 + chunk.len()].copy_from_slice(chunk);
            self.disk.write_sector(track, head, sector, &buf)?;
        }

        let (name8, ext3) = split_name(name);
        let mut entry_bytes = [0u8; ENTRY_SIZE];
        entry_bytes[0..8].copy_from_slice(&name8);
        entry_bytes[8..11].copy_from_slice(&ext3);
        entry_bytes[11] = allocated[0].logical_track;
        entry_bytes[12] = allocated[0].sector;
        entry_bytes[13] = allocated.last().unwrap().logical_track;
        entry_bytes[14] = allocated.last().unwrap().sector;
        entry_bytes[15..17].copy_from_slice(&(allocated.len() as u16).to_be_bytes());
        self.write_directory_entry(&entry_bytes)
    }

    fn delete_file(&mut self, name: &str) -> Result<(), DiskImageError> {
        if !self.disk.writable() {
            return Err(DiskImageError::NotWriteable);
        }
        let entry = self.find_entry(name)?;
        let (track, head, sector) = self.lsn_to_chs(entry.dir_lsn);
        let mut raw = self.disk.read_sector(track, head, sector)?;
        let base = ENTRY_BASE_OFFSET + entry.slot * ENTRY_SIZE;
        raw[base] = 0x00;
        self.disk.write_sector(track, head, sector, &raw)?;
        warn!("Flex delete_file {name}: directory entry cleared (chain left in place)");
        Ok(())
    }

    fn rename_file(&mut self, old: &str, new: &str) -> Result<(), DiskImageError> {
        if !self.is_valid_filename(new) {
            return Err(DiskImageError::InvalidFilename(new.to_string()));
        }
        let entry = self.find_entry(old)?;
        let (track, head, sector) = self.lsn_to_chs(entry.dir_lsn);
        let mut raw = self.disk.read_sector(track, head, sector)?;
        let base = ENTRY_BASE_OFFSET + entry.slot * ENTRY_SIZE;
        let (name8, ext3) = split_name(new);
        raw[base..base + 8].copy_from_slice(&name8);
        raw[base + 8..base + 11].copy_from_slice(&ext3);
        self.disk.write_sector(track, head, sector, &raw)
    }

    /// §9 Open Question (a): free = count(unallocated sectors) × sector size, since Flex carries
    /// no allocation bitmap of its own.
    fn free(&mut self) -> Result<usize, DiskImageError> {
        let used = self.used_sectors()?;
        let geom = self.disk.geometry();
        Ok((geom.sector_count() - used.len()) * 256)
    }

    fn is_valid_filename(&self, name: &str) -> bool {
        let (base, ext) = match name.split_once('.') {
            Some((b, e)) => (b, e),
            None => (name, ""),
        };
        !base.is_empty() && base.len() <= 8 && ext.len() <= 3 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
    }

    /// §9 Open Question (a): every chain must end at a sector whose next pointer is `(0,0)`, and
    /// no sector may be shared between two chains.
    fn check(&mut self) -> Result<(), DiskImageError> {
        let entries = self.read_directory()?;
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            let chain = self.chain_from(entry.start)?;
            for ls in chain {
                if !seen.insert(ls) {
                    return Err(DiskImageError::ConsistencyError(format!(
                        "{}: sector shared with another file's chain",
                        entry.display_name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn get_file_info(&mut self, name: &str) -> Result<FileInfo, DiskImageError> {
        Ok(self.read_file(name)?.info)
    }

    fn is_sector_allocated(&mut self, track: u16, head: u8, sector: u8) -> Result<bool, DiskImageError> {
        let ls = self.chs_to_logical(track, head, sector);
        Ok(self.used_sectors()?.contains(&ls) || track == 0)
    }
}

impl<'a> FlexFileSystem<'a> {
    fn used_sectors(&mut self) -> Result<std::collections::HashSet<LogicalSector>, DiskImageError> {
        let entries = self.read_directory()?;
        let mut used = std::collections::HashSet::new();
        for entry in &entries {
            for ls in self.chain_from(entry.start)? {
                used.insert(ls);
            }
        }
        Ok(used)
    }
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

    fn new_disk() -> Disk {
        Disk::Memory(MemoryDisk::new(ChsGeometry::new(1, 35, 18, 256)))
    }

    fn clear_directory(disk: &mut Disk, heads: u8) {
        let geom = disk.geometry();
        let spt = geom.sectors_per_track as u32;
        let h = heads as u32;
        let mut lsn = FIRST_DIRECTORY_LSN;
        loop {
            let idx0 = lsn - 1;
            let track = (idx0 / (spt * h)) as u16;
            let rem = idx0 % (spt * h);
            let sector = (rem / h + 1) as u8;
            let head = (rem % h) as u8;
            let empty = vec![0u8; 256];
            disk.write_sector(track, head, sector, &empty).unwrap();
            break; // single directory sector is enough for these small tests
        }
    }

    #[test]
    fn write_read_round_trip() {
        let mut disk = new_disk();
        clear_directory(&mut disk, 1);
        let mut fs = FlexFileSystem::mount(&mut disk);
        let file = File {
            info: FileInfo {
                name: "DATA.TXT".into(),
                size: 4,
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data: vec![1, 2, 3, 4],
        };
        fs.write_file("DATA.TXT", &file).unwrap();
        let back = fs.read_file("data.txt").unwrap();
        assert_eq!(&back.data[..4], &[1, 2, 3, 4]);
        assert!(fs.check().is_ok());
    }

    #[test]
    fn free_shrinks_after_write() {
        let mut disk = new_disk();
        clear_directory(&mut disk, 1);
        let mut fs = FlexFileSystem::mount(&mut disk);
        let before = fs.free().unwrap();
        let file = File {
            info: FileInfo {
                name: "A.TXT".into(),
                size: 1,
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data: vec![0xAA],
        };
        fs.write_file("A.TXT", &file).unwrap();
        assert!(fs.free().unwrap() < before);
    }
}
