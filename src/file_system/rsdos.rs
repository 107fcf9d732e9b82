/*
    dragonfox

    src/file_system/rsdos.rs

    RsDos: a single-sided 35-track 18-sector 256-byte filesystem. Allocation is by 9-sector
    "granule": a 68-entry map at track 17 sector 2 threads each file's granule chain, terminated
    by a `0xC0..=0xC9` byte whose low nibble counts sectors used in the chain's final granule
    (§4.4.1).
*/
use log::{debug, trace, warn};
use regex::Regex;

use crate::disk_image::Disk;
use crate::file_system::{File, FileInfo, FileSystem, FileType};
use crate::DiskImageError;

const DIRECTORY_TRACK: u16 = 17;
const GRANULE_MAP_SECTOR: u8 = 2;
const DIRECTORY_FIRST_SECTOR: u8 = 3;
const DIRECTORY_SECTOR_COUNT: u8 = 9;
const ENTRIES_PER_SECTOR: usize = 8;
const ENTRY_SIZE: usize = 32;
const SECTORS_PER_GRANULE: u8 = 9;
const GRANULE_COUNT: usize = 68;
const GRANULE_BYTES: usize = SECTORS_PER_GRANULE as usize * 256;

const UNUSED_ENTRY: u8 = 0x00;
const END_OF_DIRECTORY: u8 = 0xFF;
const FREE_GRANULE: u8 = 0xFF;
const TERMINAL_LOW: u8 = 0xC0;
const TERMINAL_HIGH: u8 = 0xC9;

#[derive(Clone, Debug)]
struct DirEntry {
    sector: u8,
    slot: usize,
    name: [u8; 8],
    ext: [u8; 3],
    file_type: u8,
    ascii_flag: u8,
    first_granule: u8,
    last_sector_len: u16,
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

    fn file_type(&self) -> FileType {
        match self.file_type {
            0 => FileType::Basic,
            1 => FileType::Data,
            2 => FileType::MachineCode,
            _ => FileType::Unknown,
        }
    }
}

/// Mounts an RsDos filesystem over a disk handle. Filename comparisons honor the
/// `case_sensitive` knob set at mount time (Design Note "Case-sensitivity knob"); RsDos images
/// are uppercase by convention, but the knob lets a caller opt into strict matching.
pub struct RsDosFileSystem<'a> {
    disk: &'a mut Disk,
    case_sensitive: bool,
}

impl<'a> RsDosFileSystem<'a> {
    pub fn mount(disk: &'a mut Disk, case_sensitive: bool) -> Self {
        Self { disk, case_sensitive }
    }

    fn granule_map(&mut self) -> Result<[u8; GRANULE_COUNT], DiskImageError> {
        let sector = self.disk.read_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR)?;
        let mut map = [0u8; GRANULE_COUNT];
        map.copy_from_slice(&sector[0..GRANULE_COUNT]);
        Ok(map)
    }

    fn write_granule_map(&mut self, map: &[u8; GRANULE_COUNT]) -> Result<(), DiskImageError> {
        let mut sector = self.disk.read_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR)?;
        sector[0..GRANULE_COUNT].copy_from_slice(map);
        self.disk.write_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR, &sector)
    }

    /// Map a granule index to its first sector's CHS (§4.4.1 "granule-to-LSN mapping").
    fn granule_chs(granule: u8) -> (u16, u8) {
        let g = granule as u16;
        let track = if g < 34 { g / 2 } else { g / 2 + 1 };
        let sector_base = if g % 2 == 0 { 0 } else { 9 };
        (track, sector_base)
    }

    fn read_directory(&mut self) -> Result<Vec<DirEntry>, DiskImageError> {
        let mut entries = Vec::new();
        'sectors: for s in 0..DIRECTORY_SECTOR_COUNT {
            let sector_num = DIRECTORY_FIRST_SECTOR + s;
            let sector = self.disk.read_sector(DIRECTORY_TRACK, 0, sector_num)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = slot * ENTRY_SIZE;
                let raw = &sector[base..base + ENTRY_SIZE];
                match raw[0] {
                    END_OF_DIRECTORY => break 'sectors,
                    UNUSED_ENTRY => continue,
                    _ => {}
                }
                let mut name = [0u8; 8];
                name.copy_from_slice(&raw[0..8]);
                let mut ext = [0u8; 3];
                ext.copy_from_slice(&raw[8..11]);
                entries.push(DirEntry {
                    sector: sector_num,
                    slot,
                    name,
                    ext,
                    file_type: raw[11],
                    ascii_flag: raw[12],
                    first_granule: raw[13],
                    last_sector_len: u16::from_be_bytes([raw[14], raw[15]]),
                });
            }
        }
        trace!("RsDos directory: {} live entries", entries.len());
        Ok(entries)
    }

    fn find_entry(&mut self, name: &str) -> Result<DirEntry, DiskImageError> {
        let entries = self.read_directory()?;
        entries
            .into_iter()
            .find(|e| self.names_match(&e.display_name(), name))
            .ok_or_else(|| DiskImageError::FileNotFound(name.to_string()))
    }

    fn names_match(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    fn chain(&mut self, first_granule: u8) -> Result<(Vec<u8>, Vec<u8>), DiskImageError> {
        let map = self.granule_map()?;
        let mut visited = Vec::new();
        let mut granule = first_granule;
        loop {
            if granule as usize >= GRANULE_COUNT {
                return Err(DiskImageError::ConsistencyError(format!(
                    "granule index {granule} out of range"
                )));
            }
            visited.push(granule);
            let entry = map[granule as usize];
            if (TERMINAL_LOW..=TERMINAL_HIGH).contains(&entry) {
                break;
            }
            if entry == FREE_GRANULE {
                return Err(DiskImageError::ConsistencyError(format!(
                    "granule chain from {first_granule} reaches a free granule"
                )));
            }
            granule = entry;
        }
        let terminal = map[*visited.last().unwrap() as usize];
        Ok((visited, vec![terminal]))
    }

    fn read_chain_data(&mut self, entry: &DirEntry) -> Result<Vec<u8>, DiskImageError> {
        let (granules, terminal) = self.chain(entry.first_granule)?;
        let last_used_sectors = (terminal[0] & 0x0F).max(1) as u8;
        let mut data = Vec::new();
        for (i, &granule) in granules.iter().enumerate() {
            let (track, sector_base) = Self::granule_chs(granule);
            let is_last = i == granules.len() - 1;
            let sector_count = if is_last { last_used_sectors } else { SECTORS_PER_GRANULE };
            for s in 0..sector_count {
                let sector_num = sector_base + s + 1;
                let bytes = self.disk.read_sector(track, 0, sector_num)?;
                if is_last && s == sector_count - 1 {
                    let len = if entry.last_sector_len == 0 {
                        256
                    } else {
                        entry.last_sector_len.min(256) as usize
                    };
                    data.extend_from_slice(&bytes[..len]);
                } else {
                    data.extend_from_slice(&bytes);
                }
            }
        }
        Ok(data)
    }

    fn allocate_granules(&mut self, count: usize) -> Result<Vec<u8>, DiskImageError> {
        let map = self.granule_map()?;
        let free: Vec<u8> = (0..GRANULE_COUNT as u8).filter(|&g| map[g as usize] == FREE_GRANULE).collect();
        if free.len() < count {
            return Err(DiskImageError::FilesystemFull);
        }
        Ok(free[..count].to_vec())
    }
}

impl<'a> FileSystem for RsDosFileSystem<'a> {
    fn list_files(&mut self) -> Result<Vec<String>, DiskImageError> {
        Ok(self.read_directory()?.iter().map(DirEntry::display_name).collect())
    }

    fn file_exists(&mut self, name: &str) -> Result<bool, DiskImageError> {
        Ok(self.find_entry(name).is_ok())
    }

    fn read_file(&mut self, name: &str) -> Result<File, DiskImageError> {
        let entry = self.find_entry(name)?;
        let data = self.read_chain_data(&entry)?;
        debug!("RsDos read_file {name}: {} bytes", data.len());
        Ok(File {
            info: FileInfo {
                name: entry.display_name(),
                size: data.len(),
                file_type: entry.file_type(),
                is_ascii: entry.ascii_flag != 0,
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
        let granule_count = file.data.len().div_ceil(GRANULE_BYTES).max(1);
        let granules = self.allocate_granules(granule_count)?;

        let mut map = self.granule_map()?;
        for i in 0..granule_count - 1 {
            map[granules[i] as usize] = granules[i + 1];
        }
        let last_granule_bytes = file.data.len() - (granule_count - 1) * GRANULE_BYTES;
        let last_sectors_used = last_granule_bytes.div_ceil(256).max(1) as u8;
        map[*granules.last().unwrap() as usize] = TERMINAL_LOW + (last_sectors_used - 1).min(9);
        self.write_granule_map(&map)?;

        for (i, &granule) in granules.iter().enumerate() {
            let (track, sector_base) = Self::granule_chs(granule);
            let start = i * GRANULE_BYTES;
            let chunk = &file.data[start..(start + GRANULE_BYTES).min(file.data.len())];
            for (s, sector_bytes) in chunk.chunks(256).enumerate() {
                let mut buf = vec![0u8; 256];
                buf[..sector_bytes.len()].copy_from_slice(sector_bytes);
                self.disk.write_sector(track, 0, sector_base + s as u8 + 1, &buf)?;
            }
        }

        let (name8, ext3) = split_name(name);
        let last_sector_len = (last_granule_bytes - (last_sectors_used as usize - 1) * 256) as u16;
        self.write_directory_entry(
            &name8,
            &ext3,
            file.info.file_type,
            file.info.is_ascii,
            granules[0],
            if last_sector_len == 0 { 256 } else { last_sector_len },
        )
    }

    fn delete_file(&mut self, name: &str) -> Result<(), DiskImageError> {
        if !self.disk.writable() {
            return Err(DiskImageError::NotWriteable);
        }
        let entry = self.find_entry(name)?;
        let (granules, _) = self.chain(entry.first_granule)?;
        let mut map = self.granule_map()?;
        for g in granules {
            map[g as usize] = FREE_GRANULE;
        }
        self.write_granule_map(&map)?;

        let mut sector = self.disk.read_sector(DIRECTORY_TRACK, 0, entry.sector)?;
        sector[entry.slot * ENTRY_SIZE] = UNUSED_ENTRY;
        self.disk.write_sector(DIRECTORY_TRACK, 0, entry.sector, &sector)?;
        warn!("RsDos delete_file {name}: granules released");
        Ok(())
    }

    fn rename_file(&mut self, old: &str, new: &str) -> Result<(), DiskImageError> {
        if !self.is_valid_filename(new) {
            return Err(DiskImageError::InvalidFilename(new.to_string()));
        }
        let entry = self.find_entry(old)?;
        let (name8, ext3) = split_name(new);
        let mut sector = self.disk.read_sector(DIRECTORY_TRACK, 0, entry.sector)?;
        let base = entry.slot * ENTRY_SIZE;
        sector[base..base + 8].copy_from_slice(&name8);
        sector[base + 8..base + 11].copy_from_slice(&ext3);
        self.disk.write_sector(DIRECTORY_TRACK, 0, entry.sector, &sector)
    }

    fn free(&mut self) -> Result<usize, DiskImageError> {
        let map = self.granule_map()?;
        Ok(map.iter().filter(|&&g| g == FREE_GRANULE).count() * GRANULE_BYTES)
    }

    fn is_valid_filename(&self, name: &str) -> bool {
        let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{1,7}(\.[A-Za-z0-9]{0,3})?$").unwrap();
        re.is_match(name)
    }

    fn check(&mut self) -> Result<(), DiskImageError> {
        let entries = self.read_directory()?;
        let mut seen = std::collections::HashSet::new();
        for entry in entries {
            let (granules, terminal) = self.chain(entry.first_granule)?;
            let nibble = terminal[0] & 0x0F;
            if nibble > 9 {
                return Err(DiskImageError::ConsistencyError(format!(
                    "{}: terminal low nibble {nibble} out of [0,9]",
                    entry.display_name()
                )));
            }
            for g in granules {
                let (track, _) = Self::granule_chs(g);
                if track == DIRECTORY_TRACK {
                    return Err(DiskImageError::ConsistencyError(format!(
                        "{}: chain visits the directory track",
                        entry.display_name()
                    )));
                }
                if !seen.insert(g) {
                    return Err(DiskImageError::ConsistencyError(format!(
                        "granule {g} shared between chains"
                    )));
                }
            }
        }
        Ok(())
    }

    fn get_file_info(&mut self, name: &str) -> Result<FileInfo, DiskImageError> {
        let entry = self.find_entry(name)?;
        let data = self.read_chain_data(&entry)?;
        Ok(FileInfo {
            name: entry.display_name(),
            size: data.len(),
            file_type: entry.file_type(),
            is_ascii: entry.ascii_flag != 0,
            load_address: None,
            exec_address: None,
        })
    }

    fn is_sector_allocated(&mut self, track: u16, head: u8, sector: u8) -> Result<bool, DiskImageError> {
        if head != 0 {
            return Ok(false);
        }
        let map = self.granule_map()?;
        for g in 0..GRANULE_COUNT as u8 {
            if map[g as usize] == FREE_GRANULE {
                continue;
            }
            let (g_track, base) = Self::granule_chs(g);
            if g_track == track && sector >= base + 1 && sector <= base + SECTORS_PER_GRANULE {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'a> RsDosFileSystem<'a> {
    fn write_directory_entry(
        &mut self,
        name8: &[u8; 8],
        ext3: &[u8; 3],
        file_type: FileType,
        is_ascii: bool,
        first_granule: u8,
        last_sector_len: u16,
    ) -> Result<(), DiskImageError> {
        for s in 0..DIRECTORY_SECTOR_COUNT {
            let sector_num = DIRECTORY_FIRST_SECTOR + s;
            let mut sector = self.disk.read_sector(DIRECTORY_TRACK, 0, sector_num)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let base = slot * ENTRY_SIZE;
                if sector[base] == UNUSED_ENTRY || sector[base] == END_OF_DIRECTORY {
                    sector[base..base + 8].copy_from_slice(name8);
                    sector[base + 8..base + 11].copy_from_slice(ext3);
                    sector[base + 11] = match file_type {
                        FileType::Basic => 0,
                        FileType::Data => 1,
                        FileType::MachineCode => 2,
                        FileType::Unknown => 1,
                    };
                    sector[base + 12] = is_ascii as u8;
                    sector[base + 13] = first_granule;
                    sector[base + 14..base + 16].copy_from_slice(&last_sector_len.to_be_bytes());
                    return self.disk.write_sector(DIRECTORY_TRACK, 0, sector_num, &sector);
                }
            }
        }
        Err(DiskImageError::FilesystemFull)
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

    fn mark_all_free(disk: &mut Disk) {
        let mut map = vec![0xFFu8; 256];
        disk.write_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR, &map).unwrap();
        map = vec![0u8; 256];
        for s in DIRECTORY_FIRST_SECTOR..DIRECTORY_FIRST_SECTOR + DIRECTORY_SECTOR_COUNT {
            map[0] = END_OF_DIRECTORY;
            disk.write_sector(DIRECTORY_TRACK, 0, s, &map).unwrap();
        }
    }

    #[test]
    fn write_read_round_trip() {
        let mut disk = new_disk();
        mark_all_free(&mut disk);
        let mut fs = RsDosFileSystem::mount(&mut disk, false);
        let file = File {
            info: FileInfo {
                name: "HELLO.BAS".into(),
                size: 3,
                file_type: FileType::Basic,
                is_ascii: true,
                load_address: None,
                exec_address: None,
            },
            data: vec![1, 2, 3],
        };
        fs.write_file("HELLO.BAS", &file).unwrap();
        let back = fs.read_file("hello.bas").unwrap();
        assert_eq!(back.data, vec![1, 2, 3]);
        assert!(fs.check().is_ok());
    }

    #[test]
    fn filename_validation_matches_grammar() {
        let disk = &mut new_disk();
        let fs = RsDosFileSystem::mount(disk, false);
        assert!(fs.is_valid_filename("HELLO"));
        assert!(fs.is_valid_filename("HELLO.BAS"));
        assert!(!fs.is_valid_filename(".BAS"));
        assert!(!fs.is_valid_filename("TOOLONGNAME"));
    }

    #[test]
    fn free_counts_unallocated_granules() {
        let mut disk = new_disk();
        mark_all_free(&mut disk);
        let mut fs = RsDosFileSystem::mount(&mut disk, false);
        assert_eq!(fs.free().unwrap(), GRANULE_COUNT * GRANULE_BYTES);
    }

    #[test]
    fn check_detects_shared_granule() {
        let mut disk = new_disk();
        mark_all_free(&mut disk);
        {
            let mut map = disk.read_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR).unwrap();
            map[0] = TERMINAL_LOW;
            disk.write_sector(DIRECTORY_TRACK, 0, GRANULE_MAP_SECTOR, &map).unwrap();
            let mut dir = disk.read_sector(DIRECTORY_TRACK, 0, DIRECTORY_FIRST_SECTOR).unwrap();
            dir[0..8].copy_from_slice(b"A       ");
            dir[13] = 0;
            dir[32] = b'B';
            for i in 1..8 {
                dir[32 + i] = b' ';
            }
            dir[32 + 13] = 0; // both entries claim granule 0
            disk.write_sector(DIRECTORY_TRACK, 0, DIRECTORY_FIRST_SECTOR, &dir).unwrap();
        }
        let mut fs = RsDosFileSystem::mount(&mut disk, false);
        assert!(fs.check().is_err());
    }
}
