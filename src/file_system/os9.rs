/*
    dragonfox

    src/file_system/os9.rs

    OS-9 RBF: a disk descriptor in sector 0 (cluster size, total sector count, bitmap location,
    root directory's file descriptor LSN), file descriptors carrying attributes/owner/link
    count/size/date and a segment list, and directory files whose 32-byte entries pair a
    29-character name (high bit set on the final character) with a 3-byte FD sector LSN (§4.4.4).

    Read-only (DESIGN.md Open Question decision): OS-9's segment-allocation algorithm for writes
    is underspecified both here and upstream, so `write_file`/`delete_file`/`rename_file` return
    `DiskImageError::NotWriteable`. Only the root directory's entries are listed — the `FileSystem`
    trait models one flat namespace, matching every other filesystem in this crate, so nested
    subdirectories are not traversed.
*/
use log::{debug, trace};

use crate::disk_image::Disk;
use crate::file_system::{File, FileInfo, FileSystem, FileType};
use crate::DiskImageError;

const DESCRIPTOR_LSN: u32 = 0;
const DIR_ENTRY_SIZE: usize = 32;
const DIR_NAME_LEN: usize = 29;
const FD_HEADER_LEN: usize = 13;
const SEGMENT_SIZE: usize = 4;
const ATTR_DIRECTORY: u8 = 0x80;

struct DiskDescriptor {
    total_sectors: u32,
    cluster_size: u8,
    bitmap_lsn: u32,
    root_fd_lsn: u32,
}

impl DiskDescriptor {
    fn decode(bytes: &[u8]) -> Self {
        Self {
            total_sectors: read_lsn3(&bytes[0..3]),
            cluster_size: bytes[3],
            bitmap_lsn: read_lsn3(&bytes[4..7]),
            root_fd_lsn: read_lsn3(&bytes[7..10]),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; 10];
        write_lsn3(&mut out[0..3], self.total_sectors);
        out[3] = self.cluster_size;
        write_lsn3(&mut out[4..7], self.bitmap_lsn);
        write_lsn3(&mut out[7..10], self.root_fd_lsn);
        out
    }
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    lsn: u32,
    count: u8,
}

struct FileDescriptor {
    lsn: u32,
    is_directory: bool,
    file_size: u32,
    segments: Vec<Segment>,
}

impl FileDescriptor {
    fn decode(lsn: u32, bytes: &[u8]) -> Self {
        let attributes = bytes[0];
        let file_size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let mut segments = Vec::new();
        let mut off = FD_HEADER_LEN;
        while off + SEGMENT_SIZE <= bytes.len() {
            let seg_lsn = read_lsn3(&bytes[off..off + 3]);
            let count = bytes[off + 3];
            if seg_lsn == 0 && count == 0 {
                break;
            }
            segments.push(Segment { lsn: seg_lsn, count });
            off += SEGMENT_SIZE;
        }
        Self {
            lsn,
            is_directory: attributes & ATTR_DIRECTORY != 0,
            file_size,
            segments,
        }
    }
}

struct DirEntry {
    name: String,
    fd_lsn: u32,
}

pub struct Os9FileSystem<'a> {
    disk: &'a mut Disk,
}

impl<'a> Os9FileSystem<'a> {
    pub fn mount(disk: &'a mut Disk) -> Self {
        Self { disk }
    }

    fn lsn_to_chs(&self, lsn: u32) -> (u16, u8, u8) {
        let geom = self.disk.geometry();
        let spt = geom.sectors_per_track as u32;
        let heads = geom.heads as u32;
        let track = lsn / (spt * heads);
        let rem = lsn % (spt * heads);
        let head = (rem / spt) as u8;
        let sector = (rem % spt + 1) as u8;
        (track as u16, head, sector)
    }

    fn read_lsn(&mut self, lsn: u32) -> Result<Vec<u8>, DiskImageError> {
        let (track, head, sector) = self.lsn_to_chs(lsn);
        self.disk.read_sector(track, head, sector)
    }

    fn read_descriptor(&mut self) -> Result<DiskDescriptor, DiskImageError> {
        Ok(DiskDescriptor::decode(&self.read_lsn(DESCRIPTOR_LSN)?))
    }

    fn read_fd(&mut self, lsn: u32) -> Result<FileDescriptor, DiskImageError> {
        Ok(FileDescriptor::decode(lsn, &self.read_lsn(lsn)?))
    }

    fn read_fd_data(&mut self, fd: &FileDescriptor) -> Result<Vec<u8>, DiskImageError> {
        let geom = self.disk.geometry();
        let mut data = Vec::with_capacity(fd.file_size as usize);
        for seg in &fd.segments {
            for i in 0..seg.count as u32 {
                let bytes = self.read_lsn(seg.lsn + i)?;
                data.extend_from_slice(&bytes);
            }
        }
        data.truncate(fd.file_size as usize);
        trace!("OS-9 FD {:#x}: {} bytes across {} segments, sector size {}", fd.lsn, data.len(), fd.segments.len(), geom.sector_size);
        Ok(data)
    }

    fn read_root_entries(&mut self) -> Result<Vec<DirEntry>, DiskImageError> {
        let descriptor = self.read_descriptor()?;
        let root_fd = self.read_fd(descriptor.root_fd_lsn)?;
        let raw = self.read_fd_data(&root_fd)?;
        self.decode_entries(&raw)
    }

    fn find_entry(&mut self, name: &str) -> Result<DirEntry, DiskImageError> {
        self.read_root_entries()?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DiskImageError::FileNotFound(name.to_string()))
    }
}

impl<'a> FileSystem for Os9FileSystem<'a> {
    fn list_files(&mut self) -> Result<Vec<String>, DiskImageError> {
        let mut names = Vec::new();
        for entry in self.read_root_entries()? {
            let fd = self.read_fd(entry.fd_lsn)?;
            if !fd.is_directory {
                names.push(entry.name);
            }
        }
        Ok(names)
    }

    fn file_exists(&mut self, name: &str) -> Result<bool, DiskImageError> {
        Ok(self.find_entry(name).is_ok())
    }

    fn read_file(&mut self, name: &str) -> Result<File, DiskImageError> {
        let entry = self.find_entry(name)?;
        let fd = self.read_fd(entry.fd_lsn)?;
        if fd.is_directory {
            return Err(DiskImageError::FormatError(format!("{name}: is a directory")));
        }
        let data = self.read_fd_data(&fd)?;
        debug!("OS-9 read_file {name}: {} bytes", data.len());
        Ok(File {
            info: FileInfo {
                name: entry.name,
                size: data.len(),
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data,
        })
    }

    fn write_file(&mut self, _name: &str, _file: &File) -> Result<(), DiskImageError> {
        Err(DiskImageError::NotWriteable)
    }

    fn delete_file(&mut self, _name: &str) -> Result<(), DiskImageError> {
        Err(DiskImageError::NotWriteable)
    }

    fn rename_file(&mut self, _old: &str, _new: &str) -> Result<(), DiskImageError> {
        Err(DiskImageError::NotWriteable)
    }

    fn free(&mut self) -> Result<usize, DiskImageError> {
        let descriptor = self.read_descriptor()?;
        let total_clusters = (descriptor.total_sectors as usize).div_ceil(descriptor.cluster_size.max(1) as usize);
        let bitmap_bytes = total_clusters.div_ceil(8);
        let sector_size = self.disk.geometry().sector_size as usize;
        let sectors_needed = bitmap_bytes.div_ceil(sector_size);
        let mut bitmap = Vec::with_capacity(bitmap_bytes);
        for i in 0..sectors_needed {
            bitmap.extend_from_slice(&self.read_lsn(descriptor.bitmap_lsn + i as u32)?);
        }
        let mut free_clusters = 0usize;
        for cluster in 0..total_clusters {
            if !get_bit(&bitmap, cluster) {
                free_clusters += 1;
            }
        }
        Ok(free_clusters * descriptor.cluster_size as usize * sector_size)
    }

    fn is_valid_filename(&self, name: &str) -> bool {
        !name.is_empty() && name.len() <= DIR_NAME_LEN && !name.contains('/') && name.bytes().all(|b| b < 0x80)
    }

    /// Walks every root-directory file's segment list, flagging any LSN claimed by more than one
    /// file (directories and their own FD/segment sectors are exempt — only data files are
    /// cross-checked, since subdirectories are not traversed).
    fn check(&mut self) -> Result<(), DiskImageError> {
        let entries = self.read_root_entries()?;
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            let fd = self.read_fd(entry.fd_lsn)?;
            if fd.is_directory {
                continue;
            }
            for seg in &fd.segments {
                for i in 0..seg.count as u32 {
                    if !seen.insert(seg.lsn + i) {
                        return Err(DiskImageError::ConsistencyError(format!(
                            "{}: LSN {} claimed by more than one file",
                            entry.name,
                            seg.lsn + i
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
        let geom = self.disk.geometry();
        let lsn = (track as u32 * geom.heads as u32 + head as u32) * geom.sectors_per_track as u32 + sector as u32 - 1;
        let descriptor = self.read_descriptor()?;
        let entries = self.read_root_entries()?;
        for entry in &entries {
            let fd = self.read_fd(entry.fd_lsn)?;
            if fd.is_directory {
                continue;
            }
            for seg in &fd.segments {
                if lsn >= seg.lsn && lsn < seg.lsn + seg.count as u32 {
                    return Ok(true);
                }
            }
        }
        Ok(lsn == DESCRIPTOR_LSN || lsn == descriptor.bitmap_lsn || lsn == descriptor.root_fd_lsn)
    }
}

impl<'a> Os9FileSystem<'a> {
    fn decode_entries(&self, raw: &[u8]) -> Result<Vec<DirEntry>, DiskImageError> {
        let mut entries = Vec::new();
        for chunk in raw.chunks(DIR_ENTRY_SIZE) {
            if chunk.len() < DIR_ENTRY_SIZE || chunk[0] == 0x00 {
                continue;
            }
            let mut name = String::new();
            for &b in &chunk[0..DIR_NAME_LEN] {
                if b == 0 {
                    break;
                }
                name.push((b & 0x7F) as char);
                if b & 0x80 != 0 {
                    break;
                }
            }
            let fd_lsn = read_lsn3(&chunk[DIR_NAME_LEN..DIR_NAME_LEN + 3]);
            entries.push(DirEntry { name, fd_lsn });
        }
        Ok(entries)
    }

    /// Build a fresh, empty OS-9 filesystem: disk descriptor, an empty root directory FD with
    /// one segment holding its (empty) directory data, and a bitmap marking the descriptor,
    /// bitmap, and root-FD clusters as used.
    pub fn format(disk: &'a mut Disk) -> Result<(), DiskImageError> {
        let geom = disk.geometry();
        let cluster_size: u8 = 1;
        let total_sectors = geom.sector_count() as u32;
        let bitmap_lsn = 1u32;
        let root_fd_lsn = 2u32;
        let root_data_lsn = 3u32;

        let descriptor = DiskDescriptor {
            total_sectors,
            cluster_size,
            bitmap_lsn,
            root_fd_lsn,
        };
        let mut sector0 = vec![0u8; geom.sector_size as usize];
        let enc = descriptor.encode();
        sector0[0..enc.len()].copy_from_slice(&enc);
        let (t, h, s) = chs_for_lsn(&geom, DESCRIPTOR_LSN);
        disk.write_sector(t, h, s, &sector0)?;

        let total_clusters = (total_sectors as usize).div_ceil(cluster_size as usize);
        let mut bitmap = vec![0u8; total_clusters.div_ceil(8).max(1)];
        for cluster in [DESCRIPTOR_LSN, bitmap_lsn, root_fd_lsn, root_data_lsn] {
            set_bit(&mut bitmap, cluster as usize, true);
        }
        let (t, h, s) = chs_for_lsn(&geom, bitmap_lsn);
        let mut bitmap_sector = vec![0u8; geom.sector_size as usize];
        bitmap_sector[0..bitmap.len()].copy_from_slice(&bitmap);
        disk.write_sector(t, h, s, &bitmap_sector)?;

        let mut fd = vec![0u8; FD_HEADER_LEN + SEGMENT_SIZE];
        fd[0] = ATTR_DIRECTORY;
        fd[4..8].copy_from_slice(&0u32.to_be_bytes());
        write_lsn3(&mut fd[FD_HEADER_LEN..FD_HEADER_LEN + 3], root_data_lsn);
        fd[FD_HEADER_LEN + 3] = 1;
        let mut fd_sector = vec![0u8; geom.sector_size as usize];
        fd_sector[0..fd.len()].copy_from_slice(&fd);
        let (t, h, s) = chs_for_lsn(&geom, root_fd_lsn);
        disk.write_sector(t, h, s, &fd_sector)?;

        let empty_dir = vec![0u8; geom.sector_size as usize];
        let (t, h, s) = chs_for_lsn(&geom, root_data_lsn);
        disk.write_sector(t, h, s, &empty_dir)?;
        Ok(())
    }
}

fn chs_for_lsn(geom: &crate::ChsGeometry, lsn: u32) -> (u16, u8, u8) {
    let spt = geom.sectors_per_track as u32;
    let heads = geom.heads as u32;
    let track = lsn / (spt * heads);
    let rem = lsn % (spt * heads);
    let head = (rem / spt) as u8;
    let sector = (rem % spt + 1) as u8;
    (track as u16, head, sector)
}

fn read_lsn3(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

fn write_lsn3(out: &mut [u8], value: u32) {
    out[0] = (value >> 16) as u8;
    out[1] = (value >> 8) as u8;
    out[2] = value as u8;
}

fn get_bit(bytes: &[u8], index: usize) -> bool {
    let byte = index / 8;
    let bit = index % 8;
    byte < bytes.len() && bytes[byte] & (0x80 >> bit) != 0
}

fn set_bit(bytes: &mut [u8], index: usize, value: bool) {
    let byte = index / 8;
    let bit = index % 8;
    if byte >= bytes.len() {
        return;
    }
    if value {
        bytes[byte] |= 0x80 >> bit;
    } else {
        bytes[byte] &= !(0x80 >> bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_image::MemoryDisk;
    use crate::ChsGeometry;

    fn new_disk() -> Disk {
        Disk::Memory(MemoryDisk::new(ChsGeometry::new(1, 35, 18, 256)))
    }

    #[test]
    fn fresh_disk_lists_no_files() {
        let mut disk = new_disk();
        Os9FileSystem::format(&mut disk).unwrap();
        let mut fs = Os9FileSystem::mount(&mut disk);
        assert!(fs.list_files().unwrap().is_empty());
        assert!(fs.check().is_ok());
    }

    #[test]
    fn fresh_disk_reports_free_space() {
        let mut disk = new_disk();
        Os9FileSystem::format(&mut disk).unwrap();
        let mut fs = Os9FileSystem::mount(&mut disk);
        let free = fs.free().unwrap();
        assert!(free > 0);
        assert!(free < 35 * 18 * 256);
    }

    #[test]
    fn write_is_rejected() {
        let mut disk = new_disk();
        Os9FileSystem::format(&mut disk).unwrap();
        let mut fs = Os9FileSystem::mount(&mut disk);
        let file = File {
            info: FileInfo {
                name: "X".into(),
                size: 0,
                file_type: FileType::Data,
                is_ascii: false,
                load_address: None,
                exec_address: None,
            },
            data: vec![],
        };
        assert!(matches!(fs.write_file("X", &file), Err(DiskImageError::NotWriteable)));
    }
}
