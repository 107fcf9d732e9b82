/*
    dragonfox

    src/image_parsers/vdk.rs

    VDK: a 12-byte header (magic `"dk"`, tracks/sides, compression flag) followed by raw
    256-byte sectors in head-major order (§4.3, §6 "VDK header layout").
*/
use binrw::BinRead;
use log::debug;

use crate::{Chs, ChsGeometry, DiskImageError};

const SECTORS_PER_TRACK: u8 = 18;
const SECTOR_SIZE: u16 = 256;

#[derive(BinRead, Debug)]
#[br(little, magic = b"dk")]
struct VdkHeader {
    version: u8,
    source_version: u8,
    source_id: u8,
    flags: u8,
    #[br(pad_before = 2)]
    header_len: u8,
    tracks: u8,
    sides: u8,
    compression: u8,
}

pub struct VdkDisk {
    data: Vec<u8>,
    header_len: usize,
    geometry: ChsGeometry,
    writable: bool,
}

impl VdkDisk {
    pub fn detect(data: &[u8]) -> bool {
        data.len() >= 12 && &data[0..2] == b"dk" && data[11] == 0
    }

    pub fn open(data: Vec<u8>, writable: bool) -> Result<Self, DiskImageError> {
        let mut cursor = std::io::Cursor::new(&data);
        let header = VdkHeader::read(&mut cursor)?;
        if header.compression != 0 {
            return Err(DiskImageError::FormatError(
                "VDK compression flag must be 0 (unsupported)".into(),
            ));
        }
        let header_len = header.header_len as usize;
        if header_len > data.len() {
            return Err(DiskImageError::FormatError("VDK header length exceeds file size".into()));
        }
        debug!("VDK geometry: heads={} tracks={}", header.sides, header.tracks);
        Ok(Self {
            data,
            header_len,
            geometry: ChsGeometry::new(header.sides, header.tracks as u16, SECTORS_PER_TRACK, SECTOR_SIZE),
            writable,
        })
    }

    pub fn geometry(&self) -> ChsGeometry {
        self.geometry
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    fn offset(&self, track: u16, head: u8, sector: u8) -> Option<usize> {
        let lba = self.geometry.to_lba(track, head, sector)?;
        Some(self.header_len + lba * SECTOR_SIZE as usize)
    }

    pub fn sector_exists(&self, track: u16, head: u8, sector: u8) -> bool {
        self.offset(track, head, sector).is_some()
    }

    pub fn read_sector(&mut self, track: u16, head: u8, sector: u8) -> Result<Vec<u8>, DiskImageError> {
        let offset = self
            .offset(track, head, sector)
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, SECTOR_SIZE)))?;
        self.data
            .get(offset..offset + SECTOR_SIZE as usize)
            .map(|s| s.to_vec())
            .ok_or(DiskImageError::EndOfStream)
    }

    pub fn write_sector(&mut self, track: u16, head: u8, sector: u8, bytes: &[u8]) -> Result<(), DiskImageError> {
        let offset = self
            .offset(track, head, sector)
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, SECTOR_SIZE)))?;
        if bytes.len() != SECTOR_SIZE as usize {
            return Err(DiskImageError::FormatError(format!(
                "write_sector expected {SECTOR_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        self.data[offset..offset + SECTOR_SIZE as usize].copy_from_slice(bytes);
        Ok(())
    }

    pub fn dispose(&mut self) -> Result<(), DiskImageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_image(tracks: u8, sides: u8) -> Vec<u8> {
        // magic, version, source_version, source_id, flags, pad(2), header_len, tracks, sides, compression
        let mut data = vec![b'd', b'k', 0, 0, 0, 0, 0, 0, 12, tracks, sides, 0];
        data.extend(vec![0u8; tracks as usize * sides as usize * SECTORS_PER_TRACK as usize * SECTOR_SIZE as usize]);
        data
    }

    /// S7: opening a 2-side 80-track VDK image reports heads=2 tracks=80 and 2880 unique CHS.
    #[test]
    fn geometry_matches_worked_example() {
        let data = build_image(80, 2);
        assert!(VdkDisk::detect(&data));
        let disk = VdkDisk::open(data, false).unwrap();
        let geom = disk.geometry();
        assert_eq!(geom.heads, 2);
        assert_eq!(geom.tracks, 80);
        assert_eq!(geom.sector_count(), 2880);
    }

    #[test]
    fn rejects_compressed_images() {
        let mut data = build_image(40, 1);
        data[11] = 1;
        assert!(!VdkDisk::detect(&data));
    }

    #[test]
    fn read_write_round_trip() {
        let data = build_image(40, 1);
        let mut disk = VdkDisk::open(data, true).unwrap();
        disk.write_sector(5, 0, 9, &[0x77u8; 256]).unwrap();
        assert_eq!(disk.read_sector(5, 0, 9).unwrap(), vec![0x77u8; 256]);
    }
}
