/*
    dragonfox

    src/image_parsers/jvc.rs

    JVC: a flat image with an optional 0-5 byte header (§4.3). No magic; detected by extension
    and, when present, a plausible header. Geometry defaults to 18 sectors/track, 256 bytes/
    sector, 1 side when no header is present, inferring track count from file length.
*/
use log::debug;

use crate::{Chs, ChsGeometry, DiskImageError};

const DEFAULT_SECTORS_PER_TRACK: u8 = 18;
const DEFAULT_SECTOR_SIZE: u16 = 256;

#[derive(Copy, Clone, Debug)]
struct JvcHeader {
    sectors_per_track: u8,
    sides: u8,
    sector_size: u16,
    first_sector_id: u8,
    sector_attribute_flag: bool,
}

impl Default for JvcHeader {
    fn default() -> Self {
        Self {
            sectors_per_track: DEFAULT_SECTORS_PER_TRACK,
            sides: 1,
            sector_size: DEFAULT_SECTOR_SIZE,
            first_sector_id: 1,
            sector_attribute_flag: false,
        }
    }
}

fn parse_header(bytes: &[u8]) -> JvcHeader {
    let mut h = JvcHeader::default();
    if !bytes.is_empty() {
        h.sectors_per_track = bytes[0];
    }
    if bytes.len() > 1 {
        h.sides = bytes[1];
    }
    if bytes.len() > 2 {
        h.sector_size = 128u16.wrapping_shl(bytes[2] as u32);
    }
    if bytes.len() > 3 {
        h.first_sector_id = bytes[3];
    }
    if bytes.len() > 4 {
        h.sector_attribute_flag = bytes[4] != 0;
    }
    h
}

pub struct JvcDisk {
    data: Vec<u8>,
    header_len: usize,
    header: JvcHeader,
    geometry: ChsGeometry,
    writable: bool,
}

impl JvcDisk {
    /// Open a JVC image. `header_len` is 0-5 (detected by the caller from file length modulo
    /// track size, per the format's own ambiguity - a 0-length header is legal).
    pub fn open(data: Vec<u8>, header_len: usize, writable: bool) -> Result<Self, DiskImageError> {
        if header_len > 5 || header_len > data.len() {
            return Err(DiskImageError::FormatError(format!(
                "invalid JVC header length {header_len}"
            )));
        }
        let header = parse_header(&data[..header_len]);
        let body_len = data.len() - header_len;
        let track_bytes = header.sectors_per_track as usize
            * header.sides as usize
            * header.sector_size as usize;
        if track_bytes == 0 {
            return Err(DiskImageError::FormatError("JVC geometry implies zero-byte track".into()));
        }
        let tracks = (body_len / track_bytes).max(1) as u16;
        debug!(
            "JVC geometry: heads={} tracks={tracks} sectors_per_track={} sector_size={}",
            header.sides, header.sectors_per_track, header.sector_size
        );
        Ok(Self {
            data,
            header_len,
            header,
            geometry: ChsGeometry::new(header.sides, tracks, header.sectors_per_track, header.sector_size),
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
        let first = self.header.first_sector_id;
        if sector < first {
            return None;
        }
        let lba = self.geometry.to_lba(track, head, sector - first + 1)?;
        Some(self.header_len + lba * self.geometry.sector_size as usize)
    }

    pub fn sector_exists(&self, track: u16, head: u8, sector: u8) -> bool {
        self.offset(track, head, sector).is_some()
    }

    pub fn read_sector(&mut self, track: u16, head: u8, sector: u8) -> Result<Vec<u8>, DiskImageError> {
        let offset = self
            .offset(track, head, sector)
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, self.geometry.sector_size)))?;
        let size = self.geometry.sector_size as usize;
        self.data
            .get(offset..offset + size)
            .map(|s| s.to_vec())
            .ok_or(DiskImageError::EndOfStream)
    }

    pub fn write_sector(&mut self, track: u16, head: u8, sector: u8, bytes: &[u8]) -> Result<(), DiskImageError> {
        let offset = self
            .offset(track, head, sector)
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, self.geometry.sector_size)))?;
        let size = self.geometry.sector_size as usize;
        if bytes.len() != size {
            return Err(DiskImageError::FormatError(format!(
                "write_sector expected {size} bytes, got {}",
                bytes.len()
            )));
        }
        self.data[offset..offset + size].copy_from_slice(bytes);
        Ok(())
    }

    pub fn dispose(&mut self) -> Result<(), DiskImageError> {
        Ok(())
    }

    pub fn sector_attribute_flag(&self) -> bool {
        self.header.sector_attribute_flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_headerless_image(tracks: u16) -> Vec<u8> {
        vec![0u8; tracks as usize * DEFAULT_SECTORS_PER_TRACK as usize * DEFAULT_SECTOR_SIZE as usize]
    }

    #[test]
    fn headerless_geometry_inferred_from_length() {
        let data = build_headerless_image(35);
        let disk = JvcDisk::open(data, 0, false).unwrap();
        let geom = disk.geometry();
        assert_eq!(geom.heads, 1);
        assert_eq!(geom.tracks, 35);
        assert_eq!(geom.sectors_per_track, 18);
        assert_eq!(geom.sector_size, 256);
    }

    #[test]
    fn header_overrides_defaults() {
        let mut data = vec![10u8, 2, 1, 1, 0]; // 10 spt, 2 sides, 256B, first id 1
        data.extend(vec![0u8; 10 * 2 * 256 * 3]);
        let disk = JvcDisk::open(data, 5, false).unwrap();
        let geom = disk.geometry();
        assert_eq!(geom.sectors_per_track, 10);
        assert_eq!(geom.heads, 2);
        assert_eq!(geom.tracks, 3);
    }

    #[test]
    fn read_write_round_trip() {
        let data = build_headerless_image(35);
        let mut disk = JvcDisk::open(data, 0, true).unwrap();
        disk.write_sector(3, 0, 5, &[0x42u8; 256]).unwrap();
        assert_eq!(disk.read_sector(3, 0, 5).unwrap(), vec![0x42u8; 256]);
    }
}
