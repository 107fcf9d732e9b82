/*
    dragonfox

    src/chs.rs

    Cylinder/Head/Sector addressing and disk geometry.
*/
use std::fmt;
use std::fmt::Display;

/// A CHS triple plus the sector's size. `size` is the size in bytes (128, 256, 512, or 1024 -
/// see §3 of the specification), not a size *code*; image codecs that encode a size code (DMK's
/// `size = 128 << size_code`) convert at their boundary.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Chs {
    track: u16,
    head: u8,
    sector: u8,
    size: u16,
}

impl Default for Chs {
    fn default() -> Self {
        Self {
            track: 0,
            head: 0,
            sector: 1,
            size: 256,
        }
    }
}

impl Display for Chs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[track:{} head:{} sector:{} size:{}]",
            self.track, self.head, self.sector, self.size
        )
    }
}

impl From<(u16, u8, u8)> for Chs {
    fn from((track, head, sector): (u16, u8, u8)) -> Self {
        Self {
            track,
            head,
            sector,
            size: 256,
        }
    }
}

impl From<(u16, u8, u8, u16)> for Chs {
    fn from((track, head, sector, size): (u16, u8, u8, u16)) -> Self {
        Self {
            track,
            head,
            sector,
            size,
        }
    }
}

impl Chs {
    pub fn new(track: u16, head: u8, sector: u8, size: u16) -> Self {
        Self {
            track,
            head,
            sector,
            size,
        }
    }

    pub fn track(&self) -> u16 {
        self.track
    }
    pub fn head(&self) -> u8 {
        self.head
    }
    pub fn sector(&self) -> u8 {
        self.sector
    }
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Return just the (track, head, sector) identity, ignoring size - this is what uniquely
    /// addresses a sector within a disk (§3 invariant).
    pub fn id(&self) -> (u16, u8, u8) {
        (self.track, self.head, self.sector)
    }

    /// Convert a DMK/HFE size code (0..=3 for 128/256/512/1024) to a byte size.
    pub fn size_code_to_bytes(code: u8) -> u16 {
        128u16.wrapping_shl(code as u32)
    }

    /// Convert a byte size to a DMK/HFE size code, rounding down to the nearest power of two
    /// step. Panics only on a size of 0, which never occurs for a real sector.
    pub fn bytes_to_size_code(mut size: u16) -> u8 {
        let mut code = 0u8;
        while size > 128 {
            size >>= 1;
            code += 1;
        }
        code
    }
}

/// Disk-wide geometry: number of heads (sides) and tracks (cylinders), plus the sectors-per-track
/// and default sector size assumed by formats that don't encode a per-track layout (JVC, VDK).
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct ChsGeometry {
    pub heads: u8,
    pub tracks: u16,
    pub sectors_per_track: u8,
    pub sector_size: u16,
}

impl ChsGeometry {
    pub fn new(heads: u8, tracks: u16, sectors_per_track: u8, sector_size: u16) -> Self {
        Self {
            heads,
            tracks,
            sectors_per_track,
            sector_size,
        }
    }

    /// Total number of sectors implied by this geometry (§8 invariant 3).
    pub fn sector_count(&self) -> usize {
        self.heads as usize * self.tracks as usize * self.sectors_per_track as usize
    }

    /// Convert a CHS identity to a linear sector index (head-major within a track, track-major
    /// overall), used by formats that store sectors in a flat, geometry-implied layout.
    pub fn to_lba(&self, track: u16, head: u8, sector: u8) -> Option<usize> {
        if track >= self.tracks || head >= self.heads || sector < 1 || sector > self.sectors_per_track {
            return None;
        }
        let spt = self.sectors_per_track as usize;
        let hpc = self.heads as usize;
        Some((track as usize * hpc + head as usize) * spt + (sector as usize - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chs_id_ignores_size() {
        let a = Chs::new(10, 1, 3, 256);
        let b = Chs::new(10, 1, 3, 512);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn size_code_round_trip() {
        for code in 0..4u8 {
            let bytes = Chs::size_code_to_bytes(code);
            assert_eq!(Chs::bytes_to_size_code(bytes), code);
        }
        assert_eq!(Chs::size_code_to_bytes(0), 128);
        assert_eq!(Chs::size_code_to_bytes(1), 256);
        assert_eq!(Chs::size_code_to_bytes(2), 512);
        assert_eq!(Chs::size_code_to_bytes(3), 1024);
    }

    #[test]
    fn geometry_sector_count() {
        let geom = ChsGeometry::new(2, 80, 18, 256);
        assert_eq!(geom.sector_count(), 2880);
    }

    #[test]
    fn geometry_to_lba() {
        let geom = ChsGeometry::new(2, 40, 18, 256);
        assert_eq!(geom.to_lba(0, 0, 1), Some(0));
        assert_eq!(geom.to_lba(0, 1, 1), Some(18));
        assert_eq!(geom.to_lba(1, 0, 1), Some(36));
        assert_eq!(geom.to_lba(0, 0, 19), None);
    }
}
