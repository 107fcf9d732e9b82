/*
    dragonfox

    src/disk_image.rs

    The disk abstraction every image codec and filesystem is built on: a sum type over the four
    concrete encodings plus an in-memory variant, sharing one sector-addressable interface
    (Design Note "Polymorphism over image formats", §3 "Disk").
*/
use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::image_parsers::{dmk::DmkDisk, hfe::HfeDisk, jvc::JvcDisk, vdk::VdkDisk};
use crate::{Chs, ChsGeometry, DiskImageError};

/// Disk-wide geometry, shared by every variant.
pub type DiskGeometry = ChsGeometry;

/// A disk image, dispatched over its concrete on-host encoding. Every variant shares the same
/// sector-addressable operations; callers never need to match on the variant themselves except
/// to pick which codec opened it.
pub enum Disk {
    Jvc(JvcDisk),
    Vdk(VdkDisk),
    Dmk(DmkDisk),
    Hfe(HfeDisk),
    Memory(MemoryDisk),
}

impl Disk {
    pub fn geometry(&self) -> DiskGeometry {
        match self {
            Disk::Jvc(d) => d.geometry(),
            Disk::Vdk(d) => d.geometry(),
            Disk::Dmk(d) => d.geometry(),
            Disk::Hfe(d) => d.geometry(),
            Disk::Memory(d) => d.geometry(),
        }
    }

    pub fn writable(&self) -> bool {
        match self {
            Disk::Jvc(d) => d.writable(),
            Disk::Vdk(d) => d.writable(),
            Disk::Dmk(d) => d.writable(),
            Disk::Hfe(d) => d.writable(),
            Disk::Memory(_) => true,
        }
    }

    pub fn sector_exists(&self, track: u16, head: u8, sector: u8) -> bool {
        match self {
            Disk::Jvc(d) => d.sector_exists(track, head, sector),
            Disk::Vdk(d) => d.sector_exists(track, head, sector),
            Disk::Dmk(d) => d.sector_exists(track, head, sector),
            Disk::Hfe(d) => d.sector_exists(track, head, sector),
            Disk::Memory(d) => d.sector_exists(track, head, sector),
        }
    }

    pub fn read_sector(&mut self, track: u16, head: u8, sector: u8) -> Result<Vec<u8>, DiskImageError> {
        trace!("read_sector track={track} head={head} sector={sector}");
        match self {
            Disk::Jvc(d) => d.read_sector(track, head, sector),
            Disk::Vdk(d) => d.read_sector(track, head, sector),
            Disk::Dmk(d) => d.read_sector(track, head, sector),
            Disk::Hfe(d) => d.read_sector(track, head, sector),
            Disk::Memory(d) => d.read_sector(track, head, sector),
        }
    }

    pub fn write_sector(
        &mut self,
        track: u16,
        head: u8,
        sector: u8,
        data: &[u8],
    ) -> Result<(), DiskImageError> {
        if !self.writable() {
            warn!("write_sector rejected: disk opened read-only");
            return Err(DiskImageError::NotWriteable);
        }
        if !self.sector_exists(track, head, sector) {
            return Err(DiskImageError::SectorNotFound(Chs::new(
                track,
                head,
                sector,
                data.len() as u16,
            )));
        }
        debug!("write_sector track={track} head={head} sector={sector} len={}", data.len());
        match self {
            Disk::Jvc(d) => d.write_sector(track, head, sector, data),
            Disk::Vdk(d) => d.write_sector(track, head, sector, data),
            Disk::Dmk(d) => d.write_sector(track, head, sector, data),
            Disk::Hfe(d) => d.write_sector(track, head, sector, data),
            Disk::Memory(d) => d.write_sector(track, head, sector, data),
        }
    }

    /// Lazily iterate every CHS position on the disk in `(track, head, sector)` order (Design
    /// Note "Iteration" - single-pass, non-restartable, never materializes the whole image).
    pub fn iter_chs(&self) -> impl Iterator<Item = Chs> + '_ {
        let geom = self.geometry();
        (0..geom.tracks).flat_map(move |track| {
            (0..geom.heads).flat_map(move |head| {
                (1..=geom.sectors_per_track).map(move |sector| {
                    Chs::new(track, head, sector, geom.sector_size)
                })
            })
        })
    }

    /// Flush any image-level metadata (HFE track list, DMK IDAM offsets) and release the
    /// underlying byte sink. Idempotent - a disposed handle may be disposed again as a no-op.
    pub fn dispose(&mut self) -> Result<(), DiskImageError> {
        debug!("dispose");
        match self {
            Disk::Jvc(d) => d.dispose(),
            Disk::Vdk(d) => d.dispose(),
            Disk::Dmk(d) => d.dispose(),
            Disk::Hfe(d) => d.dispose(),
            Disk::Memory(_) => Ok(()),
        }
    }
}

/// An in-memory disk: geometry plus a sparse sector table, no backing file (§10.5). Used by
/// tests and by callers assembling a fresh image before choosing a format to serialize it to.
pub struct MemoryDisk {
    geometry: DiskGeometry,
    sectors: BTreeMap<(u16, u8, u8), Vec<u8>>,
}

impl MemoryDisk {
    pub fn new(geometry: DiskGeometry) -> Self {
        let mut sectors = BTreeMap::new();
        for track in 0..geometry.tracks {
            for head in 0..geometry.heads {
                for sector in 1..=geometry.sectors_per_track {
                    sectors.insert(
                        (track, head, sector),
                        vec![0u8; geometry.sector_size as usize],
                    );
                }
            }
        }
        Self { geometry, sectors }
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    pub fn sector_exists(&self, track: u16, head: u8, sector: u8) -> bool {
        self.sectors.contains_key(&(track, head, sector))
    }

    pub fn read_sector(&mut self, track: u16, head: u8, sector: u8) -> Result<Vec<u8>, DiskImageError> {
        self.sectors
            .get(&(track, head, sector))
            .cloned()
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, self.geometry.sector_size)))
    }

    pub fn write_sector(
        &mut self,
        track: u16,
        head: u8,
        sector: u8,
        data: &[u8],
    ) -> Result<(), DiskImageError> {
        let slot = self
            .sectors
            .get_mut(&(track, head, sector))
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, self.geometry.sector_size)))?;
        slot.clear();
        slot.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_disk_round_trips_writes() {
        let geom = DiskGeometry::new(1, 35, 18, 256);
        let mut disk = Disk::Memory(MemoryDisk::new(geom));
        disk.write_sector(10, 0, 5, &[0xAAu8; 256]).unwrap();
        assert_eq!(disk.read_sector(10, 0, 5).unwrap(), vec![0xAAu8; 256]);
    }

    /// §8 invariant 3 & 4: sector_count and iteration agree, each CHS appears exactly once.
    #[test]
    fn iteration_covers_every_chs_once() {
        let geom = DiskGeometry::new(2, 35, 18, 256);
        let disk = Disk::Memory(MemoryDisk::new(geom));
        let all: Vec<_> = disk.iter_chs().collect();
        assert_eq!(all.len(), geom.sector_count());
        let unique: std::collections::HashSet<_> = all.iter().map(|c| c.id()).collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn write_to_missing_sector_fails() {
        let geom = DiskGeometry::new(1, 35, 18, 256);
        let mut disk = Disk::Memory(MemoryDisk::new(geom));
        let err = disk.write_sector(99, 0, 1, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, DiskImageError::SectorNotFound(_)));
    }
}
