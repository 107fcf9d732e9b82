/*
    dragonfox

    src/image_parsers/hfe.rs

    HFE: a 512-byte header plus a track-list block of per-track `(offset, length)` pairs, each
    track stored as two sides interleaved at 256-byte granularity (§4.3, §6 "HFE header layout").

    HFE stores each track byte bit-reversed relative to the MFM bit order this crate's decoder
    expects (LSB-first on disk, MSB-first once decoded) - `REVERSE_TABLE` undoes that before the
    bytes reach `MfmDecoder`.
*/
use binrw::BinRead;
use log::{debug, trace};

use crate::bitstream::mfm::{MfmDecoder, MfmEncoder};
use crate::track::{deinterleave_hfe_side, encode_sector_record, interleave_hfe_sides, recover_sectors, RecoveredSector};
use crate::{Chs, ChsGeometry, DiskImageError};

const BLOCK_SIZE: usize = 512;

const fn generate_reverse_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }
    table
}

const REVERSE_TABLE: [u8; 256] = generate_reverse_table();

fn reverse_bits(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|&b| REVERSE_TABLE[b as usize]).collect()
}

#[derive(BinRead, Debug)]
#[br(little, magic = b"HXCPICFE")]
struct HfeFileHeader {
    revision: u8,
    tracks: u8,
    sides: u8,
    track_encoding: u8,
    bitrate: u16,
    rotation: u16,
    interface_mode: u8,
    _reserved0: u8,
    track_list_block: u16,
    write_protected: u8,
    single_step: u8,
    track0_side0_encoding: u8,
    track0_side1_encoding: u8,
}

#[derive(BinRead, Clone, Copy, Debug)]
#[br(little)]
struct HfeTrackIndexEntry {
    offset_blocks: u16,
    length_bytes: u16,
}

pub struct HfeDisk {
    data: Vec<u8>,
    header: HfeFileHeader,
    track_list: Vec<HfeTrackIndexEntry>,
    geometry: ChsGeometry,
    writable: bool,
}

impl HfeDisk {
    pub fn detect(data: &[u8]) -> bool {
        data.len() >= 8 && &data[0..8] == b"HXCPICFE"
    }

    pub fn open(data: Vec<u8>, writable: bool) -> Result<Self, DiskImageError> {
        let mut cursor = std::io::Cursor::new(&data);
        let header = HfeFileHeader::read(&mut cursor)?;

        let list_offset = header.track_list_block as usize * BLOCK_SIZE;
        let mut track_list = Vec::with_capacity(header.tracks as usize);
        let mut list_cursor = std::io::Cursor::new(&data[list_offset..]);
        for _ in 0..header.tracks {
            track_list.push(HfeTrackIndexEntry::read(&mut list_cursor)?);
        }

        debug!(
            "HFE geometry: heads={} tracks={} bitrate={}kbps",
            header.sides, header.tracks, header.bitrate
        );

        // HFE tracks carry no fixed sector count in the header; recover it by scanning track 0
        // side 0, same as the other bitstream format (DMK).
        let geometry_probe = decode_track_sectors(&data, &track_list, 0, 0);
        let spt = geometry_probe.len().max(1) as u8;
        let size = geometry_probe.first().map(|s| s.id.size()).unwrap_or(256);

        Ok(Self {
            geometry: ChsGeometry::new(header.sides, header.tracks as u16, spt, size),
            data,
            header,
            track_list,
            writable,
        })
    }

    pub fn geometry(&self) -> ChsGeometry {
        self.geometry
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    fn decode_track(&self, track: u16, head: u8) -> Vec<RecoveredSector> {
        decode_track_sectors(&self.data, &self.track_list, track, head)
    }

    pub fn sector_exists(&self, track: u16, head: u8, sector: u8) -> bool {
        self.decode_track(track, head).iter().any(|s| s.id.sector() == sector)
    }

    pub fn read_sector(&mut self, track: u16, head: u8, sector: u8) -> Result<Vec<u8>, DiskImageError> {
        self.decode_track(track, head)
            .into_iter()
            .find(|s| s.id.sector() == sector)
            .map(|s| s.data)
            .ok_or_else(|| DiskImageError::SectorNotFound(Chs::new(track, head, sector, self.geometry.sector_size)))
    }

    /// Rewrite one sector's payload by re-encoding its whole side of the track: decode every
    /// sector already on `(track, head)`, splice in the new payload, and re-run each through
    /// `encode_sector_record` with this crate's own gap convention (§4.3). The other side's raw
    /// bytes are carried over untouched rather than re-encoded, since a from-scratch re-encode of
    /// an unmodified side is not guaranteed to reproduce its original gap bytes bit-for-bit.
    pub fn write_sector(&mut self, track: u16, head: u8, sector: u8, bytes: &[u8]) -> Result<(), DiskImageError> {
        if !self.writable {
            return Err(DiskImageError::NotWriteable);
        }
        let id = Chs::new(track, head, sector, self.geometry.sector_size);
        let entry = *self
            .track_list
            .get(track as usize)
            .ok_or_else(|| DiskImageError::SectorNotFound(id))?;

        let mut sectors = self.decode_track(track, head);
        let target = sectors
            .iter_mut()
            .find(|s| s.id.sector() == sector)
            .ok_or_else(|| DiskImageError::SectorNotFound(id))?;
        target.data = bytes.to_vec();
        target.id_crc_ok = true;
        target.data_crc_ok = true;

        let mut enc = MfmEncoder::new(Vec::new());
        for s in &sectors {
            encode_sector_record(&mut enc, &s.id, &s.data, 0x4E, 8)?;
        }
        let new_side = reverse_bits(&enc.into_inner()?);

        let offset = entry.offset_blocks as usize * BLOCK_SIZE;
        let block_len = entry.length_bytes as usize;
        let original_block = self.data[offset..offset + block_len].to_vec();
        let other_side = deinterleave_hfe_side(&original_block, if head == 0 { 1 } else { 0 });

        let mut rebuilt = if head == 0 {
            interleave_hfe_sides(&new_side, &other_side)
        } else {
            interleave_hfe_sides(&other_side, &new_side)
        };
        if rebuilt.len() > block_len {
            return Err(DiskImageError::FormatError(format!(
                "re-encoded track {track} grew from {block_len} to {} bytes, would overrun the next track",
                rebuilt.len()
            )));
        }
        rebuilt.resize(block_len, 0);

        trace!("HFE rewrote track={track} head={head} sector={sector}, {} payload bytes", bytes.len());
        self.data[offset..offset + block_len].copy_from_slice(&rebuilt);
        Ok(())
    }

    pub fn dispose(&mut self) -> Result<(), DiskImageError> {
        Ok(())
    }

    pub fn write_protected(&self) -> bool {
        self.header.write_protected != 0
    }
}

fn decode_track_sectors(
    data: &[u8],
    track_list: &[HfeTrackIndexEntry],
    track: u16,
    head: u8,
) -> Vec<RecoveredSector> {
    let Some(entry) = track_list.get(track as usize) else {
        return Vec::new();
    };
    let offset = entry.offset_blocks as usize * BLOCK_SIZE;
    let Some(block) = data.get(offset..offset + entry.length_bytes as usize) else {
        return Vec::new();
    };
    let side_bytes = deinterleave_hfe_side(block, head);
    let decoded = reverse_bits(&side_bytes);
    let mut dec = MfmDecoder::new(&decoded);
    recover_sectors(&mut dec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::mfm::MfmEncoder;
    use crate::track::encode_sector_record;

    #[test]
    fn reverse_table_is_involutive() {
        for b in 0u8..=255 {
            assert_eq!(REVERSE_TABLE[REVERSE_TABLE[b as usize] as usize], b);
        }
        assert_eq!(REVERSE_TABLE[0x01], 0x80);
        assert_eq!(REVERSE_TABLE[0xFF], 0xFF);
    }

    fn encode_hfe_side(sector_count: u8) -> Vec<u8> {
        let mut enc = MfmEncoder::new(Vec::new());
        for s in 1..=sector_count {
            let id = Chs::new(0, 0, s, 256);
            encode_sector_record(&mut enc, &id, &vec![s; 256], 0x4E, 8).unwrap();
        }
        let decoded = enc.into_inner().unwrap();
        reverse_bits(&decoded)
    }

    fn build_image(sector_count: u8) -> Vec<u8> {
        let side0 = encode_hfe_side(sector_count);
        let side1 = vec![0u8; side0.len()];

        let mut track_block = interleave_hfe_sides(&side0, &side1);
        track_block.resize((track_block.len() + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE, 0);

        let mut header = vec![0u8; BLOCK_SIZE];
        header[0..8].copy_from_slice(b"HXCPICFE");
        header[8] = 0; // revision
        header[9] = 1; // tracks
        header[10] = 2; // sides
        header[11] = 0; // track_encoding
        header[12..14].copy_from_slice(&250u16.to_le_bytes()); // bitrate
        header[14..16].copy_from_slice(&300u16.to_le_bytes()); // rotation
        header[16] = 0; // interface_mode
        header[17] = 0; // reserved
        header[18..20].copy_from_slice(&1u16.to_le_bytes()); // track_list_block = 1 (block after header)
        header[20] = 0; // write_protected
        header[21] = 0; // single_step
        header[22] = 0;
        header[23] = 0;

        let mut track_list_block = vec![0u8; BLOCK_SIZE];
        track_list_block[0..2].copy_from_slice(&2u16.to_le_bytes()); // track data starts at block 2
        track_list_block[2..4].copy_from_slice(&(track_block.len() as u16).to_le_bytes());

        let mut data = header;
        data.extend(track_list_block);
        data.extend(track_block);
        data
    }

    #[test]
    fn recovers_sectors_from_side0() {
        let data = build_image(4);
        assert!(HfeDisk::detect(&data));
        let mut disk = HfeDisk::open(data, false).unwrap();
        for s in 1..=4u8 {
            let payload = disk.read_sector(0, 0, s).unwrap();
            assert_eq!(payload, vec![s; 256]);
        }
    }

    #[test]
    fn write_sector_rewrites_payload_without_disturbing_siblings() {
        let data = build_image(4);
        let mut disk = HfeDisk::open(data, true).unwrap();
        disk.write_sector(0, 0, 2, &vec![0xCCu8; 256]).unwrap();
        assert_eq!(disk.read_sector(0, 0, 2).unwrap(), vec![0xCCu8; 256]);
        for &s in &[1u8, 3, 4] {
            assert_eq!(disk.read_sector(0, 0, s).unwrap(), vec![s; 256]);
        }
    }

    #[test]
    fn write_sector_rejects_read_only_handle() {
        let data = build_image(2);
        let mut disk = HfeDisk::open(data, false).unwrap();
        let err = disk.write_sector(0, 0, 1, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, DiskImageError::NotWriteable));
    }
}
