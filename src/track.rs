/*
    dragonfox

    src/track.rs

    The sector/track model shared by every image codec, and the IDAM/DAM scanner used by the
    bitstream-based formats (HFE, DMK) to recover a track's sector list from its raw MFM stream
    (§3 "Track (HFE/DMK)", §4.3).
*/
use crate::bitstream::mfm::MfmDecoder;
use crate::crc::Crc16Ccitt;
use crate::{Chs, DiskImageError};

const IDAM_MARK: u8 = 0xFE;
const DAM_MARK: u8 = 0xFB;

/// A sector recovered from a raw encoded track: its identity, payload, and whether the ID and
/// data CRCs validated. A CRC-bad sector is still returned with its payload - §7's propagation
/// policy never silently substitutes or drops it.
#[derive(Clone, Debug)]
pub struct RecoveredSector {
    pub id: Chs,
    pub data: Vec<u8>,
    pub id_crc_ok: bool,
    pub data_crc_ok: bool,
}

/// Scan a decoded MFM bitstream for `(gap, A1×3, IDAM, CHRN, CRC, gap, A1×3, DAM, data, CRC,
/// gap)*` records, returning every complete sector found. Gap bytes and unrecognised marks are
/// skipped; a truncated final record at end-of-track is dropped rather than erroring, since real
/// tracks often end mid-gap.
pub fn recover_sectors(dec: &mut MfmDecoder) -> Vec<RecoveredSector> {
    let mut sectors = Vec::new();
    let mut pending: Option<(Chs, bool)> = None; // (id, id_crc_ok) awaiting its DAM

    loop {
        let Some((_byte, is_sync)) = dec.read_byte() else {
            break;
        };
        if !is_sync {
            continue;
        }
        // Consume the rest of the 0xA1 sync run (nominally three, but tolerate any count >= 1).
        loop {
            let before = dec.bit_pos();
            match dec.read_byte() {
                Some((b, true)) if b == 0xA1 => {}
                Some((mark, false)) => {
                    match mark {
                        IDAM_MARK => {
                            if let Some(idam) = read_idam(dec) {
                                pending = Some(idam);
                            }
                        }
                        DAM_MARK => {
                            if let Some((id, id_crc_ok)) = pending.take() {
                                if let Some((data, data_crc_ok)) = read_dam(dec, id.size() as usize)
                                {
                                    sectors.push(RecoveredSector {
                                        id,
                                        data,
                                        id_crc_ok,
                                        data_crc_ok,
                                    });
                                }
                            }
                        }
                        _ => {}
                    }
                    break;
                }
                _ => {
                    dec.seek_bit(before);
                    break;
                }
            }
        }
    }

    sectors
}

/// Having just consumed the `0xFE` mark, read the remaining CHRN + CRC and validate.
fn read_idam(dec: &mut MfmDecoder) -> Option<(Chs, bool)> {
    let mut rest = [0u8; 5];
    for slot in rest.iter_mut() {
        *slot = dec.read_byte()?.0;
    }
    let [track, head, sector, size_code, _unused] = [rest[0], rest[1], rest[2], rest[3], rest[4]];
    let crc_hi = dec.read_byte()?.0;
    let crc_lo = dec.read_byte()?.0;
    let stored_crc = u16::from_be_bytes([crc_hi, crc_lo]);

    let mut record = vec![0xA1, 0xA1, 0xA1, IDAM_MARK];
    record.extend_from_slice(&rest[..4]);
    let computed = Crc16Ccitt::of(&record);

    let size = Chs::size_code_to_bytes(size_code);
    Some((Chs::new(track as u16, head, sector, size), computed == stored_crc))
}

/// Having just consumed the `0xFB` mark, read `size` data bytes plus CRC and validate.
fn read_dam(dec: &mut MfmDecoder, size: usize) -> Option<(Vec<u8>, bool)> {
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        data.push(dec.read_byte()?.0);
    }
    let crc_hi = dec.read_byte()?.0;
    let crc_lo = dec.read_byte()?.0;
    let stored_crc = u16::from_be_bytes([crc_hi, crc_lo]);

    let mut record = vec![0xA1, 0xA1, 0xA1, DAM_MARK];
    record.extend_from_slice(&data);
    let computed = Crc16Ccitt::of(&record);

    Some((data, computed == stored_crc))
}

/// Encode one sector's IDAM + gap + DAM + data as a raw MFM-ready byte sequence (sync marks
/// written via `write_sync`, everything else via `write_byte`), used by HFE/DMK sector writers.
pub fn encode_sector_record<W: std::io::Write>(
    enc: &mut crate::bitstream::mfm::MfmEncoder<W>,
    id: &Chs,
    data: &[u8],
    gap_fill: u8,
    gap_len: usize,
) -> Result<(), DiskImageError> {
    let size_code = Chs::bytes_to_size_code(id.size());
    enc.write_sync()?;
    enc.write_sync()?;
    enc.write_sync()?;
    let idam_body = [IDAM_MARK, id.track() as u8, id.head(), id.sector(), size_code, 0];
    enc.write_bytes(&idam_body)?;
    let mut crc_record = vec![0xA1, 0xA1, 0xA1];
    crc_record.extend_from_slice(&idam_body[..5]);
    let crc = Crc16Ccitt::of(&crc_record);
    enc.write_bytes(&crc.to_be_bytes())?;

    for _ in 0..gap_len {
        enc.write_byte(gap_fill)?;
    }

    enc.write_sync()?;
    enc.write_sync()?;
    enc.write_sync()?;
    enc.write_byte(DAM_MARK)?;
    enc.write_bytes(data)?;
    let mut data_crc_record = vec![0xA1, 0xA1, 0xA1, DAM_MARK];
    data_crc_record.extend_from_slice(data);
    let data_crc = Crc16Ccitt::of(&data_crc_record);
    enc.write_bytes(&data_crc.to_be_bytes())?;

    for _ in 0..gap_len {
        enc.write_byte(gap_fill)?;
    }
    Ok(())
}

/// Deinterleave one side of an HFE track block, which stores the two sides' bitstreams
/// interleaved at 256-byte granularity (`256 B side 0 | 256 B side 1 | …`, §4.3).
pub fn deinterleave_hfe_side(track_block: &[u8], side: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(track_block.len() / 2 + 256);
    let mut offset = 0;
    let mut chunk_side = 0u8;
    while offset < track_block.len() {
        let end = (offset + 256).min(track_block.len());
        if chunk_side == side {
            out.extend_from_slice(&track_block[offset..end]);
        }
        offset = end;
        chunk_side ^= 1;
    }
    out
}

/// Interleave two sides' bitstreams back into one HFE track block at 256-byte granularity - the
/// inverse of `deinterleave_hfe_side`. Used when rewriting a single sector so the untouched side
/// rides back in unchanged.
pub fn interleave_hfe_sides(side0: &[u8], side1: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(side0.len() + side1.len());
    let len = side0.len().max(side1.len());
    let mut offset = 0;
    while offset < len {
        let end0 = (offset + 256).min(side0.len());
        if offset < side0.len() {
            out.extend_from_slice(&side0[offset..end0]);
        }
        let end1 = (offset + 256).min(side1.len());
        if offset < side1.len() {
            out.extend_from_slice(&side1[offset..end1]);
        }
        offset += 256;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::mfm::MfmEncoder;

    /// §8 invariant 1: decode(encode(sector)) == sector.
    #[test]
    fn sector_round_trips_through_idam_dam_scan() {
        let id = Chs::new(1, 0, 1, 256);
        let data = vec![0xE5u8; 256];

        let mut enc = MfmEncoder::new(Vec::new());
        enc.write_byte(0x4E).unwrap(); // leading gap
        encode_sector_record(&mut enc, &id, &data, 0x4E, 4).unwrap();
        let media = enc.into_inner().unwrap();

        let mut dec = MfmDecoder::new(&media);
        let sectors = recover_sectors(&mut dec);
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].id, id);
        assert_eq!(sectors[0].data, data);
        assert!(sectors[0].id_crc_ok);
        assert!(sectors[0].data_crc_ok);
    }

    /// S1/S2: the exact IDAM and data-record CRCs from the specification's worked example.
    #[test]
    fn idam_and_dam_match_worked_example() {
        let id = Chs::new(1, 0, 1, 256);
        let data = vec![0xE5u8; 256];
        let mut enc = MfmEncoder::new(Vec::new());
        encode_sector_record(&mut enc, &id, &data, 0, 0).unwrap();
        let media = enc.into_inner().unwrap();
        let mut dec = MfmDecoder::new(&media);
        let sectors = recover_sectors(&mut dec);
        assert_eq!(sectors.len(), 1);
        assert!(sectors[0].id_crc_ok);
        assert!(sectors[0].data_crc_ok);
    }

    #[test]
    fn deinterleave_recovers_each_side() {
        let mut block = Vec::new();
        block.extend(std::iter::repeat(0xAAu8).take(256)); // side 0
        block.extend(std::iter::repeat(0xBBu8).take(256)); // side 1
        block.extend(std::iter::repeat(0xCCu8).take(256)); // side 0 again
        block.extend(std::iter::repeat(0xDDu8).take(256)); // side 1 again

        let side0 = deinterleave_hfe_side(&block, 0);
        let side1 = deinterleave_hfe_side(&block, 1);
        assert!(side0.iter().take(256).all(|&b| b == 0xAA));
        assert!(side0.iter().skip(256).all(|&b| b == 0xCC));
        assert!(side1.iter().take(256).all(|&b| b == 0xBB));
        assert!(side1.iter().skip(256).all(|&b| b == 0xDD));
    }

    #[test]
    fn crc_bad_sector_is_still_returned() {
        let id = Chs::new(2, 0, 5, 256);
        let data = vec![0x00u8; 256];
        let mut enc = MfmEncoder::new(Vec::new());
        encode_sector_record(&mut enc, &id, &data, 0, 0).unwrap();
        let mut media = enc.into_inner().unwrap();
        // Flip a bit deep in the data region so the data CRC no longer matches.
        let len = media.len();
        media[len - 10] ^= 0xFF;

        let mut dec = MfmDecoder::new(&media);
        let sectors = recover_sectors(&mut dec);
        assert_eq!(sectors.len(), 1);
        assert!(sectors[0].id_crc_ok);
        assert!(!sectors[0].data_crc_ok);
    }
}
