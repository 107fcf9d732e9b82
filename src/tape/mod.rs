/*
    dragonfox

    src/tape/mod.rs

    Dragon cassette tape block framer: leader detection, the 0x3C sync byte, and the
    type/length/payload/checksum envelope wrapped around header, data, and end-of-file blocks
    (§4.5, §3 "Tape block").
*/
use log::{debug, trace};

use crate::bitstream::tape::{TapeBitReader, TapeBitWriter};
use crate::file_format::TapeFileHeader;
use crate::DiskImageError;

const LEADER_BYTE: u8 = 0x55;
const SYNC_BYTE: u8 = 0x3C;

const BLOCK_HEADER: u8 = 0x00;
const BLOCK_DATA: u8 = 0x01;
const BLOCK_EOF: u8 = 0xFF;

/// A single framed tape block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TapeBlock {
    Header(TapeFileHeader),
    Data(Vec<u8>),
    EndOfFile,
}

impl TapeBlock {
    fn type_byte(&self) -> u8 {
        match self {
            TapeBlock::Header(_) => BLOCK_HEADER,
            TapeBlock::Data(_) => BLOCK_DATA,
            TapeBlock::EndOfFile => BLOCK_EOF,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            TapeBlock::Header(h) => h.encode().to_vec(),
            TapeBlock::Data(bytes) => bytes.clone(),
            TapeBlock::EndOfFile => Vec::new(),
        }
    }

    /// The on-wire length byte: a Data block of exactly 256 bytes is encoded as `0x00`
    /// (§4.5 "length 0x00 is interpreted as 256 for data blocks").
    fn length_byte(&self) -> Result<u8, DiskImageError> {
        let len = self.payload().len();
        if matches!(self, TapeBlock::Data(_)) && len == 256 {
            return Ok(0x00);
        }
        u8::try_from(len).map_err(|_| DiskImageError::FormatError(format!("tape block payload too long: {len}")))
    }

    fn checksum(type_byte: u8, length_byte: u8, payload: &[u8]) -> u8 {
        let mut sum = type_byte as u32 + length_byte as u32;
        for &b in payload {
            sum += b as u32;
        }
        (sum % 256) as u8
    }
}

/// Scan `reader` for a run of at least `min_leader` byte-aligned `0x55` leader bytes, then a
/// `0x3C` sync byte (searched bit by bit, since the leader need not end on a byte boundary), then
/// parse the following type/length/payload/checksum envelope.
pub fn read_block(reader: &mut TapeBitReader<'_>, min_leader: usize) -> Result<TapeBlock, DiskImageError> {
    let mut leader_count = 0usize;
    loop {
        let before = reader.bit_pos();
        match reader.read_aligned_byte() {
            Some(LEADER_BYTE) => leader_count += 1,
            Some(_) => {
                reader.seek_bit(before);
                break;
            }
            None => return Err(DiskImageError::EndOfStream),
        }
    }
    if leader_count < min_leader {
        return Err(DiskImageError::FormatError(format!(
            "tape leader too short: {leader_count} < {min_leader}"
        )));
    }

    let sync_pos = reader
        .find_byte_from(reader.bit_pos(), SYNC_BYTE)
        .ok_or(DiskImageError::EndOfStream)?;
    reader.seek_bit(sync_pos + 8);
    trace!("tape sync found at bit {sync_pos} after {leader_count} leader bytes");

    let type_byte = reader.read_byte().ok_or(DiskImageError::EndOfStream)?;
    let length_byte = reader.read_byte().ok_or(DiskImageError::EndOfStream)?;
    let payload_len = if type_byte == BLOCK_DATA && length_byte == 0 {
        256
    } else {
        length_byte as usize
    };
    let mut payload = Vec::with_capacity(payload_len);
    for _ in 0..payload_len {
        payload.push(reader.read_byte().ok_or(DiskImageError::EndOfStream)?);
    }
    let checksum = reader.read_byte().ok_or(DiskImageError::EndOfStream)?;

    let expected = TapeBlock::checksum(type_byte, length_byte, &payload);
    if checksum != expected {
        return Err(DiskImageError::ChecksumError(format!(
            "tape block checksum mismatch: expected {expected:#04x}, got {checksum:#04x}"
        )));
    }

    let block = match type_byte {
        BLOCK_HEADER => TapeBlock::Header(TapeFileHeader::decode(&payload)?),
        BLOCK_DATA => TapeBlock::Data(payload),
        BLOCK_EOF => TapeBlock::EndOfFile,
        other => return Err(DiskImageError::BlockTypeError(other)),
    };
    debug!("read tape block type={type_byte:#04x} len={payload_len}");
    Ok(block)
}

/// Emit `leader_length` leader bytes, the sync byte, and `block`'s framed envelope, all
/// byte-aligned (§4.5).
pub fn write_block(writer: &mut TapeBitWriter, block: &TapeBlock, leader_length: usize) -> Result<(), DiskImageError> {
    for _ in 0..leader_length {
        writer.write_byte(LEADER_BYTE);
    }
    writer.write_byte(SYNC_BYTE);

    let type_byte = block.type_byte();
    let length_byte = block.length_byte()?;
    let payload = block.payload();
    let checksum = TapeBlock::checksum(type_byte, length_byte, &payload);

    writer.write_byte(type_byte);
    writer.write_byte(length_byte);
    writer.write_bytes(&payload);
    writer.write_byte(checksum);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S4: a header block with a short leader.
    #[test]
    fn parses_header_block_worked_example() {
        let bytes = [
            0x55, 0x3C, 0x00, 0x0F, 0x46, 0x4F, 0x4F, 0x42, 0x41, 0x52, 0x20, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x08,
        ];
        let mut reader = TapeBitReader::new(&bytes);
        let block = read_block(&mut reader, 1).unwrap();
        match block {
            TapeBlock::Header(h) => {
                assert_eq!(h.name_str(), "FOOBAR");
                assert_eq!(h.file_type, crate::file_format::FILE_TYPE_BASIC);
                assert!(!h.is_ascii);
                assert!(!h.is_gapped);
            }
            other => panic!("expected header block, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut bytes = [0x55, 0x3C, 0x01, 0x02, 0xAA, 0xBB, 0x00].to_vec();
        *bytes.last_mut().unwrap() = 0xFF; // wrong checksum
        let mut reader = TapeBitReader::new(&bytes);
        let err = read_block(&mut reader, 1).unwrap_err();
        assert!(matches!(err, DiskImageError::ChecksumError(_)));
    }

    #[test]
    fn write_then_read_round_trips() {
        let block = TapeBlock::Data(vec![1, 2, 3, 4, 5]);
        let mut writer = TapeBitWriter::new();
        write_block(&mut writer, &block, 4).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = TapeBitReader::new(&bytes);
        assert_eq!(read_block(&mut reader, 4).unwrap(), block);
    }

    #[test]
    fn data_block_256_bytes_uses_zero_length_byte() {
        let block = TapeBlock::Data(vec![0xAAu8; 256]);
        let mut writer = TapeBitWriter::new();
        write_block(&mut writer, &block, 2).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes[3], 0x00);
        let mut reader = TapeBitReader::new(&bytes);
        assert_eq!(read_block(&mut reader, 2).unwrap(), block);
    }

    #[test]
    fn end_of_file_block_round_trips() {
        let mut writer = TapeBitWriter::new();
        write_block(&mut writer, &TapeBlock::EndOfFile, 1).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = TapeBitReader::new(&bytes);
        assert_eq!(read_block(&mut reader, 1).unwrap(), TapeBlock::EndOfFile);
    }
}
