/*
    dragonfox

    src/file_format.rs

    File-type headers embedded in a file's own byte stream, as opposed to its directory entry:
    the 9-byte DragonDos load/exec preamble (§4.4.2) and the 15-byte tape header payload (§3),
    which share the same load-address/exec-address shape but not the same wire layout.
*/
use crate::DiskImageError;

pub const FILE_TYPE_BASIC: u8 = 1;
pub const FILE_TYPE_MACHINE_CODE: u8 = 2;
pub const FILE_TYPE_DATA: u8 = 3;

const DRAGON_HEADER_LEN: usize = 9;

/// DragonDos BASIC/machine-code file preamble: `55 type lo-load hi-load lo-len hi-len lo-exec
/// hi-exec AA`. Data files (`FILE_TYPE_DATA`) carry no such header on disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DragonFileHeader {
    pub file_type: u8,
    pub load_address: u16,
    pub length: u16,
    pub exec_address: u16,
}

impl DragonFileHeader {
    /// Parse a header from the front of a file's raw sector bytes, returning it along with the
    /// remaining payload.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), DiskImageError> {
        if bytes.len() < DRAGON_HEADER_LEN {
            return Err(DiskImageError::FormatError("DragonDos file header truncated".into()));
        }
        if bytes[0] != 0x55 || bytes[8] != 0xAA {
            return Err(DiskImageError::FormatError(
                "DragonDos file header missing 0x55/0xAA sentinels".into(),
            ));
        }
        let header = Self {
            file_type: bytes[1],
            load_address: u16::from_le_bytes([bytes[2], bytes[3]]),
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
            exec_address: u16::from_le_bytes([bytes[6], bytes[7]]),
        };
        Ok((header, &bytes[DRAGON_HEADER_LEN..]))
    }

    pub fn encode(&self) -> [u8; DRAGON_HEADER_LEN] {
        let mut out = [0u8; DRAGON_HEADER_LEN];
        out[0] = 0x55;
        out[1] = self.file_type;
        out[2..4].copy_from_slice(&self.load_address.to_le_bytes());
        out[4..6].copy_from_slice(&self.length.to_le_bytes());
        out[6..8].copy_from_slice(&self.exec_address.to_le_bytes());
        out[8] = 0xAA;
        out
    }
}

/// Cassette tape header-block payload (15 bytes): 8-byte space-padded name, file type, ASCII
/// flag, gap flag, start address, load address. Field order is start-then-load on the wire
/// (confirmed by the worked example in §8 S5), not the load-then-start order its prose summary
/// suggests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TapeFileHeader {
    pub name: [u8; 8],
    pub file_type: u8,
    pub is_ascii: bool,
    pub is_gapped: bool,
    pub load_address: u16,
    pub start_address: u16,
}

impl TapeFileHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self, DiskImageError> {
        if bytes.len() != 15 {
            return Err(DiskImageError::FormatError(format!(
                "tape header payload must be 15 bytes, got {}",
                bytes.len()
            )));
        }
        let mut name = [0u8; 8];
        name.copy_from_slice(&bytes[0..8]);
        Ok(Self {
            name,
            file_type: bytes[8],
            is_ascii: bytes[9] != 0,
            is_gapped: bytes[10] != 0,
            start_address: u16::from_be_bytes([bytes[11], bytes[12]]),
            load_address: u16::from_be_bytes([bytes[13], bytes[14]]),
        })
    }

    pub fn encode(&self) -> [u8; 15] {
        let mut out = [0u8; 15];
        out[0..8].copy_from_slice(&self.name);
        out[8] = self.file_type;
        out[9] = self.is_ascii as u8;
        out[10] = self.is_gapped as u8;
        out[11..13].copy_from_slice(&self.start_address.to_be_bytes());
        out[13..15].copy_from_slice(&self.load_address.to_be_bytes());
        out
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    pub fn padded_name(name: &str) -> [u8; 8] {
        let mut out = [b' '; 8];
        for (i, c) in name.as_bytes().iter().take(8).enumerate() {
            out[i] = c.to_ascii_uppercase();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dragon_file_header_round_trips() {
        let header = DragonFileHeader {
            file_type: FILE_TYPE_MACHINE_CODE,
            load_address: 0x1000,
            length: 256,
            exec_address: 0x1000,
        };
        let bytes = header.encode();
        let (decoded, rest) = DragonFileHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }

    /// S5: tape header payload for ("BARBAR", MachineCode, ascii=false, gapped=false,
    /// load=10000, start=50000).
    #[test]
    fn tape_header_matches_worked_example() {
        let header = TapeFileHeader {
            name: TapeFileHeader::padded_name("BARBAR"),
            file_type: FILE_TYPE_MACHINE_CODE,
            is_ascii: false,
            is_gapped: false,
            load_address: 10000,
            start_address: 50000,
        };
        let bytes = header.encode();
        assert_eq!(
            bytes,
            [0x42, 0x41, 0x52, 0x42, 0x41, 0x52, 0x20, 0x20, 0x02, 0x00, 0x00, 0xC3, 0x50, 0x27, 0x10]
        );
        assert_eq!(TapeFileHeader::decode(&bytes).unwrap(), header);
    }
}
