/*
    dragonfox

    src/image_parsers/mod.rs

    Disk factory: dispatch on file signature/extension to the right image codec (§6 "Dispatch
    rule"). Try HFE signature, then VDK signature, then DMK by extension, then JVC by extension.
*/
pub mod dmk;
pub mod hfe;
pub mod jvc;
pub mod vdk;

use std::fmt;

use strum::EnumIter;

use crate::disk_image::Disk;
use crate::DiskImageError;

/// The on-host image formats this crate can open, independent of the `Disk` instance a given
/// file decodes to.
#[derive(Copy, Clone, Debug, EnumIter, Eq, PartialEq)]
pub enum ImageFormat {
    Jvc,
    Vdk,
    Dmk,
    Hfe,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageFormat::Jvc => write!(f, "JVC"),
            ImageFormat::Vdk => write!(f, "VDK"),
            ImageFormat::Dmk => write!(f, "DMK"),
            ImageFormat::Hfe => write!(f, "HFE"),
        }
    }
}

impl ImageFormat {
    /// The file extensions recognized for this format (§6 "Dispatch rule").
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jvc => &["dsk", "jvc"],
            ImageFormat::Vdk => &["vdk"],
            ImageFormat::Dmk => &["dmk"],
            ImageFormat::Hfe => &["hfe"],
        }
    }
}

/// Open a disk image, inferring its format from the byte content and, where the format carries
/// no magic of its own (DMK, JVC), from the file extension.
pub fn open_disk_image(data: Vec<u8>, extension: &str, writable: bool) -> Result<Disk, DiskImageError> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();

    if hfe::HfeDisk::detect(&data) {
        return Ok(Disk::Hfe(hfe::HfeDisk::open(data, writable)?));
    }
    if vdk::VdkDisk::detect(&data) {
        return Ok(Disk::Vdk(vdk::VdkDisk::open(data, writable)?));
    }
    if ext == "dmk" {
        return Ok(Disk::Dmk(dmk::DmkDisk::open(data, writable)?));
    }
    if ext == "dsk" || ext == "jvc" {
        let header_len = infer_jvc_header_len(&data);
        return Ok(Disk::Jvc(jvc::JvcDisk::open(data, header_len, writable)?));
    }

    Err(DiskImageError::FormatError(format!(
        "could not determine disk image format for extension \"{extension}\""
    )))
}

/// JVC carries no magic; a header is present only when the body length isn't an exact multiple
/// of a full 18-sector/256-byte track. This is a heuristic, not a guarantee (§4.3).
fn infer_jvc_header_len(data: &[u8]) -> usize {
    const TRACK_BYTES: usize = 18 * 256;
    for header_len in 0..=5 {
        if header_len <= data.len() && (data.len() - header_len) % TRACK_BYTES == 0 {
            return header_len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_format_claims_at_least_one_extension() {
        for format in ImageFormat::iter() {
            assert!(!format.extensions().is_empty(), "{format} has no recognized extension");
        }
    }

    #[test]
    fn dispatches_hfe_by_signature() {
        let mut data = vec![0u8; 8];
        data[0..8].copy_from_slice(b"HXCPICFE");
        // Not a fully valid HFE image, but detect() should still route it there and surface the
        // resulting parse error rather than silently falling through to another format.
        let err = open_disk_image(data, "img", true).unwrap_err();
        assert!(matches!(err, DiskImageError::FormatError(_)));
    }

    #[test]
    fn dispatches_jvc_by_extension() {
        let data = vec![0u8; 18 * 256 * 35];
        let disk = open_disk_image(data, ".dsk", false).unwrap();
        assert_eq!(disk.geometry().tracks, 35);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let data = vec![0u8; 16];
        let err = open_disk_image(data, "xyz", false).unwrap_err();
        assert!(matches!(err, DiskImageError::FormatError(_)));
    }
}
