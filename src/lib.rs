/*
    dragonfox

    Copyright 2026 dragonfox contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the "Software"),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! # dragonfox
//!
//! dragonfox is a Rust library for reading, writing, and manipulating floppy disk images of the
//! kind used by the Dragon and Tandy Color Computer family of 8-bit home computers.
//!
//! It converts between four representations: an on-host image file (JVC, VDK, DMK, or HFE), a
//! logical array of CHS-addressed sectors, a filesystem directory of named files (DragonDos,
//! RsDos, Flex, or OS-9), and cassette-tape bit streams holding tokenized BASIC programs.
//!
//! The main entry point for image files is [`disk_image::Disk`], opened via
//! [`image_parsers::open_disk_image`]. Filesystems are mounted over an open disk with
//! [`file_system::FileSystem`] implementors such as [`file_system::rsdos::RsDosFileSystem`].

pub mod basic;
pub mod bitstream;
mod chs;
mod crc;
pub mod disk_image;
pub mod file_format;
pub mod file_system;
pub mod image_parsers;
pub mod tape;
mod track;

pub use chs::{Chs, ChsGeometry};
pub use crc::Crc16Ccitt;

use thiserror::Error;

/// Largest sector size this crate will ever allocate for (1024 bytes covers every format in
/// scope; DMK/HFE size codes above that are rejected as `FormatError`).
pub const MAXIMUM_SECTOR_SIZE: usize = 1024;
/// The sector size assumed when a format's header does not specify one.
pub const DEFAULT_SECTOR_SIZE: usize = 256;

/// The taxonomy of errors surfaced by every layer in this crate (§7 of the specification).
#[derive(Debug, Error)]
pub enum DiskImageError {
    #[error("an I/O error occurred reading or writing the disk image: {0}")]
    IoError(String),
    #[error("disk image format error: {0}")]
    FormatError(String),
    #[error("sector {0} was not found on this disk")]
    SectorNotFound(Chs),
    #[error("operation requires a writable handle but this disk or filesystem is read-only")]
    NotWriteable,
    #[error("filesystem consistency check failed: {0}")]
    ConsistencyError(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("the filesystem has no free space for this operation")]
    FilesystemFull,
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("checksum or CRC error: {0}")]
    ChecksumError(String),
    #[error("unknown tape block type: {0:#04x}")]
    BlockTypeError(u8),
    #[error("end of stream reached while decoding a truncated input")]
    EndOfStream,
    #[error("operation attempted on a disposed handle")]
    ObjectDisposed,
}

impl From<std::io::Error> for DiskImageError {
    fn from(err: std::io::Error) -> Self {
        DiskImageError::IoError(err.to_string())
    }
}

impl From<binrw::Error> for DiskImageError {
    fn from(err: binrw::Error) -> Self {
        DiskImageError::FormatError(err.to_string())
    }
}
