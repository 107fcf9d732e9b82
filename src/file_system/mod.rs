/*
    dragonfox

    src/file_system/mod.rs

    The shared filesystem interface every on-disk format implements (§4.4): list, read, write,
    rename, delete, free space, filename validation, consistency check, and per-file metadata.
*/
pub mod dragondos;
pub mod flex;
pub mod os9;
pub mod rsdos;

use crate::DiskImageError;

/// A file's type as recorded by its filesystem - not every filesystem distinguishes all of
/// these (RsDos has no separate "Text" type beyond its ASCII flag; OS-9 has none at all).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileType {
    Basic,
    Data,
    MachineCode,
    Unknown,
}

/// Flat, filesystem-agnostic per-file metadata (§10.5 "FileInfo") - never a pointer into a
/// mutable sector buffer (Design Note "Directory parsing").
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
    pub file_type: FileType,
    pub is_ascii: bool,
    pub load_address: Option<u16>,
    pub exec_address: Option<u16>,
}

/// A file's contents plus the metadata needed to reconstruct its file-type header on write-back.
#[derive(Clone, Debug)]
pub struct File {
    pub info: FileInfo,
    pub data: Vec<u8>,
}

/// The operation set every concrete filesystem (RsDos, DragonDos, Flex, OS-9) implements over a
/// mounted disk.
pub trait FileSystem {
    fn list_files(&mut self) -> Result<Vec<String>, DiskImageError>;
    fn file_exists(&mut self, name: &str) -> Result<bool, DiskImageError>;
    fn read_file(&mut self, name: &str) -> Result<File, DiskImageError>;
    fn write_file(&mut self, name: &str, file: &File) -> Result<(), DiskImageError>;
    fn delete_file(&mut self, name: &str) -> Result<(), DiskImageError>;
    fn rename_file(&mut self, old: &str, new: &str) -> Result<(), DiskImageError>;
    fn free(&mut self) -> Result<usize, DiskImageError>;
    fn is_valid_filename(&self, name: &str) -> bool;
    fn check(&mut self) -> Result<(), DiskImageError>;
    fn get_file_info(&mut self, name: &str) -> Result<FileInfo, DiskImageError>;
    fn is_sector_allocated(&mut self, track: u16, head: u8, sector: u8) -> Result<bool, DiskImageError>;
}
