//! Directories, fixed-size tables of named entries stored as ordinary files.
//!
//! A directory never grows. Once every slot of its table is in use, no more
//! files or directories can be added to it.

use std::fmt::Write;

use crate::alloc::Bitmap;
use crate::config::FILE_NAME_MAX_LEN;
use crate::error::{FsError, Result};
use crate::header::ExtentHeader;
use crate::io::BlockStorage;
use crate::openfile::OpenFile;

use log::debug;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Bytes one entry occupies in a directory file.
pub const DIRECTORY_ENTRY_SIZE: usize = std::mem::size_of::<DirectoryEntry>();

/// One slot of a directory table.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Location of the entry's extent header.
    sector: u32,
    in_use: u8,
    is_directory: u8,
    /// NUL padded, one byte longer than the longest name so it stays terminated.
    name: [u8; FILE_NAME_MAX_LEN + 1],
}

const _: () = assert!(DIRECTORY_ENTRY_SIZE == 16);

impl DirectoryEntry {
    fn new(name: &str, sector: usize, is_directory: bool) -> Self {
        let mut entry = Self::new_zeroed();
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry.sector = sector as u32;
        entry.in_use = 1;
        entry.is_directory = is_directory as u8;
        entry
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory != 0
    }

    pub fn sector(&self) -> usize {
        self.sector as usize
    }

    fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    fn matches(&self, name: &str, is_directory: bool) -> bool {
        self.is_in_use()
            && self.is_directory() == is_directory
            && self.name_bytes() == name.as_bytes()
    }
}

/// Rejects names that cannot be stored in an entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidPath(format!("bad component {:?}", name)));
    }
    if name.len() > FILE_NAME_MAX_LEN {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// In-memory copy of a directory table. Load it from the directory's file with
/// [`Directory::load`] before use and write it back with [`Directory::store`]
/// after any change.
///
/// Files and directories have separate namespaces: a file and a directory may
/// share a name within one table, two entries of the same kind may not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    table: Vec<DirectoryEntry>,
}

impl Directory {
    /// Creates an empty directory with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            table: vec![DirectoryEntry::new_zeroed(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// Bytes needed to persist a table of `capacity` slots.
    pub fn file_size(capacity: usize) -> usize {
        capacity * DIRECTORY_ENTRY_SIZE
    }

    pub fn load<T: BlockStorage>(&mut self, dev: &mut T, file: &OpenFile) -> Result<()> {
        let mut buf = vec![0; Self::file_size(self.capacity())];
        file.read_at(dev, &mut buf, 0)?;
        for (slot, raw) in self
            .table
            .iter_mut()
            .zip(buf.chunks_exact(DIRECTORY_ENTRY_SIZE))
        {
            *slot = DirectoryEntry::read_from(raw).unwrap_or_else(DirectoryEntry::new_zeroed);
        }
        Ok(())
    }

    pub fn store<T: BlockStorage>(&self, dev: &mut T, file: &OpenFile) -> Result<()> {
        file.write_at(dev, self.table.as_slice().as_bytes(), 0)?;
        Ok(())
    }

    pub fn find_index(&self, name: &str, is_directory: bool) -> Option<usize> {
        self.table
            .iter()
            .position(|entry| entry.matches(name, is_directory))
    }

    /// Header sector of the entry named `name` of the given kind.
    pub fn find(&self, name: &str, is_directory: bool) -> Option<usize> {
        self.find_index(name, is_directory)
            .map(|slot| self.table[slot].sector())
    }

    /// Registers `name` in the first free slot.
    pub fn add(&mut self, name: &str, sector: usize, is_directory: bool) -> Result<()> {
        validate_name(name)?;
        if self.find_index(name, is_directory).is_some() {
            return Err(FsError::NameCollision(name.to_string()));
        }
        let slot = self
            .table
            .iter_mut()
            .find(|entry| !entry.is_in_use())
            .ok_or(FsError::DirectoryFull)?;
        *slot = DirectoryEntry::new(name, sector, is_directory);
        Ok(())
    }

    pub fn remove(&mut self, name: &str, is_directory: bool) -> Result<()> {
        let slot = self
            .find_index(name, is_directory)
            .ok_or_else(|| FsError::PathComponentNotFound(name.to_string()))?;
        self.table[slot].in_use = 0;
        Ok(())
    }

    /// In-use entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.table.iter().filter(|entry| entry.is_in_use())
    }

    /// Names of the in-use entries in slot order.
    pub fn list(&self) -> Vec<String> {
        self.entries().map(DirectoryEntry::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Appends every in-use entry followed by its header.
    pub fn print<T: BlockStorage>(&self, dev: &mut T, out: &mut String) -> Result<()> {
        out.push_str("Directory contents:\n");
        for entry in self.entries() {
            let _ = writeln!(
                out,
                "Name: {}, Sector: {}, Directory: {}",
                entry.name(),
                entry.sector(),
                entry.is_directory()
            );
            ExtentHeader::load(dev, entry.sector())?.dump(dev, out)?;
        }
        Ok(())
    }

    /// Frees everything below this directory.
    ///
    /// Nested directories are emptied first, then every entry's data sectors and
    /// header sector are returned to `bitmap` and the entry is released. The table
    /// is written back to `file` once all entries are gone. `bitmap` is shared by
    /// the whole recursion and is not persisted here, the caller flushes it once.
    pub fn clear_subtree<T: BlockStorage>(
        &mut self,
        dev: &mut T,
        bitmap: &mut Bitmap,
        file: &OpenFile,
    ) -> Result<()> {
        for slot in 0..self.table.len() {
            let entry = self.table[slot];
            if !entry.is_in_use() {
                continue;
            }
            if entry.is_directory() {
                let child_file = OpenFile::open(dev, entry.sector())?;
                let mut child = Directory::new(self.capacity());
                child.load(dev, &child_file)?;
                child.clear_subtree(dev, bitmap, &child_file)?;
            }
            debug!("freeing {:?} at sector {}", entry.name(), entry.sector());
            ExtentHeader::load(dev, entry.sector())?.deallocate(bitmap);
            bitmap.clear(entry.sector());
            self.table[slot].in_use = 0;
        }
        self.store(dev, file)
    }
}
