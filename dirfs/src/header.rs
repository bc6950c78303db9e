//! Extent headers, the per-file record mapping a byte length onto sectors.

use std::fmt::Write;

use crate::alloc::Bitmap;
use crate::config::{div_round_up, MAX_FILE_SIZE, NUM_DIRECT, SECTOR_SIZE};
use crate::error::{FsError, Result};
use crate::io::BlockStorage;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Occupies exactly one sector on disk, located by the sector number that
/// identifies the file.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtentHeader {
    /// The total size of the file in bytes.
    byte_length: u32,
    /// Number of leading entries of `blocks` in use, always
    /// `ceil(byte_length / SECTOR_SIZE)`.
    block_count: u32,
    blocks: [u32; NUM_DIRECT],
}

const _: () = assert!(std::mem::size_of::<ExtentHeader>() == SECTOR_SIZE);

impl Default for ExtentHeader {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl ExtentHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims enough free sectors from `bitmap` to hold `requested` bytes.
    ///
    /// Capacity is checked before any sector is claimed, so a failed call leaves
    /// both the header and the bitmap as they were.
    pub fn allocate(&mut self, bitmap: &mut Bitmap, requested: usize) -> Result<()> {
        if requested > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge {
                requested,
                max: MAX_FILE_SIZE,
            });
        }
        let needed = div_round_up(requested, SECTOR_SIZE);
        if bitmap.num_clear() < needed {
            return Err(FsError::NoFreeDataBlocks);
        }

        for slot in self.blocks.iter_mut().take(needed) {
            let sector = bitmap.find_free().ok_or(FsError::NoFreeDataBlocks)?;
            *slot = sector as u32;
        }
        self.byte_length = requested as u32;
        self.block_count = needed as u32;
        Ok(())
    }

    /// Returns every data sector to `bitmap`. The header sector itself is owned
    /// by the caller and is not touched.
    pub fn deallocate(&self, bitmap: &mut Bitmap) {
        for &sector in self.blocks() {
            debug_assert!(bitmap.test(sector as usize), "sector {} not in use", sector);
            bitmap.clear(sector as usize);
        }
    }

    pub fn load<T: BlockStorage>(dev: &mut T, sector: usize) -> Result<Self> {
        let mut buf = [0; SECTOR_SIZE];
        dev.read_block(sector, &mut buf)?;
        let header = Self::read_from(&buf[..]).ok_or(FsError::Unformatted)?;
        Ok(header)
    }

    pub fn store<T: BlockStorage>(&self, dev: &mut T, sector: usize) -> Result<()> {
        dev.write_block(sector, self.as_bytes())?;
        Ok(())
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length as usize
    }

    /// The sectors holding file data, in file order.
    pub fn blocks(&self) -> &[u32] {
        let count = (self.block_count as usize).min(NUM_DIRECT);
        &self.blocks[..count]
    }

    /// Sector holding the `index`-th sector worth of file data.
    pub fn block_at(&self, index: usize) -> Option<usize> {
        self.blocks().get(index).map(|&sector| sector as usize)
    }

    /// Sector holding the byte at `offset`.
    pub fn byte_to_sector(&self, offset: usize) -> Option<usize> {
        self.block_at(offset / SECTOR_SIZE)
    }

    /// Whether the length and sector list agree and every listed sector exists on
    /// a device of `num_sectors` sectors.
    pub fn is_consistent(&self, num_sectors: usize) -> bool {
        self.block_count as usize <= NUM_DIRECT
            && div_round_up(self.byte_length(), SECTOR_SIZE) == self.block_count as usize
            && self.blocks().iter().all(|&s| (s as usize) < num_sectors)
    }

    /// Appends the header and a printable rendering of the file contents.
    pub fn dump<T: BlockStorage>(&self, dev: &mut T, out: &mut String) -> Result<()> {
        let blocks: Vec<String> = self.blocks().iter().map(|s| s.to_string()).collect();
        let _ = writeln!(
            out,
            "FileHeader contents.  File size: {}.  File blocks: {}",
            self.byte_length,
            blocks.join(" ")
        );
        out.push_str("File contents:\n");

        let mut remaining = self.byte_length();
        let mut buf = [0; SECTOR_SIZE];
        for &sector in self.blocks() {
            dev.read_block(sector as usize, &mut buf)?;
            let chunk = remaining.min(SECTOR_SIZE);
            for &byte in &buf[..chunk] {
                if byte.is_ascii_graphic() || byte == b' ' {
                    out.push(byte as char);
                } else {
                    let _ = write!(out, "\\{:x}", byte);
                }
            }
            remaining -= chunk;
            out.push('\n');
        }
        Ok(())
    }
}
