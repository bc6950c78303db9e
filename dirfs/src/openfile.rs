//! Handles over open files.

use crate::config::SECTOR_SIZE;
use crate::error::{FsError, Result};
use crate::header::ExtentHeader;
use crate::io::BlockStorage;

/// A seekable handle on a file, identified by the sector holding its header.
///
/// The handle keeps a copy of the header taken when it was opened and holds no
/// reference to the device. Reads and writes are routed through
/// [`FileSystem`](crate::FileSystem), which owns the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    sector: usize,
    header: ExtentHeader,
    position: usize,
}

impl OpenFile {
    /// Opens the file whose header lives at `sector`.
    pub fn open<T: BlockStorage>(dev: &mut T, sector: usize) -> Result<Self> {
        let header = ExtentHeader::load(dev, sector)?;
        Ok(Self {
            sector,
            header,
            position: 0,
        })
    }

    /// Wraps a header that is already in memory, typically one just written.
    pub(crate) fn from_header(sector: usize, header: ExtentHeader) -> Self {
        Self {
            sector,
            header,
            position: 0,
        }
    }

    pub fn sector(&self) -> usize {
        self.sector
    }

    pub fn header(&self) -> &ExtentHeader {
        &self.header
    }

    pub fn length(&self) -> usize {
        self.header.byte_length()
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn tell(&self) -> usize {
        self.position
    }

    /// Reads from the seek position and advances it by the bytes read.
    pub fn read<T: BlockStorage>(&mut self, dev: &mut T, buf: &mut [u8]) -> Result<usize> {
        let read = self.read_at(dev, buf, self.position)?;
        self.position += read;
        Ok(read)
    }

    /// Writes at the seek position and advances it by the bytes written.
    pub fn write<T: BlockStorage>(&mut self, dev: &mut T, buf: &[u8]) -> Result<usize> {
        let written = self.write_at(dev, buf, self.position)?;
        self.position += written;
        Ok(written)
    }

    /// Reads up to `buf.len()` bytes starting at `position`, stopping at end of
    /// file. Returns the number of bytes read.
    pub fn read_at<T: BlockStorage>(
        &self,
        dev: &mut T,
        buf: &mut [u8],
        position: usize,
    ) -> Result<usize> {
        let wanted = self.clip(buf.len(), position);
        if wanted == 0 {
            return Ok(0);
        }

        let mut block = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < wanted {
            let offset = position + done;
            let in_sector = offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(wanted - done);
            dev.read_block(self.sector_for(offset)?, &mut block)?;
            buf[done..done + chunk].copy_from_slice(&block[in_sector..in_sector + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    /// Writes up to `buf.len()` bytes starting at `position`. Files never grow,
    /// writes past the end of file are dropped. Returns the number of bytes
    /// written.
    pub fn write_at<T: BlockStorage>(
        &self,
        dev: &mut T,
        buf: &[u8],
        position: usize,
    ) -> Result<usize> {
        let wanted = self.clip(buf.len(), position);
        if wanted == 0 {
            return Ok(0);
        }

        let mut block = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < wanted {
            let offset = position + done;
            let in_sector = offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(wanted - done);
            let sector = self.sector_for(offset)?;
            if chunk < SECTOR_SIZE {
                dev.read_block(sector, &mut block)?;
            }
            block[in_sector..in_sector + chunk].copy_from_slice(&buf[done..done + chunk]);
            dev.write_block(sector, &block)?;
            done += chunk;
        }
        Ok(done)
    }

    fn clip(&self, len: usize, position: usize) -> usize {
        len.min(self.length().saturating_sub(position))
    }

    // Only a header whose length disagrees with its sector list can miss here.
    fn sector_for(&self, offset: usize) -> Result<usize> {
        self.header.byte_to_sector(offset).ok_or_else(|| {
            FsError::InvalidArgument(format!(
                "offset {} lies outside the extent of sector {}",
                offset, self.sector
            ))
        })
    }
}
