//! Free sector tracking.

use crate::config::{div_round_up, BITS_IN_BYTE};
use crate::error::Result;
use crate::io::BlockStorage;
use crate::openfile::OpenFile;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per device sector, set when the sector is allocated. Bit `i` lives in
/// byte `i / 8` at position `i % 8`, which is also the layout of the bitmap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    num_bits: usize,
}

impl Bitmap {
    /// Creates a bitmap with every sector free.
    pub fn new(num_bits: usize) -> Self {
        Self {
            bits: vec![0; div_round_up(num_bits, BITS_IN_BYTE)],
            num_bits,
        }
    }

    /// Size of the persisted form in bytes.
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.num_bits, "sector {} out of range", blocknr);
        let mask = 1u8 << (blocknr % BITS_IN_BYTE);
        match self.bits[blocknr / BITS_IN_BYTE] & mask {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn test(&self, blocknr: usize) -> bool {
        self.get(blocknr) == State::Used
    }

    /// Reserves a sector unconditionally. Reserving an already used sector is a
    /// logic error.
    pub fn mark(&mut self, blocknr: usize) {
        debug_assert!(!self.test(blocknr), "sector {} already marked", blocknr);
        self.bits[blocknr / BITS_IN_BYTE] |= 1u8 << (blocknr % BITS_IN_BYTE);
    }

    pub fn clear(&mut self, blocknr: usize) {
        assert!(blocknr < self.num_bits, "sector {} out of range", blocknr);
        self.bits[blocknr / BITS_IN_BYTE] &= !(1u8 << (blocknr % BITS_IN_BYTE));
    }

    /// Claims the lowest free sector, or returns `None` when the device is full.
    pub fn find_free(&mut self) -> Option<usize> {
        let blocknr = (0..self.num_bits).find(|&i| !self.test(i))?;
        self.mark(blocknr);
        Some(blocknr)
    }

    pub fn num_clear(&self) -> usize {
        (0..self.num_bits).filter(|&i| !self.test(i)).count()
    }

    /// Iterates over every allocated sector in ascending order.
    pub fn used(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_bits).filter(move |&i| self.test(i))
    }

    /// Replaces the in-memory bits with the contents of the bitmap file.
    pub fn load<T: BlockStorage>(&mut self, dev: &mut T, file: &OpenFile) -> Result<()> {
        file.read_at(dev, &mut self.bits, 0)?;
        Ok(())
    }

    /// Writes every bit back to the bitmap file.
    pub fn store<T: BlockStorage>(&self, dev: &mut T, file: &OpenFile) -> Result<()> {
        file.write_at(dev, &self.bits, 0)?;
        Ok(())
    }
}
