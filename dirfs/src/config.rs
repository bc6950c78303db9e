//! Disk geometry and layout constants.

/// Bytes per sector. Every on-disk structure is addressed in sectors.
pub const SECTOR_SIZE: usize = 128;
/// Default device size, 32 tracks of 32 sectors.
pub const DEFAULT_NUM_SECTORS: usize = 32 * 32;
pub const BITS_IN_BYTE: usize = 8;

/// Known locations.
pub const FREE_MAP_SECTOR: usize = 0;
pub const ROOT_DIRECTORY_SECTOR: usize = 1;

/// Number of block numbers an extent header holds once its two length fields
/// are accounted for.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * 4) / 4;
/// Hard ceiling on file size, files never grow beyond their header.
pub const MAX_FILE_SIZE: usize = NUM_DIRECT * SECTOR_SIZE;

/// Longest name a single path component may carry.
pub const FILE_NAME_MAX_LEN: usize = 9;
/// Size of the entry table of every directory unless formatted otherwise.
pub const DEFAULT_DIRECTORY_ENTRIES: usize = 10;

/// Number of sectors needed to hold `bytes` bytes.
pub fn div_round_up(bytes: usize, unit: usize) -> usize {
    (bytes + unit - 1) / unit
}

/// Layout choices made when a device is formatted. The file system always spans
/// the whole device.
///
/// ```
/// use dirfs::FormatOptions;
///
/// let opts = FormatOptions::new().with_directory_entries(4);
/// assert_eq!(opts.directory_entries(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    directory_entries: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            directory_entries: DEFAULT_DIRECTORY_ENTRIES,
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry table capacity shared by every directory.
    pub fn with_directory_entries(mut self, entries: usize) -> Self {
        self.directory_entries = entries;
        self
    }

    pub fn directory_entries(&self) -> usize {
        self.directory_entries
    }
}
