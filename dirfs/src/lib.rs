//! A small hierarchical file system stored on a fixed-sector block device.
//!
//! Free space is tracked by a bitmap, every file is described by a one-sector
//! extent header, and directories are files holding fixed-size entry tables,
//! so they nest to any depth. Files and directories have a size fixed at
//! creation time.
//!
//! ```
//! use dirfs::io::FileBlockEmulatorBuilder;
//! use dirfs::{FileSystem, FormatOptions, DEFAULT_NUM_SECTORS};
//!
//! let dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
//!     .with_block_count(DEFAULT_NUM_SECTORS)
//!     .build()
//!     .unwrap();
//! let mut fs = FileSystem::format(dev, FormatOptions::new()).unwrap();
//!
//! fs.create("/docs/notes", 11).unwrap();
//! fs.write_file("/docs/notes", b"hello world").unwrap();
//! assert_eq!(fs.read_file("/docs/notes").unwrap(), b"hello world");
//! ```

mod alloc;
mod config;
mod dir;
mod error;
mod fs;
mod header;
pub mod io;
mod openfile;
mod path;

pub use crate::alloc::{Bitmap, State};
pub use crate::config::*;
pub use crate::dir::{Directory, DirectoryEntry, DIRECTORY_ENTRY_SIZE};
pub use crate::error::{FsError, Result};
pub use crate::fs::FileSystem;
pub use crate::header::ExtentHeader;
pub use crate::openfile::OpenFile;
