use std::fmt::Write;
use std::path::Path;

use crate::alloc::Bitmap;
use crate::config::*;
use crate::dir::{Directory, DirectoryEntry, DIRECTORY_ENTRY_SIZE};
use crate::error::{FsError, Result};
use crate::header::ExtentHeader;
use crate::io::BlockStorage;
use crate::openfile::OpenFile;
use crate::path::{components, split_target};

use log::{debug, info, warn};

/// A hierarchical file system on a fixed-sector device.
///
/// # Layout
/// ==========================================================================
/// | Bitmap header | Root directory header | Bitmap, directories, file data |
/// ==========================================================================
///
/// The bitmap and the root directory are ordinary files whose headers sit in
/// the first two sectors. Both stay open while the file system is mounted.
/// Every other directory is a file registered in its parent with the directory
/// flag set.
///
/// Mutating operations resolve the path, allocate or free sectors in an
/// in-memory copy of the bitmap, then persist the header, the directory and
/// the bitmap, in that order. Nothing is written before all in-memory steps
/// succeed, but there is no journal: an I/O failure while persisting, or a
/// crash, can leave the bitmap and a directory out of sync.
///
/// The file system does no locking. Callers sharing one instance between
/// threads must serialize whole operations themselves.
pub struct FileSystem<T: BlockStorage> {
    dev: T,
    free_map_file: OpenFile,
    directory_file: OpenFile,
    num_sectors: usize,
    directory_entries: usize,
}

impl<T: BlockStorage> FileSystem<T> {
    /// Writes an empty file system onto `dev`, covering the whole device.
    pub fn format(mut dev: T, opts: FormatOptions) -> Result<Self> {
        let num_sectors = dev.block_count();
        let directory_entries = opts.directory_entries();
        info!(
            "formatting {} sectors with {} entries per directory",
            num_sectors, directory_entries
        );
        if directory_entries == 0 {
            return Err(FsError::InvalidArgument(
                "directories need at least one entry".to_string(),
            ));
        }
        if directory_entries > MAX_FILE_SIZE / DIRECTORY_ENTRY_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "{} entries do not fit in a {} byte directory file",
                directory_entries, MAX_FILE_SIZE
            )));
        }
        if num_sectors <= ROOT_DIRECTORY_SECTOR {
            return Err(FsError::DeviceFull);
        }

        let mut free_map = Bitmap::new(num_sectors);
        // Claim the header sectors first so nothing else grabs them.
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIRECTORY_SECTOR);

        let map_size = free_map.byte_len();
        let mut map_hdr = ExtentHeader::new();
        map_hdr
            .allocate(&mut free_map, map_size)
            .map_err(bootstrap_error)?;
        let mut dir_hdr = ExtentHeader::new();
        dir_hdr
            .allocate(&mut free_map, Directory::file_size(directory_entries))
            .map_err(bootstrap_error)?;

        debug!("writing headers back to disk");
        map_hdr.store(&mut dev, FREE_MAP_SECTOR)?;
        dir_hdr.store(&mut dev, ROOT_DIRECTORY_SECTOR)?;

        let free_map_file = OpenFile::from_header(FREE_MAP_SECTOR, map_hdr);
        let directory_file = OpenFile::from_header(ROOT_DIRECTORY_SECTOR, dir_hdr);

        debug!("writing bitmap and directory back to disk");
        free_map.store(&mut dev, &free_map_file)?;
        Directory::new(directory_entries).store(&mut dev, &directory_file)?;

        Ok(Self {
            dev,
            free_map_file,
            directory_file,
            num_sectors,
            directory_entries,
        })
    }

    /// Opens the file system already present on `dev`.
    pub fn mount(mut dev: T) -> Result<Self> {
        let num_sectors = dev.block_count();
        if num_sectors <= ROOT_DIRECTORY_SECTOR {
            return Err(FsError::Unformatted);
        }
        let free_map_file = OpenFile::open(&mut dev, FREE_MAP_SECTOR)?;
        let directory_file = OpenFile::open(&mut dev, ROOT_DIRECTORY_SECTOR)?;

        let map_hdr = free_map_file.header();
        let dir_hdr = directory_file.header();
        let layout_ok = map_hdr.is_consistent(num_sectors)
            && dir_hdr.is_consistent(num_sectors)
            && map_hdr.byte_length() == div_round_up(num_sectors, BITS_IN_BYTE)
            && dir_hdr.byte_length() > 0
            && dir_hdr.byte_length() % DIRECTORY_ENTRY_SIZE == 0;
        if !layout_ok {
            return Err(FsError::Unformatted);
        }

        let directory_entries = dir_hdr.byte_length() / DIRECTORY_ENTRY_SIZE;
        info!(
            "mounted {} sectors with {} entries per directory",
            num_sectors, directory_entries
        );
        Ok(Self {
            dev,
            free_map_file,
            directory_file,
            num_sectors,
            directory_entries,
        })
    }

    /// Releases the device.
    pub fn into_device(self) -> T {
        self.dev
    }

    pub fn num_sectors(&self) -> usize {
        self.num_sectors
    }

    /// Entry table capacity of every directory.
    pub fn directory_entries(&self) -> usize {
        self.directory_entries
    }

    /// Creates a file of `size` bytes. Missing parent directories are created
    /// along the way and stay in place even if creating the file then fails.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, size: usize) -> Result<()> {
        let (parents, name) = split_target(path.as_ref())?;
        debug!("creating file {:?}, size {}", path.as_ref(), size);
        if size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge {
                requested: size,
                max: MAX_FILE_SIZE,
            });
        }

        let (mut dir, dir_file) = self.walk(&parents, true)?;
        if dir.find(&name, false).is_some() {
            return Err(FsError::NameCollision(name));
        }
        self.make_entry(&mut dir, &dir_file, &name, size, false)?;
        Ok(())
    }

    /// Creates an empty directory. Missing parent directories are created along
    /// the way.
    pub fn create_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let (parents, name) = split_target(path.as_ref())?;
        debug!("creating directory {:?}", path.as_ref());

        let (mut dir, dir_file) = self.walk(&parents, true)?;
        if dir.find(&name, true).is_some() {
            return Err(FsError::NameCollision(name));
        }
        let size = Directory::file_size(self.directory_entries);
        self.make_entry(&mut dir, &dir_file, &name, size, true)?;
        Ok(())
    }

    /// Opens the file at `path`. Fails without touching the disk if any
    /// component is missing.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<OpenFile> {
        let (parents, name) = split_target(path.as_ref())?;
        debug!("opening file {:?}", path.as_ref());

        let (dir, _) = self.walk(&parents, false)?;
        let sector = dir
            .find(&name, false)
            .ok_or_else(|| lookup_error(&dir, &name, false))?;
        OpenFile::open(&mut self.dev, sector)
    }

    /// Deletes the file at `path` and frees its sectors.
    pub fn remove<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let (parents, name) = split_target(path.as_ref())?;
        debug!("removing file {:?}", path.as_ref());

        let (mut dir, dir_file) = self.walk(&parents, false)?;
        let sector = dir
            .find(&name, false)
            .ok_or_else(|| lookup_error(&dir, &name, false))?;

        let header = ExtentHeader::load(&mut self.dev, sector)?;
        let mut free_map = self.load_bitmap()?;
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        dir.remove(&name, false)?;

        dir.store(&mut self.dev, &dir_file)?;
        self.store_bitmap(&free_map)
    }

    /// Deletes the directory at `path` together with everything below it.
    pub fn remove_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let (parents, name) = split_target(path.as_ref())?;
        debug!("removing directory {:?}", path.as_ref());

        let (mut dir, dir_file) = self.walk(&parents, false)?;
        let sector = dir
            .find(&name, true)
            .ok_or_else(|| lookup_error(&dir, &name, true))?;

        let target_file = OpenFile::open(&mut self.dev, sector)?;
        let mut target = self.load_directory(&target_file)?;
        let mut free_map = self.load_bitmap()?;

        target.clear_subtree(&mut self.dev, &mut free_map, &target_file)?;
        target_file.header().deallocate(&mut free_map);
        free_map.clear(sector);
        dir.remove(&name, true)?;

        dir.store(&mut self.dev, &dir_file)?;
        self.store_bitmap(&free_map)
    }

    /// Entries of the directory at `path`, without descending into
    /// subdirectories. `/` lists the root directory.
    pub fn list<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<DirectoryEntry>> {
        let names = components(path.as_ref())?;
        let (dir, _) = self.walk(&names, false)?;
        Ok(dir.entries().copied().collect())
    }

    pub fn read(&mut self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
        file.read(&mut self.dev, buf)
    }

    pub fn write(&mut self, file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
        file.write(&mut self.dev, buf)
    }

    pub fn read_at(&mut self, file: &OpenFile, buf: &mut [u8], position: usize) -> Result<usize> {
        file.read_at(&mut self.dev, buf, position)
    }

    pub fn write_at(&mut self, file: &OpenFile, buf: &[u8], position: usize) -> Result<usize> {
        file.write_at(&mut self.dev, buf, position)
    }

    /// Reads the whole content of the file at `path`.
    pub fn read_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<u8>> {
        let file = self.open(path)?;
        let mut content = vec![0; file.length()];
        file.read_at(&mut self.dev, &mut content, 0)?;
        Ok(content)
    }

    /// Overwrites the file at `path` from its start. Returns the number of bytes
    /// that fit in the file.
    pub fn write_file<P: AsRef<Path>>(&mut self, path: P, data: &[u8]) -> Result<usize> {
        let file = self.open(path)?;
        file.write_at(&mut self.dev, data, 0)
    }

    /// Loads the extent header stored at `sector`, as found in a
    /// [`DirectoryEntry`].
    pub fn header(&mut self, sector: usize) -> Result<ExtentHeader> {
        ExtentHeader::load(&mut self.dev, sector)
    }

    /// A fresh copy of the free sector map.
    pub fn bitmap(&mut self) -> Result<Bitmap> {
        self.load_bitmap()
    }

    pub fn free_sectors(&mut self) -> Result<usize> {
        Ok(self.load_bitmap()?.num_clear())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.dev.sync_disk()?;
        Ok(())
    }

    /// Describes the bitmap, every directory and every file header, for
    /// debugging.
    pub fn dump(&mut self) -> Result<String> {
        let mut out = String::new();

        out.push_str("Bit map file header:\n");
        self.free_map_file.header().dump(&mut self.dev, &mut out)?;
        out.push_str("Directory file header:\n");
        self.directory_file.header().dump(&mut self.dev, &mut out)?;

        let free_map = self.load_bitmap()?;
        let used: Vec<String> = free_map.used().map(|s| s.to_string()).collect();
        let _ = writeln!(out, "Bitmap set:\n{}", used.join(", "));

        let root = self.directory_file.clone();
        self.dump_directory(&root, "/", &mut out)?;
        Ok(out)
    }

    fn dump_directory(&mut self, file: &OpenFile, path: &str, out: &mut String) -> Result<()> {
        let dir = self.load_directory(file)?;
        let _ = writeln!(out, "{}", path);
        dir.print(&mut self.dev, out)?;

        for entry in dir.entries().filter(|entry| entry.is_directory()) {
            let child = OpenFile::open(&mut self.dev, entry.sector())?;
            let child_path = format!("{}{}/", path, entry.name());
            self.dump_directory(&child, &child_path, out)?;
        }
        Ok(())
    }

    /// Follows `names` down from the root, each one a directory. With
    /// `create_missing`, absent directories are created on the way.
    /// Returns the last directory reached and the file backing it.
    fn walk(&mut self, names: &[String], create_missing: bool) -> Result<(Directory, OpenFile)> {
        let mut file = self.directory_file.clone();
        let mut dir = self.load_directory(&file)?;

        for name in names {
            file = match dir.find(name, true) {
                Some(sector) => OpenFile::open(&mut self.dev, sector)?,
                None if create_missing => {
                    debug!("creating intermediate directory {:?}", name);
                    let size = Directory::file_size(self.directory_entries);
                    self.make_entry(&mut dir, &file, name, size, true)?
                }
                None => return Err(lookup_error(&dir, name, true)),
            };
            dir = self.load_directory(&file)?;
        }
        Ok((dir, file))
    }

    /// Allocates a header and `size` bytes of data for `name`, registers it in
    /// `dir` and persists header, directory and bitmap. Data sectors are zeroed
    /// before the entry is linked in, which also leaves a new directory with an
    /// empty table.
    fn make_entry(
        &mut self,
        dir: &mut Directory,
        dir_file: &OpenFile,
        name: &str,
        size: usize,
        is_directory: bool,
    ) -> Result<OpenFile> {
        let mut free_map = self.load_bitmap()?;
        let sector = free_map.find_free().ok_or(FsError::NoFreeHeaderBlock)?;

        let mut header = ExtentHeader::new();
        if let Err(err) = header.allocate(&mut free_map, size) {
            warn!(
                "no room for {} bytes of {:?}, dropping claimed header sector {}",
                size, name, sector
            );
            return Err(err);
        }
        dir.add(name, sector, is_directory)?;

        debug!("persisting {:?} at sector {}", name, sector);
        header.store(&mut self.dev, sector)?;
        let zeroes = [0; SECTOR_SIZE];
        for &block in header.blocks() {
            self.dev.write_block(block as usize, &zeroes)?;
        }
        let file = OpenFile::from_header(sector, header);
        dir.store(&mut self.dev, dir_file)?;
        self.store_bitmap(&free_map)?;
        Ok(file)
    }

    fn load_directory(&mut self, file: &OpenFile) -> Result<Directory> {
        let mut dir = Directory::new(self.directory_entries);
        dir.load(&mut self.dev, file)?;
        Ok(dir)
    }

    fn load_bitmap(&mut self) -> Result<Bitmap> {
        let mut free_map = Bitmap::new(self.num_sectors);
        free_map.load(&mut self.dev, &self.free_map_file)?;
        Ok(free_map)
    }

    fn store_bitmap(&mut self, free_map: &Bitmap) -> Result<()> {
        free_map.store(&mut self.dev, &self.free_map_file)
    }
}

/// Explains why `name` of the wanted kind is absent from `dir`.
fn lookup_error(dir: &Directory, name: &str, is_directory: bool) -> FsError {
    match (dir.find(name, !is_directory), is_directory) {
        (Some(_), true) => FsError::NotADirectory(name.to_string()),
        (Some(_), false) => FsError::NotAFile(name.to_string()),
        (None, _) => FsError::PathComponentNotFound(name.to_string()),
    }
}

fn bootstrap_error(err: FsError) -> FsError {
    match err {
        FsError::NoFreeDataBlocks => FsError::DeviceFull,
        FsError::FileTooLarge { requested, max } => FsError::InvalidArgument(format!(
            "bootstrap file of {} bytes exceeds the {} byte file limit",
            requested, max
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileBlockEmulator, FileBlockEmulatorBuilder};

    fn create_test_device(blocks: usize) -> FileBlockEmulator {
        let dev = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(dev)
            .with_block_count(blocks)
            .build()
            .expect("Could not initialize disk emulator.")
    }

    fn create_test_fs() -> FileSystem<FileBlockEmulator> {
        FileSystem::format(create_test_device(DEFAULT_NUM_SECTORS), FormatOptions::new()).unwrap()
    }

    #[test]
    fn format_reserves_bootstrap_sectors() {
        let mut fs = create_test_fs();
        let free_map = fs.bitmap().unwrap();

        // Two headers, one bitmap sector, two root directory sectors.
        assert_eq!(free_map.used().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(fs.list("/").unwrap().is_empty());
        assert_eq!(fs.directory_entries(), DEFAULT_DIRECTORY_ENTRIES);
    }

    #[test]
    fn tiny_device_cannot_be_formatted() {
        let result = FileSystem::format(create_test_device(4), FormatOptions::new());
        assert!(matches!(result, Err(FsError::DeviceFull)));
    }

    #[test]
    fn zero_entry_directories_are_rejected() {
        let opts = FormatOptions::new().with_directory_entries(0);
        let result = FileSystem::format(create_test_device(64), opts);
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn oversized_directory_tables_are_rejected() {
        for entries in &[MAX_FILE_SIZE / DIRECTORY_ENTRY_SIZE + 1, usize::MAX / 4] {
            let opts = FormatOptions::new().with_directory_entries(*entries);
            let result = FileSystem::format(create_test_device(64), opts);
            assert!(matches!(result, Err(FsError::InvalidArgument(_))));
        }
    }

    #[test]
    fn unformatted_device_fails_to_mount() {
        let result = FileSystem::mount(create_test_device(64));
        assert!(matches!(result, Err(FsError::Unformatted)));
    }

    #[test]
    fn file_not_found_returns_error() {
        let mut fs = create_test_fs();
        match fs.open("/foo").unwrap_err() {
            FsError::PathComponentNotFound(name) => assert_eq!(name, "foo"),
            other => panic!("Unexpected error type {:?}", other),
        }
    }

    #[test]
    fn kind_mismatches_are_reported() {
        let mut fs = create_test_fs();
        fs.create("/plain", 10).unwrap();
        fs.create_directory("/dir").unwrap();

        assert!(matches!(fs.open("/dir"), Err(FsError::NotAFile(_))));
        assert!(matches!(fs.remove_directory("/plain"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.list("/plain"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.open("/plain/x"), Err(FsError::NotADirectory(_))));
    }

    #[test]
    fn create_builds_missing_parents() {
        let mut fs = create_test_fs();
        fs.create("/a/b/file", 20).unwrap();

        let names: Vec<String> = fs.list("/a").unwrap().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["b"]);
        assert!(fs.list("/a").unwrap()[0].is_directory());
        assert_eq!(fs.open("/a/b/file").unwrap().length(), 20);
    }

    #[test]
    fn oversized_file_is_rejected_before_any_change() {
        let mut fs = create_test_fs();
        let before = fs.bitmap().unwrap();

        let result = fs.create("/a/big", MAX_FILE_SIZE + 1);

        assert!(matches!(result, Err(FsError::FileTooLarge { .. })));
        assert_eq!(fs.bitmap().unwrap(), before);
        assert!(fs.list("/").unwrap().is_empty());
    }

    #[test]
    fn exhausted_device_leaves_bitmap_unchanged() {
        let mut fs = FileSystem::format(create_test_device(16), FormatOptions::new()).unwrap();
        let before = fs.bitmap().unwrap();

        let result = fs.create("/big", MAX_FILE_SIZE);

        assert!(matches!(result, Err(FsError::NoFreeDataBlocks)));
        assert_eq!(fs.bitmap().unwrap(), before);
        assert!(fs.list("/").unwrap().is_empty());
    }

    #[test]
    fn new_directories_start_empty_on_reused_sectors() {
        let mut fs = create_test_fs();
        fs.create("/junk", 64).unwrap();
        fs.write_file("/junk", &[0xff; 64]).unwrap();
        fs.remove("/junk").unwrap();

        // The directory reuses the sectors the file left full of 0xff.
        fs.create_directory("/fresh").unwrap();
        assert!(fs.list("/fresh").unwrap().is_empty());
    }

    #[test]
    fn new_files_start_zeroed_on_reused_sectors() {
        let mut fs = create_test_fs();
        fs.create("/a", 64).unwrap();
        fs.write_file("/a", &[0xff; 64]).unwrap();
        fs.remove("/a").unwrap();

        fs.create("/b", 64).unwrap();
        assert_eq!(fs.read_file("/b").unwrap(), vec![0; 64]);
    }

    #[test]
    fn dump_describes_nested_entries() {
        let mut fs = create_test_fs();
        fs.create("/docs/readme", 5).unwrap();
        fs.write_file("/docs/readme", b"hello").unwrap();

        let dump = fs.dump().unwrap();

        assert!(dump.contains("Bit map file header:"));
        assert!(dump.contains("Name: docs"));
        assert!(dump.contains("/docs/"));
        assert!(dump.contains("Name: readme"));
        assert!(dump.contains("hello"));
    }
}
