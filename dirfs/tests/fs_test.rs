use std::collections::BTreeSet;

use dirfs::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
use dirfs::{FileSystem, FormatOptions, FsError, DEFAULT_NUM_SECTORS};
use tempfile::NamedTempFile;

fn create_test_device(blocks: usize) -> FileBlockEmulator {
  FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
    .with_block_count(blocks)
    .build()
    .expect("Could not initialize disk emulator.")
}

fn format(entries: usize) -> FileSystem<FileBlockEmulator> {
  let opts = FormatOptions::new().with_directory_entries(entries);
  FileSystem::format(create_test_device(DEFAULT_NUM_SECTORS), opts).unwrap()
}

/// Collects every sector reachable from the root: headers and data blocks.
/// Panics if two structures claim the same sector.
fn reachable_sectors(fs: &mut FileSystem<FileBlockEmulator>) -> BTreeSet<usize> {
  let mut seen = BTreeSet::new();
  let mut pending = vec![("/".to_string(), 1usize)];
  claim(fs, &mut seen, 0);

  while let Some((path, sector)) = pending.pop() {
    claim(fs, &mut seen, sector);
    for entry in fs.list(&path).unwrap() {
      if entry.is_directory() {
        pending.push((format!("{}{}/", path, entry.name()), entry.sector()));
      } else {
        claim(fs, &mut seen, entry.sector());
      }
    }
  }
  seen
}

fn claim(fs: &mut FileSystem<FileBlockEmulator>, seen: &mut BTreeSet<usize>, sector: usize) {
  assert!(seen.insert(sector), "sector {} claimed twice", sector);
  let header = fs.header(sector).unwrap();
  for &block in header.blocks() {
    assert!(seen.insert(block as usize), "block {} claimed twice", block);
  }
}

fn assert_consistent(fs: &mut FileSystem<FileBlockEmulator>) {
  let reachable = reachable_sectors(fs);
  let used: BTreeSet<usize> = fs.bitmap().unwrap().used().collect();
  assert_eq!(used, reachable);
}

#[test]
fn can_initialize_disk_with_filesystem() {
  let tf = NamedTempFile::new().unwrap();
  let dev = FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
    .with_block_count(DEFAULT_NUM_SECTORS)
    .build()
    .unwrap();

  // Prepare the device with the file system layout.
  let mut fs = FileSystem::format(dev, FormatOptions::new()).unwrap();
  fs.create("/etc/motd", 12).unwrap();
  fs.write_file("/etc/motd", b"welcome back").unwrap();
  fs.sync().unwrap();
  drop(fs);

  // Open the file system again and verify the layout survived.
  let dev = FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
    .with_block_count(DEFAULT_NUM_SECTORS)
    .clear_medium(false)
    .build()
    .unwrap();
  let mut fs = FileSystem::mount(dev).unwrap();
  assert_eq!(fs.directory_entries(), 10);
  assert_eq!(fs.read_file("/etc/motd").unwrap(), b"welcome back");
  assert_consistent(&mut fs);
}

#[test]
fn released_device_can_be_mounted_again() {
  let mut fs = FileSystem::format(create_test_device(256), FormatOptions::new()).unwrap();
  assert_eq!(fs.num_sectors(), 256);
  fs.create_directory("/var").unwrap();
  fs.create("/var/log", 3).unwrap();
  fs.write_file("/var/log", b"ok!").unwrap();
  fs.sync().unwrap();

  let file = fs.into_device().into_file();
  let dev = FileBlockEmulatorBuilder::from(file)
    .with_block_count(256)
    .clear_medium(false)
    .build()
    .unwrap();
  let mut fs = FileSystem::mount(dev).unwrap();
  assert_eq!(fs.num_sectors(), 256);
  assert_eq!(fs.read_file("/var/log").unwrap(), b"ok!");
  assert_consistent(&mut fs);
}

#[test]
fn unformatted_blocks_fail_to_mount() {
  let result = FileSystem::mount(create_test_device(DEFAULT_NUM_SECTORS));
  assert!(matches!(result, Err(FsError::Unformatted)));
}

#[test]
fn create_open_collide_remove_scenario() {
  let mut fs = format(10);

  fs.create("/foo.txt", 200).unwrap();
  let file = fs.open("/foo.txt").unwrap();
  assert_eq!(file.length(), 200);

  assert!(matches!(fs.create("/foo.txt", 50), Err(FsError::NameCollision(_))));
  assert_eq!(fs.open("/foo.txt").unwrap().length(), 200);

  fs.remove("/foo.txt").unwrap();
  assert!(matches!(fs.open("/foo.txt"), Err(FsError::PathComponentNotFound(_))));
  assert_consistent(&mut fs);
}

#[test]
fn bitmap_matches_live_headers_after_mixed_operations() {
  let mut fs = format(10);

  fs.create("/a/one", 300).unwrap();
  fs.create("/a/two", 0).unwrap();
  fs.create_directory("/a/sub").unwrap();
  fs.create("/a/sub/three", 1000).unwrap();
  fs.create("/top", 129).unwrap();
  assert_consistent(&mut fs);

  fs.remove("/a/one").unwrap();
  fs.create("/a/four", 77).unwrap();
  assert_consistent(&mut fs);

  fs.remove_directory("/a/sub").unwrap();
  assert_consistent(&mut fs);
}

#[test]
fn file_and_directory_may_share_a_name() {
  let mut fs = format(10);

  fs.create("/same", 10).unwrap();
  fs.create_directory("/same").unwrap();
  fs.create("/same/inner", 10).unwrap();

  assert_eq!(fs.list("/").unwrap().len(), 2);
  assert_eq!(fs.open("/same").unwrap().length(), 10);
  assert!(matches!(fs.create_directory("/same"), Err(FsError::NameCollision(_))));

  fs.remove_directory("/same").unwrap();
  assert_eq!(fs.open("/same").unwrap().length(), 10);
  assert_consistent(&mut fs);
}

#[test]
fn full_directory_rejects_one_more_entry() {
  let mut fs = format(3);
  fs.create("/a", 1).unwrap();
  fs.create("/b", 1).unwrap();
  fs.create_directory("/c").unwrap();
  let before = fs.list("/").unwrap();
  let free_before = fs.bitmap().unwrap();

  assert!(matches!(fs.create("/d", 1), Err(FsError::DirectoryFull)));
  assert!(matches!(fs.create_directory("/e"), Err(FsError::DirectoryFull)));

  assert_eq!(fs.list("/").unwrap(), before);
  assert_eq!(fs.bitmap().unwrap(), free_before);
}

#[test]
fn removing_a_tree_frees_every_sector() {
  let mut fs = format(10);
  let baseline = fs.bitmap().unwrap();

  fs.create_directory("/a").unwrap();
  fs.create_directory("/a/b").unwrap();
  fs.create_directory("/a/b/c").unwrap();
  fs.create("/a/b/c/file", 700).unwrap();
  fs.write_file("/a/b/c/file", &[7; 700]).unwrap();
  fs.create("/keep", 10).unwrap();
  let keep = fs.open("/keep").unwrap();

  fs.remove_directory("/a").unwrap();

  let names: Vec<String> = fs.list("/").unwrap().iter().map(|e| e.name()).collect();
  assert_eq!(names, vec!["keep"]);
  let mut expected = baseline;
  expected.mark(keep.sector());
  for &block in keep.header().blocks() {
    expected.mark(block as usize);
  }
  assert_eq!(fs.bitmap().unwrap(), expected);
  assert!(matches!(fs.open("/a/b/c/file"), Err(FsError::PathComponentNotFound(_))));
  assert_consistent(&mut fs);
}

#[test]
fn missing_components_fail_without_mutation() {
  let mut fs = format(10);
  fs.create("/a/c", 10).unwrap();
  let device_before = fs.bitmap().unwrap();
  let listing_before = fs.list("/a").unwrap();

  assert!(matches!(fs.open("/a/missing/c"), Err(FsError::PathComponentNotFound(_))));
  assert!(matches!(fs.remove("/a/missing/c"), Err(FsError::PathComponentNotFound(_))));
  assert!(matches!(
    fs.remove_directory("/a/missing"),
    Err(FsError::PathComponentNotFound(_))
  ));
  assert!(matches!(fs.list("/a/missing"), Err(FsError::PathComponentNotFound(_))));

  assert_eq!(fs.bitmap().unwrap(), device_before);
  assert_eq!(fs.list("/a").unwrap(), listing_before);
}

#[test]
fn file_io_through_handles_is_clipped_to_length() {
  let mut fs = format(10);
  fs.create("/log", 150).unwrap();
  let mut file = fs.open("/log").unwrap();

  assert_eq!(fs.write(&mut file, &[b'x'; 100]).unwrap(), 100);
  assert_eq!(fs.write(&mut file, &[b'y'; 100]).unwrap(), 50);
  file.seek(95);
  let mut buf = [0; 10];
  assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 10);
  assert_eq!(&buf, b"xxxxxyyyyy");

  let mut tail = [0; 10];
  assert_eq!(fs.read_at(&file, &mut tail, 145).unwrap(), 5);
  assert_eq!(fs.write_at(&file, b"zz", 148).unwrap(), 2);
  assert_eq!(&fs.read_file("/log").unwrap()[145..], b"yyyzz");
}

#[test]
fn free_sector_count_returns_to_baseline() {
  let mut fs = format(10);
  let baseline = fs.free_sectors().unwrap();

  fs.create("/x/y/z", 2000).unwrap();
  assert!(fs.free_sectors().unwrap() < baseline);

  fs.remove_directory("/x").unwrap();
  assert_eq!(fs.free_sectors().unwrap(), baseline);
}
