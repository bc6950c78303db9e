use clap::{Parser, Subcommand};
use dirfs::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
use dirfs::{FileSystem, FormatOptions, DEFAULT_DIRECTORY_ENTRIES, DEFAULT_NUM_SECTORS, SECTOR_SIZE};
use eyre::{ensure, Result, WrapErr};
use log::trace;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(about = "Inspect and modify dirfs disk images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a disk image holding an empty file system.
    Format {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(short = 's', long, default_value_t = DEFAULT_NUM_SECTORS)]
        sectors: usize,
        #[arg(short = 'e', long, default_value_t = DEFAULT_DIRECTORY_ENTRIES)]
        entries: usize,
    },
    /// Create a directory, including missing parents.
    Mkdir {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        path: PathBuf,
    },
    /// Create a zero filled file of a fixed size.
    Touch {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        path: PathBuf,
        #[arg(short = 's', long, default_value_t = 0)]
        size: usize,
    },
    /// Copy a host file into the image.
    Put {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        source: PathBuf,
        #[arg(index = 3)]
        path: PathBuf,
    },
    /// Print a file to stdout.
    Cat {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        path: PathBuf,
    },
    /// Remove a file.
    Rm {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        path: PathBuf,
    },
    /// Remove a directory and everything below it.
    Rmdir {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2)]
        path: PathBuf,
    },
    /// List one directory.
    Ls {
        #[arg(index = 1)]
        image: PathBuf,
        #[arg(index = 2, default_value = "/")]
        path: PathBuf,
    },
    /// Print the bitmap, every directory and every file header.
    Dump {
        #[arg(index = 1)]
        image: PathBuf,
    },
}

fn format_image(image: &Path, sectors: usize, entries: usize) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)
        .wrap_err_with(|| format!("Failed to create image {:?}", image))?;
    let dev = FileBlockEmulatorBuilder::from(file)
        .with_block_count(sectors)
        .build()?;
    let mut sfs = FileSystem::format(dev, FormatOptions::new().with_directory_entries(entries))?;
    sfs.sync()?;
    Ok(())
}

fn mount_image(image: &Path) -> Result<FileSystem<FileBlockEmulator>> {
    let len = fs::metadata(image)
        .wrap_err_with(|| format!("Failed to stat image {:?}", image))?
        .len() as usize;
    ensure!(
        len > 0 && len % SECTOR_SIZE == 0,
        "{:?} is not a whole number of {} byte sectors",
        image,
        SECTOR_SIZE
    );
    trace!("opening {:?} with {} sectors", image, len / SECTOR_SIZE);
    let dev = FileBlockEmulator::open_disk(image, len / SECTOR_SIZE)?;
    FileSystem::mount(dev).wrap_err("Failed to mount image")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
    trace!("Starting up dirfs cli");

    match cli.command {
        Command::Format {
            image,
            sectors,
            entries,
        } => format_image(&image, sectors, entries)?,
        Command::Mkdir { image, path } => {
            let mut sfs = mount_image(&image)?;
            sfs.create_directory(&path)
                .wrap_err_with(|| format!("Failed to create directory {:?}", path))?;
            sfs.sync()?;
        }
        Command::Touch { image, path, size } => {
            let mut sfs = mount_image(&image)?;
            sfs.create(&path, size)
                .wrap_err_with(|| format!("Failed to create {:?}", path))?;
            sfs.sync()?;
        }
        Command::Put {
            image,
            source,
            path,
        } => {
            let data = fs::read(&source).wrap_err_with(|| format!("Failed to read {:?}", source))?;
            let mut sfs = mount_image(&image)?;
            sfs.create(&path, data.len())
                .wrap_err_with(|| format!("Failed to create {:?}", path))?;
            let written = sfs.write_file(&path, &data)?;
            ensure!(written == data.len(), "Short write to {:?}", path);
            sfs.sync()?;
        }
        Command::Cat { image, path } => {
            let mut sfs = mount_image(&image)?;
            let data = sfs
                .read_file(&path)
                .wrap_err_with(|| format!("Failed to read {:?}", path))?;
            std::io::stdout().write_all(&data)?;
        }
        Command::Rm { image, path } => {
            let mut sfs = mount_image(&image)?;
            sfs.remove(&path)
                .wrap_err_with(|| format!("Failed to remove {:?}", path))?;
            sfs.sync()?;
        }
        Command::Rmdir { image, path } => {
            let mut sfs = mount_image(&image)?;
            sfs.remove_directory(&path)
                .wrap_err_with(|| format!("Failed to remove directory {:?}", path))?;
            sfs.sync()?;
        }
        Command::Ls { image, path } => {
            let mut sfs = mount_image(&image)?;
            for entry in sfs.list(&path)? {
                if entry.is_directory() {
                    println!("{}/", entry.name());
                } else {
                    println!("{}", entry.name());
                }
            }
        }
        Command::Dump { image } => {
            let mut sfs = mount_image(&image)?;
            print!("{}", sfs.dump()?);
        }
    }
    Ok(())
}
