//! Pack a directory tree from the host filesystem into an archive.

use anyhow::{bail, Context, Result};
use archfs::{Archive, DEFAULT_ALLOCATION_SIZE};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "archfs-import", version, about = "Pack a directory into an archive file")]
struct Args {
    /// Archive file to create (overwritten if it exists)
    archive: PathBuf,

    /// Directory whose contents are imported
    directory: PathBuf,

    /// Allocation unit size in bytes
    #[arg(long, default_value_t = DEFAULT_ALLOCATION_SIZE)]
    allocation_size: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    if !args.directory.is_dir() {
        bail!("{} is not a directory", args.directory.display());
    }

    let mut archive = Archive::create(&args.archive, args.allocation_size)
        .with_context(|| format!("creating {}", args.archive.display()))?;
    let imported = import_tree(&mut archive, &args.directory)?;

    let stats = archive.stats();
    archive.close()?;

    info!(
        archive = %args.archive.display(),
        entries = imported,
        used_units = stats.used_units,
        "import finished"
    );
    Ok(())
}

/// Import the children of `dir` into the archive's current directory,
/// descending depth-first. Returns the number of entries created.
fn import_tree(archive: &mut Archive, dir: &Path) -> Result<u64> {
    let mut imported = 0u64;

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => {
                warn!(path = %path.display(), "skipping entry with non-UTF-8 name");
                continue;
            }
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            archive.create_directory(&name)?;
            archive.set_current_directory(&name)?;
            imported += 1 + import_tree(archive, &path)?;
            archive.set_current_directory("..")?;
        } else if file_type.is_file() {
            let data = std::fs::read(&path)?;
            archive.create_file(&name, &data)?;
            imported += 1;
        } else {
            warn!(path = %path.display(), "skipping special file");
        }
    }

    Ok(imported)
}
