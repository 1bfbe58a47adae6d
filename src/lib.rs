//! # archfs
//!
//! A single-file archive container with an internal directory tree and a
//! bitmap block allocator. One archive file holds a whole hierarchy of
//! named files and directories, addressable by slash-separated paths.
//!
//! ## On-disk layout
//!
//! ```text
//! +--------------------------------------------------+
//! | Header                                           |
//! |   magic "ARCH"            4 bytes                |
//! |   allocation size         4 bytes                |
//! |   allocation table        1024 x u32 bitmap      |
//! |   root directory node     720 bytes, inline      |
//! +--------------------------------------------------+  <- allocation base
//! | Allocated units: directory nodes + file payloads |
//! +--------------------------------------------------+
//! ```
//!
//! All integers are little-endian. Directory nodes hold up to 16 entries
//! and chain into overflow nodes when a directory outgrows one node. Space
//! past the header is managed in fixed-size units by a first-fit bitmap
//! allocator that can grow, shrink, and relocate allocations.
//!
//! ## Storage backends
//!
//! The engine works against the [`store::ArchiveStore`] trait. Two
//! backends ship: [`store::DirectStore`] maps operations straight onto a
//! file, [`store::CompressedStore`] keeps the whole image in memory and
//! gzips it on close. [`Archive::open`] and [`Archive::create`] use the
//! compressed backend; [`Archive::with_store`] accepts either.
//!
//! ## Example
//!
//! ```no_run
//! use archfs::Archive;
//!
//! # fn main() -> archfs::Result<()> {
//! let mut archive = Archive::create("data.arc", 4096)?;
//! archive.create_directory("/docs")?;
//! archive.create_file("/docs/readme.txt", b"hello")?;
//! assert_eq!(archive.read_file("/docs/readme.txt")?, b"hello");
//! archive.close()?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod archive;
pub mod directory;
pub mod error;
pub mod header;
pub mod layout;
pub mod store;

pub use archive::{Archive, ArchiveStats};
pub use directory::{ArchiveDirectory, ArchiveEntry, EntryKind};
pub use error::{ArchiveError, Result};
pub use header::{ArchiveHeader, DEFAULT_ALLOCATION_SIZE};
pub use store::{ArchiveStore, CompressedStore, DirectStore, OpenMode};

/// Library version, from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
