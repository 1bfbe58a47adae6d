//! Archive header
//!
//! The header occupies the first [`HEADER_SIZE`] bytes of the archive and
//! is the single source of truth for free space: it carries the magic tag,
//! the allocation unit size, the allocation table bitmap, and the root
//! directory node stored inline. The allocation base (the first byte the
//! allocator may hand out) starts immediately after the header.

use crate::directory::{ArchiveDirectory, DIRECTORY_SIZE};
use crate::error::{ArchiveError, Result};
use crate::layout;

/// Magic tag of an archive ("ARCH" in a hex dump).
pub const ARCHIVE_MAGIC: u32 = layout::tag(b"ARCH");

/// Words in the allocation table. Each word tracks 32 allocation units,
/// so an archive may hold up to 32768 allocations units.
pub const ALLOCATION_TABLE_WORDS: usize = 1024;

/// Default allocation unit size in bytes.
pub const DEFAULT_ALLOCATION_SIZE: u32 = 4096;

/// Serialized size of the header: magic + unit size + table + root node.
pub const HEADER_SIZE: usize = 8 + ALLOCATION_TABLE_WORDS * 4 + DIRECTORY_SIZE;

/// Byte offset of the inline root directory node.
pub const ROOT_OFFSET: u32 = (8 + ALLOCATION_TABLE_WORDS * 4) as u32;

/// Archive header (offset 0)
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub magic: u32,

    /// Bytes per allocation unit.
    pub allocation_size: u32,

    /// One bit per allocation unit; 1 = in use.
    pub allocation_table: [u32; ALLOCATION_TABLE_WORDS],

    /// Root directory node, stored inline rather than by reference.
    pub root: ArchiveDirectory,
}

impl ArchiveHeader {
    pub fn new(allocation_size: u32) -> Result<Self> {
        if allocation_size == 0 {
            return Err(ArchiveError::InvalidAllocationSize(allocation_size));
        }

        Ok(ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            allocation_size,
            allocation_table: [0; ALLOCATION_TABLE_WORDS],
            root: ArchiveDirectory::new(0),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.allocation_size.to_le_bytes());

        for word in &self.allocation_table {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        bytes.extend_from_slice(&self.root.to_bytes());
        bytes
    }

    /// Parse a header. A wrong archive magic means the file is not an
    /// archive at all; a wrong root magic means it is corrupted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "insufficient bytes for header",
            )));
        }

        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        if word(0) != ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }

        let allocation_size = word(4);
        if allocation_size == 0 {
            return Err(ArchiveError::InvalidAllocationSize(allocation_size));
        }

        let mut allocation_table = [0u32; ALLOCATION_TABLE_WORDS];
        for (i, slot) in allocation_table.iter_mut().enumerate() {
            *slot = word(8 + i * 4);
        }

        let root = ArchiveDirectory::from_bytes(&bytes[ROOT_OFFSET as usize..], ROOT_OFFSET)?;

        Ok(ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            allocation_size,
            allocation_table,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(ROOT_OFFSET, 4104);
        assert_eq!(HEADER_SIZE, 4824);
        assert_eq!(ARCHIVE_MAGIC.to_le_bytes(), *b"ARCH");
    }

    #[test]
    fn test_new_header() {
        let header = ArchiveHeader::new(DEFAULT_ALLOCATION_SIZE).unwrap();
        assert_eq!(header.magic, ARCHIVE_MAGIC);
        assert_eq!(header.allocation_size, 4096);
        assert_eq!(header.root.parent, 0);
        assert_eq!(header.root.num_entries, 0);
        assert!(header.allocation_table.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_zero_allocation_size_rejected() {
        assert!(matches!(
            ArchiveHeader::new(0),
            Err(ArchiveError::InvalidAllocationSize(0))
        ));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut header = ArchiveHeader::new(512).unwrap();
        header.allocation_table[0] = 0b1011;
        header.allocation_table[1023] = 0xDEAD_BEEF;
        header.root.next = 7777;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], b"ARCH");
        assert_eq!(&bytes[ROOT_OFFSET as usize..ROOT_OFFSET as usize + 4], b"DIR ");

        let parsed = ArchiveHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.allocation_size, 512);
        assert_eq!(parsed.allocation_table[0], 0b1011);
        assert_eq!(parsed.allocation_table[1023], 0xDEAD_BEEF);
        assert_eq!(parsed.root.next, 7777);
    }

    #[test]
    fn test_invalid_magic() {
        let header = ArchiveHeader::new(4096).unwrap();
        let mut bytes = header.to_bytes();
        bytes[..4].copy_from_slice(b"NOPE");

        assert!(matches!(
            ArchiveHeader::from_bytes(&bytes),
            Err(ArchiveError::InvalidMagic)
        ));
    }

    #[test]
    fn test_corrupted_root() {
        let header = ArchiveHeader::new(4096).unwrap();
        let mut bytes = header.to_bytes();
        bytes[ROOT_OFFSET as usize] = 0;

        assert!(matches!(
            ArchiveHeader::from_bytes(&bytes),
            Err(ArchiveError::CorruptedDirectory(_))
        ));
    }
}
