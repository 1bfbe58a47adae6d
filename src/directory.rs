//! Directory nodes and entries
//!
//! A logical directory is a singly-linked chain of fixed-size physical
//! nodes. Each node holds up to [`ENTRY_CAPACITY`] entries and references
//! its parent node and its overflow continuation by byte offset; all nodes
//! of one chain share the same parent. Nodes are read from storage as
//! independent value copies, never as live references.

use crate::error::{ArchiveError, Result};
use crate::layout::{self, NAME_LEN};

/// Magic tag of a directory node ("DIR " in a hex dump).
pub const DIRECTORY_MAGIC: u32 = layout::tag(b"DIR ");

/// Entries per physical directory node.
pub const ENTRY_CAPACITY: usize = 16;

/// Serialized size of one entry: name + offset + size + kind.
pub const ENTRY_SIZE: usize = NAME_LEN + 4 + 4 + 4;

/// Serialized size of one directory node.
pub const DIRECTORY_SIZE: usize = 16 + ENTRY_CAPACITY * ENTRY_SIZE;

/// Kind tag of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntryKind {
    Directory = 0,
    File = 1,
}

impl EntryKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(EntryKind::Directory),
            1 => Some(EntryKind::File),
            _ => None,
        }
    }
}

/// A named reference to a file or nested directory
///
/// A directory entry's `size` always equals [`DIRECTORY_SIZE`] (the node it
/// points at, not its children); a file entry's `size` is the payload
/// length in bytes.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntry {
    pub name: [u8; NAME_LEN],
    pub offset: u32,
    pub size: u32,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn directory(name: &str, offset: u32) -> Result<Self> {
        Ok(ArchiveEntry {
            name: layout::encode_name(name)?,
            offset,
            size: DIRECTORY_SIZE as u32,
            kind: EntryKind::Directory,
        })
    }

    pub fn file(name: &str, offset: u32, size: u32) -> Result<Self> {
        Ok(ArchiveEntry {
            name: layout::encode_name(name)?,
            offset,
            size,
            kind: EntryKind::File,
        })
    }

    pub fn name(&self) -> String {
        layout::decode_name(&self.name)
    }

    pub fn is_named(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        bytes.len() < NAME_LEN
            && self.name[..bytes.len()] == *bytes
            && self.name[bytes.len()] == 0
    }

    fn empty() -> Self {
        ArchiveEntry {
            name: [0; NAME_LEN],
            offset: 0,
            size: 0,
            kind: EntryKind::Directory,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&(self.kind as u32).to_le_bytes());
    }

    fn read_from(bytes: &[u8], node_offset: u32) -> Result<Self> {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[..NAME_LEN]);

        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let kind = EntryKind::from_u32(word(NAME_LEN + 8))
            .ok_or(ArchiveError::CorruptedDirectory(node_offset))?;

        Ok(ArchiveEntry {
            name,
            offset: word(NAME_LEN),
            size: word(NAME_LEN + 4),
            kind,
        })
    }
}

/// One physical directory node
#[derive(Debug, Clone)]
pub struct ArchiveDirectory {
    pub magic: u32,
    /// Byte offset of the parent node; 0 only for the root.
    pub parent: u32,
    /// Byte offset of the overflow continuation node, 0 if none.
    pub next: u32,
    pub num_entries: u32,
    pub entries: [ArchiveEntry; ENTRY_CAPACITY],
}

impl ArchiveDirectory {
    pub fn new(parent: u32) -> Self {
        ArchiveDirectory {
            magic: DIRECTORY_MAGIC,
            parent,
            next: 0,
            num_entries: 0,
            entries: [ArchiveEntry::empty(); ENTRY_CAPACITY],
        }
    }

    pub fn has_free_space(&self) -> bool {
        (self.num_entries as usize) < ENTRY_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Live entries of this node, in on-disk order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries[..self.num_entries as usize]
    }

    pub fn add_entry(&mut self, entry: ArchiveEntry) -> Result<()> {
        if !self.has_free_space() {
            return Err(ArchiveError::DirectoryFull);
        }

        self.entries[self.num_entries as usize] = entry;
        self.num_entries += 1;
        Ok(())
    }

    /// Remove entry `n`, shifting the following entries of this node left.
    /// No compaction happens across chain nodes.
    pub fn remove_entry(&mut self, n: usize) -> Result<ArchiveEntry> {
        if n >= self.num_entries as usize {
            return Err(ArchiveError::InvalidPath(format!(
                "entry index {} out of range",
                n
            )));
        }

        let removed = self.entries[n];
        self.entries
            .copy_within(n + 1..self.num_entries as usize, n);
        self.num_entries -= 1;
        self.entries[self.num_entries as usize] = ArchiveEntry::empty();
        Ok(removed)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.is_named(name))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(DIRECTORY_SIZE);

        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.parent.to_le_bytes());
        bytes.extend_from_slice(&self.next.to_le_bytes());
        bytes.extend_from_slice(&self.num_entries.to_le_bytes());

        for entry in &self.entries {
            entry.write_to(&mut bytes);
        }

        bytes
    }

    /// Parse a node read from `offset`. The offset is only used for error
    /// reporting.
    pub fn from_bytes(bytes: &[u8], offset: u32) -> Result<Self> {
        if bytes.len() < DIRECTORY_SIZE {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "insufficient bytes for directory node",
            )));
        }

        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        if word(0) != DIRECTORY_MAGIC {
            return Err(ArchiveError::CorruptedDirectory(offset));
        }

        let num_entries = word(12);
        if num_entries as usize > ENTRY_CAPACITY {
            return Err(ArchiveError::CorruptedDirectory(offset));
        }

        let mut entries = [ArchiveEntry::empty(); ENTRY_CAPACITY];
        for (i, slot) in entries.iter_mut().enumerate().take(num_entries as usize) {
            let at = 16 + i * ENTRY_SIZE;
            *slot = ArchiveEntry::read_from(&bytes[at..at + ENTRY_SIZE], offset)?;
        }

        Ok(ArchiveDirectory {
            magic: DIRECTORY_MAGIC,
            parent: word(4),
            next: word(8),
            num_entries,
            entries,
        })
    }
}
