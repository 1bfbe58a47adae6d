//! Archive engine
//!
//! Owns one storage backend and one allocator, maintains the root node and
//! the current-directory cursor, and implements every path-based operation.
//! This is the only module that knows the on-disk struct layouts.
//!
//! Directory nodes are value copies read from storage, not live references.
//! The header's embedded root and the cursor node are the two long-lived
//! in-memory mirrors; [`Archive::write_directory`] re-synchronizes them
//! whenever a node is written back to a matching offset.

use crate::allocator::{Allocator, WORD_BITS};
use crate::directory::{ArchiveDirectory, ArchiveEntry, EntryKind, DIRECTORY_SIZE};
use crate::error::{ArchiveError, Result};
use crate::header::{ArchiveHeader, ALLOCATION_TABLE_WORDS, HEADER_SIZE, ROOT_OFFSET};
use crate::layout::{self, normalize_path, parent_and_leaf, split_components};
use crate::store::{ArchiveStore, CompressedStore, OpenMode};
use std::io::SeekFrom;
use std::path::Path;
use tracing::debug;

/// Single-file archive container
///
/// Single-threaded and synchronous; exactly one writer is assumed. Opening
/// the same file through two engine instances at once is not arbitrated.
/// With the default compressed backend, mutations live in memory until
/// [`Archive::close`] writes the file back in one pass.
pub struct Archive {
    store: Box<dyn ArchiveStore>,
    mode: OpenMode,
    header: ArchiveHeader,
    allocator: Allocator,
    /// In-memory copy of the node the cursor points at.
    current_dir: ArchiveDirectory,
    current_dir_offset: u32,
    current_path: String,
}

/// Where an entry lives: the chain node holding it and its slot index.
struct EntryLocation {
    node_offset: u32,
    node: ArchiveDirectory,
    index: usize,
}

impl EntryLocation {
    fn entry(&self) -> &ArchiveEntry {
        &self.node.entries()[self.index]
    }
}

/// Space usage snapshot
#[derive(Debug, Clone, Copy)]
pub struct ArchiveStats {
    pub allocation_size: u32,
    pub total_units: u32,
    pub used_units: u32,
    pub free_units: u32,
}

impl Archive {
    /// Create a new archive file and open it read-write.
    pub fn create<P: AsRef<Path>>(path: P, allocation_size: u32) -> Result<Self> {
        let header = ArchiveHeader::new(allocation_size)?;

        let mut store = CompressedStore::open(&path, OpenMode::WriteOnly)?;
        store.write(&header.to_bytes())?;
        store.close()?;

        Self::open(path, false)
    }

    /// Open an existing archive through the compressed backend.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let mode = if read_only {
            OpenMode::ReadOnly
        } else {
            OpenMode::ReadWrite
        };

        let store = CompressedStore::open(path, mode)?;
        Self::with_store(Box::new(store))
    }

    /// Open an archive over an arbitrary storage backend.
    ///
    /// The backends are interchangeable; nothing below this point depends
    /// on which one is active.
    pub fn with_store(mut store: Box<dyn ArchiveStore>) -> Result<Self> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        store.seek(SeekFrom::Start(0))?;
        store.read(&mut bytes)?;

        let header = ArchiveHeader::from_bytes(&bytes)?;
        let allocator = Allocator::new(header.allocation_size, HEADER_SIZE as u32);
        let current_dir = header.root.clone();

        Ok(Archive {
            mode: store.mode(),
            store,
            header,
            allocator,
            current_dir,
            current_dir_offset: ROOT_OFFSET,
            current_path: "/".to_string(),
        })
    }

    /// Close the archive. With the compressed backend this is the moment
    /// the file is written back to disk; dropping without closing loses
    /// unpersisted changes.
    pub fn close(mut self) -> Result<()> {
        self.store.close()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn allocation_size(&self) -> u32 {
        self.header.allocation_size
    }

    pub fn stats(&self) -> ArchiveStats {
        let total_units = ALLOCATION_TABLE_WORDS as u32 * WORD_BITS;
        let used_units = Allocator::used_sectors(&self.header.allocation_table);

        ArchiveStats {
            allocation_size: self.header.allocation_size,
            total_units,
            used_units,
            free_units: total_units - used_units,
        }
    }

    /// Create a directory at `path`; all but the last component must exist.
    pub fn create_directory(&mut self, path: &str) -> Result<()> {
        self.check_write()?;

        let (parent_path, leaf) = parent_and_leaf(path)?;
        layout::encode_name(&leaf)?;

        let (parent_offset, parent) = self.resolve_dir(&parent_path)?;
        if self.chain_find(parent_offset, &parent, &leaf)?.is_some() {
            return Err(ArchiveError::AlreadyExists(path.to_string()));
        }

        let (node_offset, mut node) = self.node_with_capacity(parent_offset, parent)?;

        let child_offset = self.alloc(DIRECTORY_SIZE as u32)?;
        let child = ArchiveDirectory::new(node_offset);

        node.add_entry(ArchiveEntry::directory(&leaf, child_offset)?)?;
        self.write_directory(node_offset, &node)?;
        self.write_directory(child_offset, &child)?;
        self.store.flush()?;

        debug!(path, offset = child_offset, "created directory");
        Ok(())
    }

    /// Create a file at `path` with the given content.
    pub fn create_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.check_write()?;

        let (parent_path, leaf) = parent_and_leaf(path)?;
        layout::encode_name(&leaf)?;

        let (parent_offset, parent) = self.resolve_dir(&parent_path)?;
        if self.chain_find(parent_offset, &parent, &leaf)?.is_some() {
            return Err(ArchiveError::AlreadyExists(path.to_string()));
        }

        let (node_offset, mut node) = self.node_with_capacity(parent_offset, parent)?;

        let size = data.len() as u32;
        let payload_offset = self.alloc(size)?;

        node.add_entry(ArchiveEntry::file(&leaf, payload_offset, size)?)?;
        self.write_directory(node_offset, &node)?;

        self.store.seek(SeekFrom::Start(payload_offset as u64))?;
        self.store.write(data)?;
        self.store.flush()?;

        debug!(path, size, offset = payload_offset, "created file");
        Ok(())
    }

    /// Change the current-directory cursor and normalize the textual path.
    pub fn set_current_directory(&mut self, path: &str) -> Result<()> {
        self.check_read()?;

        let (offset, dir) = self.resolve_dir(path)?;
        self.current_dir_offset = offset;
        self.current_dir = dir;

        if path.starts_with('/') {
            self.current_path = path.to_string();
        } else {
            self.current_path.push_str(path);
            self.current_path.push('/');
        }
        self.current_path = normalize_path(&self.current_path);

        Ok(())
    }

    pub fn current_directory(&self) -> &str {
        &self.current_path
    }

    /// Entry names of a directory, in on-disk order across the whole
    /// overflow chain.
    pub fn list_directory(&mut self, path: &str) -> Result<Vec<String>> {
        self.check_read()?;

        let (_, mut dir) = self.resolve_dir(path)?;
        let mut names = Vec::new();

        loop {
            names.extend(dir.entries().iter().map(|e| e.name()));
            if dir.next == 0 {
                break;
            }
            dir = self.read_directory(dir.next)?;
        }

        Ok(names)
    }

    /// Byte size recorded in the entry at `path`. For a directory entry
    /// this is the size of one directory node.
    pub fn file_size(&mut self, path: &str) -> Result<u32> {
        self.check_read()?;
        Ok(self.locate_entry(path)?.entry().size)
    }

    /// Read a file into a caller-supplied buffer.
    ///
    /// A buffer smaller than the file is a hard error; a larger buffer has
    /// its unused tail zero-filled. Returns the file size.
    pub fn read_file_into(&mut self, path: &str, buffer: &mut [u8]) -> Result<usize> {
        self.check_read()?;

        let location = self.locate_entry(path)?;
        let entry = *location.entry();
        if entry.kind != EntryKind::File {
            return Err(ArchiveError::NotAFile(path.to_string()));
        }

        let size = entry.size as usize;
        if buffer.len() < size {
            return Err(ArchiveError::InsufficientBuffer {
                have: buffer.len(),
                need: size,
            });
        }

        self.store.seek(SeekFrom::Start(entry.offset as u64))?;
        self.store.read(&mut buffer[..size])?;
        buffer[size..].fill(0);

        Ok(size)
    }

    /// Read a file into a freshly sized buffer.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        self.check_read()?;

        let size = self.file_size(path)?;
        let mut buffer = vec![0u8; size as usize];
        self.read_file_into(path, &mut buffer)?;
        Ok(buffer)
    }

    /// Replace a file's content in place, reallocating its run when the
    /// size class changes.
    pub fn update_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.check_write()?;

        let location = self.locate_entry(path)?;
        let entry = *location.entry();
        if entry.kind != EntryKind::File {
            return Err(ArchiveError::NotAFile(path.to_string()));
        }

        let new_size = data.len() as u32;
        let new_offset = self.realloc(entry.offset, entry.size, new_size)?;

        self.store.seek(SeekFrom::Start(new_offset as u64))?;
        self.store.write(data)?;

        let EntryLocation {
            node_offset,
            mut node,
            index,
        } = location;
        node.entries[index].offset = new_offset;
        node.entries[index].size = new_size;
        self.write_directory(node_offset, &node)?;
        self.store.flush()?;

        debug!(path, size = new_size, offset = new_offset, "updated file");
        Ok(())
    }

    /// Remove a file: drop its entry from the owning chain node and free
    /// its payload run.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        self.check_write()?;

        let location = self.locate_entry(path)?;
        let entry = *location.entry();
        if entry.kind != EntryKind::File {
            return Err(ArchiveError::NotAFile(path.to_string()));
        }

        let EntryLocation {
            node_offset,
            mut node,
            index,
        } = location;
        node.remove_entry(index)?;
        self.write_directory(node_offset, &node)?;

        self.release(entry.offset, entry.size)?;
        self.store.flush()?;

        debug!(path, "removed file");
        Ok(())
    }

    /// Remove an empty directory: free its whole node chain and drop its
    /// entry from the parent. The current directory cannot be removed.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.check_write()?;

        let location = self.locate_entry(path)?;
        let entry = *location.entry();
        if entry.kind != EntryKind::Directory {
            return Err(ArchiveError::NotADirectory(path.to_string()));
        }
        if entry.offset == self.current_dir_offset {
            return Err(ArchiveError::InvalidPath(format!(
                "{} is the current directory",
                path
            )));
        }

        // Emptiness must hold across the whole overflow chain.
        let mut chain = Vec::new();
        let mut offset = entry.offset;
        while offset != 0 {
            let node = self.read_directory(offset)?;
            if !node.is_empty() {
                return Err(ArchiveError::DirectoryNotEmpty(path.to_string()));
            }
            chain.push(offset);
            offset = node.next;
        }

        let EntryLocation {
            node_offset,
            mut node,
            index,
        } = location;
        node.remove_entry(index)?;
        self.write_directory(node_offset, &node)?;

        for offset in chain {
            self.release(offset, DIRECTORY_SIZE as u32)?;
        }
        self.store.flush()?;

        debug!(path, "removed directory");
        Ok(())
    }

    // ---- path resolution ------------------------------------------------

    /// Resolve a path to a directory node and its byte offset.
    ///
    /// Absolute paths start at the root, relative paths at the cursor.
    /// `.` is skipped, `..` follows the node's parent, anything else is an
    /// exact name match searched across the node's overflow chain.
    fn resolve_dir(&mut self, path: &str) -> Result<(u32, ArchiveDirectory)> {
        let (mut offset, mut dir, rest) = if let Some(stripped) = path.strip_prefix('/') {
            (ROOT_OFFSET, self.header.root.clone(), stripped)
        } else {
            (self.current_dir_offset, self.current_dir.clone(), path)
        };

        for component in split_components(rest) {
            if component == "." {
                continue;
            }

            if component == ".." {
                if dir.parent == 0 {
                    return Err(ArchiveError::InvalidPath(path.to_string()));
                }
                offset = dir.parent;
                dir = self.read_directory(offset)?;
                continue;
            }

            let location = self
                .chain_find(offset, &dir, component)?
                .ok_or_else(|| ArchiveError::NotFound(component.to_string()))?;

            let entry = location.entry();
            if entry.kind != EntryKind::Directory {
                return Err(ArchiveError::NotADirectory(component.to_string()));
            }

            offset = entry.offset;
            dir = self.read_directory(offset)?;
        }

        Ok((offset, dir))
    }

    /// Locate the entry named by `path` inside its parent's overflow chain.
    fn locate_entry(&mut self, path: &str) -> Result<EntryLocation> {
        let (parent_path, leaf) = parent_and_leaf(path)?;
        let (parent_offset, parent) = self.resolve_dir(&parent_path)?;

        self.chain_find(parent_offset, &parent, &leaf)?
            .ok_or(ArchiveError::NotFound(leaf))
    }

    /// Search one logical directory (head node plus overflow chain) for an
    /// entry by exact name.
    fn chain_find(
        &mut self,
        head_offset: u32,
        head: &ArchiveDirectory,
        name: &str,
    ) -> Result<Option<EntryLocation>> {
        let mut node_offset = head_offset;
        let mut node = head.clone();

        loop {
            if let Some(index) = node.find(name) {
                return Ok(Some(EntryLocation {
                    node_offset,
                    node,
                    index,
                }));
            }

            if node.next == 0 {
                return Ok(None);
            }

            node_offset = node.next;
            node = self.read_directory(node_offset)?;
        }
    }

    /// Walk a chain to the first node with a free entry slot, allocating
    /// and linking a new overflow node when the whole chain is full.
    fn node_with_capacity(
        &mut self,
        mut node_offset: u32,
        mut node: ArchiveDirectory,
    ) -> Result<(u32, ArchiveDirectory)> {
        while !node.has_free_space() {
            if node.next != 0 {
                node_offset = node.next;
                node = self.read_directory(node_offset)?;
                continue;
            }

            let overflow_offset = self.alloc(DIRECTORY_SIZE as u32)?;
            node.next = overflow_offset;
            self.write_directory(node_offset, &node)?;

            debug!(offset = overflow_offset, "linked directory overflow node");

            // Overflow nodes of one logical directory share its parent.
            node = ArchiveDirectory::new(node.parent);
            node_offset = overflow_offset;
        }

        Ok((node_offset, node))
    }

    // ---- node and header I/O --------------------------------------------

    fn read_directory(&mut self, offset: u32) -> Result<ArchiveDirectory> {
        let mut bytes = vec![0u8; DIRECTORY_SIZE];
        self.store.seek(SeekFrom::Start(offset as u64))?;
        self.store.read(&mut bytes)?;
        ArchiveDirectory::from_bytes(&bytes, offset)
    }

    /// Write a node at its offset and re-synchronize the two long-lived
    /// in-memory mirrors when their offsets match.
    fn write_directory(&mut self, offset: u32, dir: &ArchiveDirectory) -> Result<()> {
        self.store.seek(SeekFrom::Start(offset as u64))?;
        self.store.write(&dir.to_bytes())?;

        if offset == ROOT_OFFSET {
            self.header.root = dir.clone();
        }
        if offset == self.current_dir_offset {
            self.current_dir = dir.clone();
        }

        Ok(())
    }

    /// Persist the header. Called after every allocation table mutation;
    /// the table is the single source of truth for free space.
    fn flush_header(&mut self) -> Result<()> {
        let bytes = self.header.to_bytes();
        self.store.seek(SeekFrom::Start(0))?;
        self.store.write(&bytes)?;
        Ok(())
    }

    fn alloc(&mut self, size: u32) -> Result<u32> {
        let offset = self
            .allocator
            .allocate(&mut self.header.allocation_table, size)?;
        self.flush_header()?;
        Ok(offset)
    }

    fn release(&mut self, offset: u32, size: u32) -> Result<()> {
        self.allocator
            .free(&mut self.header.allocation_table, offset, size);
        self.flush_header()
    }

    fn realloc(&mut self, offset: u32, old_size: u32, new_size: u32) -> Result<u32> {
        let new_offset = {
            let Archive {
                ref mut store,
                ref mut header,
                ref allocator,
                ..
            } = *self;

            allocator.reallocate(
                &mut header.allocation_table,
                offset,
                old_size,
                new_size,
                |old, new, size| copy_range(store.as_mut(), old, new, size),
            )?
        };

        self.flush_header()?;
        Ok(new_offset)
    }

    fn check_read(&self) -> Result<()> {
        if !self.mode.readable() {
            return Err(ArchiveError::NotReadable);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if !self.mode.writable() {
            return Err(ArchiveError::NotWritable);
        }
        Ok(())
    }
}

/// Copy a byte range between two offsets of a store. Used when a
/// reallocation has to move an allocation; the allocator itself never
/// performs I/O.
fn copy_range(store: &mut dyn ArchiveStore, old: u32, new: u32, size: u32) -> Result<()> {
    let mut data = vec![0u8; size as usize];

    store.seek(SeekFrom::Start(old as u64))?;
    store.read(&mut data)?;
    store.seek(SeekFrom::Start(new as u64))?;
    store.write(&data)?;

    Ok(())
}
