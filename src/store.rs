//! Storage backends for archive containers
//!
//! The engine talks to one byte-addressable store through [`ArchiveStore`].
//! Two implementations exist: [`DirectStore`] maps every operation 1:1 onto
//! the underlying file, and [`CompressedStore`] holds the whole archive body
//! in memory, gunzipping it on open and gzipping it back on close.

use crate::error::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open mode for a storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenMode {
    pub fn readable(self) -> bool {
        !matches!(self, OpenMode::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// Byte-addressable random-access store
///
/// `read` copies the lesser of the requested size and the remaining bytes
/// and leaves the tail of the destination untouched; callers that need the
/// exact count must check sizes themselves.
pub trait ArchiveStore {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn read(&mut self, buffer: &mut [u8]) -> Result<()>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn tell(&self) -> u64;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn mode(&self) -> OpenMode;
}

/// Pass-through file store
///
/// No buffering beyond what the OS provides.
pub struct DirectStore {
    file: File,
    mode: OpenMode,
    position: u64,
}

impl DirectStore {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let file = match mode {
            OpenMode::ReadOnly => OpenOptions::new().read(true).open(&path)?,
            OpenMode::WriteOnly => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?,
            // The file may not exist yet; create it without truncation.
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?,
        };

        Ok(DirectStore {
            file,
            mode,
            position: 0,
        })
    }
}

impl ArchiveStore for DirectStore {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.file.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.position += buffer.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = self.file.seek(pos)?;
        Ok(self.position)
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// Whole-buffer compressed store
///
/// Open fully decompresses the file into memory (write-only mode skips
/// this); all reads and writes hit the buffer; `flush` is a no-op and data
/// only reaches disk when `close` recompresses the buffer in one pass.
/// Memory consumption is O(archive size) for the lifetime of the store.
pub struct CompressedStore {
    path: PathBuf,
    mode: OpenMode,
    buffer: Vec<u8>,
    position: usize,
    closed: bool,
}

impl CompressedStore {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Contents will be overwritten anyway.
        if mode == OpenMode::WriteOnly {
            return Ok(CompressedStore {
                path,
                mode,
                buffer: Vec::new(),
                position: 0,
                closed: false,
            });
        }

        let file = File::open(&path)?;
        let mut buffer = Vec::new();
        GzDecoder::new(file).read_to_end(&mut buffer)?;

        Ok(CompressedStore {
            path,
            mode,
            buffer,
            position: 0,
            closed: false,
        })
    }

    /// Logical size of the decompressed archive body.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl ArchiveStore for CompressedStore {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let end = self.position + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }

        self.buffer[self.position..end].copy_from_slice(data);
        self.position = end;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        let remaining = self.buffer.len().saturating_sub(self.position);
        let count = buffer.len().min(remaining);

        buffer[..count].copy_from_slice(&self.buffer[self.position..self.position + count]);
        self.position += buffer.len();
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.buffer.len() as i64 + offset,
        };

        self.position = target.max(0) as usize;

        // Seeking past the logical end extends the buffer.
        if self.position > self.buffer.len() {
            self.buffer.resize(self.position, 0);
        }

        Ok(self.position as u64)
    }

    fn tell(&self) -> u64 {
        self.position as u64
    }

    fn flush(&mut self) -> Result<()> {
        // Data reaches disk on close only.
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed || self.mode == OpenMode::ReadOnly {
            return Ok(());
        }

        let file = File::create(&self.path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&self.buffer)?;
        encoder.finish()?;

        self.closed = true;
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gzip_file(path: &Path, data: &[u8]) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_direct_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("direct.bin");

        let mut store = DirectStore::open(&path, OpenMode::ReadWrite).unwrap();
        store.write(b"hello direct").unwrap();
        store.seek(SeekFrom::Start(6)).unwrap();

        let mut buffer = [0u8; 6];
        store.read(&mut buffer).unwrap();
        assert_eq!(&buffer, b"direct");
        assert_eq!(store.tell(), 12);

        store.close().unwrap();
    }

    #[test]
    fn test_compressed_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("comp.gz");

        {
            let mut store = CompressedStore::open(&path, OpenMode::WriteOnly).unwrap();
            store.write(b"compressed body").unwrap();
            store.close().unwrap();
        }

        let mut store = CompressedStore::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(store.len(), 15);

        let mut buffer = [0u8; 15];
        store.read(&mut buffer).unwrap();
        assert_eq!(&buffer, b"compressed body");
    }

    #[test]
    fn test_compressed_store_short_read_leaves_tail() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short.gz");
        gzip_file(&path, b"abc");

        let mut store = CompressedStore::open(&path, OpenMode::ReadOnly).unwrap();
        let mut buffer = [0xFFu8; 8];
        store.read(&mut buffer).unwrap();

        assert_eq!(&buffer[..3], b"abc");
        assert_eq!(&buffer[3..], &[0xFF; 5]);
    }

    #[test]
    fn test_compressed_store_write_extends_buffer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extend.gz");

        let mut store = CompressedStore::open(&path, OpenMode::WriteOnly).unwrap();
        store.seek(SeekFrom::Start(100)).unwrap();
        store.write(b"tail").unwrap();
        assert_eq!(store.len(), 104);
        store.close().unwrap();

        let store = CompressedStore::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(store.len(), 104);
    }

    #[test]
    fn test_compressed_store_corrupt_input_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corrupt.gz");
        std::fs::write(&path, b"this is not gzip data").unwrap();

        assert!(CompressedStore::open(&path, OpenMode::ReadOnly).is_err());
    }

    #[test]
    fn test_compressed_store_readonly_close_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.gz");
        gzip_file(&path, b"original");
        let before = std::fs::read(&path).unwrap();

        let mut store = CompressedStore::open(&path, OpenMode::ReadOnly).unwrap();
        store.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_stores_are_substitutable() {
        let temp = TempDir::new().unwrap();

        let mut stores: Vec<Box<dyn ArchiveStore>> = vec![
            Box::new(DirectStore::open(temp.path().join("a.bin"), OpenMode::ReadWrite).unwrap()),
            Box::new(
                CompressedStore::open(temp.path().join("b.gz"), OpenMode::WriteOnly).unwrap(),
            ),
        ];

        for store in &mut stores {
            store.write(b"same contract").unwrap();
            store.seek(SeekFrom::Start(0)).unwrap();
            assert_eq!(store.tell(), 0);
            store.flush().unwrap();
            store.close().unwrap();
        }
    }
}
