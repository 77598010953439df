//! # Memory Module
//!
//! Byte level access to the storage behind the variables of the explored program.
//!
//! A [`MemoryClient`] reads and writes raw bytes at absolute addresses, as reported by the
//! debug info. Every client carries a signed base offset that is subtracted from each address
//! before the I/O happens (see [`Addr::translate`]). This is how a static address of an
//! executable is mapped to an offset in a memory dump, or to the load address of a relocated
//! process.
//!
//! Two clients are provided:
//!
//! * [`FileClient`] works on a file, like a memory dump or a flash image
//! * [`ProcessClient`] works on the memory of a running process through `/proc/<pid>/mem`

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

use nix::unistd::Pid;
use tracing::{debug, trace};

use crate::addr::Addr;
use crate::errors::{ExplorerError, Result};

/// Memory client shared between the explorer and the variable proxies reading through it
pub type SharedClient = Rc<RefCell<dyn MemoryClient>>;

/// Address based byte I/O against a backing store
pub trait MemoryClient {
    /// Reads exactly `size` bytes at `addr`
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::ShortRead`] if fewer bytes are available, or with the
    /// error of the underlying I/O.
    fn read(&mut self, addr: Addr, size: usize) -> Result<Vec<u8>>;

    /// Writes all of `data` at `addr`
    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<()>;

    /// Sets the base offset subtracted from all following addresses
    fn set_offset(&mut self, offset: i64);

    fn offset(&self) -> i64;
}

fn read_exactly(source: &mut impl Read, size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(size);
    source.take(size as u64).read_to_end(&mut buf)?;
    if buf.len() != size {
        return Err(ExplorerError::ShortRead {
            expected: size,
            got: buf.len(),
        });
    }
    Ok(buf)
}

/// Memory client backed by a regular file
///
/// Writes past the end of the file extend it.
#[derive(Debug)]
pub struct FileClient {
    file: File,
    offset: i64,
}

impl FileClient {
    /// Opens an existing file for reading and writing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening memory file {}", path.display());
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self::from_file(file))
    }

    /// Creates a new, empty file, truncating it if it exists
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: File) -> Self {
        Self { file, offset: 0 }
    }
}

impl MemoryClient for FileClient {
    fn read(&mut self, addr: Addr, size: usize) -> Result<Vec<u8>> {
        let position = addr.translate(self.offset)?;
        trace!("reading {size} bytes at {addr} (file position {position:#x})");
        self.file.seek(SeekFrom::Start(position))?;
        read_exactly(&mut self.file, size)
    }

    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<()> {
        let position = addr.translate(self.offset)?;
        trace!("writing {} bytes at {addr} (file position {position:#x})", data.len());
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    fn offset(&self) -> i64 {
        self.offset
    }
}

/// Memory client for a running process
///
/// Memory is accessed through `/proc/<pid>/mem`, which requires the same permissions as
/// attaching a debugger to the process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessClient {
    pid: Pid,
    offset: i64,
}

impl ProcessClient {
    /// Creates a client for the process with `pid`
    ///
    /// # Errors
    ///
    /// Fails with [`ExplorerError::Os`] if there is no such process.
    pub fn new(pid: Pid) -> Result<Self> {
        // ESRCH if the process does not exist
        nix::unistd::getpgid(Some(pid))?;
        Ok(Self { pid, offset: 0 })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Gets the start of the first mapping in the process's address space
    pub fn base_addr(&self) -> Result<Addr> {
        let maps = proc_maps::get_process_maps(self.pid.into())?;
        let first = maps.first().ok_or_else(|| {
            ExplorerError::NotFound(format!("memory map of process {}", self.pid))
        })?;
        Ok(Addr::from(first.start()))
    }

    fn mem_file(&self, write: bool) -> Result<File> {
        Ok(File::options()
            .read(!write)
            .write(write)
            .open(format!("/proc/{}/mem", self.pid))?)
    }
}

impl MemoryClient for ProcessClient {
    fn read(&mut self, addr: Addr, size: usize) -> Result<Vec<u8>> {
        let position = addr.translate(self.offset)?;
        trace!("reading {size} bytes at {addr} of process {}", self.pid);
        let mut file = self.mem_file(false)?;
        file.seek(SeekFrom::Start(position))?;
        read_exactly(&mut file, size)
    }

    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<()> {
        let position = addr.translate(self.offset)?;
        trace!("writing {} bytes at {addr} of process {}", data.len(), self.pid);
        let mut file = self.mem_file(true)?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(data)?;
        Ok(())
    }

    fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    fn offset(&self) -> i64 {
        self.offset
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    fn client() -> (NamedTempFile, FileClient) {
        let tmp = NamedTempFile::new().unwrap();
        let client = FileClient::open(tmp.path()).unwrap();
        (tmp, client)
    }

    #[test]
    fn test_file_read_write() {
        let (_tmp, mut c) = client();
        c.write(Addr::from(0u64), &[0xfe, 0xed, 0xbe, 0xef]).unwrap();
        assert_eq!(c.read(Addr::from(0u64), 2).unwrap(), [0xfe, 0xed]);
        assert_eq!(c.read(Addr::from(2u64), 2).unwrap(), [0xbe, 0xef]);

        // not enough bytes in the file yet
        let err = c.read(Addr::from(2u64), 10).unwrap_err();
        assert!(matches!(
            err,
            ExplorerError::ShortRead {
                expected: 10,
                got: 2
            }
        ));

        c.write(Addr::from(4u64), &[0; 8]).unwrap();
        let mut expected = vec![0xfe, 0xed, 0xbe, 0xef];
        expected.extend([0; 8]);
        assert_eq!(c.read(Addr::from(0u64), 12).unwrap(), expected);

        c.write(Addr::from(1u64), &[0, 0]).unwrap();
        assert_eq!(c.read(Addr::from(0u64), 2).unwrap(), [0xfe, 0x00]);
    }

    #[test]
    fn test_file_offset() {
        let (_tmp, mut c) = client();
        c.write(Addr::from(0u64), b"hello world").unwrap();
        c.set_offset(0x1000);
        assert_eq!(c.offset(), 0x1000);
        assert_eq!(c.read(Addr::from(0x1006u64), 5).unwrap(), b"world");

        let err = c.read(Addr::from(0x10u64), 1).unwrap_err();
        assert!(matches!(err, ExplorerError::NegativeAddress(_, 0x1000)));

        // negative offsets move addresses up
        c.set_offset(-6);
        assert_eq!(c.read(Addr::from(0u64), 5).unwrap(), b"world");
    }

    #[test]
    fn test_file_write_extends() {
        let (tmp, mut c) = client();
        c.write(Addr::from(4u64), &[1, 2]).unwrap();
        assert_eq!(std::fs::read(tmp.path()).unwrap(), [0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_process_client_self() {
        let value: u64 = 0xdead_beef_cafe_babe;
        let addr = Addr::from(&value as *const u64 as usize);
        let mut c = ProcessClient::new(nix::unistd::getpid()).unwrap();

        match c.read(addr, 8) {
            Ok(bytes) => assert_eq!(bytes, value.to_ne_bytes()),
            // hardened kernels may forbid reading our own memory this way
            Err(ExplorerError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied)
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(c.base_addr().unwrap() > Addr::NULL);
    }
}
