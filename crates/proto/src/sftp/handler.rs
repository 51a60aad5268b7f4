//! The server-side handler boundary.
//!
//! The dispatch loop translates each packet into an [`SftpRequest`] and
//! hands it to one of four handlers, mirroring the request shapes of
//! the protocol: reads, writes, commands, and listings. Handlers return
//! plain `io::Result`s; the dispatch loop maps failures onto status
//! replies and never tears the session down for them.

use crate::sftp::attrs::FileAttributes;
use crate::sftp::extensions::StatVfs;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;

/// What a request asks the backing filesystem to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Open for reading (OPEN with the READ flag)
    Get,
    /// Open for writing (OPEN with write-ish flags)
    Put,
    /// Apply attributes (SETSTAT / FSETSTAT)
    Setstat,
    /// Rename, failing if the target exists (v3 RENAME)
    Rename,
    /// Remove a directory
    Rmdir,
    /// Create a directory
    Mkdir,
    /// Remove a file
    Remove,
    /// Create a symbolic link
    Symlink,
    /// Create a hard link (`hardlink@openssh.com`)
    Link,
    /// Rename, overwriting the target (`posix-rename@openssh.com`)
    PosixRename,
    /// List a directory (OPENDIR / READDIR)
    List,
    /// Stat following symlinks
    Stat,
    /// Stat without following symlinks
    Lstat,
    /// Read a symlink target
    Readlink,
}

/// One filesystem request, decoded and pre-cleaned by the dispatch loop.
#[derive(Debug, Clone)]
pub struct SftpRequest {
    /// The operation
    pub method: RequestMethod,
    /// Primary path. For `Symlink` this is the link being created; for
    /// `Rename`/`PosixRename`/`Link` it is the existing path.
    pub filepath: String,
    /// Secondary path: rename/link destination, or what a symlink
    /// points at.
    pub target: Option<String>,
    /// `SSH_FXF_*` open flags for `Get`/`Put`
    pub pflags: u32,
    /// Attributes for `Put` (create mode), `Mkdir` and `Setstat`
    pub attrs: Option<FileAttributes>,
}

impl SftpRequest {
    /// A request addressing a single path.
    pub fn path(method: RequestMethod, filepath: impl Into<String>) -> Self {
        Self {
            method,
            filepath: filepath.into(),
            target: None,
            pflags: 0,
            attrs: None,
        }
    }

    /// A request addressing a source and a destination.
    pub fn with_target(
        method: RequestMethod,
        filepath: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            method,
            filepath: filepath.into(),
            target: Some(target.into()),
            pflags: 0,
            attrs: None,
        }
    }

    /// An open request with flags and creation attributes.
    pub fn open(
        method: RequestMethod,
        filepath: impl Into<String>,
        pflags: u32,
        attrs: FileAttributes,
    ) -> Self {
        Self {
            method,
            filepath: filepath.into(),
            target: None,
            pflags,
            attrs: Some(attrs),
        }
    }
}

/// Positional reader for an open file.
#[async_trait]
pub trait FileReadAt: Send + Sync {
    /// Reads up to `len` bytes at `offset`. Short reads are legal; an
    /// empty result means end of file.
    async fn read_at(&self, offset: u64, len: u32) -> io::Result<Bytes>;
}

impl std::fmt::Debug for dyn FileReadAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn FileReadAt").finish()
    }
}

/// Positional writer for an open file.
#[async_trait]
pub trait FileWriteAt: Send + Sync {
    /// Writes all of `data` at `offset`; partial writes are an error.
    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Flushes the file to stable storage (`fsync@openssh.com`).
    async fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Cursor over directory entries.
#[async_trait]
pub trait ListerAt: Send + Sync {
    /// Returns up to `max` entries starting at `offset`. An empty batch
    /// ends the iteration.
    async fn list_at(&self, offset: u64, max: usize) -> io::Result<Vec<FileInfo>>;
}

/// One directory entry as produced by a lister; the dispatch loop adds
/// the long-form listing line.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Bare name, or the link target for `Readlink`
    pub name: String,
    /// Attributes
    pub attrs: FileAttributes,
}

/// Opens files for reading.
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Called lazily on the first READ against an OPEN handle.
    async fn file_read(&self, req: &SftpRequest) -> io::Result<Box<dyn FileReadAt>>;
}

/// Opens files for writing.
#[async_trait]
pub trait FileWriter: Send + Sync {
    /// Called lazily on the first WRITE against an OPEN handle.
    async fn file_write(&self, req: &SftpRequest) -> io::Result<Box<dyn FileWriteAt>>;
}

/// Executes path commands: Setstat, Rename, Rmdir, Mkdir, Remove,
/// Symlink, Link, PosixRename.
#[async_trait]
pub trait FileCmder: Send + Sync {
    /// Runs the command described by `req`.
    async fn file_cmd(&self, req: &SftpRequest) -> io::Result<()>;

    /// Filesystem statistics for `statvfs@openssh.com`. Backends that
    /// cannot supply them keep this default.
    async fn statvfs(&self, path: &str) -> io::Result<StatVfs> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statvfs not supported by this backend",
        ))
    }
}

/// Produces listings: List, Stat, Lstat, Readlink.
#[async_trait]
pub trait FileLister: Send + Sync {
    /// Returns a cursor for `req`. Stat/Lstat/Readlink listers yield a
    /// single entry.
    async fn file_list(&self, req: &SftpRequest) -> io::Result<Box<dyn ListerAt>>;
}

/// The four handlers backing a server session.
#[derive(Clone)]
pub struct Handlers {
    /// Read-side opens
    pub file_get: Arc<dyn FileReader>,
    /// Write-side opens
    pub file_put: Arc<dyn FileWriter>,
    /// Path commands
    pub file_cmd: Arc<dyn FileCmder>,
    /// Listings and stats
    pub file_list: Arc<dyn FileLister>,
}
