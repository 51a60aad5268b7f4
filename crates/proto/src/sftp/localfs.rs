//! Built-in handler backed by the host filesystem.
//!
//! Serves the paths handed to it as-is; the dispatch loop has already
//! cleaned them. Positional file I/O runs on the blocking pool, path
//! operations go through `tokio::fs`.

use crate::sftp::attrs::FileAttributes;
use crate::sftp::consts::{
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, SSH_FXF_APPEND, SSH_FXF_CREAT, SSH_FXF_EXCL,
    SSH_FXF_READ, SSH_FXF_TRUNC, SSH_FXF_WRITE,
};
use crate::sftp::handler::{
    FileCmder, FileInfo, FileLister, FileReadAt, FileReader, FileWriteAt, FileWriter, Handlers,
    ListerAt, RequestMethod, SftpRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Arc;
use tokio::task;

/// Handler set serving the host filesystem.
pub struct LocalFs;

impl LocalFs {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }

    /// Bundles one `LocalFs` behind all four handler seams.
    pub fn handlers() -> Handlers {
        let fs = Arc::new(LocalFs::new());
        Handlers {
            file_get: fs.clone(),
            file_put: fs.clone(),
            file_cmd: fs.clone(),
            file_list: fs,
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}

fn target_of(req: &SftpRequest) -> io::Result<String> {
    req.target
        .clone()
        .ok_or_else(|| invalid("request is missing a target path"))
}

fn open_options(pflags: u32, attrs: Option<&FileAttributes>) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.read(pflags & SSH_FXF_READ != 0);
    opts.write(pflags & SSH_FXF_WRITE != 0);
    opts.append(pflags & SSH_FXF_APPEND != 0);
    opts.truncate(pflags & SSH_FXF_TRUNC != 0);
    if pflags & SSH_FXF_CREAT != 0 {
        if pflags & SSH_FXF_EXCL != 0 {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mode = attrs
            .and_then(|a| a.permissions)
            .map(|m| m & 0o7777)
            .unwrap_or(DEFAULT_FILE_MODE);
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = attrs;
    opts
}

#[cfg(unix)]
fn read_at_blocking(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at_blocking(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn write_all_at_blocking(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at_blocking(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
        }
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}

struct LocalReadAt {
    file: Arc<File>,
}

#[async_trait]
impl FileReadAt for LocalReadAt {
    async fn read_at(&self, offset: u64, len: u32) -> io::Result<Bytes> {
        let file = Arc::clone(&self.file);
        blocking(move || {
            let mut buf = vec![0u8; len as usize];
            let n = read_at_blocking(&file, &mut buf, offset)?;
            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
        .await
    }
}

struct LocalWriteAt {
    file: Arc<File>,
}

#[async_trait]
impl FileWriteAt for LocalWriteAt {
    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        let data = data.to_vec();
        blocking(move || write_all_at_blocking(&file, &data, offset)).await
    }

    async fn sync(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        blocking(move || file.sync_all()).await
    }
}

#[async_trait]
impl FileReader for LocalFs {
    async fn file_read(&self, req: &SftpRequest) -> io::Result<Box<dyn FileReadAt>> {
        let path = req.filepath.clone();
        let file = blocking(move || OpenOptions::new().read(true).open(path)).await?;
        Ok(Box::new(LocalReadAt {
            file: Arc::new(file),
        }))
    }
}

#[async_trait]
impl FileWriter for LocalFs {
    async fn file_write(&self, req: &SftpRequest) -> io::Result<Box<dyn FileWriteAt>> {
        let path = req.filepath.clone();
        let opts = open_options(req.pflags, req.attrs.as_ref());
        let file = blocking(move || opts.open(path)).await?;
        Ok(Box::new(LocalWriteAt {
            file: Arc::new(file),
        }))
    }
}

#[async_trait]
impl FileCmder for LocalFs {
    async fn file_cmd(&self, req: &SftpRequest) -> io::Result<()> {
        match req.method {
            RequestMethod::Mkdir => {
                let path = req.filepath.clone();
                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    let mode = req
                        .attrs
                        .as_ref()
                        .and_then(|a| a.permissions)
                        .map(|m| m & 0o7777)
                        .unwrap_or(DEFAULT_DIR_MODE);
                    blocking(move || std::fs::DirBuilder::new().mode(mode).create(path)).await
                }
                #[cfg(not(unix))]
                {
                    tokio::fs::create_dir(path).await
                }
            }
            RequestMethod::Rmdir => tokio::fs::remove_dir(&req.filepath).await,
            RequestMethod::Remove => tokio::fs::remove_file(&req.filepath).await,
            RequestMethod::Rename => {
                // v3 RENAME must not overwrite.
                let target = target_of(req)?;
                if tokio::fs::symlink_metadata(&target).await.is_ok() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{}: target already exists", target),
                    ));
                }
                tokio::fs::rename(&req.filepath, &target).await
            }
            RequestMethod::PosixRename => {
                tokio::fs::rename(&req.filepath, &target_of(req)?).await
            }
            RequestMethod::Link => tokio::fs::hard_link(&req.filepath, &target_of(req)?).await,
            RequestMethod::Symlink => {
                let target = target_of(req)?;
                #[cfg(unix)]
                {
                    tokio::fs::symlink(&target, &req.filepath).await
                }
                #[cfg(not(unix))]
                {
                    let _ = target;
                    Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "symlinks not supported on this platform",
                    ))
                }
            }
            RequestMethod::Setstat => {
                let attrs = req
                    .attrs
                    .as_ref()
                    .ok_or_else(|| invalid("setstat without attributes"))?;
                apply_setstat(&req.filepath, attrs).await
            }
            _ => Err(invalid("not a path command")),
        }
    }
}

/// Applies exactly the flagged fields, in a fixed order. A failure
/// leaves earlier fields applied, matching plain sftp-server behavior.
async fn apply_setstat(path: &str, attrs: &FileAttributes) -> io::Result<()> {
    if let Some(size) = attrs.size {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await?;
        file.set_len(size).await?;
    }

    #[cfg(unix)]
    if let Some(mode) = attrs.permissions {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, Permissions::from_mode(mode & 0o7777)).await?;
    }

    #[cfg(unix)]
    if let (Some(uid), Some(gid)) = (attrs.uid, attrs.gid) {
        let path = path.to_string();
        blocking(move || std::os::unix::fs::chown(path, Some(uid), Some(gid))).await?;
    }

    if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
        let path = path.to_string();
        blocking(move || {
            use std::fs::FileTimes;
            use std::time::{Duration, UNIX_EPOCH};

            let times = FileTimes::new()
                .set_accessed(UNIX_EPOCH + Duration::from_secs(atime as u64))
                .set_modified(UNIX_EPOCH + Duration::from_secs(mtime as u64));
            File::open(path)?.set_times(times)
        })
        .await?;
    }

    Ok(())
}

struct MemLister {
    entries: Vec<FileInfo>,
}

#[async_trait]
impl ListerAt for MemLister {
    async fn list_at(&self, offset: u64, max: usize) -> io::Result<Vec<FileInfo>> {
        let start = (offset as usize).min(self.entries.len());
        let end = (start + max).min(self.entries.len());
        Ok(self.entries[start..end].to_vec())
    }
}

#[async_trait]
impl FileLister for LocalFs {
    async fn file_list(&self, req: &SftpRequest) -> io::Result<Box<dyn ListerAt>> {
        match req.method {
            RequestMethod::List => {
                let path = req.filepath.clone();
                let entries = blocking(move || {
                    let mut entries = Vec::new();
                    for entry in std::fs::read_dir(path)? {
                        let entry = entry?;
                        let name = entry.file_name().to_string_lossy().into_owned();
                        // DirEntry::metadata does not follow symlinks,
                        // which is what a listing wants.
                        let md = entry.metadata()?;
                        entries.push(FileInfo {
                            name,
                            attrs: FileAttributes::from_metadata(&md),
                        });
                    }
                    entries.sort_by(|a, b| a.name.cmp(&b.name));
                    Ok(entries)
                })
                .await?;
                Ok(Box::new(MemLister { entries }))
            }
            RequestMethod::Stat => {
                let md = tokio::fs::metadata(&req.filepath).await?;
                Ok(Box::new(MemLister {
                    entries: vec![FileInfo {
                        name: req.filepath.clone(),
                        attrs: FileAttributes::from_metadata(&md),
                    }],
                }))
            }
            RequestMethod::Lstat => {
                let md = tokio::fs::symlink_metadata(&req.filepath).await?;
                Ok(Box::new(MemLister {
                    entries: vec![FileInfo {
                        name: req.filepath.clone(),
                        attrs: FileAttributes::from_metadata(&md),
                    }],
                }))
            }
            RequestMethod::Readlink => {
                let target = tokio::fs::read_link(&req.filepath).await?;
                Ok(Box::new(MemLister {
                    entries: vec![FileInfo {
                        name: target.to_string_lossy().into_owned(),
                        attrs: FileAttributes::default(),
                    }],
                }))
            }
            _ => Err(invalid("not a listing request")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::consts::S_IFDIR;

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempdir();
        let path = path_in(&dir, "data.bin");
        let fs = LocalFs::new();

        let put = SftpRequest::open(
            RequestMethod::Put,
            &path,
            SSH_FXF_WRITE | SSH_FXF_CREAT | SSH_FXF_TRUNC,
            FileAttributes::default(),
        );
        let writer = fs.file_write(&put).await.unwrap();
        writer.write_at(0, b"hello world").await.unwrap();
        writer.sync().await.unwrap();

        let get = SftpRequest::open(
            RequestMethod::Get,
            &path,
            SSH_FXF_READ,
            FileAttributes::default(),
        );
        let reader = fs.file_read(&get).await.unwrap();
        let data = reader.read_at(6, 32).await.unwrap();
        assert_eq!(&data[..], b"world");

        // At EOF the read is empty.
        let eof = reader.read_at(11, 32).await.unwrap();
        assert!(eof.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let dir = tempdir();
        let fs = LocalFs::new();
        let req = SftpRequest::open(
            RequestMethod::Get,
            path_in(&dir, "absent"),
            SSH_FXF_READ,
            FileAttributes::default(),
        );
        let err = fs.file_read(&req).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_mkdir_and_stat() {
        let dir = tempdir();
        let path = path_in(&dir, "sub");
        let fs = LocalFs::new();

        fs.file_cmd(&SftpRequest::path(RequestMethod::Mkdir, &path))
            .await
            .unwrap();

        let lister = fs
            .file_list(&SftpRequest::path(RequestMethod::Stat, &path))
            .await
            .unwrap();
        let entries = lister.list_at(0, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        let mode = entries[0].attrs.permissions.unwrap();
        assert_eq!(mode & crate::sftp::consts::S_IFMT, S_IFDIR);
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() {
        let dir = tempdir();
        let a = path_in(&dir, "a");
        let b = path_in(&dir, "b");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let fs = LocalFs::new();
        let err = fs
            .file_cmd(&SftpRequest::with_target(RequestMethod::Rename, &a, &b))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        // posix-rename overwrites.
        fs.file_cmd(&SftpRequest::with_target(RequestMethod::PosixRename, &a, &b))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&b).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_setstat_truncates() {
        let dir = tempdir();
        let path = path_in(&dir, "t");
        std::fs::write(&path, b"hello world").unwrap();

        let fs = LocalFs::new();
        let mut req = SftpRequest::path(RequestMethod::Setstat, &path);
        req.attrs = Some(FileAttributes {
            size: Some(5),
            ..Default::default()
        });
        fs.file_cmd(&req).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_batched() {
        let dir = tempdir();
        for name in ["c", "a", "b"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let fs = LocalFs::new();
        let lister = fs
            .file_list(&SftpRequest::path(
                RequestMethod::List,
                dir.path().to_string_lossy().into_owned(),
            ))
            .await
            .unwrap();

        let first = lister.list_at(0, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );
        let second = lister.list_at(2, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "c");
        assert!(lister.list_at(3, 2).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_and_readlink() {
        let dir = tempdir();
        let target = path_in(&dir, "target");
        let link = path_in(&dir, "link");
        std::fs::write(&target, b"x").unwrap();

        let fs = LocalFs::new();
        fs.file_cmd(&SftpRequest::with_target(
            RequestMethod::Symlink,
            &link,
            &target,
        ))
        .await
        .unwrap();

        let lister = fs
            .file_list(&SftpRequest::path(RequestMethod::Readlink, &link))
            .await
            .unwrap();
        let entries = lister.list_at(0, 1).await.unwrap();
        assert_eq!(entries[0].name, target);
    }

    #[tokio::test]
    async fn test_statvfs_declined() {
        let fs = LocalFs::new();
        let err = fs.statvfs("/").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
