//! SFTP client: connection plumbing and the application-facing API.
//!
//! # Architecture
//!
//! One writer, many callers: requests carry monotonically assigned ids;
//! each caller parks a one-shot reply slot in the pending table and a
//! single reader task demultiplexes incoming frames back to the slots.
//! Any transport or decode error latches the connection: every parked
//! and future caller gets the latched error, and nothing touches the
//! wire again. Each slot is written at most once, and the error
//! broadcast never shares a slot with a normal reply.
//!
//! ```text
//! caller --+                         +--> oneshot --> caller
//! caller --+-> id alloc -> frame ->  |
//! caller --+    (writer lock)        +--> reader task (demux by id)
//! ```

use crate::sftp::attrs::FileAttributes;
use crate::sftp::consts::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_PACKET, SFTP_VERSION,
    SSH_FXF_CREAT, SSH_FXF_READ, SSH_FXF_TRUNC, SSH_FXF_WRITE,
};
use crate::sftp::error::{status_error, StatusCode};
use crate::sftp::extensions::{StatVfs, EXT_HARDLINK, EXT_POSIX_RENAME, EXT_STATVFS};
use crate::sftp::file::RemoteFile;
use crate::sftp::packet::{NameEntry, RequestPacket, ResponsePacket};
use crate::sftp::wire::{read_frame, write_frame, WireWriter};
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use skiff_platform::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Client tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Chunk size for pipelined file transfers.
    pub max_packet: usize,
    /// Cap on in-flight chunks per file operation (the window `W`).
    pub max_concurrent_requests: usize,
    /// Issue sequential reads strictly one at a time. Required for
    /// servers that do not tolerate pipelining, and useful for
    /// deterministic benchmarking.
    pub disable_concurrent_reads: bool,
    /// Maximum accepted frame length; larger frames are fatal.
    pub max_frame_len: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_packet: DEFAULT_MAX_PACKET,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            disable_concurrent_reads: false,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[derive(Default)]
struct Pending {
    waiters: HashMap<u32, oneshot::Sender<Result<ResponsePacket>>>,
    latched: Option<String>,
}

/// Shared connection state: the writer, the pending-waiter table and
/// the id counter.
pub(crate) struct Conn {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: SyncMutex<Pending>,
    next_id: AtomicU32,
    extensions: HashMap<String, String>,
}

impl Conn {
    /// Latches the broken state and fails every parked waiter. The
    /// first message wins; later latches re-broadcast it.
    pub(crate) fn latch(&self, msg: &str) {
        let (msg, waiters) = {
            let mut pending = self.pending.lock();
            if pending.latched.is_none() {
                pending.latched = Some(msg.to_string());
            }
            let msg = pending
                .latched
                .clone()
                .unwrap_or_else(|| msg.to_string());
            (msg, std::mem::take(&mut pending.waiters))
        };
        if !waiters.is_empty() {
            debug!("failing {} pending requests: {}", waiters.len(), msg);
        }
        for (_, tx) in waiters {
            let _ = tx.send(Err(Error::ConnectionLost(msg.clone())));
        }
    }

    fn take_waiter(&self, id: u32) -> Option<oneshot::Sender<Result<ResponsePacket>>> {
        self.pending.lock().waiters.remove(&id)
    }

    pub(crate) fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Allocates an id, parks a reply slot, writes the frame. Returns
    /// the slot. Fails synchronously when the connection is latched.
    pub(crate) async fn post<F>(&self, build: F) -> Result<oneshot::Receiver<Result<ResponsePacket>>>
    where
        F: FnOnce(u32) -> RequestPacket,
    {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.pending.lock();
            if let Some(msg) = &pending.latched {
                return Err(Error::ConnectionLost(msg.clone()));
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            pending.waiters.insert(id, tx);
            id
        };

        let frame = build(id).encode();
        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, &frame).await {
            drop(writer);
            self.take_waiter(id);
            let msg = format!("write failed: {}", e);
            self.latch(&msg);
            return Err(Error::ConnectionLost(msg));
        }
        Ok(rx)
    }

    /// `post` + await the reply.
    pub(crate) async fn call<F>(&self, build: F) -> Result<ResponsePacket>
    where
        F: FnOnce(u32) -> RequestPacket,
    {
        let rx = self.post(build).await?;
        await_reply(rx).await
    }

    async fn shutdown_writer(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(Error::Io)
    }
}

/// A connection whose far side is an open in-memory pipe; the pipe is
/// returned so it stays alive for the test's duration.
#[cfg(test)]
pub(crate) fn conn_for_tests() -> (Arc<Conn>, tokio::io::DuplexStream) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let conn = Arc::new(Conn {
        writer: Mutex::new(Box::new(near)),
        pending: SyncMutex::new(Pending::default()),
        next_id: AtomicU32::new(1),
        extensions: HashMap::new(),
    });
    (conn, far)
}

/// Resolves a parked reply slot. A dropped sender means the reader
/// died without broadcasting, which counts as a lost connection.
pub(crate) async fn await_reply(
    rx: oneshot::Receiver<Result<ResponsePacket>>,
) -> Result<ResponsePacket> {
    match rx.await {
        Ok(reply) => reply,
        Err(_) => Err(Error::ConnectionLost("connection closed".to_string())),
    }
}

fn reply_name(reply: &ResponsePacket) -> &'static str {
    match reply {
        ResponsePacket::Version { .. } => "VERSION",
        ResponsePacket::Status { .. } => "STATUS",
        ResponsePacket::Handle { .. } => "HANDLE",
        ResponsePacket::Data { .. } => "DATA",
        ResponsePacket::Name { .. } => "NAME",
        ResponsePacket::Attrs { .. } => "ATTRS",
        ResponsePacket::ExtendedReply { .. } => "EXTENDED_REPLY",
    }
}

fn unexpected(reply: &ResponsePacket, wanted: &str) -> Error {
    Error::Protocol(format!(
        "expected {} reply, got {}",
        wanted,
        reply_name(reply)
    ))
}

fn status_to_error(code: u32, message: String) -> Error {
    match StatusCode::from_u32(code) {
        Some(code) => status_error(code, message),
        None => Error::Status { code, message },
    }
}

/// OK status or the mapped status error.
pub(crate) fn expect_status(reply: ResponsePacket) -> Result<()> {
    match reply {
        ResponsePacket::Status { code, message, .. } => {
            if code == StatusCode::Ok as u32 {
                Ok(())
            } else {
                Err(status_to_error(code, message))
            }
        }
        other => Err(unexpected(&other, "STATUS")),
    }
}

pub(crate) fn expect_handle(reply: ResponsePacket) -> Result<Bytes> {
    match reply {
        ResponsePacket::Handle { handle, .. } => Ok(handle),
        ResponsePacket::Status { code, message, .. } => Err(status_to_error(code, message)),
        other => Err(unexpected(&other, "HANDLE")),
    }
}

pub(crate) fn expect_attrs(reply: ResponsePacket) -> Result<FileAttributes> {
    match reply {
        ResponsePacket::Attrs { attrs, .. } => Ok(attrs),
        ResponsePacket::Status { code, message, .. } => Err(status_to_error(code, message)),
        other => Err(unexpected(&other, "ATTRS")),
    }
}

pub(crate) fn expect_name(reply: ResponsePacket) -> Result<Vec<NameEntry>> {
    match reply {
        ResponsePacket::Name { entries, .. } => Ok(entries),
        ResponsePacket::Status { code, message, .. } => Err(status_to_error(code, message)),
        other => Err(unexpected(&other, "NAME")),
    }
}

/// `Ok(Some(data))` for DATA, `Ok(None)` for an EOF status.
pub(crate) fn expect_data(reply: ResponsePacket) -> Result<Option<Bytes>> {
    match reply {
        ResponsePacket::Data { data, .. } => Ok(Some(data)),
        ResponsePacket::Status { code, message, .. } => {
            if code == StatusCode::Eof as u32 {
                Ok(None)
            } else {
                Err(status_to_error(code, message))
            }
        }
        other => Err(unexpected(&other, "DATA")),
    }
}

pub(crate) fn expect_extended_reply(reply: ResponsePacket) -> Result<Bytes> {
    match reply {
        ResponsePacket::ExtendedReply { payload, .. } => Ok(payload),
        ResponsePacket::Status { code, message, .. } => Err(status_to_error(code, message)),
        other => Err(unexpected(&other, "EXTENDED_REPLY")),
    }
}

async fn read_loop<R>(mut rd: R, conn: Arc<Conn>, max_frame: usize)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut rd, max_frame).await {
            Ok(Some(payload)) => match ResponsePacket::decode(payload) {
                Ok(reply) => match reply.request_id() {
                    Some(id) => match conn.take_waiter(id) {
                        Some(tx) => {
                            let _ = tx.send(Ok(reply));
                        }
                        None => debug!("discarding reply for unknown request id {}", id),
                    },
                    None => {
                        conn.latch("unexpected VERSION packet mid-session");
                        break;
                    }
                },
                Err(e) => {
                    conn.latch(&e.to_string());
                    break;
                }
            },
            Ok(None) => {
                conn.latch("connection closed by peer");
                break;
            }
            Err(e) => {
                conn.latch(&e.to_string());
                break;
            }
        }
    }
    debug!("sftp reader task exiting");
}

/// An SFTP v3 client over an established byte stream.
///
/// The stream is typically an SSH channel with the `sftp` subsystem
/// already requested; anything `AsyncRead + AsyncWrite` works, which is
/// what the tests exploit with in-memory duplex pipes.
pub struct SftpClient {
    conn: Arc<Conn>,
    opts: ClientOptions,
    reader: JoinHandle<()>,
}

impl SftpClient {
    /// Performs version negotiation over `stream` and starts the
    /// reader task.
    pub async fn new<S>(stream: S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_options(stream, ClientOptions::default()).await
    }

    /// Like [`SftpClient::new`] with explicit options.
    pub async fn with_options<S>(stream: S, opts: ClientOptions) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut rd, mut wr) = tokio::io::split(stream);

        let init = RequestPacket::Init {
            version: SFTP_VERSION,
            extensions: Vec::new(),
        };
        write_frame(&mut wr, &init.encode()).await?;

        let payload = read_frame(&mut rd, opts.max_frame_len)
            .await?
            .ok_or_else(|| {
                Error::Protocol("connection closed during version negotiation".to_string())
            })?;
        let (version, extensions) = match ResponsePacket::decode(payload)? {
            ResponsePacket::Version {
                version,
                extensions,
            } => (version, extensions),
            other => return Err(unexpected(&other, "VERSION")),
        };
        if version != SFTP_VERSION {
            return Err(Error::Unsupported(format!(
                "server negotiated protocol version {}, only {} is supported",
                version, SFTP_VERSION
            )));
        }
        info!(
            "sftp session established: version {}, {} extensions",
            version,
            extensions.len()
        );

        let conn = Arc::new(Conn {
            writer: Mutex::new(Box::new(wr)),
            pending: SyncMutex::new(Pending::default()),
            next_id: AtomicU32::new(1),
            extensions: extensions.into_iter().collect(),
        });
        let reader = tokio::spawn(read_loop(rd, Arc::clone(&conn), opts.max_frame_len));

        Ok(Self { conn, opts, reader })
    }

    /// True if the server advertised `name` in its VERSION reply.
    pub fn has_extension(&self, name: &str) -> bool {
        self.conn.has_extension(name)
    }

    /// Opens `path` for reading.
    pub async fn open(&self, path: &str) -> Result<RemoteFile> {
        self.open_with_flags(path, SSH_FXF_READ).await
    }

    /// Creates (or truncates) `path` and opens it for writing.
    pub async fn create(&self, path: &str) -> Result<RemoteFile> {
        self.open_with_flags(path, SSH_FXF_WRITE | SSH_FXF_CREAT | SSH_FXF_TRUNC)
            .await
    }

    /// Opens `path` with an explicit `SSH_FXF_*` flag combination.
    pub async fn open_with_flags(&self, path: &str, pflags: u32) -> Result<RemoteFile> {
        let path_owned = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Open {
                id,
                path: path_owned,
                pflags,
                attrs: FileAttributes::default(),
            })
            .await?;
        let handle = expect_handle(reply)?;
        Ok(RemoteFile::new(
            Arc::clone(&self.conn),
            self.opts.clone(),
            handle,
            path.to_string(),
        ))
    }

    /// Stats `path`, following symlinks.
    pub async fn stat(&self, path: &str) -> Result<FileAttributes> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Stat { id, path })
            .await?;
        expect_attrs(reply)
    }

    /// Stats `path` without following symlinks.
    pub async fn lstat(&self, path: &str) -> Result<FileAttributes> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Lstat { id, path })
            .await?;
        expect_attrs(reply)
    }

    /// Applies the flagged fields of `attrs` to `path`.
    pub async fn setstat(&self, path: &str, attrs: FileAttributes) -> Result<()> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::SetStat { id, path, attrs })
            .await?;
        expect_status(reply)
    }

    /// Changes permission bits.
    pub async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.setstat(
            path,
            FileAttributes {
                permissions: Some(mode),
                ..Default::default()
            },
        )
        .await
    }

    /// Changes ownership.
    pub async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.setstat(
            path,
            FileAttributes {
                uid: Some(uid),
                gid: Some(gid),
                ..Default::default()
            },
        )
        .await
    }

    /// Sets access and modification times (seconds since the epoch).
    pub async fn chtimes(&self, path: &str, atime: u32, mtime: u32) -> Result<()> {
        self.setstat(
            path,
            FileAttributes {
                atime: Some(atime),
                mtime: Some(mtime),
                ..Default::default()
            },
        )
        .await
    }

    /// Truncates `path` to `size` bytes.
    pub async fn truncate(&self, path: &str, size: u64) -> Result<()> {
        self.setstat(
            path,
            FileAttributes {
                size: Some(size),
                ..Default::default()
            },
        )
        .await
    }

    /// Removes the file at `path`.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Remove { id, path })
            .await?;
        expect_status(reply)
    }

    /// Creates the directory `path`.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Mkdir {
                id,
                path,
                attrs: FileAttributes::default(),
            })
            .await?;
        expect_status(reply)
    }

    /// Creates `path` and any missing parents, tolerating directories
    /// that already exist.
    pub async fn mkdir_all(&self, path: &str) -> Result<()> {
        match self.stat(path).await {
            Ok(attrs) if attrs.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(status_error(
                    StatusCode::Failure,
                    format!("{} exists and is not a directory", path),
                ))
            }
            Err(_) => {}
        }

        let rooted = path.starts_with('/');
        let mut prefix = if rooted {
            String::from("/")
        } else {
            String::new()
        };
        for comp in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix.push_str(comp);
            match self.stat(&prefix).await {
                Ok(attrs) if attrs.is_dir() => continue,
                Ok(_) => {
                    return Err(status_error(
                        StatusCode::Failure,
                        format!("{} exists and is not a directory", prefix),
                    ))
                }
                Err(_) => {
                    if let Err(e) = self.mkdir(&prefix).await {
                        // Lost a race with a concurrent creator: fine
                        // as long as a directory is there now.
                        match self.stat(&prefix).await {
                            Ok(attrs) if attrs.is_dir() => {}
                            _ => return Err(e),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes the directory at `path`.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::Rmdir { id, path })
            .await?;
        expect_status(reply)
    }

    /// Renames `oldpath` to `newpath`; fails if `newpath` exists.
    pub async fn rename(&self, oldpath: &str, newpath: &str) -> Result<()> {
        let (oldpath, newpath) = (oldpath.to_string(), newpath.to_string());
        let reply = self
            .conn
            .call(|id| RequestPacket::Rename {
                id,
                oldpath,
                newpath,
            })
            .await?;
        expect_status(reply)
    }

    /// Renames `oldpath` to `newpath`, overwriting `newpath`
    /// (`posix-rename@openssh.com`).
    pub async fn posix_rename(&self, oldpath: &str, newpath: &str) -> Result<()> {
        self.require_extension(EXT_POSIX_RENAME)?;
        let mut w = WireWriter::new();
        w.string(oldpath).string(newpath);
        let payload = w.freeze();
        let reply = self
            .conn
            .call(|id| RequestPacket::Extended {
                id,
                name: EXT_POSIX_RENAME.to_string(),
                payload,
            })
            .await?;
        expect_status(reply)
    }

    /// Creates a hard link `newpath` to `oldpath`
    /// (`hardlink@openssh.com`).
    pub async fn hard_link(&self, oldpath: &str, newpath: &str) -> Result<()> {
        self.require_extension(EXT_HARDLINK)?;
        let mut w = WireWriter::new();
        w.string(oldpath).string(newpath);
        let payload = w.freeze();
        let reply = self
            .conn
            .call(|id| RequestPacket::Extended {
                id,
                name: EXT_HARDLINK.to_string(),
                payload,
            })
            .await?;
        expect_status(reply)
    }

    /// Creates a symlink at `linkpath` pointing at `targetpath`.
    pub async fn symlink(&self, targetpath: &str, linkpath: &str) -> Result<()> {
        let (targetpath, linkpath) = (targetpath.to_string(), linkpath.to_string());
        let reply = self
            .conn
            .call(|id| RequestPacket::Symlink {
                id,
                targetpath,
                linkpath,
            })
            .await?;
        expect_status(reply)
    }

    /// Reads the target of the symlink at `path`.
    pub async fn read_link(&self, path: &str) -> Result<String> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::ReadLink { id, path })
            .await?;
        let entries = expect_name(reply)?;
        entries
            .into_iter()
            .next()
            .map(|e| e.filename)
            .ok_or_else(|| Error::Protocol("empty READLINK reply".to_string()))
    }

    /// Asks the server to canonicalize `path`.
    pub async fn real_path(&self, path: &str) -> Result<String> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::RealPath { id, path })
            .await?;
        let entries = expect_name(reply)?;
        entries
            .into_iter()
            .next()
            .map(|e| e.filename)
            .ok_or_else(|| Error::Protocol("empty REALPATH reply".to_string()))
    }

    /// The server's working directory: `real_path(".")`.
    pub async fn getwd(&self) -> Result<String> {
        self.real_path(".").await
    }

    /// Filesystem statistics for the filesystem holding `path`
    /// (`statvfs@openssh.com`).
    pub async fn stat_vfs(&self, path: &str) -> Result<StatVfs> {
        self.require_extension(EXT_STATVFS)?;
        let mut w = WireWriter::new();
        w.string(path);
        let payload = w.freeze();
        let reply = self
            .conn
            .call(|id| RequestPacket::Extended {
                id,
                name: EXT_STATVFS.to_string(),
                payload,
            })
            .await?;
        StatVfs::decode(expect_extended_reply(reply)?)
    }

    /// Lists the directory at `path`. `.` and `..` entries are
    /// filtered out.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<NameEntry>> {
        let path = path.to_string();
        let reply = self
            .conn
            .call(|id| RequestPacket::OpenDir { id, path })
            .await?;
        let handle = expect_handle(reply)?;

        let mut entries = Vec::new();
        let result = loop {
            let handle = handle.clone();
            let reply = match self
                .conn
                .call(|id| RequestPacket::ReadDir { id, handle })
                .await
            {
                Ok(reply) => reply,
                Err(e) => break Err(e),
            };
            match reply {
                ResponsePacket::Name { entries: batch, .. } => {
                    entries.extend(
                        batch
                            .into_iter()
                            .filter(|e| e.filename != "." && e.filename != ".."),
                    );
                }
                ResponsePacket::Status { code, message, .. } => {
                    if code == StatusCode::Eof as u32 {
                        break Ok(());
                    }
                    break Err(status_to_error(code, message));
                }
                other => break Err(unexpected(&other, "NAME")),
            }
        };

        let close = self
            .conn
            .call(|id| RequestPacket::Close { id, handle })
            .await
            .and_then(expect_status);
        result.and(close)?;
        Ok(entries)
    }

    /// Copies the local file at `local` to `remote`. Returns the byte
    /// count.
    pub async fn upload(&self, local: &str, remote: &str) -> Result<u64> {
        let mut src = tokio::fs::File::open(local).await.map_err(Error::Io)?;
        let mut file = self.create(remote).await?;
        let copied = file.read_from(&mut src).await;
        let closed = file.close().await;
        let copied = copied?;
        closed?;
        debug!("uploaded {} bytes to {}", copied, remote);
        Ok(copied)
    }

    /// Copies `remote` into the local file at `local`. Returns the
    /// byte count.
    pub async fn download(&self, remote: &str, local: &str) -> Result<u64> {
        let mut file = self.open(remote).await?;
        let mut dst = tokio::fs::File::create(local).await.map_err(Error::Io)?;
        let copied = file.write_to(&mut dst).await;
        let flushed = dst.flush().await.map_err(Error::Io);
        let closed = file.close().await;
        let copied = copied?;
        flushed?;
        closed?;
        debug!("downloaded {} bytes from {}", copied, remote);
        Ok(copied)
    }

    /// Shuts the connection down. Pending and future requests fail
    /// with the latched error.
    pub async fn close(self) -> Result<()> {
        self.conn.latch("client closed the connection");
        let result = self.conn.shutdown_writer().await;
        self.reader.abort();
        result
    }

    fn require_extension(&self, name: &str) -> Result<()> {
        if self.conn.has_extension(name) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!(
                "server does not support {}",
                name
            )))
        }
    }
}
