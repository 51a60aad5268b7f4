//! Server dispatch.
//!
//! Two topologies over the same dispatch function, so their externally
//! observable behavior is identical:
//!
//! - [`RequestServer`] - one task decodes, dispatches and replies
//!   serially; reply ordering is trivial. One per user session.
//! - [`PacketServer`] - a reader task feeds a bounded queue, a pool of
//!   workers dispatches concurrently, and a packet manager re-serializes
//!   replies into arrival order before the single writer task emits
//!   them. Reply order is preserved globally, including READ/WRITE.
//!
//! ```text
//! bytes -> codec -> dispatch -> handler -> reply -> packet manager -> bytes
//! ```

use crate::sftp::attrs::FileAttributes;
use crate::sftp::consts::{
    SFTP_VERSION, SSH_FXF_APPEND, SSH_FXF_CREAT, SSH_FXF_READ, SSH_FXF_TRUNC, SSH_FXF_WRITE,
};
use crate::sftp::error::{status_from_io, StatusCode};
use crate::sftp::extensions::{
    EXT_FSYNC, EXT_HARDLINK, EXT_POSIX_RENAME, EXT_STATVFS, SERVER_EXTENSIONS,
};
use crate::sftp::handle::{HandleTable, OpenFile, OpenHandle};
use crate::sftp::handler::{Handlers, RequestMethod, SftpRequest};
use crate::sftp::longname;
use crate::sftp::packet::{
    is_known_request_type, peek_type_and_id, NameEntry, RequestPacket, ResponsePacket,
};
use crate::sftp::wire::{read_frame, write_frame, WireReader};
use crate::sftp::{consts, packet_mgr};
use bytes::Bytes;
use skiff_platform::{Error, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tuning knobs for a server session.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Reject every mutating request with `PERMISSION_DENIED` without
    /// invoking the handler.
    pub read_only: bool,
    /// Maximum accepted frame length; larger frames are fatal.
    pub max_frame_len: usize,
    /// Worker count for [`PacketServer`].
    pub workers: usize,
    /// Input queue depth for [`PacketServer`]; bounds how far the
    /// reader can run ahead of the workers.
    pub queue_depth: usize,
    /// Entries per READDIR batch.
    pub readdir_batch: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            read_only: false,
            max_frame_len: consts::DEFAULT_MAX_FRAME_LEN,
            workers,
            queue_depth: workers * 2,
            readdir_batch: consts::DEFAULT_READDIR_BATCH,
        }
    }
}

/// Lexically cleans a path and roots it at `/`: resolves `.` and `..`,
/// collapses slashes, clamps `..` at the root.
pub(crate) fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut out = String::from("/");
    out.push_str(&parts.join("/"));
    out
}

fn status(id: u32, code: StatusCode, message: &str) -> ResponsePacket {
    let message = if message.is_empty() {
        code.message().to_string()
    } else {
        message.to_string()
    };
    ResponsePacket::Status {
        id,
        code: code as u32,
        message,
        language: String::new(),
    }
}

fn ok(id: u32) -> ResponsePacket {
    status(id, StatusCode::Ok, "")
}

fn io_status(id: u32, err: &std::io::Error) -> ResponsePacket {
    status(id, status_from_io(err), &err.to_string())
}

fn bad_handle(id: u32) -> ResponsePacket {
    status(id, StatusCode::Failure, "bad file descriptor")
}

/// Shared per-connection server state.
struct Session {
    handlers: Handlers,
    handles: HandleTable,
    opts: ServerOptions,
}

impl Session {
    fn new(handlers: Handlers, opts: ServerOptions) -> Self {
        Self {
            handlers,
            handles: HandleTable::new(),
            opts,
        }
    }

    /// Largest DATA payload that still fits the peer's frame budget
    /// with headroom for the reply header.
    fn max_read_len(&self) -> u32 {
        self.opts.max_frame_len.saturating_sub(1024).max(1024) as u32
    }

    fn denied_read_only(&self, pkt: &RequestPacket) -> bool {
        if !self.opts.read_only {
            return false;
        }
        match pkt {
            RequestPacket::Open { pflags, .. } => {
                pflags & (SSH_FXF_WRITE | SSH_FXF_APPEND | SSH_FXF_CREAT | SSH_FXF_TRUNC) != 0
            }
            RequestPacket::Write { .. }
            | RequestPacket::SetStat { .. }
            | RequestPacket::FSetStat { .. }
            | RequestPacket::Remove { .. }
            | RequestPacket::Mkdir { .. }
            | RequestPacket::Rmdir { .. }
            | RequestPacket::Rename { .. }
            | RequestPacket::Symlink { .. } => true,
            RequestPacket::Extended { name, .. } => {
                matches!(name.as_str(), EXT_POSIX_RENAME | EXT_HARDLINK | EXT_FSYNC)
            }
            _ => false,
        }
    }

    async fn dispatch(&self, pkt: RequestPacket) -> ResponsePacket {
        if self.denied_read_only(&pkt) {
            let id = pkt.id().unwrap_or(0);
            return status(id, StatusCode::PermissionDenied, "server is read-only");
        }

        match pkt {
            // The serve loops consume INIT during negotiation; one
            // arriving here is a peer bug.
            RequestPacket::Init { .. } => status(0, StatusCode::BadMessage, "unexpected INIT"),

            RequestPacket::Open {
                id,
                path,
                pflags,
                attrs,
            } => self.open(id, path, pflags, attrs),

            RequestPacket::OpenDir { id, path } => self.opendir(id, path).await,

            RequestPacket::Close { id, handle } => {
                let token = String::from_utf8_lossy(&handle).into_owned();
                match self.handles.remove(&token) {
                    Some(_) => ok(id),
                    None => bad_handle(id),
                }
            }

            RequestPacket::Read {
                id,
                handle,
                offset,
                len,
            } => self.read(id, &handle, offset, len).await,

            RequestPacket::Write {
                id,
                handle,
                offset,
                data,
            } => self.write(id, &handle, offset, &data).await,

            RequestPacket::Stat { id, path } => {
                self.stat(id, clean_path(&path), RequestMethod::Stat).await
            }
            RequestPacket::Lstat { id, path } => {
                self.stat(id, clean_path(&path), RequestMethod::Lstat).await
            }
            RequestPacket::Fstat { id, handle } => match self.lookup(&handle) {
                Some(open) => {
                    let path = match open.as_ref() {
                        OpenHandle::File(f) => f.path.clone(),
                        OpenHandle::Dir(d) => d.path.clone(),
                    };
                    self.stat(id, path, RequestMethod::Stat).await
                }
                None => bad_handle(id),
            },

            RequestPacket::SetStat { id, path, attrs } => {
                self.setstat(id, clean_path(&path), attrs).await
            }
            RequestPacket::FSetStat { id, handle, attrs } => match self.lookup(&handle) {
                Some(open) => {
                    let path = match open.as_ref() {
                        OpenHandle::File(f) => f.path.clone(),
                        OpenHandle::Dir(d) => d.path.clone(),
                    };
                    self.setstat(id, path, attrs).await
                }
                None => bad_handle(id),
            },

            RequestPacket::ReadDir { id, handle } => self.readdir(id, &handle).await,

            RequestPacket::Remove { id, path } => {
                let req = SftpRequest::path(RequestMethod::Remove, clean_path(&path));
                self.cmd(id, req).await
            }
            RequestPacket::Rmdir { id, path } => {
                let req = SftpRequest::path(RequestMethod::Rmdir, clean_path(&path));
                self.cmd(id, req).await
            }
            RequestPacket::Mkdir { id, path, attrs } => {
                let mut req = SftpRequest::path(RequestMethod::Mkdir, clean_path(&path));
                req.attrs = Some(attrs);
                self.cmd(id, req).await
            }
            RequestPacket::Rename {
                id,
                oldpath,
                newpath,
            } => {
                let req = SftpRequest::with_target(
                    RequestMethod::Rename,
                    clean_path(&oldpath),
                    clean_path(&newpath),
                );
                self.cmd(id, req).await
            }

            RequestPacket::RealPath { id, path } => {
                let cleaned = clean_path(&path);
                ResponsePacket::Name {
                    id,
                    entries: vec![NameEntry {
                        filename: cleaned.clone(),
                        longname: cleaned,
                        attrs: FileAttributes::default(),
                    }],
                }
            }

            RequestPacket::ReadLink { id, path } => {
                let req = SftpRequest::path(RequestMethod::Readlink, clean_path(&path));
                match self.handlers.file_list.file_list(&req).await {
                    Err(e) => io_status(id, &e),
                    Ok(lister) => match lister.list_at(0, 1).await {
                        Err(e) => io_status(id, &e),
                        Ok(entries) => match entries.into_iter().next() {
                            None => status(id, StatusCode::NoSuchFile, ""),
                            Some(entry) => ResponsePacket::Name {
                                id,
                                entries: vec![NameEntry {
                                    filename: entry.name.clone(),
                                    longname: entry.name,
                                    attrs: FileAttributes::default(),
                                }],
                            },
                        },
                    },
                }
            }

            RequestPacket::Symlink {
                id,
                targetpath,
                linkpath,
            } => {
                // The link target is an arbitrary string and is not
                // cleaned; relative targets are meaningful.
                let req = SftpRequest::with_target(
                    RequestMethod::Symlink,
                    clean_path(&linkpath),
                    targetpath,
                );
                self.cmd(id, req).await
            }

            RequestPacket::Extended { id, name, payload } => {
                self.extended(id, &name, payload).await
            }
        }
    }

    fn lookup(&self, handle: &Bytes) -> Option<Arc<OpenHandle>> {
        let token = String::from_utf8_lossy(handle).into_owned();
        self.handles.get(&token)
    }

    fn open(&self, id: u32, path: String, pflags: u32, attrs: FileAttributes) -> ResponsePacket {
        if path.is_empty() {
            return status(id, StatusCode::BadMessage, "empty path");
        }
        if pflags & (SSH_FXF_READ | SSH_FXF_WRITE | SSH_FXF_APPEND) == 0 {
            return status(id, StatusCode::BadMessage, "open without access flags");
        }
        let token = self
            .handles
            .insert(OpenHandle::file(clean_path(&path), pflags, attrs));
        debug!("opened {} as handle {}", path, token);
        ResponsePacket::Handle {
            id,
            handle: Bytes::from(token),
        }
    }

    async fn opendir(&self, id: u32, path: String) -> ResponsePacket {
        if path.is_empty() {
            return status(id, StatusCode::BadMessage, "empty path");
        }
        let cleaned = clean_path(&path);

        // Build the lister up front so a missing or unreadable
        // directory fails the OPENDIR, not the first READDIR.
        let req = SftpRequest::path(RequestMethod::List, cleaned.clone());
        let lister = match self.handlers.file_list.file_list(&req).await {
            Ok(lister) => lister,
            Err(e) => return io_status(id, &e),
        };

        let token = self.handles.insert(OpenHandle::dir_with_lister(cleaned, lister));
        ResponsePacket::Handle {
            id,
            handle: Bytes::from(token),
        }
    }

    async fn read(&self, id: u32, handle: &Bytes, offset: u64, len: u32) -> ResponsePacket {
        let Some(open) = self.lookup(handle) else {
            return bad_handle(id);
        };
        let OpenHandle::File(file) = open.as_ref() else {
            return bad_handle(id);
        };

        let reader = match self.file_reader(file).await {
            Ok(reader) => reader,
            Err(e) => return io_status(id, &e),
        };

        let len = len.min(self.max_read_len());
        match reader.read_at(offset, len).await {
            Err(e) => io_status(id, &e),
            Ok(data) if data.is_empty() && len > 0 => status(id, StatusCode::Eof, ""),
            Ok(data) => ResponsePacket::Data { id, data },
        }
    }

    async fn write(&self, id: u32, handle: &Bytes, offset: u64, data: &[u8]) -> ResponsePacket {
        let Some(open) = self.lookup(handle) else {
            return bad_handle(id);
        };
        let OpenHandle::File(file) = open.as_ref() else {
            return bad_handle(id);
        };

        let writer = match self.file_writer(file).await {
            Ok(writer) => writer,
            Err(e) => return io_status(id, &e),
        };

        match writer.write_at(offset, data).await {
            Ok(()) => ok(id),
            Err(e) => io_status(id, &e),
        }
    }

    async fn file_reader<'a>(
        &self,
        file: &'a OpenFile,
    ) -> std::io::Result<&'a (dyn crate::sftp::handler::FileReadAt + 'static)> {
        let req = SftpRequest::open(
            RequestMethod::Get,
            file.path.clone(),
            file.pflags,
            file.attrs.clone(),
        );
        let boxed = file
            .reader
            .get_or_try_init(|| self.handlers.file_get.file_read(&req))
            .await?;
        Ok(boxed.as_ref())
    }

    async fn file_writer<'a>(
        &self,
        file: &'a OpenFile,
    ) -> std::io::Result<&'a (dyn crate::sftp::handler::FileWriteAt + 'static)> {
        let req = SftpRequest::open(
            RequestMethod::Put,
            file.path.clone(),
            file.pflags,
            file.attrs.clone(),
        );
        let boxed = file
            .writer
            .get_or_try_init(|| self.handlers.file_put.file_write(&req))
            .await?;
        Ok(boxed.as_ref())
    }

    async fn stat(&self, id: u32, path: String, method: RequestMethod) -> ResponsePacket {
        let req = SftpRequest::path(method, path);
        match self.handlers.file_list.file_list(&req).await {
            Err(e) => io_status(id, &e),
            Ok(lister) => match lister.list_at(0, 1).await {
                Err(e) => io_status(id, &e),
                Ok(entries) => match entries.into_iter().next() {
                    None => status(id, StatusCode::NoSuchFile, ""),
                    Some(entry) => ResponsePacket::Attrs {
                        id,
                        attrs: entry.attrs,
                    },
                },
            },
        }
    }

    async fn setstat(&self, id: u32, path: String, attrs: FileAttributes) -> ResponsePacket {
        let mut req = SftpRequest::path(RequestMethod::Setstat, path);
        req.attrs = Some(attrs);
        self.cmd(id, req).await
    }

    async fn cmd(&self, id: u32, req: SftpRequest) -> ResponsePacket {
        match self.handlers.file_cmd.file_cmd(&req).await {
            Ok(()) => ok(id),
            Err(e) => io_status(id, &e),
        }
    }

    async fn readdir(&self, id: u32, handle: &Bytes) -> ResponsePacket {
        let Some(open) = self.lookup(handle) else {
            return bad_handle(id);
        };
        let OpenHandle::Dir(dir) = open.as_ref() else {
            return bad_handle(id);
        };

        let req = SftpRequest::path(RequestMethod::List, dir.path.clone());
        let lister = match dir
            .lister
            .get_or_try_init(|| self.handlers.file_list.file_list(&req))
            .await
        {
            Ok(lister) => lister,
            Err(e) => return io_status(id, &e),
        };

        let batch = self.opts.readdir_batch.max(1);
        let offset = dir.offset.fetch_add(batch as u64, Ordering::SeqCst);
        match lister.list_at(offset, batch).await {
            Err(e) => io_status(id, &e),
            Ok(entries) if entries.is_empty() => status(id, StatusCode::Eof, ""),
            Ok(entries) => ResponsePacket::Name {
                id,
                entries: entries
                    .into_iter()
                    .map(|e| NameEntry {
                        longname: longname::format(&e.name, &e.attrs),
                        filename: e.name,
                        attrs: e.attrs,
                    })
                    .collect(),
            },
        }
    }

    async fn extended(&self, id: u32, name: &str, payload: Bytes) -> ResponsePacket {
        match name {
            EXT_POSIX_RENAME => {
                let mut r = WireReader::new(payload);
                let (oldpath, newpath) =
                    match (r.string("oldpath"), r.string("newpath"), r.finish(name)) {
                        (Ok(o), Ok(n), Ok(())) => (o, n),
                        _ => return status(id, StatusCode::BadMessage, "malformed posix-rename"),
                    };
                let req = SftpRequest::with_target(
                    RequestMethod::PosixRename,
                    clean_path(&oldpath),
                    clean_path(&newpath),
                );
                self.cmd(id, req).await
            }
            EXT_HARDLINK => {
                let mut r = WireReader::new(payload);
                let (oldpath, newpath) =
                    match (r.string("oldpath"), r.string("newpath"), r.finish(name)) {
                        (Ok(o), Ok(n), Ok(())) => (o, n),
                        _ => return status(id, StatusCode::BadMessage, "malformed hardlink"),
                    };
                let req = SftpRequest::with_target(
                    RequestMethod::Link,
                    clean_path(&oldpath),
                    clean_path(&newpath),
                );
                self.cmd(id, req).await
            }
            EXT_FSYNC => {
                let mut r = WireReader::new(payload);
                let handle = match (r.bytes("handle"), r.finish(name)) {
                    (Ok(h), Ok(())) => h,
                    _ => return status(id, StatusCode::BadMessage, "malformed fsync"),
                };
                let Some(open) = self.lookup(&handle) else {
                    return bad_handle(id);
                };
                let OpenHandle::File(file) = open.as_ref() else {
                    return bad_handle(id);
                };
                // Nothing written through this handle yet: nothing to
                // flush.
                match file.writer.get() {
                    None => ok(id),
                    Some(writer) => match writer.sync().await {
                        Ok(()) => ok(id),
                        Err(e) => io_status(id, &e),
                    },
                }
            }
            EXT_STATVFS => {
                let mut r = WireReader::new(payload);
                let path = match (r.string("path"), r.finish(name)) {
                    (Ok(p), Ok(())) => p,
                    _ => return status(id, StatusCode::BadMessage, "malformed statvfs"),
                };
                match self.handlers.file_cmd.statvfs(&clean_path(&path)).await {
                    Ok(vfs) => ResponsePacket::ExtendedReply {
                        id,
                        payload: vfs.encode(),
                    },
                    Err(e) => io_status(id, &e),
                }
            }
            other => {
                warn!("unsupported extension request: {}", other);
                status(id, StatusCode::OpUnsupported, "unknown extension")
            }
        }
    }
}

/// Consumes the INIT frame and answers VERSION with the advertised
/// extension set. Returns the negotiated version.
async fn negotiate<R, W>(rd: &mut R, wr: &mut W, max_frame: usize) -> Result<u32>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let payload = read_frame(rd, max_frame)
        .await?
        .ok_or_else(|| Error::Protocol("stream closed before INIT".to_string()))?;
    let version = match RequestPacket::decode(payload)? {
        RequestPacket::Init { version, .. } => version,
        other => {
            return Err(Error::Protocol(format!(
                "expected INIT, got {:?}",
                other
            )))
        }
    };

    let negotiated = version.min(SFTP_VERSION);
    let reply = ResponsePacket::Version {
        version: negotiated,
        extensions: SERVER_EXTENSIONS
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_string()))
            .collect(),
    };
    write_frame(wr, &reply.encode()).await?;
    info!("sftp session negotiated version {}", negotiated);
    Ok(negotiated)
}

enum Decoded {
    Packet(RequestPacket),
    BadMessage(ResponsePacket),
}

/// Frame-level damage is fatal; a known request type with a damaged
/// body is answered with BAD_MESSAGE and the session survives.
fn decode_request(payload: Bytes) -> Result<Decoded> {
    match RequestPacket::decode(payload.clone()) {
        Ok(RequestPacket::Init { .. }) => Err(Error::Protocol(
            "unexpected INIT after negotiation".to_string(),
        )),
        Ok(pkt) => Ok(Decoded::Packet(pkt)),
        Err(err) => {
            if let Some((typ, id)) = peek_type_and_id(&payload) {
                if is_known_request_type(typ) {
                    debug!("bad request packet (type {}): {}", typ, err);
                    return Ok(Decoded::BadMessage(status(
                        id,
                        StatusCode::BadMessage,
                        &err.to_string(),
                    )));
                }
            }
            Err(err)
        }
    }
}

/// Serial per-session server: one request at a time, replies in order.
pub struct RequestServer<S> {
    stream: S,
    handlers: Handlers,
    opts: ServerOptions,
}

impl<S> RequestServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Serves `handlers` over `stream` with default options.
    pub fn new(stream: S, handlers: Handlers) -> Self {
        Self::with_options(stream, handlers, ServerOptions::default())
    }

    /// Serves `handlers` over `stream` with explicit options.
    pub fn with_options(stream: S, handlers: Handlers, opts: ServerOptions) -> Self {
        Self {
            stream,
            handlers,
            opts,
        }
    }

    /// Runs the session until the peer closes the stream (returns
    /// `Ok`) or a fatal transport/decode error occurs.
    pub async fn serve(self) -> Result<()> {
        let max_frame = self.opts.max_frame_len;
        let (mut rd, mut wr) = tokio::io::split(self.stream);
        negotiate(&mut rd, &mut wr, max_frame).await?;

        let session = Session::new(self.handlers, self.opts);
        loop {
            let payload = match read_frame(&mut rd, max_frame).await? {
                Some(payload) => payload,
                None => return Ok(()),
            };
            let reply = match decode_request(payload)? {
                Decoded::Packet(pkt) => session.dispatch(pkt).await,
                Decoded::BadMessage(reply) => reply,
            };
            write_frame(&mut wr, &reply.encode()).await?;
        }
    }
}

/// Concurrent server: a worker pool dispatches packets while a packet
/// manager keeps replies in arrival order.
pub struct PacketServer<S> {
    stream: S,
    handlers: Handlers,
    opts: ServerOptions,
}

impl<S> PacketServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Serves `handlers` over `stream` with default options.
    pub fn new(stream: S, handlers: Handlers) -> Self {
        Self::with_options(stream, handlers, ServerOptions::default())
    }

    /// Serves `handlers` over `stream` with explicit options.
    pub fn with_options(stream: S, handlers: Handlers, opts: ServerOptions) -> Self {
        Self {
            stream,
            handlers,
            opts,
        }
    }

    /// Runs the session until the peer closes the stream or a fatal
    /// error occurs. Worker and writer tasks are joined before this
    /// returns.
    pub async fn serve(self) -> Result<()> {
        let max_frame = self.opts.max_frame_len;
        let workers = self.opts.workers.max(1);
        let queue_depth = self.opts.queue_depth.max(1);

        let (mut rd, mut wr) = tokio::io::split(self.stream);
        negotiate(&mut rd, &mut wr, max_frame).await?;

        let session = Arc::new(Session::new(self.handlers, self.opts));
        let (reply_tx, mgr) = packet_mgr::channel(workers);
        let writer = tokio::spawn(mgr.run(wr));

        let (pkt_tx, pkt_rx) = mpsc::channel::<(u64, RequestPacket)>(queue_depth);
        let pkt_rx = Arc::new(tokio::sync::Mutex::new(pkt_rx));

        let mut worker_handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let session = Arc::clone(&session);
            let rx = Arc::clone(&pkt_rx);
            let tx = reply_tx.clone();
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    let Some((seq, pkt)) = item else { break };
                    let reply = session.dispatch(pkt).await;
                    if tx.send((seq, reply.encode())).await.is_err() {
                        break;
                    }
                }
            }));
        }

        let mut seq: u64 = 0;
        let result = loop {
            match read_frame(&mut rd, max_frame).await {
                Ok(Some(payload)) => match decode_request(payload) {
                    Ok(Decoded::Packet(pkt)) => {
                        if pkt_tx.send((seq, pkt)).await.is_err() {
                            break Err(Error::ConnectionLost(
                                "server workers stopped".to_string(),
                            ));
                        }
                        seq += 1;
                    }
                    Ok(Decoded::BadMessage(reply)) => {
                        if reply_tx.send((seq, reply.encode())).await.is_err() {
                            break Err(Error::ConnectionLost(
                                "server writer stopped".to_string(),
                            ));
                        }
                        seq += 1;
                    }
                    Err(e) => break Err(e),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Shut down in dependency order: workers drain the queue, then
        // the manager sees all senders dropped and finishes the write
        // side.
        drop(pkt_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        drop(reply_tx);
        let writer_result = writer
            .await
            .map_err(|e| Error::Other(Box::new(e)))?;

        result.and(writer_result)
    }
}
