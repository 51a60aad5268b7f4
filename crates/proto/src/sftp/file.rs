//! The client-side open file: POSIX-like I/O over request/reply.
//!
//! Sequential reads and writes are pipelined: a logical call is split
//! into chunks of at most `P` bytes (`ClientOptions::max_packet`), with
//! up to `W` chunks in flight (`ClientOptions::max_concurrent_requests`).
//! Chunks complete out of order on the wire; the deque below drains
//! them strictly in issue order, so reassembly is positional and a
//! short reply for an interior chunk is repaired by re-issuing a read
//! for the missing tail ahead of everything else. The first chunk that
//! comes back as an EOF status ends the transfer; bytes gathered before
//! it are delivered.

use crate::sftp::attrs::FileAttributes;
use crate::sftp::client::{
    await_reply, expect_attrs, expect_data, expect_status, ClientOptions, Conn,
};
use crate::sftp::extensions::EXT_FSYNC;
use crate::sftp::packet::{RequestPacket, ResponsePacket};
use crate::sftp::wire::WireWriter;
use bytes::Bytes;
use skiff_platform::{Error, Result};
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

type ReplySlot = oneshot::Receiver<Result<ResponsePacket>>;

/// A remote open file (or the client end of an open handle).
///
/// Sequential [`read`](Self::read)/[`write`](Self::write) advance an
/// internal offset; the positional variants leave it untouched. Call
/// [`close`](Self::close) when done; the handle server-side lives until
/// then.
pub struct RemoteFile {
    conn: Arc<Conn>,
    opts: ClientOptions,
    handle: Bytes,
    path: String,
    offset: u64,
    closed: bool,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Awaits every outstanding chunk, discarding results. Keeps
/// at-most-once bookkeeping intact when a transfer aborts early.
async fn drain<T>(mut pending: VecDeque<(u64, T, ReplySlot)>) {
    while let Some((_, _, rx)) = pending.pop_front() {
        let _ = rx.await;
    }
}

impl RemoteFile {
    pub(crate) fn new(
        conn: Arc<Conn>,
        opts: ClientOptions,
        handle: Bytes,
        path: String,
    ) -> Self {
        Self {
            conn,
            opts,
            handle,
            path,
            offset: 0,
            closed: false,
        }
    }

    /// The path this file was opened with.
    pub fn name(&self) -> &str {
        &self.path
    }

    fn window_for(&self, len: usize) -> usize {
        if self.opts.disable_concurrent_reads {
            return 1;
        }
        let chunk = self.opts.max_packet.max(1);
        let needed = len.div_ceil(chunk);
        needed.clamp(1, self.opts.max_concurrent_requests.max(1))
    }

    /// Reads at the current offset, advancing it. Returns the number
    /// of bytes placed in `buf`; 0 means end of file.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(buf, self.offset).await?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Reads at an explicit offset without touching the file offset.
    /// Pipelined unless `disable_concurrent_reads` is set.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = self.opts.max_packet.max(1) as u64;
        let window = self.window_for(buf.len());
        let end = offset + buf.len() as u64;

        let mut pending: VecDeque<(u64, u32, ReplySlot)> = VecDeque::with_capacity(window);
        let mut next = offset;
        let mut filled = 0usize;

        loop {
            while pending.len() < window && next < end {
                let len = (end - next).min(chunk) as u32;
                let handle = self.handle.clone();
                match self
                    .conn
                    .post(move |id| RequestPacket::Read {
                        id,
                        handle,
                        offset: next,
                        len,
                    })
                    .await
                {
                    Ok(rx) => pending.push_back((next, len, rx)),
                    Err(e) => {
                        drain(pending).await;
                        return Err(e);
                    }
                }
                next += len as u64;
            }

            let Some((off, len, rx)) = pending.pop_front() else {
                break;
            };
            let reply = match await_reply(rx).await {
                Ok(reply) => reply,
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
            };
            match expect_data(reply) {
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
                // EOF at `off`: everything before it is already in
                // `buf`, everything after it is void.
                Ok(None) => {
                    drain(pending).await;
                    break;
                }
                Ok(Some(data)) => {
                    let start = (off - offset) as usize;
                    let n = data.len().min(buf.len() - start);
                    buf[start..start + n].copy_from_slice(&data[..n]);
                    filled = start + n;

                    if (n as u32) < len {
                        // Short interior reply: re-issue the missing
                        // tail ahead of later chunks so the gap is
                        // either filled or proven to be EOF.
                        let tail_off = off + n as u64;
                        let tail_len = len - n as u32;
                        let handle = self.handle.clone();
                        match self
                            .conn
                            .post(move |id| RequestPacket::Read {
                                id,
                                handle,
                                offset: tail_off,
                                len: tail_len,
                            })
                            .await
                        {
                            Ok(rx) => pending.push_front((tail_off, tail_len, rx)),
                            Err(e) => {
                                drain(pending).await;
                                return Err(e);
                            }
                        }
                    }
                }
            }
        }

        Ok(filled)
    }

    /// Writes at the current offset, advancing it.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.write_at(buf, self.offset).await?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Writes at an explicit offset without touching the file offset.
    /// Chunks are pipelined; on the first failed chunk no further
    /// chunks are issued, the in-flight ones are drained, and the
    /// error is returned.
    pub async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = self.opts.max_packet.max(1);
        let window = self.opts.max_concurrent_requests.max(1);

        let mut pending: VecDeque<(u64, usize, ReplySlot)> = VecDeque::with_capacity(window);
        let mut sent = 0usize;

        loop {
            while pending.len() < window && sent < buf.len() {
                let n = (buf.len() - sent).min(chunk);
                let off = offset + sent as u64;
                let data = Bytes::copy_from_slice(&buf[sent..sent + n]);
                let handle = self.handle.clone();
                match self
                    .conn
                    .post(move |id| RequestPacket::Write {
                        id,
                        handle,
                        offset: off,
                        data,
                    })
                    .await
                {
                    Ok(rx) => pending.push_back((off, n, rx)),
                    Err(e) => {
                        drain(pending).await;
                        return Err(e);
                    }
                }
                sent += n;
            }

            let Some((_, _, rx)) = pending.pop_front() else {
                break;
            };
            let reply = match await_reply(rx).await {
                Ok(reply) => reply,
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
            };
            if let Err(e) = expect_status(reply) {
                drain(pending).await;
                return Err(e);
            }
        }

        Ok(buf.len())
    }

    /// Streams from `src` into the file at the current offset using
    /// the write pipeline. Returns the number of bytes transferred.
    pub async fn read_from<R>(&mut self, src: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let chunk = self.opts.max_packet.max(1);
        let window = self.opts.max_concurrent_requests.max(1);

        let mut pending: VecDeque<(u64, usize, ReplySlot)> = VecDeque::with_capacity(window);
        let start = self.offset;
        let mut offset = self.offset;
        let mut source_done = false;

        loop {
            while !source_done && pending.len() < window {
                let mut data = vec![0u8; chunk];
                let n = match src.read(&mut data).await {
                    Ok(n) => n,
                    Err(e) => {
                        drain(pending).await;
                        return Err(Error::Io(e));
                    }
                };
                if n == 0 {
                    source_done = true;
                    break;
                }
                data.truncate(n);
                let off = offset;
                let data = Bytes::from(data);
                let handle = self.handle.clone();
                match self
                    .conn
                    .post(move |id| RequestPacket::Write {
                        id,
                        handle,
                        offset: off,
                        data,
                    })
                    .await
                {
                    Ok(rx) => pending.push_back((off, n, rx)),
                    Err(e) => {
                        drain(pending).await;
                        return Err(e);
                    }
                }
                offset += n as u64;
            }

            let Some((_, _, rx)) = pending.pop_front() else {
                if source_done {
                    break;
                }
                continue;
            };
            let reply = match await_reply(rx).await {
                Ok(reply) => reply,
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
            };
            if let Err(e) = expect_status(reply) {
                drain(pending).await;
                return Err(e);
            }
        }

        self.offset = offset;
        Ok(offset - start)
    }

    /// Streams the file from the current offset into `dst` using the
    /// read pipeline. Returns the number of bytes transferred.
    pub async fn write_to<W>(&mut self, dst: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let chunk = self.opts.max_packet.max(1) as u32;
        let window = if self.opts.disable_concurrent_reads {
            1
        } else {
            self.opts.max_concurrent_requests.max(1)
        };

        let mut pending: VecDeque<(u64, u32, ReplySlot)> = VecDeque::with_capacity(window);
        let mut next = self.offset;
        let mut total = 0u64;
        let mut eof = false;

        loop {
            while !eof && pending.len() < window {
                let handle = self.handle.clone();
                let off = next;
                match self
                    .conn
                    .post(move |id| RequestPacket::Read {
                        id,
                        handle,
                        offset: off,
                        len: chunk,
                    })
                    .await
                {
                    Ok(rx) => pending.push_back((off, chunk, rx)),
                    Err(e) => {
                        drain(pending).await;
                        return Err(e);
                    }
                }
                next += chunk as u64;
            }

            let Some((off, len, rx)) = pending.pop_front() else {
                break;
            };
            let reply = match await_reply(rx).await {
                Ok(reply) => reply,
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
            };
            match expect_data(reply) {
                Err(e) => {
                    drain(pending).await;
                    return Err(e);
                }
                Ok(None) => {
                    eof = true;
                    drain(pending).await;
                    break;
                }
                Ok(Some(data)) => {
                    if let Err(e) = dst.write_all(&data).await {
                        drain(pending).await;
                        return Err(Error::Io(e));
                    }
                    total += data.len() as u64;

                    if (data.len() as u32) < len {
                        // Keep `dst` strictly in file order: the gap
                        // left by a short reply is read next, before
                        // any later chunk is written out.
                        let tail_off = off + data.len() as u64;
                        let tail_len = len - data.len() as u32;
                        let handle = self.handle.clone();
                        match self
                            .conn
                            .post(move |id| RequestPacket::Read {
                                id,
                                handle,
                                offset: tail_off,
                                len: tail_len,
                            })
                            .await
                        {
                            Ok(rx) => pending.push_front((tail_off, tail_len, rx)),
                            Err(e) => {
                                drain(pending).await;
                                return Err(e);
                            }
                        }
                    }
                }
            }
        }

        self.offset += total;
        Ok(total)
    }

    /// Moves the file offset. Only `SeekFrom::End` talks to the
    /// server (an FSTAT to learn the size).
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.offset as i128 + d as i128,
            SeekFrom::End(d) => {
                let size = self.stat().await?.size.unwrap_or(0);
                size as i128 + d as i128
            }
        };
        if target < 0 || target > u64::MAX as i128 {
            return Err(Error::Protocol("seek outside the file's range".to_string()));
        }
        self.offset = target as u64;
        Ok(self.offset)
    }

    /// Attributes of the open file (FSTAT).
    pub async fn stat(&self) -> Result<FileAttributes> {
        let handle = self.handle.clone();
        let reply = self
            .conn
            .call(move |id| RequestPacket::Fstat { id, handle })
            .await?;
        expect_attrs(reply)
    }

    /// Truncates the open file to `size` bytes.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        self.fsetstat(FileAttributes {
            size: Some(size),
            ..Default::default()
        })
        .await
    }

    /// Changes the open file's permission bits.
    pub async fn chmod(&self, mode: u32) -> Result<()> {
        self.fsetstat(FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        })
        .await
    }

    /// Changes the open file's ownership.
    pub async fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        self.fsetstat(FileAttributes {
            uid: Some(uid),
            gid: Some(gid),
            ..Default::default()
        })
        .await
    }

    async fn fsetstat(&self, attrs: FileAttributes) -> Result<()> {
        let handle = self.handle.clone();
        let reply = self
            .conn
            .call(move |id| RequestPacket::FSetStat { id, handle, attrs })
            .await?;
        expect_status(reply)
    }

    /// Flushes the file to stable storage (`fsync@openssh.com`).
    pub async fn sync(&self) -> Result<()> {
        if !self.conn.has_extension(EXT_FSYNC) {
            return Err(Error::Unsupported(format!(
                "server does not support {}",
                EXT_FSYNC
            )));
        }
        let mut w = WireWriter::new();
        w.bytes(&self.handle);
        let payload = w.freeze();
        let reply = self
            .conn
            .call(move |id| RequestPacket::Extended {
                id,
                name: EXT_FSYNC.to_string(),
                payload,
            })
            .await?;
        expect_status(reply)
    }

    /// Closes the handle. The server forgets it even when the
    /// underlying close fails; a second call is a no-op.
    ///
    /// Every operation on this file awaits its replies before
    /// returning, so close synchronizes-after all of them.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let handle = self.handle.clone();
        let reply = self
            .conn
            .call(move |id| RequestPacket::Close { id, handle })
            .await?;
        expect_status(reply)
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        if !self.closed {
            debug!("remote file {} dropped without close", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::client::conn_for_tests;

    fn test_file() -> (RemoteFile, tokio::io::DuplexStream) {
        let (conn, far) = conn_for_tests();
        let file = RemoteFile::new(
            conn,
            ClientOptions::default(),
            Bytes::from_static(b"h"),
            "/x".to_string(),
        );
        (file, far)
    }

    #[tokio::test]
    async fn test_seek_is_local() {
        let (mut file, _far) = test_file();

        assert_eq!(file.seek(SeekFrom::Start(100)).await.unwrap(), 100);
        assert_eq!(file.seek(SeekFrom::Current(-50)).await.unwrap(), 50);
        assert_eq!(file.seek(SeekFrom::Current(0)).await.unwrap(), 50);
        assert!(file.seek(SeekFrom::Current(-51)).await.is_err());

        // Failed seeks leave the offset alone.
        assert_eq!(file.seek(SeekFrom::Current(0)).await.unwrap(), 50);
        file.closed = true;
    }

    #[tokio::test]
    async fn test_window_sizing() {
        let (file, _far) = test_file();
        let chunk = file.opts.max_packet;

        assert_eq!(file.window_for(1), 1);
        assert_eq!(file.window_for(chunk), 1);
        assert_eq!(file.window_for(chunk + 1), 2);
        assert_eq!(
            file.window_for(chunk * 1000),
            file.opts.max_concurrent_requests
        );
        let mut file = file;
        file.closed = true;
    }

    #[tokio::test]
    async fn test_disabled_concurrency_forces_window_of_one() {
        let (conn, _far) = conn_for_tests();
        let opts = ClientOptions {
            disable_concurrent_reads: true,
            ..Default::default()
        };
        let mut file = RemoteFile::new(conn, opts, Bytes::from_static(b"h"), "/x".to_string());
        assert_eq!(file.window_for(usize::MAX / 2), 1);
        file.closed = true;
    }
}
