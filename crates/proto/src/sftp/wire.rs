//! Binary wire primitives and framing.
//!
//! Every SFTP packet travels as a length-prefixed frame:
//!
//! ```text
//! uint32    length      (big-endian, length of what follows)
//! byte      type
//! byte[n]   payload
//! ```
//!
//! All integers are big-endian. Strings are a uint32 length followed by
//! raw bytes, no terminator. Frames larger than the configured maximum
//! are rejected before allocation and tear down the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use skiff_platform::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Cursor over a received frame payload.
///
/// Every accessor validates the remaining length before touching the
/// buffer and reports truncation as a protocol error.
pub(crate) struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub(crate) fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::Protocol(format!(
                "truncated packet: need {} bytes for {}, have {}",
                n,
                what,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64())
    }

    /// Length-prefixed byte string; the returned `Bytes` shares the
    /// frame's allocation.
    pub(crate) fn bytes(&mut self, what: &str) -> Result<Bytes> {
        let len = self.u32(what)? as usize;
        self.need(len, what)?;
        Ok(self.buf.split_to(len))
    }

    /// Length-prefixed UTF-8 string.
    pub(crate) fn string(&mut self, what: &str) -> Result<String> {
        let raw = self.bytes(what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::Protocol(format!("{} is not valid UTF-8", what)))
    }

    /// Everything left in the frame.
    pub(crate) fn rest(&mut self) -> Bytes {
        let len = self.buf.remaining();
        self.buf.split_to(len)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Rejects trailing garbage after a fully parsed packet.
    pub(crate) fn finish(&self, what: &str) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::Protocol(format!(
                "{} has {} trailing bytes",
                what,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

/// Builder for an outgoing frame payload.
pub(crate) struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub(crate) fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub(crate) fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    /// Length-prefixed byte string.
    pub(crate) fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_u32(v.len() as u32);
        self.buf.put_slice(v);
        self
    }

    /// Length-prefixed UTF-8 string.
    pub(crate) fn string(&mut self, v: &str) -> &mut Self {
        self.bytes(v.as_bytes())
    }

    /// Raw bytes, no length prefix.
    pub(crate) fn raw(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_slice(v);
        self
    }

    pub(crate) fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads one frame, returning its payload (type byte included).
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary.
/// A stream that ends mid-frame, an empty frame, or a frame longer than
/// `max_len` is an error; callers treat all three as fatal.
pub(crate) async fn read_frame<R>(r: &mut R, max_len: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut got = 0;
    while got < 4 {
        let n = r.read(&mut len_buf[got..]).await.map_err(Error::Io)?;
        if n == 0 {
            if got == 0 {
                return Ok(None);
            }
            return Err(Error::Protocol(
                "stream ended inside a frame length prefix".to_string(),
            ));
        }
        got += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(Error::Protocol("empty frame".to_string()));
    }
    if len > max_len {
        return Err(Error::Protocol(format!(
            "frame length {} exceeds limit {}",
            len, max_len
        )));
    }

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await.map_err(Error::Io)?;
    Ok(Some(Bytes::from(payload)))
}

/// Writes one frame: big-endian length prefix, then the payload.
pub(crate) async fn write_frame<W>(w: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    w.write_all(&frame).await.map_err(Error::Io)?;
    w.flush().await.map_err(Error::Io)?;
    Ok(())
}
