//! Ordered reply serialization for the packet server.
//!
//! Workers finish out of order; replies must leave in arrival order.
//! Each incoming request carries a monotonically increasing sequence
//! number. A worker that finishes sequence `s` hands its encoded reply
//! to the manager; the manager advances a cursor, writing each reply as
//! soon as every earlier sequence has been written. The channel
//! capacity equals the worker count, so the number of replies parked
//! ahead of a missing one stays bounded.

use crate::sftp::wire::write_frame;
use bytes::Bytes;
use skiff_platform::Result;
use std::collections::BTreeMap;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

pub(crate) struct PacketManager {
    rx: mpsc::Receiver<(u64, Bytes)>,
}

/// Creates the reply channel and its manager. `capacity` is the worker
/// count of the serving pool.
pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<(u64, Bytes)>, PacketManager) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, PacketManager { rx })
}

impl PacketManager {
    /// Drains replies onto `w` in sequence order until every sender is
    /// dropped. Replies for sequences that never arrive (session torn
    /// down mid-flight) are discarded rather than written out of order.
    pub(crate) async fn run<W>(mut self, mut w: W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut cursor: u64 = 0;
        let mut parked: BTreeMap<u64, Bytes> = BTreeMap::new();

        while let Some((seq, frame)) = self.rx.recv().await {
            parked.insert(seq, frame);
            while let Some(frame) = parked.remove(&cursor) {
                write_frame(&mut w, &frame).await?;
                cursor += 1;
            }
        }
        Ok(())
    }
}
