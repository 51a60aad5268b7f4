//! OpenSSH protocol extensions.
//!
//! Extension requests ride in `SSH_FXP_EXTENDED` packets, dispatched by
//! name; the server advertises its supported set in the VERSION reply
//! and clients gate optional calls on it.

use crate::sftp::wire::{WireReader, WireWriter};
use bytes::Bytes;
use skiff_platform::Result;

/// `posix-rename@openssh.com` - rename that overwrites the target.
pub const EXT_POSIX_RENAME: &str = "posix-rename@openssh.com";
/// `hardlink@openssh.com` - create a hard link.
pub const EXT_HARDLINK: &str = "hardlink@openssh.com";
/// `fsync@openssh.com` - flush an open handle to stable storage.
pub const EXT_FSYNC: &str = "fsync@openssh.com";
/// `statvfs@openssh.com` - filesystem statistics.
pub const EXT_STATVFS: &str = "statvfs@openssh.com";

/// Extensions advertised by the server in its VERSION reply.
pub const SERVER_EXTENSIONS: &[(&str, &str)] = &[
    (EXT_POSIX_RENAME, "1"),
    (EXT_HARDLINK, "1"),
    (EXT_FSYNC, "1"),
    (EXT_STATVFS, "2"),
];

/// Read-only filesystem flag in [`StatVfs::flag`].
pub const SSH_FXE_STATVFS_ST_RDONLY: u64 = 0x1;
/// No-setuid flag in [`StatVfs::flag`].
pub const SSH_FXE_STATVFS_ST_NOSUID: u64 = 0x2;

/// Filesystem statistics, per `statvfs@openssh.com` version 2.
///
/// All fields are uint64 on the wire, in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatVfs {
    /// Filesystem block size
    pub bsize: u64,
    /// Fundamental filesystem block size
    pub frsize: u64,
    /// Number of blocks, in `frsize` units
    pub blocks: u64,
    /// Free blocks
    pub bfree: u64,
    /// Free blocks for unprivileged users
    pub bavail: u64,
    /// Total inodes
    pub files: u64,
    /// Free inodes
    pub ffree: u64,
    /// Free inodes for unprivileged users
    pub favail: u64,
    /// Filesystem id
    pub fsid: u64,
    /// Mount flags (`SSH_FXE_STATVFS_ST_*`)
    pub flag: u64,
    /// Maximum filename length
    pub namemax: u64,
}

impl StatVfs {
    /// Serializes as an EXTENDED_REPLY payload.
    pub(crate) fn encode(&self) -> Bytes {
        let mut w = WireWriter::new();
        w.u64(self.bsize)
            .u64(self.frsize)
            .u64(self.blocks)
            .u64(self.bfree)
            .u64(self.bavail)
            .u64(self.files)
            .u64(self.ffree)
            .u64(self.favail)
            .u64(self.fsid)
            .u64(self.flag)
            .u64(self.namemax);
        w.freeze()
    }

    /// Parses an EXTENDED_REPLY payload.
    pub(crate) fn decode(payload: Bytes) -> Result<Self> {
        let mut r = WireReader::new(payload);
        let vfs = Self {
            bsize: r.u64("statvfs bsize")?,
            frsize: r.u64("statvfs frsize")?,
            blocks: r.u64("statvfs blocks")?,
            bfree: r.u64("statvfs bfree")?,
            bavail: r.u64("statvfs bavail")?,
            files: r.u64("statvfs files")?,
            ffree: r.u64("statvfs ffree")?,
            favail: r.u64("statvfs favail")?,
            fsid: r.u64("statvfs fsid")?,
            flag: r.u64("statvfs flag")?,
            namemax: r.u64("statvfs namemax")?,
        };
        r.finish("statvfs reply")?;
        Ok(vfs)
    }

    /// Free bytes available to unprivileged users.
    pub fn available_bytes(&self) -> u64 {
        self.frsize.saturating_mul(self.bavail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statvfs_roundtrip() {
        let vfs = StatVfs {
            bsize: 4096,
            frsize: 4096,
            blocks: 1 << 20,
            bfree: 1 << 19,
            bavail: 1 << 18,
            files: 65536,
            ffree: 32768,
            favail: 32768,
            fsid: 0xfeed,
            flag: SSH_FXE_STATVFS_ST_RDONLY,
            namemax: 255,
        };
        let wire = vfs.encode();
        assert_eq!(wire.len(), 11 * 8);
        assert_eq!(StatVfs::decode(wire).unwrap(), vfs);
    }

    #[test]
    fn test_statvfs_available_bytes() {
        let vfs = StatVfs {
            frsize: 4096,
            bavail: 10,
            ..Default::default()
        };
        assert_eq!(vfs.available_bytes(), 40960);
    }

    #[test]
    fn test_truncated_statvfs_rejected() {
        assert!(StatVfs::decode(Bytes::from_static(&[0u8; 16])).is_err());
    }
}
