//! File attributes: the flag-gated sparse metadata record.
//!
//! Attributes travel as a uint32 flags word followed by exactly the
//! fields whose flag bits are set, in a fixed order:
//!
//! ```text
//! uint32    flags
//! uint64    size          (ATTR_SIZE)
//! uint32    uid, gid      (ATTR_UIDGID)
//! uint32    permissions   (ATTR_PERMISSIONS)
//! uint32    atime, mtime  (ATTR_ACMODTIME)
//! uint32    extended_count, (string,string)*  (ATTR_EXTENDED)
//! ```
//!
//! The flags word is the sole authority on which fields are present:
//! an absent field means "unchanged" for setstat and "unknown" for
//! stat. Marshaling is deterministic.

use crate::sftp::consts::{
    ATTR_ACMODTIME, ATTR_EXTENDED, ATTR_PERMISSIONS, ATTR_SIZE, ATTR_UIDGID, S_IFDIR, S_IFLNK,
    S_IFMT, S_IFREG,
};
use crate::sftp::wire::{WireReader, WireWriter};
use skiff_platform::Result;

/// File attributes with an explicit presence bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    /// File size in bytes
    pub size: Option<u64>,
    /// Owning user id (present only together with `gid`)
    pub uid: Option<u32>,
    /// Owning group id (present only together with `uid`)
    pub gid: Option<u32>,
    /// POSIX permission bits, including the file type in `S_IFMT`
    pub permissions: Option<u32>,
    /// Access time, seconds since the epoch (present only with `mtime`)
    pub atime: Option<u32>,
    /// Modification time, seconds since the epoch (present only with `atime`)
    pub mtime: Option<u32>,
    /// Extension (type, value) pairs, preserved verbatim
    pub extended: Vec<(String, String)>,
}

impl FileAttributes {
    /// Creates empty attributes (nothing present).
    pub fn new() -> Self {
        Self::default()
    }

    /// The flags word describing which fields are present.
    pub fn flags(&self) -> u32 {
        let mut flags = 0u32;
        if self.size.is_some() {
            flags |= ATTR_SIZE;
        }
        if self.uid.is_some() && self.gid.is_some() {
            flags |= ATTR_UIDGID;
        }
        if self.permissions.is_some() {
            flags |= ATTR_PERMISSIONS;
        }
        if self.atime.is_some() && self.mtime.is_some() {
            flags |= ATTR_ACMODTIME;
        }
        if !self.extended.is_empty() {
            flags |= ATTR_EXTENDED;
        }
        flags
    }

    /// Serializes into `w`, fields in flag order.
    pub(crate) fn encode(&self, w: &mut WireWriter) {
        let flags = self.flags();
        w.u32(flags);

        if let Some(size) = self.size {
            w.u64(size);
        }
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            w.u32(uid);
            w.u32(gid);
        }
        if let Some(perm) = self.permissions {
            w.u32(perm);
        }
        if let (Some(atime), Some(mtime)) = (self.atime, self.mtime) {
            w.u32(atime);
            w.u32(mtime);
        }
        if !self.extended.is_empty() {
            w.u32(self.extended.len() as u32);
            for (typ, value) in &self.extended {
                w.string(typ);
                w.string(value);
            }
        }
    }

    /// Parses from `r`, consuming exactly the flagged fields.
    pub(crate) fn decode(r: &mut WireReader) -> Result<Self> {
        let flags = r.u32("attr flags")?;
        let mut attrs = Self::new();

        if flags & ATTR_SIZE != 0 {
            attrs.size = Some(r.u64("attr size")?);
        }
        if flags & ATTR_UIDGID != 0 {
            attrs.uid = Some(r.u32("attr uid")?);
            attrs.gid = Some(r.u32("attr gid")?);
        }
        if flags & ATTR_PERMISSIONS != 0 {
            attrs.permissions = Some(r.u32("attr permissions")?);
        }
        if flags & ATTR_ACMODTIME != 0 {
            attrs.atime = Some(r.u32("attr atime")?);
            attrs.mtime = Some(r.u32("attr mtime")?);
        }
        if flags & ATTR_EXTENDED != 0 {
            let count = r.u32("attr extended count")?;
            for _ in 0..count {
                let typ = r.string("attr extended type")?;
                let value = r.string("attr extended value")?;
                attrs.extended.push((typ, value));
            }
        }

        Ok(attrs)
    }

    /// True if the permissions field marks a directory.
    pub fn is_dir(&self) -> bool {
        self.permissions
            .map(|m| m & S_IFMT == S_IFDIR)
            .unwrap_or(false)
    }

    /// True if the permissions field marks a regular file.
    pub fn is_regular(&self) -> bool {
        self.permissions
            .map(|m| m & S_IFMT == S_IFREG)
            .unwrap_or(false)
    }

    /// True if the permissions field marks a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.permissions
            .map(|m| m & S_IFMT == S_IFLNK)
            .unwrap_or(false)
    }

    /// Builds attributes from host filesystem metadata.
    #[cfg(unix)]
    pub fn from_metadata(md: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            size: Some(md.size()),
            uid: Some(md.uid()),
            gid: Some(md.gid()),
            permissions: Some(md.mode()),
            atime: Some(clamp_time(md.atime())),
            mtime: Some(clamp_time(md.mtime())),
            extended: Vec::new(),
        }
    }

    /// Builds attributes from host filesystem metadata.
    #[cfg(not(unix))]
    pub fn from_metadata(md: &std::fs::Metadata) -> Self {
        use crate::sftp::consts::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR, S_IFREG};
        use std::time::UNIX_EPOCH;

        let type_bits = if md.is_dir() {
            S_IFDIR
        } else if md.file_type().is_symlink() {
            S_IFLNK
        } else {
            S_IFREG
        };
        let perm = if md.is_dir() {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        };
        let mtime = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
            .unwrap_or(0);

        Self {
            size: Some(md.len()),
            uid: None,
            gid: None,
            permissions: Some(type_bits | perm),
            atime: Some(mtime),
            mtime: Some(mtime),
            extended: Vec::new(),
        }
    }
}

#[cfg(unix)]
fn clamp_time(t: i64) -> u32 {
    t.clamp(0, u32::MAX as i64) as u32
}
