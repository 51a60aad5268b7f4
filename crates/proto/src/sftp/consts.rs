//! SFTP wire-protocol constants.
//!
//! Packet type numbers, open flags, attribute flags and POSIX file-type
//! bits per draft-ietf-secsh-filexfer-02.

/// SFTP protocol version implemented by this crate (v3).
pub const SFTP_VERSION: u32 = 3;

// Request packet types.
/// SSH_FXP_INIT - Initialize SFTP session
pub const SSH_FXP_INIT: u8 = 1;
/// SSH_FXP_VERSION - Version response
pub const SSH_FXP_VERSION: u8 = 2;
/// SSH_FXP_OPEN - Open file
pub const SSH_FXP_OPEN: u8 = 3;
/// SSH_FXP_CLOSE - Close file/directory handle
pub const SSH_FXP_CLOSE: u8 = 4;
/// SSH_FXP_READ - Read from file
pub const SSH_FXP_READ: u8 = 5;
/// SSH_FXP_WRITE - Write to file
pub const SSH_FXP_WRITE: u8 = 6;
/// SSH_FXP_LSTAT - Get attributes without following symlinks
pub const SSH_FXP_LSTAT: u8 = 7;
/// SSH_FXP_FSTAT - Get attributes by handle
pub const SSH_FXP_FSTAT: u8 = 8;
/// SSH_FXP_SETSTAT - Set file attributes by path
pub const SSH_FXP_SETSTAT: u8 = 9;
/// SSH_FXP_FSETSTAT - Set file attributes by handle
pub const SSH_FXP_FSETSTAT: u8 = 10;
/// SSH_FXP_OPENDIR - Open directory
pub const SSH_FXP_OPENDIR: u8 = 11;
/// SSH_FXP_READDIR - Read directory batch
pub const SSH_FXP_READDIR: u8 = 12;
/// SSH_FXP_REMOVE - Remove file
pub const SSH_FXP_REMOVE: u8 = 13;
/// SSH_FXP_MKDIR - Create directory
pub const SSH_FXP_MKDIR: u8 = 14;
/// SSH_FXP_RMDIR - Remove directory
pub const SSH_FXP_RMDIR: u8 = 15;
/// SSH_FXP_REALPATH - Canonicalize path
pub const SSH_FXP_REALPATH: u8 = 16;
/// SSH_FXP_STAT - Get attributes, following symlinks
pub const SSH_FXP_STAT: u8 = 17;
/// SSH_FXP_RENAME - Rename file or directory
pub const SSH_FXP_RENAME: u8 = 18;
/// SSH_FXP_READLINK - Read symlink target
pub const SSH_FXP_READLINK: u8 = 19;
/// SSH_FXP_SYMLINK - Create symbolic link
pub const SSH_FXP_SYMLINK: u8 = 20;

// Response packet types.
/// SSH_FXP_STATUS - Status response
pub const SSH_FXP_STATUS: u8 = 101;
/// SSH_FXP_HANDLE - Handle response
pub const SSH_FXP_HANDLE: u8 = 102;
/// SSH_FXP_DATA - Data response
pub const SSH_FXP_DATA: u8 = 103;
/// SSH_FXP_NAME - Name-list response
pub const SSH_FXP_NAME: u8 = 104;
/// SSH_FXP_ATTRS - Attributes response
pub const SSH_FXP_ATTRS: u8 = 105;

// Extension packets.
/// SSH_FXP_EXTENDED - Extended request
pub const SSH_FXP_EXTENDED: u8 = 200;
/// SSH_FXP_EXTENDED_REPLY - Extended response
pub const SSH_FXP_EXTENDED_REPLY: u8 = 201;

// File open pflags (SSH_FXF_*).
/// Open for reading
pub const SSH_FXF_READ: u32 = 0x00000001;
/// Open for writing
pub const SSH_FXF_WRITE: u32 = 0x00000002;
/// Force writes to append
pub const SSH_FXF_APPEND: u32 = 0x00000004;
/// Create if the file does not exist
pub const SSH_FXF_CREAT: u32 = 0x00000008;
/// Truncate to zero length
pub const SSH_FXF_TRUNC: u32 = 0x00000010;
/// Fail if the file exists
pub const SSH_FXF_EXCL: u32 = 0x00000020;

// File attribute flags (SSH_FILEXFER_ATTR_*).
/// uint64 size follows
pub const ATTR_SIZE: u32 = 0x00000001;
/// uint32 uid and uint32 gid follow
pub const ATTR_UIDGID: u32 = 0x00000002;
/// uint32 permissions follow
pub const ATTR_PERMISSIONS: u32 = 0x00000004;
/// uint32 atime and uint32 mtime follow
pub const ATTR_ACMODTIME: u32 = 0x00000008;
/// count-prefixed (type, value) string pairs follow
pub const ATTR_EXTENDED: u32 = 0x80000000;

// POSIX file-type bits carried in the permissions field.
/// Bit mask for the file-type bit field
pub const S_IFMT: u32 = 0o170000;
/// Socket
pub const S_IFSOCK: u32 = 0o140000;
/// Symbolic link
pub const S_IFLNK: u32 = 0o120000;
/// Regular file
pub const S_IFREG: u32 = 0o100000;
/// Block device
pub const S_IFBLK: u32 = 0o060000;
/// Directory
pub const S_IFDIR: u32 = 0o040000;
/// Character device
pub const S_IFCHR: u32 = 0o020000;
/// Named pipe (FIFO)
pub const S_IFIFO: u32 = 0o010000;
/// Set-user-ID bit
pub const S_ISUID: u32 = 0o4000;
/// Set-group-ID bit
pub const S_ISGID: u32 = 0o2000;
/// Sticky bit
pub const S_ISVTX: u32 = 0o1000;

/// Default permissions for files created without explicit attrs (rw-r--r--).
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default permissions for directories created without explicit attrs (rwxr-xr-x).
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Maximum accepted frame length. Frames above this are a fatal decode
/// error; the bound prevents unbounded allocation from a hostile peer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024;

/// Default READ/WRITE chunk size for pipelined file transfers (32 KiB).
pub const DEFAULT_MAX_PACKET: usize = 32 * 1024;

/// Default cap on in-flight chunks for a single file operation.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;

/// Default number of entries returned per READDIR batch.
pub const DEFAULT_READDIR_BATCH: usize = 128;
