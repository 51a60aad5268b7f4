//! Long-form directory listing lines.
//!
//! READDIR entries carry an `ls -l` style line next to the structured
//! attrs. The line is informational only; clients are expected to parse
//! the attrs instead.

use crate::sftp::attrs::FileAttributes;
use crate::sftp::consts::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFSOCK, S_ISGID, S_ISUID, S_ISVTX,
};
use chrono::{DateTime, Utc};

// ls switches to the year form for entries older than this.
const SIX_MONTHS_SECS: i64 = 182 * 24 * 60 * 60;

/// Formats one `ls -l` line for a directory entry:
/// mode string, link count, uid, gid, size, mtime, name.
pub fn format(name: &str, attrs: &FileAttributes) -> String {
    let mode = mode_string(attrs.permissions.unwrap_or(0));
    let uid = attrs.uid.unwrap_or(0);
    let gid = attrs.gid.unwrap_or(0);
    let size = attrs.size.unwrap_or(0);
    let mtime = format_mtime(attrs.mtime.unwrap_or(0) as i64);

    format!(
        "{mode} {links:>4} {uid:<8} {gid:<8} {size:>8} {mtime} {name}",
        links = 1
    )
}

fn format_mtime(mtime: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp(mtime, 0).unwrap_or_default();
    let age = Utc::now().timestamp() - mtime;
    if (0..SIX_MONTHS_SECS).contains(&age) {
        dt.format("%b %e %H:%M").to_string()
    } else {
        dt.format("%b %e  %Y").to_string()
    }
}

/// Renders the ten-character type and permission string (`drwxr-xr-x`).
pub fn mode_string(mode: u32) -> String {
    let mut out = String::with_capacity(10);

    out.push(match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFBLK => 'b',
        S_IFCHR => 'c',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        _ => '-',
    });

    let triplet = |out: &mut String, bits: u32, special: bool, special_char: char| {
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(match (bits & 0o1 != 0, special) {
            (true, true) => special_char,
            (false, true) => special_char.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    };

    triplet(&mut out, (mode >> 6) & 0o7, mode & S_ISUID != 0, 's');
    triplet(&mut out, (mode >> 3) & 0o7, mode & S_ISGID != 0, 's');
    triplet(&mut out, mode & 0o7, mode & S_ISVTX != 0, 't');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::consts::S_IFREG;

    #[test]
    fn test_mode_string_regular() {
        assert_eq!(mode_string(S_IFREG | 0o644), "-rw-r--r--");
        assert_eq!(mode_string(S_IFREG | 0o755), "-rwxr-xr-x");
    }

    #[test]
    fn test_mode_string_types() {
        assert_eq!(mode_string(S_IFDIR | 0o755).chars().next(), Some('d'));
        assert_eq!(mode_string(S_IFLNK | 0o777).chars().next(), Some('l'));
        assert_eq!(mode_string(S_IFIFO).chars().next(), Some('p'));
        assert_eq!(mode_string(S_IFSOCK).chars().next(), Some('s'));
        assert_eq!(mode_string(S_IFBLK).chars().next(), Some('b'));
        assert_eq!(mode_string(S_IFCHR).chars().next(), Some('c'));
    }

    #[test]
    fn test_mode_string_special_bits() {
        assert_eq!(mode_string(S_IFREG | S_ISUID | 0o4755), "-rwsr-xr-x");
        assert_eq!(mode_string(S_IFREG | S_ISUID | 0o644), "-rwSr--r--");
        assert_eq!(mode_string(S_IFDIR | S_ISVTX | 0o1777), "drwxrwxrwt");
    }

    #[test]
    fn test_format_line_shape() {
        let attrs = FileAttributes {
            size: Some(1024),
            uid: Some(501),
            gid: Some(20),
            permissions: Some(S_IFREG | 0o644),
            atime: Some(0),
            mtime: Some(0),
            extended: Vec::new(),
        };
        let line = format("hello.txt", &attrs);
        assert!(line.starts_with("-rw-r--r--"), "{line}");
        assert!(line.ends_with("hello.txt"), "{line}");
        assert!(line.contains("501"), "{line}");
        assert!(line.contains("1024"), "{line}");
        // Epoch mtime is long past the recent cutoff.
        assert!(line.contains("1970"), "{line}");
    }
}
