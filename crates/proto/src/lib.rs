//! Protocol implementations for the skiff file-transfer toolkit.
//!
//! This crate provides a Rust implementation of the SSH File Transfer
//! Protocol:
//!
//! - **SFTP** (SSH File Transfer Protocol) - version 3 per
//!   draft-ietf-secsh-filexfer-02, with the widely deployed OpenSSH
//!   extensions (`posix-rename@`, `hardlink@`, `fsync@`, `statvfs@`)
//!
//! The library sits above an opaque, reliable, ordered byte stream
//! (typically an SSH channel) and below either an application that wants
//! to access a remote filesystem (client role) or a handler that backs
//! file operations with some underlying filesystem (server role).
//!
//! # Features
//!
//! - `sftp` (default) - SFTP protocol support (client + server)
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::sftp::{FileAttributes, RequestPacket};
//!
//! // Build and serialize an SFTP packet
//! let packet = RequestPacket::Stat {
//!     id: 1,
//!     path: "/etc/hosts".to_string(),
//! };
//! let wire_format = packet.encode();
//!
//! // Parse from wire format
//! let parsed = RequestPacket::decode(wire_format).unwrap();
//! assert_eq!(parsed, RequestPacket::Stat { id: 1, path: "/etc/hosts".to_string() });
//! # let _ = FileAttributes::default();
//! ```
//!
//! # References
//!
//! - [SFTP Draft v3](https://datatracker.ietf.org/doc/html/draft-ietf-secsh-filexfer-02)
//! - [OpenSSH protocol extensions](https://cvsweb.openbsd.org/src/usr.bin/ssh/PROTOCOL)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "sftp")]
pub mod sftp;
