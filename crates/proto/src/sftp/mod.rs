//! SFTP (SSH File Transfer Protocol) version 3.
//!
//! This module implements both sides of the protocol over any reliable,
//! ordered byte stream (`AsyncRead + AsyncWrite`), typically an SSH
//! channel with the `sftp` subsystem requested.
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Wire codec** ([`packet`], [`attrs`]) - length-prefixed frames,
//!    the typed packet set, and the flag-gated attribute record
//! 2. **Client** ([`client`], [`file`]) - request/reply multiplexing
//!    over a pending-waiter table, plus a POSIX-like file object with
//!    pipelined bulk transfer
//! 3. **Server** ([`server`], [`handler`], [`localfs`]) - a serial
//!    request server and a worker-pool packet server over the same
//!    dispatch, backed by pluggable handlers
//!
//! # Protocol Flow
//!
//! ```text
//! Client                          Server
//!   |                               |
//!   |-- SSH_FXP_INIT -------------->|
//!   |<- SSH_FXP_VERSION ------------|  (extensions advertised)
//!   |                               |
//!   |-- SSH_FXP_OPEN -------------->|
//!   |<- SSH_FXP_HANDLE -------------|
//!   |                               |
//!   |-- SSH_FXP_READ (pipelined) -->|
//!   |-- SSH_FXP_READ -------------->|
//!   |<- SSH_FXP_DATA ---------------|
//!   |<- SSH_FXP_DATA ---------------|
//!   |                               |
//!   |-- SSH_FXP_CLOSE ------------->|
//!   |<- SSH_FXP_STATUS -------------|
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use skiff_proto::sftp::SftpClient;
//!
//! # async fn example(stream: tokio::io::DuplexStream) -> skiff_platform::Result<()> {
//! let client = SftpClient::new(stream).await?;
//!
//! client.mkdir_all("/remote/dir").await?;
//! client.upload("local.txt", "/remote/dir/file.txt").await?;
//!
//! for entry in client.read_dir("/remote/dir").await? {
//!     println!("{}", entry.longname);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - [SFTP Draft v3](https://datatracker.ietf.org/doc/html/draft-ietf-secsh-filexfer-02)
//! - [OpenSSH protocol extensions](https://cvsweb.openbsd.org/src/usr.bin/ssh/PROTOCOL)

pub mod attrs;
pub mod client;
pub mod consts;
pub mod error;
pub mod extensions;
pub mod file;
pub mod handler;
pub mod localfs;
pub mod longname;
pub mod packet;
pub mod server;

mod handle;
mod packet_mgr;
mod wire;

// Re-export main types
pub use attrs::FileAttributes;
pub use client::{ClientOptions, SftpClient};
pub use error::StatusCode;
pub use extensions::StatVfs;
pub use file::RemoteFile;
pub use handler::{
    FileCmder, FileInfo, FileLister, FileReadAt, FileReader, FileWriteAt, FileWriter, Handlers,
    ListerAt, RequestMethod, SftpRequest,
};
pub use localfs::LocalFs;
pub use packet::{NameEntry, RequestPacket, ResponsePacket};
pub use server::{PacketServer, RequestServer, ServerOptions};
