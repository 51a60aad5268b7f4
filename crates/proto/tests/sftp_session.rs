//! Integration tests for SFTP client-server sessions.
//!
//! Each test wires an `SftpClient` to a server over an in-memory
//! duplex pipe, with the local-filesystem backend rooted in a
//! throwaway temp directory. The tests cover:
//! - end-to-end file round-trips and EOF behavior
//! - pipelined transfers, including servers that return short reads
//! - directory listing, path operations and the OpenSSH extensions
//! - read-only mode and mid-transfer connection teardown

use skiff_platform::Error;
use skiff_proto::sftp::{
    ClientOptions, FileAttributes, FileInfo, FileReadAt, FileReader, LocalFs, PacketServer,
    RequestServer, ServerOptions, SftpClient, SftpRequest, StatusCode,
};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

type ServerHandle = JoinHandle<skiff_platform::Result<()>>;

/// One client + one serial request server over a duplex pipe.
async fn session(server_opts: ServerOptions) -> (SftpClient, ServerHandle) {
    session_with(server_opts, ClientOptions::default()).await
}

async fn session_with(
    server_opts: ServerOptions,
    client_opts: ClientOptions,
) -> (SftpClient, ServerHandle) {
    let (client_side, server_side) = tokio::io::duplex(1 << 20);
    let server = RequestServer::with_options(server_side, LocalFs::handlers(), server_opts);
    let handle = tokio::spawn(server.serve());
    let client = SftpClient::with_options(client_side, client_opts)
        .await
        .expect("sftp handshake");
    (client, handle)
}

/// One client + one worker-pool packet server over a duplex pipe.
async fn packet_session() -> (SftpClient, ServerHandle) {
    let (client_side, server_side) = tokio::io::duplex(1 << 20);
    let server = PacketServer::new(server_side, LocalFs::handlers());
    let handle = tokio::spawn(server.serve());
    let client = SftpClient::new(client_side).await.expect("sftp handshake");
    (client, handle)
}

fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn status_code(err: &Error) -> Option<u32> {
    match err {
        Error::Status { code, .. } => Some(*code),
        _ => None,
    }
}

/// A pattern that makes off-by-one reassembly bugs visible.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test]
async fn test_create_write_read_back_eof() {
    let dir = tempdir();
    let (client, server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "x");

    let mut f = client.create(&path).await.unwrap();
    assert_eq!(f.write(b"hello").await.unwrap(), 5);
    f.close().await.unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut buf = [0u8; 32];
    let n = f.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello");
    // Past EOF: zero bytes.
    assert_eq!(f.read(&mut buf).await.unwrap(), 0);
    f.close().await.unwrap();

    client.close().await.unwrap();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_open_missing_file_is_status_error() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;

    let err = client.open(&path_in(&dir, "absent")).await.unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::NoSuchFile as u32));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mkdir_all_and_stat_chain() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;

    let deep = path_in(&dir, "a/b/c");
    client.mkdir_all(&deep).await.unwrap();

    for sub in ["a", "a/b", "a/b/c"] {
        let attrs = client.stat(&path_in(&dir, sub)).await.unwrap();
        assert!(attrs.is_dir(), "{sub} should be a directory");
    }

    // A second mkdir_all over the same tree is a no-op.
    client.mkdir_all(&deep).await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_truncate_then_read() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "hello");
    std::fs::write(dir.path().join("hello"), b"hello world").unwrap();

    client.truncate(&path, 5).await.unwrap();
    assert_eq!(client.stat(&path).await.unwrap().size, Some(5));

    let mut f = client.open(&path).await.unwrap();
    let mut buf = [0u8; 64];
    let n = f.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello");
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_pipelined_transfer_with_tiny_chunks() {
    let dir = tempdir();
    let opts = ClientOptions {
        max_packet: 7,
        max_concurrent_requests: 4,
        ..Default::default()
    };
    let (client, _server) = session_with(ServerOptions::default(), opts).await;
    let path = path_in(&dir, "big");
    let data = pattern(10_000);

    // Pipelined write, then pipelined read into one buffer.
    let mut f = client.create(&path).await.unwrap();
    assert_eq!(f.write(&data).await.unwrap(), data.len());
    f.close().await.unwrap();
    assert_eq!(std::fs::read(dir.path().join("big")).unwrap(), data);

    let mut f = client.open(&path).await.unwrap();
    let mut buf = vec![0u8; data.len()];
    let n = f.read(&mut buf).await.unwrap();
    assert_eq!(n, data.len());
    assert_eq!(buf, data);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sequential_reads_with_pipelining_disabled() {
    let dir = tempdir();
    let opts = ClientOptions {
        max_packet: 16,
        disable_concurrent_reads: true,
        ..Default::default()
    };
    let (client, _server) = session_with(ServerOptions::default(), opts).await;
    let path = path_in(&dir, "f");
    let data = pattern(999);
    std::fs::write(dir.path().join("f"), &data).unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut buf = vec![0u8; data.len()];
    assert_eq!(f.read(&mut buf).await.unwrap(), data.len());
    assert_eq!(buf, data);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_at_does_not_move_offset() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    std::fs::write(dir.path().join("f"), b"0123456789").unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(f.read_at(&mut buf, 6).await.unwrap(), 4);
    assert_eq!(&buf, b"6789");

    // The sequential offset is still at the start.
    let mut buf = [0u8; 4];
    assert_eq!(f.read(&mut buf).await.unwrap(), 4);
    assert_eq!(&buf, b"0123");
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_seek_end_uses_fstat() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    std::fs::write(dir.path().join("f"), b"0123456789").unwrap();

    let mut f = client.open(&path).await.unwrap();
    assert_eq!(f.seek(SeekFrom::End(-3)).await.unwrap(), 7);
    let mut buf = [0u8; 8];
    let n = f.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"789");
    f.close().await.unwrap();

    client.close().await.unwrap();
}

// A read-side backend that never returns more than 3 bytes per READ,
// exercising the client's short-read repair path.
struct ShortReadFs {
    inner: Arc<LocalFs>,
}

struct ShortReader {
    inner: Box<dyn FileReadAt>,
}

#[async_trait::async_trait]
impl FileReadAt for ShortReader {
    async fn read_at(&self, offset: u64, len: u32) -> std::io::Result<bytes::Bytes> {
        self.inner.read_at(offset, len.min(3)).await
    }
}

#[async_trait::async_trait]
impl FileReader for ShortReadFs {
    async fn file_read(&self, req: &SftpRequest) -> std::io::Result<Box<dyn FileReadAt>> {
        let inner = self.inner.file_read(req).await?;
        Ok(Box::new(ShortReader { inner }))
    }
}

#[tokio::test]
async fn test_short_interior_reads_are_repaired() {
    let dir = tempdir();
    let path = path_in(&dir, "f");
    let data = pattern(200);
    std::fs::write(dir.path().join("f"), &data).unwrap();

    let (client_side, server_side) = tokio::io::duplex(1 << 20);
    let mut handlers = LocalFs::handlers();
    handlers.file_get = Arc::new(ShortReadFs {
        inner: Arc::new(LocalFs::new()),
    });
    let server = RequestServer::new(server_side, handlers);
    let _server = tokio::spawn(server.serve());

    let opts = ClientOptions {
        max_packet: 16,
        max_concurrent_requests: 4,
        ..Default::default()
    };
    let client = SftpClient::with_options(client_side, opts).await.unwrap();

    // Every interior chunk comes back short; the client must re-issue
    // tail reads until the buffer is contiguous.
    let mut f = client.open(&path).await.unwrap();
    let mut buf = vec![0u8; data.len()];
    assert_eq!(f.read(&mut buf).await.unwrap(), data.len());
    assert_eq!(buf, data);
    assert_eq!(f.read(&mut [0u8; 8]).await.unwrap(), 0);
    f.close().await.unwrap();

    // write_to must also keep the output in file order.
    let mut f = client.open(&path).await.unwrap();
    let mut out = Vec::new();
    assert_eq!(f.write_to(&mut out).await.unwrap(), data.len() as u64);
    assert_eq!(out, data);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_upload_download_roundtrip() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;

    let local_src = path_in(&dir, "src");
    let remote = path_in(&dir, "remote");
    let local_dst = path_in(&dir, "dst");
    let data = pattern(100_000);
    std::fs::write(dir.path().join("src"), &data).unwrap();

    assert_eq!(client.upload(&local_src, &remote).await.unwrap(), data.len() as u64);
    assert_eq!(
        client.download(&remote, &local_dst).await.unwrap(),
        data.len() as u64
    );
    assert_eq!(std::fs::read(dir.path().join("dst")).unwrap(), data);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_dir_lists_and_closes() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    for name in ["zz", "aa", "mm"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    let entries = client
        .read_dir(&dir.path().to_string_lossy())
        .await
        .unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(names, ["aa", "mm", "zz"]);
    for entry in &entries {
        assert!(entry.longname.contains(&entry.filename));
        assert_eq!(entry.attrs.size, Some(1));
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_rename_semantics() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let a = path_in(&dir, "a");
    let b = path_in(&dir, "b");
    std::fs::write(dir.path().join("a"), b"a").unwrap();
    std::fs::write(dir.path().join("b"), b"b").unwrap();

    // Plain RENAME refuses to overwrite.
    let err = client.rename(&a, &b).await.unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::Failure as u32));

    // posix-rename@openssh.com overwrites.
    client.posix_rename(&a, &b).await.unwrap();
    assert_eq!(std::fs::read(dir.path().join("b")).unwrap(), b"a");
    assert!(!dir.path().join("a").exists());

    client.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_readlink_hardlink() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let target = path_in(&dir, "target");
    let link = path_in(&dir, "link");
    let hard = path_in(&dir, "hard");
    std::fs::write(dir.path().join("target"), b"data").unwrap();

    client.symlink(&target, &link).await.unwrap();
    assert_eq!(client.read_link(&link).await.unwrap(), target);

    // lstat sees the link, stat follows it.
    assert!(client.lstat(&link).await.unwrap().is_symlink());
    assert!(client.stat(&link).await.unwrap().is_regular());

    client.hard_link(&target, &hard).await.unwrap();
    assert_eq!(std::fs::read(dir.path().join("hard")).unwrap(), b"data");

    client.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_chmod_and_chtimes() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    std::fs::write(dir.path().join("f"), b"x").unwrap();

    client.chmod(&path, 0o600).await.unwrap();
    let attrs = client.stat(&path).await.unwrap();
    assert_eq!(attrs.permissions.unwrap() & 0o777, 0o600);

    client.chtimes(&path, 1_600_000_000, 1_600_000_001).await.unwrap();
    let attrs = client.stat(&path).await.unwrap();
    assert_eq!(attrs.mtime, Some(1_600_000_001));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_realpath_and_getwd() {
    let (client, _server) = session(ServerOptions::default()).await;

    assert_eq!(client.real_path("a/b/../c").await.unwrap(), "/a/c");
    assert_eq!(client.getwd().await.unwrap(), "/");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_fsync_extension() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");

    assert!(client.has_extension("fsync@openssh.com"));
    assert!(client.has_extension("statvfs@openssh.com"));

    let mut f = client.create(&path).await.unwrap();
    f.write(b"durable").await.unwrap();
    f.sync().await.unwrap();
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_statvfs_declined_by_local_backend() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;

    // The engine advertises statvfs, but the local backend declines.
    let err = client
        .stat_vfs(&dir.path().to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::OpUnsupported as u32));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_only_server() {
    let dir = tempdir();
    let opts = ServerOptions {
        read_only: true,
        ..Default::default()
    };
    let (client, _server) = session(opts).await;
    let path = path_in(&dir, "f");
    std::fs::write(dir.path().join("f"), b"x").unwrap();

    // Writes are denied before the handler runs.
    let err = client.create(&path).await.unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::PermissionDenied as u32));
    let err = client.remove(&path).await.unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::PermissionDenied as u32));
    let err = client.posix_rename(&path, &path_in(&dir, "g")).await.unwrap_err();
    assert_eq!(status_code(&err), Some(StatusCode::PermissionDenied as u32));

    // Reads still work.
    let mut f = client.open(&path).await.unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(f.read(&mut buf).await.unwrap(), 1);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_server_teardown_fails_waiters_quickly() {
    let dir = tempdir();
    let (client, server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");

    let mut f = client.create(&path).await.unwrap();
    f.write(b"first").await.unwrap();

    // Kill the server mid-session.
    server.abort();
    let _ = server.await;

    // A bulk transfer fails with a non-EOF error within bounded time.
    let payload = pattern(32 * 1024 * 4);
    let mut src = std::io::Cursor::new(payload);
    let result = timeout(Duration::from_secs(1), f.read_from(&mut src)).await;
    match result {
        Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("transfer should not survive teardown (wrote {n} bytes)"),
        Err(_) => panic!("transfer hung after teardown"),
    }

    // Close returns the latched error instead of hanging.
    let result = timeout(Duration::from_secs(1), f.close()).await;
    match result {
        Ok(Err(Error::ConnectionLost(_))) => {}
        Ok(other) => panic!("expected latched error, got {other:?}"),
        Err(_) => panic!("close hung after teardown"),
    }
}

#[tokio::test]
async fn test_packet_server_basic_flow() {
    let dir = tempdir();
    let (client, server) = packet_session().await;
    let path = path_in(&dir, "x");

    let mut f = client.create(&path).await.unwrap();
    f.write(b"through the worker pool").await.unwrap();
    f.close().await.unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut buf = [0u8; 64];
    let n = f.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"through the worker pool");
    f.close().await.unwrap();

    client.close().await.unwrap();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_packet_server_concurrent_callers() {
    let dir = tempdir();
    let (client, _server) = packet_session().await;
    let client = Arc::new(client);

    for i in 0..8 {
        std::fs::write(dir.path().join(format!("f{i}")), vec![b'x'; i + 1]).unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = Arc::clone(&client);
        let path = path_in(&dir, &format!("f{i}"));
        tasks.push(tokio::spawn(async move {
            let attrs = client.stat(&path).await.unwrap();
            assert_eq!(attrs.size, Some(i as u64 + 1));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_packet_server_pipelined_transfer() {
    let dir = tempdir();
    let (client_side, server_side) = tokio::io::duplex(1 << 20);
    let server = PacketServer::new(server_side, LocalFs::handlers());
    let _server = tokio::spawn(server.serve());
    let opts = ClientOptions {
        max_packet: 64,
        max_concurrent_requests: 8,
        ..Default::default()
    };
    let client = SftpClient::with_options(client_side, opts).await.unwrap();

    let path = path_in(&dir, "big");
    let data = pattern(50_000);
    std::fs::write(dir.path().join("big"), &data).unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut buf = vec![0u8; data.len()];
    assert_eq!(f.read(&mut buf).await.unwrap(), data.len());
    assert_eq!(buf, data);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_write_to_streams_in_order() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    let data = pattern(30_000);
    std::fs::write(dir.path().join("f"), &data).unwrap();

    let mut f = client.open(&path).await.unwrap();
    let mut out = Vec::new();
    assert_eq!(f.write_to(&mut out).await.unwrap(), data.len() as u64);
    assert_eq!(out, data);
    f.close().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_from_streams_source() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    let data = pattern(30_000);

    let mut f = client.create(&path).await.unwrap();
    let mut src = std::io::Cursor::new(data.clone());
    assert_eq!(f.read_from(&mut src).await.unwrap(), data.len() as u64);
    f.close().await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), data);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_attrs_roundtrip_through_setstat() {
    let dir = tempdir();
    let (client, _server) = session(ServerOptions::default()).await;
    let path = path_in(&dir, "f");
    std::fs::write(dir.path().join("f"), b"attrs").unwrap();

    let got = client.stat(&path).await.unwrap();
    assert_eq!(got.size, Some(5));

    // Echo a subset back through setstat; only flagged fields apply.
    client
        .setstat(
            &path,
            FileAttributes {
                atime: got.atime,
                mtime: got.mtime,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_file_info_shape() {
    // FileInfo is the lister-facing slice of a NAME entry.
    let info = FileInfo {
        name: "f".to_string(),
        attrs: FileAttributes::default(),
    };
    assert_eq!(info.name, "f");
}
