use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::traits::{ByteLink, LinkRx, LinkTx};

/// A byte link backed by a stream socket.
///
/// Stands in for the UART on a host: `pair()` gives an in-process loopback
/// for tests, `connect()`/[`LinkListener`] run the link over a Unix domain
/// socket between processes. Read timeouts on the underlying stream provide
/// the bounded-wait polling the transport loop relies on.
pub struct StreamLink {
    stream: UnixStream,
}

impl StreamLink {
    /// Create a connected loopback pair.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self { stream: a }, Self { stream: b }))
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| LinkError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to link socket");
        Ok(Self { stream })
    }

    fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }
}

impl ByteLink for StreamLink {
    type Rx = StreamRx;
    type Tx = StreamTx;

    fn split(self) -> Result<(StreamRx, StreamTx)> {
        let write_half = self.stream.try_clone()?;
        Ok((
            StreamRx {
                stream: self.stream,
                wait: None,
            },
            StreamTx { stream: write_half },
        ))
    }
}

/// Receive half of a [`StreamLink`].
pub struct StreamRx {
    stream: UnixStream,
    /// Last applied read timeout; avoids a syscall per poll.
    wait: Option<Duration>,
}

impl LinkRx for StreamRx {
    fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize> {
        if self.wait != Some(wait) {
            // A zero Duration would mean "block forever" to the socket API.
            let timeout = if wait.is_zero() {
                Duration::from_millis(1)
            } else {
                wait
            };
            self.stream.set_read_timeout(Some(timeout))?;
            self.wait = Some(wait);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(LinkError::Closed),
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(LinkError::Io(err)),
        }
    }
}

/// Transmit half of a [`StreamLink`].
pub struct StreamTx {
    stream: UnixStream,
}

impl LinkTx for StreamTx {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.stream.write(&bytes[offset..]) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
        self.stream.flush()?;
        Ok(())
    }
}

/// Accepts incoming link connections on a Unix domain socket.
pub struct LinkListener {
    listener: UnixListener,
    path: PathBuf,
}

impl LinkListener {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket, it is removed first
    /// (stale socket cleanup). Existing non-socket files are never removed.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(LinkError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| LinkError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| LinkError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(LinkError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| LinkError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "listening for link connections");

        Ok(Self { listener, path })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<StreamLink> {
        let (stream, _addr) = self.listener.accept().map_err(LinkError::Accept)?;
        debug!("accepted link connection");
        Ok(StreamLink::from_stream(stream))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LinkListener {
    fn drop(&mut self) {
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket() {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (a, b) = StreamLink::pair().unwrap();
        let (mut a_rx, mut a_tx) = a.split().unwrap();
        let (mut b_rx, mut b_tx) = b.split().unwrap();

        a_tx.send(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let n = b_rx.recv(&mut buf, Duration::from_millis(200)).unwrap();
        assert_eq!(&buf[..n], b"ping");

        b_tx.send(b"pong").unwrap();
        let n = a_rx.recv(&mut buf, Duration::from_millis(200)).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn recv_returns_zero_on_empty_link() {
        let (a, _b) = StreamLink::pair().unwrap();
        let (mut rx, _tx) = a.split().unwrap();

        let mut buf = [0u8; 16];
        let n = rx.recv(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn recv_reports_closed_link() {
        let (a, b) = StreamLink::pair().unwrap();
        let (mut rx, _tx) = a.split().unwrap();
        drop(b);

        let mut buf = [0u8; 16];
        let err = rx.recv(&mut buf, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, LinkError::Closed));
    }

    #[test]
    fn bind_accept_connect_roundtrip() {
        let dir = std::env::temp_dir().join(format!("liftlink-link-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("test.sock");

        let listener = LinkListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let client = StreamLink::connect(&path_clone).unwrap();
            let (_rx, mut tx) = client.split().unwrap();
            tx.send(b"hello").unwrap();
        });

        let server = listener.accept().unwrap();
        let (mut rx, _tx) = server.split().unwrap();
        let mut buf = [0u8; 5];
        let mut got = 0;
        while got < buf.len() {
            got += rx
                .recv(&mut buf[got..], Duration::from_millis(500))
                .unwrap();
        }
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bind_rejects_overlong_path() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = LinkListener::bind(&long_path);
        assert!(matches!(result, Err(LinkError::PathTooLong { .. })));
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = std::env::temp_dir().join(format!("liftlink-bind-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = LinkListener::bind(&sock_path);
        assert!(matches!(result, Err(LinkError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
