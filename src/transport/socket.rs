//! Socket endpoints.
//!
//! - `tcp://host:port` - TCP (both platforms)
//! - `unix:/path/to.sock` - Unix Domain Socket (Unix only)
//!
//! # Example
//!
//! ```ignore
//! use framewire::transport::{Endpoint, Listener};
//!
//! let endpoint: Endpoint = "tcp://127.0.0.1:50051".parse()?;
//! let listener = Listener::bind(&endpoint).await?;
//! let connection = listener.accept().await?;
//! let (reader, writer) = connection.into_channel(64 * 1024);
//! ```

use std::fmt;
use std::str::FromStr;

#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use super::stream::{StreamReader, StreamWriter};
use crate::error::{FramewireError, Result};

/// Read half of a connection.
pub type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connection.
pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Where to listen or connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = FramewireError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            let valid = addr
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(FramewireError::InvalidEndpoint(format!(
                    "expected tcp://host:port, got {:?}",
                    s
                )));
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix:") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(FramewireError::InvalidEndpoint(
                        "unix endpoint has no path".to_string(),
                    ));
                }
                return Ok(Endpoint::Unix(PathBuf::from(path)));
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(FramewireError::InvalidEndpoint(
                    "unix sockets are not supported on this platform".to_string(),
                ));
            }
        }

        Err(FramewireError::InvalidEndpoint(format!(
            "unknown scheme in {:?}",
            s
        )))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl Endpoint {
    /// Connect to a listening peer.
    pub async fn connect(&self) -> Result<Connection> {
        let connection = match self {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                Connection::from_tcp(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Connection::from_unix(UnixStream::connect(path).await?),
        };
        tracing::debug!(endpoint = %self, "Connected");
        Ok(connection)
    }
}

/// Generate a unique socket path for this process.
///
/// Format: `{tmp}/framewire-{pid}-{random}.sock`
#[cfg(unix)]
pub fn generate_socket_path() -> PathBuf {
    let pid = std::process::id();
    std::env::temp_dir().join(format!("framewire-{}-{:x}.sock", pid, rand_u64()))
}

/// Time-and-pid mix; unique enough for socket file names.
#[cfg(unix)]
fn rand_u64() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid ^ seq.rotate_left(32)
}

/// A connected byte stream.
pub struct Connection {
    reader: BoxedRead,
    writer: BoxedWrite,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    #[cfg(unix)]
    fn from_unix(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split into raw read and write halves.
    pub fn into_split(self) -> (BoxedRead, BoxedWrite) {
        (self.reader, self.writer)
    }

    /// Split into message-level channel halves.
    pub fn into_channel(
        self,
        read_buffer_size: usize,
    ) -> (StreamReader<BoxedRead>, StreamWriter<BoxedWrite>) {
        (
            StreamReader::with_buffer_size(self.reader, read_buffer_size),
            StreamWriter::new(self.writer),
        )
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

/// Accepts connections on an [`Endpoint`].
///
/// A Unix socket file is removed when the listener is dropped.
pub struct Listener {
    inner: Inner,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.local_endpoint().ok())
            .finish()
    }
}

impl Listener {
    /// Bind to `endpoint`.
    ///
    /// For Unix sockets, an existing file at the path is removed first.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let inner = match endpoint {
            Endpoint::Tcp(addr) => Inner::Tcp(TcpListener::bind(addr.as_str()).await?),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                remove_stale_socket(path)?;
                Inner::Unix {
                    listener: UnixListener::bind(path)?,
                    path: path.clone(),
                }
            }
        };

        let listener = Self { inner };
        tracing::info!(endpoint = %listener.local_endpoint()?, "Listening");
        Ok(listener)
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<Connection> {
        match &self.inner {
            Inner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                tracing::debug!(%peer, "Accepted connection");
                Ok(Connection::from_tcp(stream))
            }
            #[cfg(unix)]
            Inner::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().await?;
                tracing::debug!("Accepted connection");
                Ok(Connection::from_unix(stream))
            }
        }
    }

    /// The bound endpoint, with the real port when bound to port 0.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match &self.inner {
            Inner::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Inner::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Inner::Unix { path, .. } = &self.inner {
            let _ = std::fs::remove_file(path);
        }
    }
}
