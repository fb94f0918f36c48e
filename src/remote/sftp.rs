//! SFTP transport on top of `ssh2`.
//!
//! `ssh2` is a blocking client. One [`SftpSession`] owns exactly one SSH
//! connection and one SFTP channel behind a mutex; each call runs on tokio's
//! blocking pool and holds the lock for the whole operation, so remote calls
//! from concurrent workers are serialized through the single connection.
//!
//! A call that fails at the session level (socket error, libssh2 timeout,
//! panic) drops the connection. The next call opens a fresh one with the same
//! settings, so a retried operation never reuses a dead session.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};

use super::{RemoteEntry, RemoteSession};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::types::RemotePath;

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_SUCH_PATH: i32 = 10;

struct Connection {
    session: Session,
    sftp: Sftp,
}

/// Raw failure of one blocking ssh2 call, classified once the call returns
enum CallError {
    Ssh(ssh2::Error),
    Io(std::io::Error),
}

impl From<ssh2::Error> for CallError {
    fn from(err: ssh2::Error) -> Self {
        CallError::Ssh(err)
    }
}

impl From<std::io::Error> for CallError {
    fn from(err: std::io::Error) -> Self {
        CallError::Io(err)
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Ssh(e) => write!(f, "{e}"),
            CallError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl CallError {
    /// Whether the connection is unusable after this failure
    ///
    /// SFTP status replies leave the channel intact; libssh2 session codes
    /// (socket, timeout, disconnect) and broken reads do not.
    fn breaks_session(&self) -> bool {
        match self {
            CallError::Ssh(e) => matches!(e.code(), ErrorCode::Session(_)),
            CallError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
        }
    }

    /// Map onto the transient/permanent taxonomy
    fn classify(self, path: &str) -> Error {
        match self {
            CallError::Ssh(err) => match err.code() {
                ErrorCode::SFTP(FX_NO_SUCH_FILE) | ErrorCode::SFTP(FX_NO_SUCH_PATH) => {
                    Error::NotFound(path.to_string())
                }
                ErrorCode::SFTP(FX_PERMISSION_DENIED) => Error::PermissionDenied(path.to_string()),
                _ => Error::Transport(format!("{path}: {err}")),
            },
            CallError::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
                std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
                _ => Error::Transport(format!("{path}: {err}")),
            },
        }
    }
}

type Connector<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

struct SlotState<C> {
    connection: Option<C>,
    closed: bool,
}

/// One connection behind a mutex, reopened on demand after a session failure
struct ConnectionSlot<C> {
    state: Mutex<SlotState<C>>,
    connect: Connector<C>,
}

impl<C> ConnectionSlot<C> {
    fn new(connection: C, connect: Connector<C>) -> Self {
        Self {
            state: Mutex::new(SlotState {
                connection: Some(connection),
                closed: false,
            }),
            connect,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<C>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A panicking call already dropped the connection it held
                self.state.clear_poison();
                tracing::warn!("Recovered SFTP session lock after a panicked call");
                poisoned.into_inner()
            }
        }
    }

    /// Run `op` against the connection, opening a new one if none is held
    ///
    /// The connection is taken out of the slot for the duration of `op` and
    /// only put back when `op` leaves it usable.
    fn call<T>(
        &self,
        path: &str,
        op: impl FnOnce(&C) -> std::result::Result<T, CallError>,
    ) -> Result<T> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Transport("SFTP session is closed".to_string()));
        }

        let connection = match state.connection.take() {
            Some(connection) => connection,
            None => {
                let fresh = (self.connect)()
                    .map_err(|e| Error::Transport(format!("SFTP reconnect failed: {e}")))?;
                tracing::info!("SFTP session re-established");
                fresh
            }
        };

        match op(&connection) {
            Ok(value) => {
                state.connection = Some(connection);
                Ok(value)
            }
            Err(e) if e.breaks_session() => {
                tracing::warn!(
                    path,
                    error = %e,
                    "SFTP connection lost, reconnecting on next call"
                );
                drop(connection);
                Err(e.classify(path))
            }
            Err(e) => {
                state.connection = Some(connection);
                Err(e.classify(path))
            }
        }
    }

    /// Mark the slot closed and hand back the live connection, if any
    fn close(&self) -> Option<C> {
        let mut state = self.lock();
        state.closed = true;
        state.connection.take()
    }
}

/// Authenticated SFTP connection shared by all workers
pub struct SftpSession {
    slot: Arc<ConnectionSlot<Connection>>,
    host: String,
}

impl SftpSession {
    /// Open and authenticate a connection
    ///
    /// Fails with [`Error::Connection`] when the server is unreachable, the
    /// handshake fails, or no configured credential is accepted. The settings
    /// are kept for reconnecting after a dropped session.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let config = config.clone();
        let host = format!("{}:{}", config.host, config.port);

        let first = config.clone();
        let connection = tokio::task::spawn_blocking(move || open_connection(&first))
            .await
            .map_err(|e| Error::Connection(format!("connect task failed: {e}")))??;

        tracing::info!(host = %host, "SFTP session established");

        let connect: Connector<Connection> = Box::new(move || open_connection(&config));
        Ok(Self {
            slot: Arc::new(ConnectionSlot::new(connection, connect)),
            host,
        })
    }

    /// Run a blocking closure against the live connection
    async fn with_connection<T, F>(&self, path: &RemotePath, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> std::result::Result<T, CallError> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let path = path.clone();
        tokio::task::spawn_blocking(move || slot.call(path.as_str(), op))
            .await
            .map_err(|e| Error::Other(format!("SFTP task failed: {e}")))?
    }
}

fn open_connection(config: &RemoteConfig) -> Result<Connection> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection(format!("cannot resolve {}: {e}", config.host)))?
        .next()
        .ok_or_else(|| Error::Connection(format!("no address found for {}", config.host)))?;

    let tcp = TcpStream::connect_timeout(&addr, config.connect_timeout)
        .map_err(|e| Error::Connection(format!("TCP connection to {addr} failed: {e}")))?;

    let mut session = Session::new()
        .map_err(|e| Error::Connection(format!("failed to create SSH session: {e}")))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(config.operation_timeout.as_millis().min(u32::MAX as u128) as u32);
    session
        .handshake()
        .map_err(|e| Error::Connection(format!("SSH handshake with {addr} failed: {e}")))?;

    let mut auth_errs: Vec<String> = Vec::new();
    if let Some(key) = &config.private_key {
        if let Err(e) = session.userauth_pubkey_file(
            &config.username,
            None,
            key,
            config.private_key_passphrase.as_deref(),
        ) {
            auth_errs.push(format!("key {}: {e}", key.display()));
        }
    }
    if !session.authenticated() {
        if let Some(password) = &config.password {
            if let Err(e) = session.userauth_password(&config.username, password) {
                auth_errs.push(format!("password: {e}"));
            }
        }
    }
    if !session.authenticated() {
        return Err(Error::Connection(format!(
            "authentication failed for {}: {}",
            config.username,
            auth_errs.join("; ")
        )));
    }

    let sftp = session
        .sftp()
        .map_err(|e| Error::Connection(format!("failed to open SFTP channel: {e}")))?;

    Ok(Connection { session, sftp })
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn list(&self, path: &RemotePath) -> Result<Vec<RemoteEntry>> {
        let dir = path.clone();
        self.with_connection(path, move |conn| {
            let entries = conn.sftp.readdir(Path::new(dir.as_str()))?;

            Ok(entries
                .into_iter()
                .filter_map(|(child, stat)| {
                    let name = child.file_name()?.to_str()?.to_string();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(RemoteEntry {
                        path: dir.join(&name),
                        is_dir: stat.is_dir(),
                    })
                })
                .collect())
        })
        .await
    }

    async fn fetch(&self, path: &RemotePath) -> Result<Vec<u8>> {
        let file_path = path.clone();
        self.with_connection(path, move |conn| {
            let mut file = conn.sftp.open(Path::new(file_path.as_str()))?;
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            Ok(content)
        })
        .await
    }

    async fn remove(&self, path: &RemotePath) -> Result<()> {
        let file_path = path.clone();
        self.with_connection(path, move |conn| {
            conn.sftp.unlink(Path::new(file_path.as_str()))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let slot = Arc::clone(&self.slot);
        let host = self.host.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(connection) = slot.close() {
                drop(connection.sftp);
                if let Err(e) = connection
                    .session
                    .disconnect(None, "batch run complete", None)
                {
                    tracing::warn!(host = %host, error = %e, "SFTP disconnect failed");
                } else {
                    tracing::info!(host = %host, "SFTP session closed");
                }
            }
        })
        .await
        .map_err(|e| Error::Other(format!("SFTP close task failed: {e}")))
    }
}
