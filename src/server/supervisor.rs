//! Supervisor: accept loop, registration, shutdown
//!
//! The supervisor binds the listener, runs the name-registration handshake
//! for each accepted transport, spawns one session task per client, and
//! orchestrates the drain on interrupt: terminators for the worker pool,
//! a goodbye to every session, then joins in order.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::directory::RegisterError;
use super::session::Session;
use super::upload::{spawn_upload_workers, UploadJob};
use super::ServerContext;
use crate::error::Result;
use crate::logging::LogSink;
use crate::protocol::reply;
use crate::transport::{notify_channel, NotifyReader, NotifyWriter};
use crate::{
    LISTEN_BACKLOG, LOG_DIRECTORY, MAX_ROOMS, MAX_SESSIONS, UPLOAD_QUEUE_CAPACITY, UPLOAD_WORKERS,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Maximum live rooms
    pub max_rooms: usize,
    /// Upload queue capacity
    pub upload_queue_capacity: usize,
    /// Upload worker pool size
    pub upload_workers: usize,
    /// Directory for timestamped log files
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_sessions: MAX_SESSIONS,
            max_rooms: MAX_ROOMS,
            upload_queue_capacity: UPLOAD_QUEUE_CAPACITY,
            upload_workers: UPLOAD_WORKERS,
            log_dir: PathBuf::from(LOG_DIRECTORY),
        }
    }
}

/// Triggers the same graceful-shutdown path as the interrupt signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.signal.send(true);
    }
}

/// The accepting task and owner of shutdown orchestration.
pub struct Supervisor {
    config: ServerConfig,
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    signal: Arc<watch::Sender<bool>>,
}

impl Supervisor {
    /// Open the log sink and bind the listener (address reuse enabled,
    /// backlog 10). Bind or listen failure is returned to the caller, which
    /// exits non-zero.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let log = LogSink::open(&config.log_dir);
        log.write(&format!(
            "[SERVER-START] Server started with pid: {}",
            std::process::id()
        ));

        let socket = match config.bind_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        if let Err(e) = socket.bind(config.bind_addr) {
            error!(addr = %config.bind_addr, error = %e, "bind failed");
            log.write("[SERVER-ERROR] Bind error.");
            return Err(e.into());
        }
        let listener = match socket.listen(LISTEN_BACKLOG) {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "listen failed");
                log.write("[SERVER-ERROR] listen error.");
                return Err(e.into());
            }
        };

        let port = listener.local_addr()?.port();
        info!(port, "server listening");
        log.write(&format!("[SERVER-INFO] Server listening on port: {}", port));

        let (signal, _) = watch::channel(false);
        Ok(Self {
            ctx: Arc::new(ServerContext::new(&config, log)),
            config,
            listener,
            signal: Arc::new(signal),
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that triggers graceful shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: Arc::clone(&self.signal),
        }
    }

    /// Shared server state, for inspection.
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    /// Accept clients until interrupted, then drain everything in order.
    pub async fn run(self) -> Result<()> {
        let workers = spawn_upload_workers(self.config.upload_workers, Arc::clone(&self.ctx));
        let mut sessions = JoinSet::new();
        let mut stop_rx = self.signal.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.handle_client(stream, addr, &mut sessions).await,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        self.ctx.log.write(
                            "[WARN] accept() failed: client connection could not be established. Will retry.",
                        );
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received");
                    break;
                }
                _ = async { let _ = stop_rx.wait_for(|stop| *stop).await; } => break,
            }
        }

        self.shutdown(workers, sessions).await
    }

    /// Handshake an accepted transport and spawn its session.
    async fn handle_client(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        sessions: &mut JoinSet<()>,
    ) {
        info!(%addr, "client connected");
        self.ctx
            .log
            .write(&format!("[SERVER-INFO] A client is connected from {}", addr));

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        let Some((name, session_id, notify_tx, notify_rx)) =
            self.register(&mut reader, &mut writer).await
        else {
            return;
        };

        let session = Session::new(
            name.clone(),
            session_id,
            reader,
            writer,
            notify_rx,
            notify_tx,
            self.signal.subscribe(),
            Arc::clone(&self.ctx),
        );

        let (started_tx, started_rx) = oneshot::channel();
        sessions.spawn(session.run(started_tx));

        // The start barrier: observe the session's identity before
        // accepting the next client, so the log correlates the two.
        match started_rx.await {
            Ok(id) => self.ctx.log.write(&format!(
                "[SERVER-INFO] Messaging task (session {}) is created for {}.",
                id, name
            )),
            Err(_) => warn!(user = %name, "session ended before start barrier"),
        }
    }

    /// The registration handshake: read a name line, validate it against the
    /// directory, re-prompt on rejection. A closed or failing transport ends
    /// the handshake with nothing allocated.
    async fn register(
        &self,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
    ) -> Option<(String, Uuid, NotifyWriter, NotifyReader)> {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    self.ctx
                        .log
                        .write("[SERVER-INFO] Client closed the connection during handshake.");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.ctx.log.write(&format!(
                        "[SERVER-ERROR] recv() failed during handshake: {}",
                        e
                    ));
                    return None;
                }
            }
            let name = line.trim_end_matches(['\r', '\n']);

            let (notify_tx, notify_rx) = notify_channel();
            let rejection = match self.ctx.directory.register(name, notify_tx.clone()).await {
                Ok(session_id) => {
                    if writer
                        .write_all(reply::USERNAME_ACCEPTED.as_bytes())
                        .await
                        .is_err()
                    {
                        // The client vanished between insert and ack; give
                        // the slot back.
                        self.ctx.directory.deregister(name).await;
                        return None;
                    }
                    self.ctx
                        .log
                        .write(&format!("[OK] Username: {} accepted.", name));
                    return Some((name.to_string(), session_id, notify_tx, notify_rx));
                }
                Err(RegisterError::InvalidName) => {
                    self.ctx
                        .log
                        .write("[SERVER-INFO] Client sent invalid username for creation");
                    reply::USERNAME_INVALID
                }
                Err(RegisterError::NameTaken) => {
                    self.ctx
                        .log
                        .write("[SERVER-INFO] Client sent an already taken username for creation");
                    reply::USERNAME_TAKEN
                }
                Err(RegisterError::Full) => {
                    self.ctx
                        .log
                        .write("[SERVER-INFO] A client tried to connect when server is full.");
                    reply::SERVER_FULL
                }
            };

            if writer.write_all(rejection.as_bytes()).await.is_err() {
                return None;
            }
        }
    }

    /// The drain, in order: stop accepting, terminate the worker pool, tell
    /// every session goodbye, join workers, join sessions, close the log.
    async fn shutdown(self, workers: Vec<JoinHandle<()>>, mut sessions: JoinSet<()>) -> Result<()> {
        drop(self.listener);

        for _ in 0..self.config.upload_workers {
            self.ctx.uploads.enqueue(UploadJob::Shutdown).await;
        }

        // Each session writes exactly one goodbye line and tears itself
        // down; the transport stays single-writer even during shutdown.
        let _ = self.signal.send(true);

        for worker in workers {
            let _ = worker.await;
        }
        while sessions.join_next().await.is_some() {}

        self.ctx
            .log
            .write("[SHUTDOWN] SIGINT received. Server exiting gracefully.");
        self.ctx.log.close();
        info!("shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn open(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, w) = stream.into_split();
            Self {
                reader: BufReader::new(r),
                writer: w,
            }
        }

        async fn connect(addr: SocketAddr, name: &str) -> Self {
            let mut client = Self::open(addr).await;
            client.send(&format!("{}\n", name)).await;
            assert_eq!(client.line().await, "[OK] Username accepted.\n");
            client
        }

        async fn send(&mut self, text: &str) {
            self.writer.write_all(text.as_bytes()).await.unwrap();
        }

        async fn send_bytes(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        async fn line(&mut self) -> String {
            let mut line = String::new();
            timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
                .await
                .expect("line arrived")
                .unwrap();
            line
        }

        async fn exact(&mut self, n: usize) -> Vec<u8> {
            let mut buf = vec![0u8; n];
            timeout(Duration::from_secs(5), self.reader.read_exact(&mut buf))
                .await
                .expect("bytes arrived")
                .unwrap();
            buf
        }
    }

    async fn start_server() -> (SocketAddr, ShutdownHandle, JoinHandle<Result<()>>) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_dir: std::env::temp_dir().join(format!("parlor-test-{}", Uuid::new_v4())),
            ..Default::default()
        };
        let supervisor = Supervisor::bind(config).await.unwrap();
        let addr = supervisor.local_addr().unwrap();
        let handle = supervisor.shutdown_handle();
        let task = tokio::spawn(supervisor.run());
        (addr, handle, task)
    }

    #[tokio::test]
    async fn test_unique_name_handshake() {
        let (addr, shutdown, task) = start_server().await;

        let _alice = TestClient::connect(addr, "alice").await;

        // Second client must retry on the same connection.
        let mut second = TestClient::open(addr).await;
        second.send("alice\n").await;
        assert_eq!(
            second.line().await,
            "[ERROR] Username already taken. Choose another.\n"
        );
        second.send("bob\n").await;
        assert_eq!(second.line().await, "[OK] Username accepted.\n");

        shutdown.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_name_reprompts() {
        let (addr, shutdown, task) = start_server().await;

        let mut client = TestClient::open(addr).await;
        client.send("not a name!\n").await;
        assert_eq!(
            client.line().await,
            "[ERROR] Username must be 1–16 alphanumeric characters.\n"
        );
        client.send("goodname1\n").await;
        assert_eq!(client.line().await, "[OK] Username accepted.\n");

        shutdown.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_room_chat_and_whisper_end_to_end() {
        let (addr, shutdown, task) = start_server().await;

        let mut alice = TestClient::connect(addr, "alice").await;
        let mut bob = TestClient::connect(addr, "bob").await;

        alice.send("/join lobby\n").await;
        assert_eq!(
            alice.line().await,
            "[OK] User \"alice\" joined the room: lobby\n"
        );
        bob.send("/join lobby\n").await;
        assert_eq!(bob.line().await, "[OK] User \"bob\" joined the room: lobby\n");

        alice.send("/broadcast hello room\n").await;
        assert_eq!(alice.line().await, "[alice] hello room\n");
        assert_eq!(bob.line().await, "[alice] hello room\n");

        bob.send("/whisper alice psst\n").await;
        assert_eq!(alice.line().await, "[bob] psst\n");

        shutdown.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_file_transfer_roundtrip() {
        let (addr, shutdown, task) = start_server().await;

        let mut alice = TestClient::connect(addr, "alice").await;
        let mut bob = TestClient::connect(addr, "bob").await;

        let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i * 31 % 251) as u8).collect();
        alice
            .send(&format!("/sendfile big.bin bob {}\n", payload.len()))
            .await;
        alice.send_bytes(&payload).await;
        assert_eq!(
            alice.line().await,
            format!(
                "[OK] File 'big.bin' queued for sending to bob. Size: {} bytes.\n",
                payload.len()
            )
        );

        assert_eq!(
            bob.line().await,
            format!("[FILE big.bin {} alice]\n", payload.len())
        );
        assert_eq!(bob.exact(payload.len()).await, payload);

        shutdown.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_says_goodbye_once() {
        let (addr, shutdown, task) = start_server().await;

        let mut alice = TestClient::connect(addr, "alice").await;
        let mut bob = TestClient::connect(addr, "bob").await;
        alice.send("/join lobby\n").await;
        alice.line().await;

        shutdown.shutdown();

        assert_eq!(alice.line().await, "[SERVER] shutting down. Goodbye.\n");
        assert_eq!(bob.line().await, "[SERVER] shutting down. Goodbye.\n");

        // The transport ends after the goodbye; no further lines arrive.
        let mut rest = Vec::new();
        let n = timeout(
            Duration::from_secs(5),
            alice.reader.read_to_end(&mut rest),
        )
        .await
        .expect("eof")
        .unwrap();
        assert_eq!(n, 0);

        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_exit_frees_name_for_reuse() {
        let (addr, shutdown, task) = start_server().await;

        let mut alice = TestClient::connect(addr, "alice").await;
        alice.send("/exit\n").await;
        assert_eq!(
            alice.line().await,
            "[INFO] Server is shutting down your connection.\n"
        );
        drop(alice);

        // The name becomes available again once the session tears down.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut reconnected = None;
        while tokio::time::Instant::now() < deadline {
            let mut retry = TestClient::open(addr).await;
            retry.send("alice\n").await;
            if retry.line().await == "[OK] Username accepted.\n" {
                reconnected = Some(retry);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(reconnected.is_some(), "name was never released");

        shutdown.shutdown();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
