//! BB84 session server.
//!
//! This crate provides the production server implementation using:
//! - Quinn for QUIC transport
//! - Tokio for async runtime
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! bb84-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ QuinnTransport     (QUIC via Quinn)
//!   ├─ ServerDriver       (Sans-IO orchestrator, owns the Session)
//!   ├─ ConnectionRegistry (roster)
//!   └─ ActionExecutor     (per-connection outbound queues)
//! ```
//!
//! The driver and executor live behind one async mutex. Each inbound message
//! is processed and its actions queued for every recipient before the lock is
//! released, so every participant observes mutations in the same order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod executor;
mod registry;
mod server_error;
mod system_env;
mod transport;

use std::sync::Arc;

use bb84_core::Environment;
use bb84_proto::{ClientMessage, Frame, FrameHeader};
pub use driver::{
    Audience, LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent,
};
pub use error::ServerError;
pub use executor::{ActionExecutor, BroadcastPolicy, DEFAULT_QUEUE_DEPTH, Outbound};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use server_error::{DriverError, ExecutorError, RoleList};
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, mpsc};
pub use transport::{QuinnConnection, QuinnTransport, server_tls_config};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (limits, role checks, session threshold)
    pub driver: DriverConfig,
    /// How full outbound queues are handled
    pub broadcast: BroadcastPolicy,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
            broadcast: BroadcastPolicy::Retry { max_attempts: 3, initial_backoff_ms: 10 },
        }
    }
}

/// Driver plus the queues its actions are executed against.
struct Shared {
    driver: ServerDriver<SystemEnv>,
    executor: ActionExecutor<SystemEnv>,
}

impl Shared {
    async fn process(&mut self, event: ServerEvent) -> Result<(), ServerError> {
        let actions = self.driver.process_event(event)?;
        self.executor.execute(&self.driver, actions).await
    }
}

/// Production BB84 server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and system environment.
pub struct Server {
    shared: Shared,
    transport: QuinnTransport,
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server. Must be called from within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Binding to the address fails
    /// - TLS configuration is invalid
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);
        let executor = ActionExecutor::new(env.clone(), config.broadcast);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { shared: Shared { driver, executor }, transport, env })
    }

    /// Get the local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections until the endpoint closes.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the local address cannot be read.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);
        tracing::info!(
            "Session {} created, QBER threshold {}",
            self.shared.driver.session().id(),
            self.shared.driver.session().config().threshold
        );

        let shared = Arc::new(Mutex::new(self.shared));
        let env = self.env;

        while let Some(incoming) = self.transport.accept().await {
            let shared = Arc::clone(&shared);
            let env = env.clone();

            tokio::spawn(async move {
                let conn = match incoming.await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::debug!("Handshake failed: {}", e);
                        return;
                    },
                };
                if let Err(e) = handle_connection(conn, shared, env).await {
                    tracing::error!("Connection error: {}", e);
                }
            });
        }

        tracing::info!("Endpoint closed, server stopping");
        Ok(())
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    shared: Arc<Mutex<Shared>>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let conn_id = env.random_u64();
    tracing::debug!("New connection {:016x} from {}", conn_id, conn.remote_address());

    let (mut outbound, admitted) = {
        let mut shared = shared.lock().await;
        let outbound = shared.executor.attach(conn_id);
        shared.process(ServerEvent::ConnectionAccepted { conn_id }).await?;
        let admitted = shared.driver.registry().get(conn_id).is_some();
        (outbound, admitted)
    };

    if !admitted {
        while let Ok(item) = outbound.try_recv() {
            if let Outbound::Close(reason) = item {
                conn.close(0u32.into(), reason.as_bytes());
            }
        }
        return Ok(());
    }

    match conn.accept_bi().await {
        Ok((send, recv)) => {
            let writer = tokio::spawn(write_loop(conn_id, conn.clone(), send, outbound));

            if let Err(e) = read_loop(conn_id, recv, &shared).await {
                tracing::debug!("Stream error on {:016x}: {}", conn_id, e);
            }
            writer.abort();
        },
        Err(e) => {
            tracing::debug!("Connection {:016x} closed before opening a stream: {}", conn_id, e);
        },
    }

    let mut shared = shared.lock().await;
    shared.executor.detach(conn_id);
    shared
        .process(ServerEvent::ConnectionClosed { conn_id, reason: "connection closed".to_string() })
        .await
}

/// Read frames from the control stream and feed them to the driver.
///
/// Returns when the peer finishes the stream. A malformed frame ends the
/// stream with an error.
async fn read_loop(
    conn_id: u64,
    mut recv: quinn::RecvStream,
    shared: &Mutex<Shared>,
) -> Result<(), ServerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];

    loop {
        match recv.read_exact(&mut header_buf).await {
            Ok(()) => {},
            Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(()),
            Err(e) => return Err(ServerError::Transport(e.to_string())),
        }

        let payload_size = FrameHeader::from_bytes(&header_buf)?.payload_size() as usize;

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload_size);
        buf.extend_from_slice(&header_buf);
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        let message: ClientMessage = Frame::decode(&buf)?.to_message()?;
        tracing::debug!("{:016x} -> {}", conn_id, message.action_name());

        let mut shared = shared.lock().await;
        shared.process(ServerEvent::MessageReceived { conn_id, message }).await?;
    }
}

/// Drain a connection's outbound queue onto its control stream.
async fn write_loop(
    conn_id: u64,
    conn: QuinnConnection,
    mut send: quinn::SendStream,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(bytes) => {
                if let Err(e) = send.write_all(&bytes).await {
                    tracing::debug!("Write to {:016x} failed: {}", conn_id, e);
                    return;
                }
            },
            Outbound::Close(reason) => {
                conn.close(0u32.into(), reason.as_bytes());
                return;
            },
        }
    }

    let _ = send.finish();
}
