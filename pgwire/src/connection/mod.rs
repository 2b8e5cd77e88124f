//! Postgres Connection
use bytes::{Buf, BytesMut};
use lru::LruCache;
use std::{
    collections::{HashMap, VecDeque},
    future::Ready,
    io,
    num::NonZeroUsize,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Instant,
};

use crate::{
    Result,
    common::{ByteStr, span, verbose},
    executor::Executor,
    net::Socket,
    phase,
    postgres::{
        BackendProtocol, ErrorResponse, FrontendProtocol, NoticeResponse, NotificationResponse,
        backend, frontend,
    },
    statement::StatementName,
    tracer::{NoopTracer, Tracer},
    transport::{PgTransport, PgTransportExt},
};

mod config;

pub use config::{Config, ParseError, SslMode, TlsNotSupported};

const DEFAULT_BUF_CAPACITY: usize = 1024;
const DEFAULT_PREPARED_STMT_CACHE: NonZeroUsize = NonZeroUsize::new(24).unwrap();

/// Per-connection lifecycle state.
///
/// <https://www.postgresql.org/docs/17/protocol-flow.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Socket is open, startup message not yet sent.
    Connecting,
    /// Startup sent, waiting for the authentication exchange to resolve.
    Authenticating,
    /// No request in flight, ready to accept a new one.
    Idle,
    /// A simple or extended-query request is in flight.
    Busy,
    /// Server accepted a `COPY FROM STDIN` and is waiting for `CopyData`/`CopyDone`.
    CopyIn,
    /// Server is streaming `CopyData` rows for a `COPY TO STDOUT`.
    CopyOut,
    /// A [`Pipeline`][1] has queued requests without syncing in between.
    ///
    /// [1]: crate::pipeline::Pipeline
    PipelineOpen,
    /// The connection errored in a way that cannot be recovered by draining to
    /// the next `ReadyForQuery`; it must be closed and not reused.
    Failed,
    /// [`Connection::close`] completed or the socket was shut down.
    Closed,
}

/// Postgres Connection.
///
/// # Features
///
/// Connection caches prepared statements. To opt out, use [`once`][1] when querying.
///
/// Connection handles `NoticeResponse` messages. If the `log` feature is enabled,
/// `NoticeResponse` will be logged, otherwise it is ignored.
///
/// Connection handles `ParameterStatus` by folding it into [`Connection::parameter`],
/// and `NotificationResponse` by queueing it for [`Connection::try_recv_notification`] --
/// neither ever surfaces through [`PgTransport::poll_recv`].
///
/// Connection sends `Sync` after receiving an `ErrorResponse` message.
/// This is postgres specific and happens transparently, most users
/// do not need to worry about this.
///
/// # Pending Messages
///
/// All RAII Guard API drop behavior is sync, so to perform an async operation,
/// like sending a rollback, it can only be queued. Queued actions are sent on
/// the next asynchronous operation. This is crucial for something like a
/// failed transaction, where rollback can possibly be delayed.
///
/// # Runtime
///
/// All constructors will panic if the `tokio` feature is not enabled.
///
/// [1]: crate::sql::SqlExt::once
pub struct Connection {
    // io
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,

    // feature
    stmts: LruCache<u64, StatementName>,
    params: HashMap<ByteStr, ByteStr>,
    notifications: VecDeque<NotificationResponse>,
    tracer: Arc<dyn Tracer>,

    // state
    state: ConnState,
    backend_key_data: Option<backend::BackendKeyData>,
    host: ByteStr,
    port: u16,

    // diagnostic
    connected_at: Instant,
    sync_pending: usize,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect to postgres server via environment variables.
    ///
    /// See [`Config::from_env`] for more details.
    ///
    /// # Panics
    ///
    /// Panics if `tokio` feature is not enabled.
    pub fn connect_env() -> impl Future<Output = Result<Connection>> {
        Self::connect_with(Config::from_env())
    }

    /// Connect to postgres server via url.
    ///
    /// # Panics
    ///
    /// Panics if `tokio` feature is not enabled.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect to postgres server with provided config.
    ///
    /// # Panics
    ///
    /// Panics if `tokio` feature is not enabled.
    pub async fn connect_with(config: Config) -> Result<Self> {
        span!("connect");

        let tracer: Arc<dyn Tracer> = config.tracer.clone().unwrap_or_else(|| Arc::new(NoopTracer));
        let trace_ctx = tracer.connect_start();

        let result = Self::connect_inner(&config, tracer.clone()).await;

        tracer.connect_end(trace_ctx, result.as_ref().err());
        result
    }

    async fn connect_inner(config: &Config, tracer: Arc<dyn Tracer>) -> Result<Self> {
        let socket = with_connect_timeout(config.connect_timeout, connect_socket(config)).await?;

        let mut me = Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            stmts: LruCache::new(DEFAULT_PREPARED_STMT_CACHE),
            params: HashMap::new(),
            notifications: VecDeque::new(),
            tracer,
            state: ConnState::Connecting,
            backend_key_data: None,
            host: config.host.clone(),
            port: config.port,
            connected_at: Instant::now(),
            sync_pending: 0,
        };

        me.state = ConnState::Authenticating;
        let phase::StartupResponse { backend_key_data } = phase::startup(config, &mut me).await?;
        me.backend_key_data = Some(backend_key_data);
        me.state = ConnState::Idle;

        Ok(me)
    }
}

/// Bounds `fut` by `timeout`, if any.
async fn with_connect_timeout<T>(
    timeout: Option<std::time::Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?,
        None => fut.await,
    }
}

async fn connect_socket(config: &Config) -> Result<Socket> {
    let mut socket = if config.host == "localhost" {
        let path = format!("/run/postgresql/.s.PGSQL.{}", config.port);
        match Socket::connect_socket(&path).await {
            Ok(socket) => socket,
            Err(_) => Socket::connect_tcp(&config.host, config.port).await?,
        }
    } else {
        Socket::connect_tcp(&config.host, config.port).await?
    };

    negotiate_ssl(config, &mut socket).await?;

    Ok(socket)
}

/// Runs the `SSLRequest`/response byte exchange per `sslmode`.
///
/// This crate vendors no TLS stack, so there is no byte sequence that lets
/// [`SslMode::Require`]/[`SslMode::VerifyCa`]/[`SslMode::VerifyFull`] succeed:
/// whichever single byte the server answers with, the connection attempt is
/// failed with [`TlsNotSupported`]. [`SslMode::Prefer`]/[`SslMode::Allow`]/
/// [`SslMode::Disable`] never send `SSLRequest` at all and proceed in plaintext.
async fn negotiate_ssl(config: &Config, socket: &mut Socket) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    if !config.ssl_mode.requires_tls() {
        return Ok(());
    }

    let mut buf = BytesMut::with_capacity(8);
    frontend::SSLRequest.write(&mut buf);
    socket.write_all(&buf).await?;
    socket.flush().await?;

    let _response = socket.read_u8().await?;

    Err(config::TlsNotSupported.into())
}

impl Connection {
    /// Get the [`Instant`] value of when the socket is connected to postgres server.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Current lifecycle state of this connection.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Look up a run-time parameter reported by the server via `ParameterStatus`
    /// (e.g. `server_version`, `client_encoding`, `TimeZone`).
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(ByteStr::as_str)
    }

    /// Pop the oldest queued `LISTEN`/`NOTIFY` notification, if any.
    pub fn try_recv_notification(&mut self) -> Option<NotificationResponse> {
        self.notifications.pop_front()
    }

    pub(crate) fn enter_pipeline(&mut self) {
        self.state = ConnState::PipelineOpen;
    }

    pub(crate) fn exit_pipeline(&mut self) {
        if self.state == ConnState::PipelineOpen {
            self.state = ConnState::Idle;
        }
    }

    pub(crate) fn enter_copy_in(&mut self) {
        self.state = ConnState::CopyIn;
    }

    pub(crate) fn enter_copy_out(&mut self) {
        self.state = ConnState::CopyOut;
    }

    pub(crate) fn leave_copy(&mut self) {
        self.state = ConnState::Busy;
    }
}

impl Connection {
    /// Initiates or attempts to shut down the socket, returning success when
    /// the I/O connection has completely shut down.
    pub fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.socket.poll_shutdown(cx)
    }

    /// Close connection cleanly.
    pub async fn close(mut self) -> io::Result<()> {
        self.send(frontend::Terminate);
        self.flush().await?;
        self.state = ConnState::Closed;
        self.socket.shutdown().await
    }

    /// Request cancellation of whatever is currently running on this connection.
    ///
    /// Opens a fresh side-socket to the same host, sends `CancelRequest`, and closes it --
    /// the cancel is never pipelined on the working connection itself, per protocol.
    ///
    /// A no-op if the backend never reported [`BackendKeyData`][backend::BackendKeyData]
    /// (i.e. the connection never finished startup).
    pub async fn cancel(&self) -> io::Result<()> {
        let Some(key) = self.backend_key_data.as_ref() else {
            return Ok(());
        };

        let mut socket = Socket::connect_tcp(&self.host, self.port).await?;
        let mut buf = BytesMut::with_capacity(16);
        frontend::CancelRequest { process_id: key.process_id, secret_key: key.secret_key }.write(&mut buf);
        std::future::poll_fn(|cx| crate::io::poll_write_all(&mut socket, &mut buf, cx)).await?;
        socket.shutdown().await
    }
}

macro_rules! poll_message {
    (
        poll($io:ident, $cx:ident);
        let $msgtype:ident;
        let $body:ident;
    ) => {
        let Some(mut header) = $io.read_buf.get(..5) else {
            $io.read_buf.reserve(1024);
            ready!(crate::io::poll_read(&mut $io.socket, &mut $io.read_buf, $cx)?);
            continue;
        };

        let $msgtype = header.get_u8();
        let len = header.get_i32() as _;

        if $io.read_buf.len() - 1/*msgtype*/ < len {
            $io.read_buf.reserve(1 + len);
            ready!(crate::io::poll_read(&mut $io.socket, &mut $io.read_buf, $cx)?);
            continue;
        }

        $io.read_buf.advance(5);
        let $body = $io.read_buf.split_to(len - 4).freeze();

        // Message fully acquired
        verbose!("(B){:?}", backend::BackendMessage::decode($msgtype, $body.clone()).unwrap());
    };
}

impl Connection {
    /// Execute all queued actions.
    ///
    /// See the struct docs for [more details][1].
    ///
    /// [1]: Connection#pending-messages
    pub fn ready(&mut self) -> impl Future<Output = Result<()>> {
        std::future::poll_fn(|cx| self.poll_ready(cx))
    }

    /// Attempt to execute all queued actions.
    ///
    /// See the struct docs for [more details][1].
    ///
    /// [1]: Connection#pending-messages
    pub(crate) fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        if !self.write_buf.is_empty() {
            ready!(self.poll_flush(cx)?)
        }

        while self.sync_pending != 0 {
            verbose!("healthcheck: {{sync_pending: {}}}", self.sync_pending);

            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    self.send(frontend::Sync);
                    // NOTE: not documented but the `Sync` will get eaten by ErrorResponse
                    // based on currently happening behavior
                    self.ready_request();
                    self.state = ConnState::Busy;
                    #[cfg(feature = "log")]
                    log::error!("{}", ErrorResponse::new(body));
                },
                NoticeResponse::MSGTYPE => {
                    #[cfg(feature = "log")]
                    log::warn!("{}", NoticeResponse::new(body));
                },
                backend::ParameterStatus::MSGTYPE => self.store_param(body)?,
                NotificationResponse::MSGTYPE => self.store_notification(msgtype, body)?,
                backend::ReadyForQuery::MSGTYPE => {
                    self.sync_pending -= 1;
                    if self.sync_pending == 0 && self.state != ConnState::PipelineOpen {
                        self.state = ConnState::Idle;
                    }
                },
                _ => {} // ignore all other messages until `ReadyForQuery` received
            }
        }

        Poll::Ready(Ok(()))
    }

    fn store_param(&mut self, body: bytes::Bytes) -> Result<()> {
        let status = backend::ParameterStatus::decode(backend::ParameterStatus::MSGTYPE, body)?;
        verbose!("parameter_status: {}={}", status.name, status.value);
        self.params.insert(status.name, status.value);
        Ok(())
    }

    fn store_notification(&mut self, msgtype: u8, body: bytes::Bytes) -> Result<()> {
        let notif = NotificationResponse::decode(msgtype, body)?;
        verbose!("notification: {:?}", notif);
        self.notifications.push_back(notif);
        Ok(())
    }
}

impl PgTransport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        crate::io::poll_write_all(&mut self.socket, &mut self.write_buf, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        ready!(self.poll_ready(cx)?);

        loop {
            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    self.send(frontend::Sync);
                    self.ready_request();
                    self.state = ConnState::Busy;
                    Err(ErrorResponse::new(body))?
                },
                NoticeResponse::MSGTYPE => {
                    #[cfg(feature = "log")]
                    log::warn!("{}", NoticeResponse::new(body));
                    continue;
                },
                backend::ParameterStatus::MSGTYPE => {
                    self.store_param(body)?;
                    continue;
                },
                NotificationResponse::MSGTYPE => {
                    self.store_notification(msgtype, body)?;
                    continue;
                },
                _ => return Poll::Ready(Ok(B::decode(msgtype, body)?)),
            }
        }
    }

    fn ready_request(&mut self) {
        self.sync_pending += 1;
    }

    fn send<F: FrontendProtocol + std::fmt::Debug>(&mut self, message: F) {
        verbose!("(F){:?}", message);
        if self.state == ConnState::Idle {
            self.state = ConnState::Busy;
        }
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        verbose!("(F){:?}", startup);
        startup.write(&mut self.write_buf);
    }

    fn get_stmt(&mut self, sqlid: u64) -> Option<StatementName> {
        self.stmts.get(&sqlid).cloned().inspect(|_e| {
            verbose!("statement cache hit: {_e}")
        })
    }

    fn add_stmt(&mut self, id: u64, name: StatementName) {
        verbose!("statement added: {name}");

        if let Some((_id, name)) = self.stmts.push(id, name) {
            verbose!("statement removed: {name}");

            self.send(frontend::Close { variant: b'S', name: name.as_str() });
            self.send(frontend::Sync);

            self.ready_request();
        }
    }

    fn enter_pipeline(&mut self) {
        Connection::enter_pipeline(self);
    }

    fn exit_pipeline(&mut self) {
        Connection::exit_pipeline(self);
    }

    fn enter_copy_in(&mut self) {
        Connection::enter_copy_in(self);
    }

    fn enter_copy_out(&mut self) {
        Connection::enter_copy_out(self);
    }

    fn leave_copy(&mut self) {
        Connection::leave_copy(self);
    }

    fn tracer(&self) -> &dyn Tracer {
        &*self.tracer
    }
}

impl Executor for Connection {
    type Transport = Self;

    type Future = Ready<Result<Self>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(self))
    }
}
