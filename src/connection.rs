use crate::controller::RelayOutput;
use crate::error::{ReaderError, Result};
use crate::framing::DeviceLines;
use crate::subscription::{ClientEvent, EventReceiver};
use crate::types::ConnectionState;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::FramedRead;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_LINE_LENGTH: usize = 4096;
const EVENT_CAPACITY: usize = 100;

type Lines = FramedRead<OwnedReadHalf, DeviceLines>;

/// Transport tuning for a [`LineClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bound on connect time and read inactivity; unbounded when `None`
    pub timeout: Option<Duration>,
    /// Pause between losing the socket and the next connect attempt
    pub reconnect_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// State shared between the client handle and its supervisor task
struct Shared {
    host: String,
    port: u16,
    options: ClientOptions,
    /// Writer for the live socket, `None` whenever not connected
    writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<ClientEvent>,
}

/// Persistent line-oriented TCP client for one ESP peer
///
/// Once [`connect`](Self::connect) has been called the client keeps a socket
/// to `host:port` open for as long as it lives. Any socket error, timeout or
/// close drops the socket and schedules one new attempt after
/// `reconnect_delay`, forever.
///
/// # Example
///
/// ```no_run
/// use analogreader::{ClientEvent, ClientOptions, LineClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = LineClient::new("192.168.0.11", 23, ClientOptions::default());
///     let mut events = client.subscribe();
///     client.connect();
///
///     while let Ok(event) = events.recv().await {
///         if event == ClientEvent::Connected {
///             client.send("R31\n");
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct LineClient {
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LineClient {
    /// Create an idle client; nothing happens until `connect`
    pub fn new(host: impl Into<String>, port: u16, options: ClientOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                host: host.into(),
                port,
                options,
                writer: Mutex::new(None),
                state_tx,
                event_tx,
            }),
            stop_tx: Mutex::new(None),
            task_handle: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Start connecting in the background.
    ///
    /// Calling this while the client is already running does nothing. Must
    /// be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut task_handle = lock(&self.task_handle);
        if task_handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        *lock(&self.stop_tx) = Some(stop_tx);

        let shared = self.shared.clone();
        *task_handle = Some(tokio::spawn(supervise(shared, stop_rx)));
    }

    /// Stop the background task and close the socket
    pub async fn stop(&self) {
        if let Some(tx) = lock(&self.stop_tx).take() {
            let _ = tx.send(());
        }
        let handle = lock(&self.task_handle).take();
        if let Some(handle) = handle {
            // Give it a moment to stop gracefully
            let _ = timeout(Duration::from_millis(500), handle).await;
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to connect, disconnect and line events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.shared.event_tx.subscribe())
    }

    /// Send a line to the peer, or log and drop it when disconnected.
    ///
    /// Lines are never queued for a later connection.
    pub fn send(&self, line: &str) {
        if let Err(e) = self.try_send(line) {
            tracing::warn!("{}, dropping {:?}", e, line);
        }
    }

    /// Send a line to the peer, failing with `NotConnected` when there is
    /// no socket
    pub fn try_send(&self, line: &str) -> Result<()> {
        let writer = lock(&self.shared.writer);
        let Some(tx) = writer.as_ref() else {
            return Err(ReaderError::NotConnected {
                host: self.shared.host.clone(),
                port: self.shared.port,
            });
        };

        tracing::debug!(">> {:?}", line);
        tx.send(line.to_string())
            .map_err(|_| ReaderError::ConnectionClosed)
    }
}

impl RelayOutput for LineClient {
    fn is_connected(&self) -> bool {
        LineClient::is_connected(self)
    }

    fn send_line(&self, line: &str) {
        self.send(line);
    }
}

async fn supervise(shared: Arc<Shared>, mut stop_rx: broadcast::Receiver<()>) {
    let mut failures: u64 = 0;

    loop {
        if failures == 0 {
            tracing::info!("Connecting to {}:{}", shared.host, shared.port);
        } else {
            tracing::debug!("Connecting to {}:{} (retry {})", shared.host, shared.port, failures);
        }

        let result = tokio::select! {
            _ = stop_rx.recv() => {
                shared.teardown();
                break;
            }
            result = shared.run_session() => result,
        };

        let was_connected = shared.teardown();
        match result {
            Err(e) if was_connected => {
                tracing::info!("Socket {}:{} disconnected: {}", shared.host, shared.port, e);
                failures = 0;
            }
            Err(e) => {
                tracing::debug!("Connect to {}:{} failed: {}", shared.host, shared.port, e);
                failures += 1;
            }
            Ok(()) => failures = 0,
        }

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = sleep(shared.options.reconnect_delay) => {}
        }
    }

    tracing::info!("Client for {}:{} stopped", shared.host, shared.port);
}

impl Shared {
    /// Connect and pump lines until the socket dies
    async fn run_session(&self) -> Result<()> {
        self.state_tx.send_replace(ConnectionState::Connecting);

        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match self.options.timeout {
            Some(limit) => timeout(limit, connect)
                .await
                .map_err(|_| ReaderError::Timeout)??,
            None => connect.await?,
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = FramedRead::new(read_half, DeviceLines::new(MAX_LINE_LENGTH));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        *lock(&self.writer) = Some(tx);
        self.state_tx.send_replace(ConnectionState::Connected);
        tracing::info!("Socket {}:{} connected", self.host, self.port);
        let _ = self.event_tx.send(ClientEvent::Connected);

        loop {
            tokio::select! {
                line = self.next_line(&mut lines) => {
                    let line = line?;
                    tracing::debug!("<< {:?}", line);
                    let _ = self.event_tx.send(ClientEvent::Line(line));
                }
                Some(out) = rx.recv() => {
                    write_half.write_all(out.as_bytes()).await?;
                }
            }
        }
    }

    /// Next line, or the socket failure that ends the session.
    ///
    /// Malformed content never surfaces here; `DeviceLines` absorbs it.
    async fn next_line(&self, lines: &mut Lines) -> Result<String> {
        let next = match self.options.timeout {
            Some(limit) => timeout(limit, lines.next())
                .await
                .map_err(|_| ReaderError::Timeout)?,
            None => lines.next().await,
        };

        match next {
            Some(line) => Ok(line?),
            None => Err(ReaderError::ConnectionClosed),
        }
    }

    /// Drop the socket writer and move to `Disconnected`.
    ///
    /// Returns whether the socket had been connected, in which case a
    /// `Disconnected` event is emitted.
    fn teardown(&self) -> bool {
        lock(&self.writer).take();
        let prior = self.state_tx.send_replace(ConnectionState::Disconnected);
        let was_connected = prior == ConnectionState::Connected;
        if was_connected {
            let _ = self.event_tx.send(ClientEvent::Disconnected);
        }
        was_connected
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
