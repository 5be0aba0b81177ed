use thiserror::Error;

/// Result type for analog reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur when talking to an ESP peer or the host
#[derive(Error, Debug)]
pub enum ReaderError {
    /// I/O error on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host configuration could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Host configuration is unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A line was sent while no socket was connected
    #[error("Not connected to {host}:{port}")]
    NotConnected {
        /// Peer host
        host: String,
        /// Peer port
        port: u16,
    },

    /// Connection was closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connect attempt or socket read timed out
    #[error("Socket timeout")]
    Timeout,

    /// The host rejected a UI update
    #[error("UI update failed: {0}")]
    Ui(String),
}
