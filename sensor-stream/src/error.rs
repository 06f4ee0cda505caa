//! Error types for SensorStream

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SensorStream error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Frame layout rejected at definition time
    #[error("Invalid frame layout: {0}")]
    Layout(#[from] LayoutError),

    /// Sample width does not match the channel declaration
    #[error("Channel '{channel}' expects {expected} values, got {actual}")]
    ChannelDimensionMismatch {
        /// Channel name
        channel: String,
        /// Declared dimension
        expected: usize,
        /// Number of values delivered
        actual: usize,
    },

    /// Sample addressed to a channel id outside the layout
    #[error("Unknown channel id: {0}")]
    UnknownChannel(usize),

    /// Connection attempt timed out, was refused or could not be resolved
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Send attempted outside the Connected state
    #[error("Not connected")]
    NotConnected,

    /// Peer closed the connection or the write failed
    #[error("Remote closed: {0}")]
    RemoteClosed(String),

    /// Writer queue is full, frame dropped
    #[error("Send queue full")]
    SendQueueFull,

    /// Sensor source failure
    #[error("Sensor source error: {0}")]
    Source(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Reasons a frame layout can be rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout has no channels")]
    Empty,

    #[error("channel '{channel}' has invalid dimension {dimension} (expected 1-4)")]
    InvalidDimension { channel: String, dimension: usize },

    #[error("channel '{0}' declared more than once")]
    DuplicateChannel(String),

    #[error("{0} channels declared, at most {max} supported", max = crate::fusion::layout::MAX_CHANNELS)]
    TooManyChannels(usize),

    #[error("quaternion channel '{channel}' needs at least 3 input values, got {dimension}")]
    QuaternionInput { channel: String, dimension: usize },
}
