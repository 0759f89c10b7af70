//! Error types for hps-proxy.

use thiserror::Error;

/// Main error type for all HPS operations.
#[derive(Debug, Error)]
pub enum HpsError {
    /// Method outside the five verbs the control opcode can carry.
    #[error("unsupported method {0:?}, valid values are GET, HEAD, POST, PUT, DELETE")]
    UnsupportedMethod(String),

    /// Scheme outside http/https.
    #[error("unsupported scheme {0:?}, valid values are http and https")]
    UnsupportedScheme(String),

    /// Control-point byte that maps to no method+scheme pair.
    #[error("unable to decode control opcode from byte 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Status notification payload shorter than the 3-octet record.
    #[error("status notification payload too short: {0} octets, need 3")]
    ShortNotifyStatus(usize),

    /// URL rejected before any radio traffic.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// CLI header argument not of the form `key=value`.
    #[error("invalid header {0:?}, expected 'key=value'")]
    InvalidHeader(String),

    /// A BLE stack operation failed (scan, connect, discover, read, write,
    /// subscribe). The connection is torn down by the caller.
    #[error("BLE transport error: {0}")]
    Transport(String),

    /// The HPS primary service was not present on the connected peripheral.
    #[error("HPS service not found on peripheral")]
    ServiceNotFound,

    /// A required characteristic was missing from the HPS service.
    #[error("characteristic {0} not found on HPS service")]
    CharacteristicNotFound(&'static str),

    /// No matching peripheral appeared before the connect timeout.
    #[error("connection timeout")]
    ConnectTimeout,

    /// No status notification arrived before the response timeout.
    #[error("response timeout")]
    ResponseTimeout,

    /// The peripheral dropped the connection mid-transaction.
    #[error("peripheral disconnected")]
    Disconnected,

    /// Outbound HTTP call failed before a response was produced.
    /// The gateway reports this as a synthetic 502 to the central.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Outbound HTTP response body could not be read.
    /// The gateway reports this as a synthetic 500 to the central.
    #[error("upstream body read failed: {0}")]
    UpstreamBody(String),

    /// I/O error outside the radio path (file output, sockets in tests).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using HpsError.
pub type Result<T> = std::result::Result<T, HpsError>;
