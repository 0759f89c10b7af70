//! Status notification codec.
//!
//! The HTTP Status Code characteristic notifies a fixed 3-octet record:
//!
//! ```text
//! ┌─────────────┬─────────────┐
//! │ Status code │ Data status │
//! │ 2 bytes     │ 1 byte      │
//! │ uint16 LE   │ bitfield    │
//! └─────────────┴─────────────┘
//! ```
//!
//! Data status bits: 0x01 headers received, 0x02 headers truncated,
//! 0x04 body received, 0x08 body truncated. The remaining bits are
//! reserved: zero on emit, ignored on receive.

use crate::error::{HpsError, Result};

/// Encoded record size in bytes (fixed, exactly 3).
pub const NOTIFY_STATUS_SIZE: usize = 3;

/// Data-status bit constants.
pub mod data_status {
    /// Response headers are available for read.
    pub const HEADERS_RECEIVED: u8 = 0x01;
    /// Response headers were cut to fit the size ceiling.
    pub const HEADERS_TRUNCATED: u8 = 0x02;
    /// Response body is available for read.
    pub const BODY_RECEIVED: u8 = 0x04;
    /// Response body was cut to fit the size ceiling.
    pub const BODY_TRUNCATED: u8 = 0x08;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0xF0;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(bits: u8, flag: u8) -> bool {
        bits & flag != 0
    }
}

/// Decoded status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyStatus {
    /// HTTP status code, e.g. 200 or 502.
    pub status_code: u16,
    pub headers_received: bool,
    pub headers_truncated: bool,
    pub body_received: bool,
    pub body_truncated: bool,
}

impl NotifyStatus {
    /// Pack the flags into the data-status octet. Reserved bits stay zero.
    pub fn data_status(&self) -> u8 {
        let mut bits = 0;
        if self.headers_received {
            bits |= data_status::HEADERS_RECEIVED;
        }
        if self.headers_truncated {
            bits |= data_status::HEADERS_TRUNCATED;
        }
        if self.body_received {
            bits |= data_status::BODY_RECEIVED;
        }
        if self.body_truncated {
            bits |= data_status::BODY_TRUNCATED;
        }
        bits
    }

    /// Encode to the 3-octet wire record.
    pub fn encode(&self) -> [u8; NOTIFY_STATUS_SIZE] {
        let code = self.status_code.to_le_bytes();
        [code[0], code[1], self.data_status()]
    }

    /// Decode a notification payload.
    ///
    /// Requires at least 3 bytes; extra bytes are ignored, as are the
    /// reserved data-status bits.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NOTIFY_STATUS_SIZE {
            return Err(HpsError::ShortNotifyStatus(buf.len()));
        }
        let bits = buf[2];
        Ok(Self {
            status_code: u16::from_le_bytes([buf[0], buf[1]]),
            headers_received: data_status::has_flag(bits, data_status::HEADERS_RECEIVED),
            headers_truncated: data_status::has_flag(bits, data_status::HEADERS_TRUNCATED),
            body_received: data_status::has_flag(bits, data_status::BODY_RECEIVED),
            body_truncated: data_status::has_flag(bits, data_status::BODY_TRUNCATED),
        })
    }
}
