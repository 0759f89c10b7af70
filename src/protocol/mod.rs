//! Protocol module - HPS wire codecs and service schema.
//!
//! This module implements the byte-level protocol:
//! - Method+scheme control opcode encoding/decoding
//! - Header block encoding with truncation, tolerant decoding
//! - 3-octet status notification record
//! - Service and characteristic schema (UUIDs, properties, size limits)

mod control;
mod headers;
pub mod schema;
mod status;

pub use control::{encode_method_scheme, opcode, Method, Opcode, Scheme};
pub use headers::Headers;
pub use status::{data_status, NotifyStatus, NOTIFY_STATUS_SIZE};
