//! Control-point opcode codec.
//!
//! The control characteristic carries a single octet that encodes the HTTP
//! method and the URL scheme together, and triggers the proxied request:
//!
//! ```text
//! ┌────────┬────────────────┬────────┐
//! │ Opcode │ Method         │ Scheme │
//! ├────────┼────────────────┼────────┤
//! │ 0x00   │ reserved       │   —    │
//! │ 0x01   │ GET            │ http   │
//! │ 0x02   │ HEAD           │ http   │
//! │ 0x03   │ POST           │ http   │
//! │ 0x04   │ PUT            │ http   │
//! │ 0x05   │ DELETE         │ http   │
//! │ 0x06   │ GET            │ https  │
//! │ 0x07   │ HEAD           │ https  │
//! │ 0x08   │ POST           │ https  │
//! │ 0x09   │ PUT            │ https  │
//! │ 0x0a   │ DELETE         │ https  │
//! │ 0x0b   │ request cancel │   —    │
//! └────────┴────────────────┴────────┘
//! ```
//!
//! Bytes 0x00 and ≥ 0x0c decode to an error carrying the offending byte.

use std::fmt;
use std::str::FromStr;

use crate::error::{HpsError, Result};

/// Raw opcode bytes.
pub mod opcode {
    /// Reserved, never valid.
    pub const RESERVED: u8 = 0x00;
    /// GET over http.
    pub const HTTP_GET: u8 = 0x01;
    /// HEAD over http.
    pub const HTTP_HEAD: u8 = 0x02;
    /// POST over http.
    pub const HTTP_POST: u8 = 0x03;
    /// PUT over http.
    pub const HTTP_PUT: u8 = 0x04;
    /// DELETE over http.
    pub const HTTP_DELETE: u8 = 0x05;
    /// GET over https.
    pub const HTTPS_GET: u8 = 0x06;
    /// HEAD over https.
    pub const HTTPS_HEAD: u8 = 0x07;
    /// POST over https.
    pub const HTTPS_POST: u8 = 0x08;
    /// PUT over https.
    pub const HTTPS_PUT: u8 = 0x09;
    /// DELETE over https.
    pub const HTTPS_DELETE: u8 = 0x0a;
    /// Cancel an in-flight request.
    pub const REQUEST_CANCEL: u8 = 0x0b;
}

/// HTTP method carried by a request opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Upper-case method name as sent on the wire to the origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = HpsError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("GET") {
            Ok(Method::Get)
        } else if trimmed.eq_ignore_ascii_case("HEAD") {
            Ok(Method::Head)
        } else if trimmed.eq_ignore_ascii_case("POST") {
            Ok(Method::Post)
        } else if trimmed.eq_ignore_ascii_case("PUT") {
            Ok(Method::Put)
        } else if trimmed.eq_ignore_ascii_case("DELETE") {
            Ok(Method::Delete)
        } else {
            Err(HpsError::UnsupportedMethod(s.to_string()))
        }
    }
}

/// URL scheme carried by a request opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Scheme as it appears in a URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = HpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(HpsError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Decoded control-point opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Dispatch a request with the given method over the given scheme.
    Request { method: Method, scheme: Scheme },
    /// Abort the in-flight request, if any.
    Cancel,
}

impl Opcode {
    /// Encode to the single control-point octet.
    pub fn encode(&self) -> u8 {
        match self {
            Opcode::Cancel => opcode::REQUEST_CANCEL,
            Opcode::Request { method, scheme } => {
                let base = match method {
                    Method::Get => opcode::HTTP_GET,
                    Method::Head => opcode::HTTP_HEAD,
                    Method::Post => opcode::HTTP_POST,
                    Method::Put => opcode::HTTP_PUT,
                    Method::Delete => opcode::HTTP_DELETE,
                };
                match scheme {
                    Scheme::Http => base,
                    Scheme::Https => base + (opcode::HTTPS_GET - opcode::HTTP_GET),
                }
            }
        }
    }

    /// Decode a control-point octet.
    ///
    /// Fails with [`HpsError::InvalidOpcode`] for 0x00 and anything
    /// above 0x0b, carrying the offending byte.
    pub fn decode(b: u8) -> Result<Self> {
        let method = match b {
            opcode::HTTP_GET | opcode::HTTPS_GET => Method::Get,
            opcode::HTTP_HEAD | opcode::HTTPS_HEAD => Method::Head,
            opcode::HTTP_POST | opcode::HTTPS_POST => Method::Post,
            opcode::HTTP_PUT | opcode::HTTPS_PUT => Method::Put,
            opcode::HTTP_DELETE | opcode::HTTPS_DELETE => Method::Delete,
            opcode::REQUEST_CANCEL => return Ok(Opcode::Cancel),
            other => return Err(HpsError::InvalidOpcode(other)),
        };
        let scheme = if b >= opcode::HTTPS_GET {
            Scheme::Https
        } else {
            Scheme::Http
        };
        Ok(Opcode::Request { method, scheme })
    }
}

/// Encode a method and scheme given as strings, validating both.
///
/// This is the string-level entry point used by the CLI path; the typed
/// [`Opcode::encode`] is infallible once both parts have parsed.
pub fn encode_method_scheme(method: &str, scheme: &str) -> Result<u8> {
    let method: Method = method.parse()?;
    let scheme: Scheme = scheme.parse()?;
    Ok(Opcode::Request { method, scheme }.encode())
}
