// src/socket/options.rs

use std::time::Duration;

use crate::error::SpError;
use bytes::Bytes;

// --- Option levels ---
pub const SOL_SOCKET: i32 = 0;
pub const TCP_LEVEL: i32 = -3;

// --- Generic socket-level options (level SOL_SOCKET) ---
pub const LINGER: i32 = 1;
pub const SNDHWM: i32 = 2;
pub const RCVHWM: i32 = 3;
pub const SNDTIMEO: i32 = 4;
pub const RCVTIMEO: i32 = 5;
pub const RECONNECT_IVL: i32 = 6;
pub const RECONNECT_IVL_MAX: i32 = 7;
pub const DOMAIN: i32 = 12;
pub const PROTOCOL: i32 = 13;
pub const SOCKET_NAME: i32 = 15;
pub const RCVMAXSIZE: i32 = 16;
pub const MAXTTL: i32 = 17;

// --- Transport options (level TCP_LEVEL) ---
pub const TCP_NODELAY: i32 = 1;

// --- Pattern options (level = protocol id of the socket) ---
pub const REQ_RESEND_IVL: i32 = 1;
pub const REQ_CANCEL_PENDING: i32 = 2;
pub const SUB_SUBSCRIBE: i32 = 1;
pub const SUB_UNSUBSCRIBE: i32 = 2;
pub const SURVEYOR_DEADLINE: i32 = 1;

pub(crate) const DEFAULT_RCVMAXSIZE: usize = 1024 * 1024;
pub(crate) const DEFAULT_MAXTTL: u8 = 8;
pub(crate) const DEFAULT_RESEND_IVL: Duration = Duration::from_millis(60_000);
pub(crate) const DEFAULT_SURVEYOR_DEADLINE: Duration = Duration::from_millis(1_000);

/// Holds parsed and validated socket options.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  // High water marks, in messages, per connection.
  pub sndhwm: usize,
  pub rcvhwm: usize,
  // None = block forever.
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  // None = wait for every queued message to be flushed.
  pub linger: Option<Duration>,
  pub reconnect_ivl: Duration,
  // Zero disables exponential backoff.
  pub reconnect_ivl_max: Duration,
  pub socket_name: Bytes,
  // None = unlimited.
  pub rcvmaxsize: Option<usize>,
  pub maxttl: u8,
  pub tcp_nodelay: bool,
}

impl SocketOptions {
  pub fn new(handle: usize) -> Self {
    Self {
      sndhwm: 128,
      rcvhwm: 128,
      sndtimeo: None,
      rcvtimeo: None,
      linger: Some(Duration::from_millis(1_000)),
      reconnect_ivl: Duration::from_millis(100),
      reconnect_ivl_max: Duration::ZERO,
      socket_name: Bytes::from(handle.to_string()),
      rcvmaxsize: Some(DEFAULT_RCVMAXSIZE),
      maxttl: DEFAULT_MAXTTL,
      tcp_nodelay: false,
    }
  }

  /// Applies a SOL_SOCKET or TCP level option. Pattern levels are handled by the socket itself.
  pub fn apply(&mut self, level: i32, option: i32, value: &[u8]) -> Result<(), SpError> {
    let invalid = || SpError::InvalidOptionValue { level, option };
    match (level, option) {
      (SOL_SOCKET, LINGER) => self.linger = parse_duration_ms_option(value).map_err(|_| invalid())?,
      (SOL_SOCKET, SNDHWM) => self.sndhwm = parse_hwm_option(value).map_err(|_| invalid())?,
      (SOL_SOCKET, RCVHWM) => self.rcvhwm = parse_hwm_option(value).map_err(|_| invalid())?,
      (SOL_SOCKET, SNDTIMEO) => self.sndtimeo = parse_duration_ms_option(value).map_err(|_| invalid())?,
      (SOL_SOCKET, RCVTIMEO) => self.rcvtimeo = parse_duration_ms_option(value).map_err(|_| invalid())?,
      (SOL_SOCKET, RECONNECT_IVL) => {
        self.reconnect_ivl = parse_positive_ms_option(value).map_err(|_| invalid())?;
      }
      (SOL_SOCKET, RECONNECT_IVL_MAX) => {
        let ms = parse_i32_option(value).map_err(|_| invalid())?;
        if ms < 0 {
          return Err(invalid());
        }
        self.reconnect_ivl_max = Duration::from_millis(ms as u64);
      }
      (SOL_SOCKET, SOCKET_NAME) => {
        if value.is_empty() || value.len() > 63 || std::str::from_utf8(value).is_err() {
          return Err(invalid());
        }
        self.socket_name = Bytes::copy_from_slice(value);
      }
      (SOL_SOCKET, RCVMAXSIZE) => {
        self.rcvmaxsize = match parse_i32_option(value).map_err(|_| invalid())? {
          -1 => None,
          n if n >= 0 => Some(n as usize),
          _ => return Err(invalid()),
        };
      }
      (SOL_SOCKET, MAXTTL) => {
        let hops = parse_i32_option(value).map_err(|_| invalid())?;
        self.maxttl = u8::try_from(hops).ok().filter(|h| *h >= 1).ok_or_else(invalid)?;
      }
      (SOL_SOCKET, DOMAIN) | (SOL_SOCKET, PROTOCOL) => return Err(invalid()), // read-only
      (TCP_LEVEL, TCP_NODELAY) => self.tcp_nodelay = parse_bool_option(value).map_err(|_| invalid())?,
      _ => return Err(SpError::InvalidOption { level, option }),
    }
    Ok(())
  }

  /// Reads back a SOL_SOCKET or TCP level option. DOMAIN and PROTOCOL are answered by the socket.
  pub fn get(&self, level: i32, option: i32) -> Result<Vec<u8>, SpError> {
    let bytes = match (level, option) {
      (SOL_SOCKET, LINGER) => duration_ms_to_bytes(self.linger),
      (SOL_SOCKET, SNDHWM) => (self.sndhwm as i32).to_ne_bytes().to_vec(),
      (SOL_SOCKET, RCVHWM) => (self.rcvhwm as i32).to_ne_bytes().to_vec(),
      (SOL_SOCKET, SNDTIMEO) => duration_ms_to_bytes(self.sndtimeo),
      (SOL_SOCKET, RCVTIMEO) => duration_ms_to_bytes(self.rcvtimeo),
      (SOL_SOCKET, RECONNECT_IVL) => duration_ms_to_bytes(Some(self.reconnect_ivl)),
      (SOL_SOCKET, RECONNECT_IVL_MAX) => duration_ms_to_bytes(Some(self.reconnect_ivl_max)),
      (SOL_SOCKET, SOCKET_NAME) => self.socket_name.to_vec(),
      (SOL_SOCKET, RCVMAXSIZE) => match self.rcvmaxsize {
        Some(n) => (n.min(i32::MAX as usize) as i32).to_ne_bytes().to_vec(),
        None => (-1i32).to_ne_bytes().to_vec(),
      },
      (SOL_SOCKET, MAXTTL) => (self.maxttl as i32).to_ne_bytes().to_vec(),
      (TCP_LEVEL, TCP_NODELAY) => (self.tcp_nodelay as i32).to_ne_bytes().to_vec(),
      _ => return Err(SpError::InvalidOption { level, option }),
    };
    Ok(bytes)
  }
}

/// Settings applied to each TCP stream as it is established.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TcpTransportConfig {
  pub tcp_nodelay: bool,
}

impl From<&SocketOptions> for TcpTransportConfig {
  fn from(options: &SocketOptions) -> Self {
    Self {
      tcp_nodelay: options.tcp_nodelay,
    }
  }
}

// --- Helper functions for parsing option values ---
// Errors carry a placeholder key; callers remap them with the real (level, option).

/// Parses a byte slice representing a native-endian integer option.
pub(crate) fn parse_i32_option(value: &[u8]) -> Result<i32, SpError> {
  let arr: [u8; 4] = value
    .try_into()
    .map_err(|_| SpError::InvalidOptionValue { level: 0, option: 0 })?;
  Ok(i32::from_ne_bytes(arr))
}

/// Parses a byte slice representing a boolean option (0 or 1).
pub(crate) fn parse_bool_option(value: &[u8]) -> Result<bool, SpError> {
  match parse_i32_option(value)? {
    0 => Ok(false),
    1 => Ok(true),
    _ => Err(SpError::InvalidOptionValue { level: 0, option: 0 }),
  }
}

/// Parses a timeout or linger value in milliseconds; -1 means infinite.
pub(crate) fn parse_duration_ms_option(value: &[u8]) -> Result<Option<Duration>, SpError> {
  let val = parse_i32_option(value)?;
  match val {
    -1 => Ok(None),
    0.. => Ok(Some(Duration::from_millis(val as u64))),
    _ => Err(SpError::InvalidOptionValue { level: 0, option: 0 }),
  }
}

/// Parses an interval that must be strictly positive.
pub(crate) fn parse_positive_ms_option(value: &[u8]) -> Result<Duration, SpError> {
  match parse_i32_option(value)? {
    v if v > 0 => Ok(Duration::from_millis(v as u64)),
    _ => Err(SpError::InvalidOptionValue { level: 0, option: 0 }),
  }
}

fn parse_hwm_option(value: &[u8]) -> Result<usize, SpError> {
  match parse_i32_option(value)? {
    v if v > 0 => Ok(v as usize),
    _ => Err(SpError::InvalidOptionValue { level: 0, option: 0 }),
  }
}

/// Encodes an optional duration as milliseconds, None as -1.
pub(crate) fn duration_ms_to_bytes(value: Option<Duration>) -> Vec<u8> {
  let ms = match value {
    Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
    None => -1,
  };
  ms.to_ne_bytes().to_vec()
}
