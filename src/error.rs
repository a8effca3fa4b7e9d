use std::fmt;
use std::io;
use thiserror::Error;

/// Base for library-specific error numbers that have no POSIX equivalent.
pub const HAUSNUMERO: i32 = 156_384_712;
/// Operation cannot be performed in the socket's current state.
pub const EFSM: i32 = HAUSNUMERO + 54;
/// The library is terminating.
pub const ETERM: i32 = HAUSNUMERO + 53;

/// Identifies which socket of a device failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSide {
  /// The first socket passed to `device()`.
  First,
  /// The second socket passed to `device()`.
  Second,
}

impl fmt::Display for DeviceSide {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DeviceSide::First => f.write_str("first"),
      DeviceSide::Second => f.write_str("second"),
    }
  }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SpError {
  // --- Creation ---
  #[error("Socket creation failed: {0}")]
  Creation(String),

  // --- Address / Endpoint ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String),
  #[error("Unknown endpoint id: {0}")]
  UnknownEndpoint(i32),

  // --- Bind / Connect ---
  #[error("Failed to bind {endpoint}: {source}")]
  Bind {
    endpoint: String,
    #[source]
    source: io::Error,
  },
  #[error("Failed to connect {endpoint}: {reason}")]
  Connect { endpoint: String, reason: String },

  // --- Options ---
  #[error("Unsupported socket option (level {level}, option {option})")]
  InvalidOption { level: i32, option: i32 },
  #[error("Invalid value for socket option (level {level}, option {option})")]
  InvalidOptionValue { level: i32, option: i32 },

  // --- Flow control ---
  /// Not a failure: the operation would have blocked and `DONTWAIT` was requested.
  #[error("Operation would block")]
  WouldBlock,
  #[error("Operation timed out")]
  Timeout,

  // --- Transport ---
  #[error("Transport error: {0}")]
  Transport(#[from] io::Error),
  #[error("Connection closed by peer")]
  ConnectionClosed,

  // --- Protocol / State ---
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String),
  #[error("Operation is invalid for the current socket state: {0}")]
  InvalidState(&'static str),
  #[error("Operation is not supported by the socket type ({0})")]
  InvalidSocketType(&'static str),

  // --- Lifecycle ---
  #[error("Socket has been closed")]
  BadHandle,
  #[error("Context is terminating")]
  Terminated,

  // --- Device ---
  #[error("Device relay stopped, {side} socket failed: {source}")]
  Device {
    side: DeviceSide,
    #[source]
    source: Box<SpError>,
  },

  #[error("Internal library error: {0}")]
  Internal(String),
}

pub type SpResult<T> = Result<T, SpError>;

impl SpError {
  /// Maps an I/O error raised while binding `endpoint`.
  pub fn bind_failed(e: io::Error, endpoint: &str) -> Self {
    SpError::Bind {
      endpoint: endpoint.to_string(),
      source: e,
    }
  }

  /// True for the non-blocking "try again" signal.
  pub fn is_would_block(&self) -> bool {
    matches!(self, SpError::WouldBlock)
  }

  /// True when the socket or its context can no longer be used.
  pub fn is_fatal(&self) -> bool {
    matches!(self, SpError::BadHandle | SpError::Terminated)
  }

  /// Numeric error code, using libc errno values where one exists.
  pub fn errno(&self) -> i32 {
    match self {
      SpError::Creation(_) => libc::EMFILE,
      SpError::InvalidEndpoint(_) => libc::EINVAL,
      SpError::UnsupportedTransport(_) => libc::EPROTONOSUPPORT,
      SpError::UnknownEndpoint(_) => libc::EINVAL,
      SpError::Bind { source, .. } => io_errno(source, libc::EADDRINUSE),
      SpError::Connect { .. } => libc::EINVAL,
      SpError::InvalidOption { .. } => libc::ENOPROTOOPT,
      SpError::InvalidOptionValue { .. } => libc::EINVAL,
      SpError::WouldBlock => libc::EAGAIN,
      SpError::Timeout => libc::ETIMEDOUT,
      SpError::Transport(e) => io_errno(e, libc::EIO),
      SpError::ConnectionClosed => libc::ECONNRESET,
      SpError::ProtocolViolation(_) => libc::EPROTO,
      SpError::InvalidState(_) => EFSM,
      SpError::InvalidSocketType(_) => libc::ENOTSUP,
      SpError::BadHandle => libc::EBADF,
      SpError::Terminated => ETERM,
      SpError::Device { source, .. } => source.errno(),
      SpError::Internal(_) => libc::EFAULT,
    }
  }
}

fn io_errno(e: &io::Error, fallback: i32) -> i32 {
  if let Some(code) = e.raw_os_error() {
    return code;
  }
  match e.kind() {
    io::ErrorKind::AddrInUse => libc::EADDRINUSE,
    io::ErrorKind::AddrNotAvailable => libc::EADDRNOTAVAIL,
    io::ErrorKind::ConnectionRefused => libc::ECONNREFUSED,
    io::ErrorKind::ConnectionReset => libc::ECONNRESET,
    io::ErrorKind::PermissionDenied => libc::EACCES,
    io::ErrorKind::TimedOut => libc::ETIMEDOUT,
    io::ErrorKind::BrokenPipe => libc::EPIPE,
    _ => fallback,
  }
}

/// Returns a human readable description for an error number produced by [`SpError::errno`].
pub fn strerror(errnum: i32) -> String {
  match errnum {
    EFSM => "Operation cannot be performed in this state".to_string(),
    ETERM => "Nanomsg library was terminated".to_string(),
    _ => io::Error::from_raw_os_error(errnum).to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn would_block_is_not_a_transport_error() {
    let wb = SpError::WouldBlock;
    assert!(wb.is_would_block());
    assert_eq!(wb.errno(), libc::EAGAIN);

    let io_err = SpError::Transport(io::Error::new(io::ErrorKind::Other, "boom"));
    assert!(!io_err.is_would_block());
    assert_eq!(io_err.errno(), libc::EIO);
  }

  #[test]
  fn bind_error_carries_os_code() {
    let e = SpError::bind_failed(io::Error::from(io::ErrorKind::AddrInUse), "tcp://127.0.0.1:1");
    assert_eq!(e.errno(), libc::EADDRINUSE);
    assert!(e.to_string().contains("tcp://127.0.0.1:1"));
  }

  #[test]
  fn device_error_reports_side_and_inner_code() {
    let e = SpError::Device {
      side: DeviceSide::Second,
      source: Box::new(SpError::BadHandle),
    };
    assert_eq!(e.errno(), libc::EBADF);
    assert!(e.to_string().contains("second"));
  }

  #[test]
  fn custom_codes_have_descriptions() {
    assert_eq!(SpError::InvalidState("x").errno(), EFSM);
    assert_eq!(SpError::Terminated.errno(), ETERM);
    assert!(strerror(EFSM).contains("state"));
    assert!(strerror(ETERM).contains("terminated"));
  }
}
