//! rnano - nanomsg-style scalability protocol sockets in pure, asynchronous Rust (Tokio).
//!
//! Sockets implement one messaging pattern each (PAIR, REQ/REP, PUB/SUB,
//! SURVEYOR/RESPONDENT, PUSH/PULL) over `tcp://`, `ipc://` and `inproc://`
//! endpoints. Raw-domain sockets expose routing headers as [`Control`] so that one
//! responder can be shared by many concurrent workers, and two raw sockets can be
//! joined with a [`device`].

pub mod context;
pub mod device;
pub mod error;
pub mod message;
pub mod poll;
pub mod socket;
pub mod symbol;

pub(crate) mod engine;
pub(crate) mod protocol;
pub(crate) mod transport;

pub use context::{context, Context, MAX_SOCKETS};
pub use device::device;
pub use error::{strerror, DeviceSide, SpError, SpResult};
pub use message::{Control, Flags, Msg};
pub use poll::{poll, PollEvents, PollItem};
pub use socket::options;
pub use socket::{Domain, EndpointId, Protocol, Socket, Statistic, ToBytes, AF_SP, AF_SP_RAW};
pub use symbol::{symbol, symbols, Symbol, SymbolKind};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

pub fn version_major() -> i32 {
  VERSION_MAJOR
}

pub fn version_minor() -> i32 {
  VERSION_MINOR
}

pub fn version_patch() -> i32 {
  VERSION_PATCH
}
