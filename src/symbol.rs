// src/symbol.rs

use crate::error::{EFSM, ETERM};
use crate::message::Flags;
use crate::socket::options::*;
use crate::socket::{Protocol, AF_SP, AF_SP_RAW};

/// What kind of constant a [`Symbol`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
  Domain,
  Protocol,
  OptionLevel,
  SocketOption,
  TransportOption,
  PatternOption,
  Flag,
  Error,
}

/// A named library constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
  pub name: &'static str,
  pub value: i32,
  pub kind: SymbolKind,
}

const fn sym(name: &'static str, value: i32, kind: SymbolKind) -> Symbol {
  Symbol { name, value, kind }
}

use SymbolKind as K;

static SYMBOLS: &[Symbol] = &[
  sym("AF_SP", AF_SP, K::Domain),
  sym("AF_SP_RAW", AF_SP_RAW, K::Domain),
  sym("PAIR", Protocol::Pair.id() as i32, K::Protocol),
  sym("PUB", Protocol::Pub.id() as i32, K::Protocol),
  sym("SUB", Protocol::Sub.id() as i32, K::Protocol),
  sym("REQ", Protocol::Req.id() as i32, K::Protocol),
  sym("REP", Protocol::Rep.id() as i32, K::Protocol),
  sym("PUSH", Protocol::Push.id() as i32, K::Protocol),
  sym("PULL", Protocol::Pull.id() as i32, K::Protocol),
  sym("SURVEYOR", Protocol::Surveyor.id() as i32, K::Protocol),
  sym("RESPONDENT", Protocol::Respondent.id() as i32, K::Protocol),
  sym("SOL_SOCKET", SOL_SOCKET, K::OptionLevel),
  sym("TCP", TCP_LEVEL, K::OptionLevel),
  sym("LINGER", LINGER, K::SocketOption),
  sym("SNDHWM", SNDHWM, K::SocketOption),
  sym("RCVHWM", RCVHWM, K::SocketOption),
  sym("SNDTIMEO", SNDTIMEO, K::SocketOption),
  sym("RCVTIMEO", RCVTIMEO, K::SocketOption),
  sym("RECONNECT_IVL", RECONNECT_IVL, K::SocketOption),
  sym("RECONNECT_IVL_MAX", RECONNECT_IVL_MAX, K::SocketOption),
  sym("DOMAIN", DOMAIN, K::SocketOption),
  sym("PROTOCOL", PROTOCOL, K::SocketOption),
  sym("SOCKET_NAME", SOCKET_NAME, K::SocketOption),
  sym("RCVMAXSIZE", RCVMAXSIZE, K::SocketOption),
  sym("MAXTTL", MAXTTL, K::SocketOption),
  sym("TCP_NODELAY", TCP_NODELAY, K::TransportOption),
  sym("REQ_RESEND_IVL", REQ_RESEND_IVL, K::PatternOption),
  sym("REQ_CANCEL_PENDING", REQ_CANCEL_PENDING, K::PatternOption),
  sym("SUB_SUBSCRIBE", SUB_SUBSCRIBE, K::PatternOption),
  sym("SUB_UNSUBSCRIBE", SUB_UNSUBSCRIBE, K::PatternOption),
  sym("SURVEYOR_DEADLINE", SURVEYOR_DEADLINE, K::PatternOption),
  sym("DONTWAIT", Flags::DONTWAIT.bits(), K::Flag),
  sym("EADDRINUSE", libc::EADDRINUSE, K::Error),
  sym("EAGAIN", libc::EAGAIN, K::Error),
  sym("EBADF", libc::EBADF, K::Error),
  sym("EINVAL", libc::EINVAL, K::Error),
  sym("EMFILE", libc::EMFILE, K::Error),
  sym("ENOPROTOOPT", libc::ENOPROTOOPT, K::Error),
  sym("ENOTSUP", libc::ENOTSUP, K::Error),
  sym("EPROTO", libc::EPROTO, K::Error),
  sym("EPROTONOSUPPORT", libc::EPROTONOSUPPORT, K::Error),
  sym("ETIMEDOUT", libc::ETIMEDOUT, K::Error),
  sym("EFSM", EFSM, K::Error),
  sym("ETERM", ETERM, K::Error),
];

/// Returns the `index`-th named constant, or `None` past the end of the table.
pub fn symbol(index: usize) -> Option<Symbol> {
  SYMBOLS.get(index).copied()
}

/// Iterates over every named constant.
pub fn symbols() -> impl Iterator<Item = Symbol> {
  SYMBOLS.iter().copied()
}
