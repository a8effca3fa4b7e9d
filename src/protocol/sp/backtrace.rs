// src/protocol/sp/backtrace.rs

//! Routing headers used by the request/reply and survey protocols.
//!
//! A request travels with a stack of 32-bit big-endian words in front of its
//! body. The originating requester pushes a request id with the top bit set;
//! every intermediary (device) pushes the id of the connection it arrived on,
//! with the top bit clear. A responder pops words up to and including the first
//! one with the top bit set and sends them back in front of the reply.

use bytes::{BufMut, Bytes, BytesMut};

/// Marks the word that terminates a backtrace (the original request id).
pub const END_OF_BACKTRACE: u32 = 0x8000_0000;

/// Size of one routing word.
pub const WORD: usize = 4;

fn word_at(data: &[u8], offset: usize) -> u32 {
  u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Splits `body` into `(backtrace, payload)`.
///
/// Returns `None` when the body ends before a terminating word is found, or when
/// the backtrace holds more than `max_hops` words.
pub fn split_backtrace(body: &Bytes, max_hops: usize) -> Option<(Bytes, Bytes)> {
  let mut offset = 0;
  let mut hops = 0;
  while offset + WORD <= body.len() {
    let word = word_at(body, offset);
    offset += WORD;
    hops += 1;
    if hops > max_hops {
      return None;
    }
    if word & END_OF_BACKTRACE != 0 {
      return Some((body.slice(..offset), body.slice(offset..)));
    }
  }
  None
}

/// Splits the connection id that a responder prepends to a received backtrace.
pub fn split_pipe_id(header: &Bytes) -> Option<(u32, Bytes)> {
  if header.len() < WORD || header.len() % WORD != 0 {
    return None;
  }
  Some((word_at(header, 0), header.slice(WORD..)))
}

/// True if `header` is a complete backtrace: whole words, the last (and only the last)
/// with the top bit set.
pub fn is_complete_backtrace(header: &[u8]) -> bool {
  if header.is_empty() || header.len() % WORD != 0 {
    return false;
  }
  let last = header.len() - WORD;
  (0..header.len())
    .step_by(WORD)
    .all(|offset| (word_at(header, offset) & END_OF_BACKTRACE != 0) == (offset == last))
}

/// Returns `prefix ‖ body` as a single buffer.
pub fn prepend(prefix: &[u8], body: &[u8]) -> Bytes {
  let mut out = BytesMut::with_capacity(prefix.len() + body.len());
  out.put_slice(prefix);
  out.put_slice(body);
  out.freeze()
}

/// Returns `id ‖ body`.
pub fn prepend_word(id: u32, body: &[u8]) -> Bytes {
  prepend(&id.to_be_bytes(), body)
}
