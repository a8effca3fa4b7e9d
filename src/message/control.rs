use bytes::Bytes;
use std::fmt;

/// Opaque routing header ("control metadata") of a raw-mode message.
///
/// Produced by `Socket::recv_with_control` and consumed by
/// `Socket::send_with_control`. The bytes are a stack of 32-bit big-endian words
/// (connection id and request/survey id for a responder) and are never interpreted
/// by callers. A `Control` is deliberately not `Clone`: each one answers exactly one
/// request.
#[derive(Default, PartialEq, Eq)]
pub struct Control {
  header: Bytes,
}

impl Control {
  /// A control carrying no routing information.
  pub fn empty() -> Self {
    Self::default()
  }

  /// Rebuilds a control from bytes obtained via [`Control::as_bytes`], e.g. after
  /// forwarding them across a process boundary.
  pub fn from_bytes(header: Bytes) -> Self {
    Self { header }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.header
  }

  pub fn len(&self) -> usize {
    self.header.len()
  }

  pub fn is_empty(&self) -> bool {
    self.header.is_empty()
  }

  pub(crate) fn into_bytes(self) -> Bytes {
    self.header
  }
}

impl fmt::Debug for Control {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let words: Vec<String> = self
      .header
      .chunks(4)
      .map(|w| w.iter().map(|b| format!("{:02x}", b)).collect())
      .collect();
    f.debug_tuple("Control").field(&words.join(":")).finish()
  }
}
