use bytes::Bytes;
use std::fmt;

/// A single, length-delimited message body.
///
/// The payload is an immutable `Bytes`, so cloning a message or handing it to
/// several connections is cheap. A received `Msg` is owned by the caller and is
/// released when dropped.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  data: Bytes,
}

impl Msg {
  /// Creates an empty message with no data.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a message from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self { data: Bytes::from(data) }
  }

  /// Creates a message from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self { data }
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      data: Bytes::from_static(data),
    }
  }

  /// Creates a message by copying a caller-owned buffer.
  pub fn from_slice(data: &[u8]) -> Self {
    Self {
      data: Bytes::copy_from_slice(data),
    }
  }

  /// Returns the message payload.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the size of the message payload in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  /// Returns true if the payload is empty.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Returns a cheap clone of the underlying `Bytes`.
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  /// Consumes the message, returning the underlying `Bytes`.
  pub fn into_bytes(self) -> Bytes {
    self.data
  }
}

impl From<Vec<u8>> for Msg {
  fn from(data: Vec<u8>) -> Self {
    Self::from_vec(data)
  }
}

impl From<&[u8]> for Msg {
  fn from(data: &[u8]) -> Self {
    Self::from_slice(data)
  }
}

impl From<&str> for Msg {
  fn from(data: &str) -> Self {
    Self::from_slice(data.as_bytes())
  }
}

impl From<String> for Msg {
  fn from(data: String) -> Self {
    Self::from_vec(data.into_bytes())
  }
}

impl From<Bytes> for Msg {
  fn from(data: Bytes) -> Self {
    Self::from_bytes(data)
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .finish()
  }
}
