// src/protocol/sp/codec.rs

use crate::error::SpError;
use crate::message::Msg;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix preceding every message body.
pub const SP_FRAME_PREFIX: usize = 8;

/// Most buffer space reserved ahead of body bytes that have not arrived yet.
const BODY_RESERVE_CHUNK: usize = 64 * 1024;

/// Codec for SP stream framing: a 64-bit big-endian body length followed by the body.
#[derive(Debug, Default)]
pub struct SpCodec {
  decoding_state: DecodingState,
  /// Largest body accepted from the peer. `None` means unlimited.
  max_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadHeader, // Waiting for the 8 length octets
  ReadBody(usize), // Waiting for this many body bytes
}

impl SpCodec {
  pub fn new(max_size: Option<usize>) -> Self {
    Self {
      decoding_state: DecodingState::default(),
      max_size,
    }
  }
}

// --- Encoder Implementation (Msg -> BytesMut) ---
impl Encoder<Msg> for SpCodec {
  type Error = SpError;

  fn encode(&mut self, item: Msg, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let data = item.data();
    dst.reserve(SP_FRAME_PREFIX + data.len());
    dst.put_u64(data.len() as u64);
    dst.put_slice(data);
    Ok(())
  }
}

// --- Decoder Implementation (BytesMut -> Msg) ---
impl Decoder for SpCodec {
  type Item = Msg;
  type Error = SpError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.decoding_state {
        DecodingState::ReadHeader => {
          if src.len() < SP_FRAME_PREFIX {
            src.reserve(SP_FRAME_PREFIX - src.len());
            return Ok(None);
          }
          let size = src.get_u64();
          let size = usize::try_from(size)
            .map_err(|_| SpError::ProtocolViolation(format!("Message size {} does not fit in memory", size)))?;
          if let Some(max) = self.max_size {
            if size > max {
              return Err(SpError::ProtocolViolation(format!(
                "Message of {} bytes exceeds the {} byte receive limit",
                size, max
              )));
            }
          }
          self.decoding_state = DecodingState::ReadBody(size);
        }

        DecodingState::ReadBody(size) => {
          if src.len() < size {
            src.reserve((size - src.len()).min(BODY_RESERVE_CHUNK));
            return Ok(None);
          }
          let body = src.split_to(size).freeze();
          self.decoding_state = DecodingState::ReadHeader;
          return Ok(Some(Msg::from_bytes(body)));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_across_partial_reads() {
    let mut codec = SpCodec::new(None);
    let mut wire = BytesMut::new();
    codec.encode(Msg::from_static(b"hello"), &mut wire).unwrap();
    assert_eq!(&wire[..8], &5u64.to_be_bytes());

    let mut src = BytesMut::new();
    src.extend_from_slice(&wire[..3]);
    assert!(codec.decode(&mut src).unwrap().is_none());
    src.extend_from_slice(&wire[3..10]);
    assert!(codec.decode(&mut src).unwrap().is_none());
    src.extend_from_slice(&wire[10..]);
    let msg = codec.decode(&mut src).unwrap().expect("complete frame");
    assert_eq!(msg.data(), b"hello");
    assert!(src.is_empty());
  }

  #[test]
  fn decodes_empty_body_and_back_to_back_frames() {
    let mut codec = SpCodec::new(None);
    let mut src = BytesMut::new();
    codec.encode(Msg::new(), &mut src).unwrap();
    codec.encode(Msg::from_static(b"x"), &mut src).unwrap();

    assert_eq!(codec.decode(&mut src).unwrap().unwrap().size(), 0);
    assert_eq!(codec.decode(&mut src).unwrap().unwrap().data(), b"x");
    assert!(codec.decode(&mut src).unwrap().is_none());
  }

  #[test]
  fn rejects_oversized_frames_before_buffering_body() {
    let mut codec = SpCodec::new(Some(4));
    let mut src = BytesMut::new();
    src.put_u64(5);
    let err = codec.decode(&mut src).unwrap_err();
    assert!(matches!(err, SpError::ProtocolViolation(_)));
  }

  #[test]
  fn advertised_length_does_not_drive_allocation() {
    let mut codec = SpCodec::new(None);
    let mut src = BytesMut::new();
    src.put_u64(1 << 60);
    src.extend_from_slice(b"partial");
    assert!(codec.decode(&mut src).unwrap().is_none());
    assert!(src.capacity() <= 2 * BODY_RESERVE_CHUNK);
  }

  #[test]
  fn large_body_arrives_in_pieces() {
    let mut codec = SpCodec::new(None);
    let mut wire = BytesMut::new();
    let body = vec![7u8; 3 * BODY_RESERVE_CHUNK + 11];
    codec.encode(Msg::from_vec(body.clone()), &mut wire).unwrap();

    let mut src = BytesMut::new();
    let mut decoded = None;
    for piece in wire.chunks(10_000) {
      src.extend_from_slice(piece);
      if let Some(msg) = codec.decode(&mut src).unwrap() {
        decoded = Some(msg);
      }
    }
    assert_eq!(decoded.expect("complete frame").data(), &body[..]);
  }
}
