// src/protocol/sp/header.rs

use crate::error::SpError;

/// Length of the protocol header exchanged when a connection opens.
pub const SP_HEADER_LENGTH: usize = 8;

const SP_SIGNATURE: [u8; 4] = [0x00, b'S', b'P', 0x00];

/// The 8-byte header each side sends before any message:
/// `00 'S' 'P' 00 <protocol id, u16 big-endian> 00 00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpHeader {
  pub protocol: u16,
}

impl SpHeader {
  pub fn new(protocol: u16) -> Self {
    Self { protocol }
  }

  pub fn to_bytes(&self) -> [u8; SP_HEADER_LENGTH] {
    let mut out = [0u8; SP_HEADER_LENGTH];
    out[..4].copy_from_slice(&SP_SIGNATURE);
    out[4..6].copy_from_slice(&self.protocol.to_be_bytes());
    out
  }

  /// Parses a peer header. The buffer must hold exactly `SP_HEADER_LENGTH` bytes.
  pub fn decode(src: &[u8]) -> Result<Self, SpError> {
    if src.len() != SP_HEADER_LENGTH {
      return Err(SpError::ProtocolViolation(format!(
        "SP header must be {} bytes, got {}",
        SP_HEADER_LENGTH,
        src.len()
      )));
    }
    if src[..4] != SP_SIGNATURE {
      return Err(SpError::ProtocolViolation("Invalid SP header signature".into()));
    }
    if src[6] != 0 || src[7] != 0 {
      return Err(SpError::ProtocolViolation("Reserved SP header bytes must be zero".into()));
    }
    Ok(Self {
      protocol: u16::from_be_bytes([src[4], src[5]]),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encodes_req_header() {
    assert_eq!(
      SpHeader::new(48).to_bytes(),
      [0x00, b'S', b'P', 0x00, 0x00, 48, 0x00, 0x00]
    );
  }

  #[test]
  fn decodes_peer_protocol() {
    let header = SpHeader::decode(&[0x00, b'S', b'P', 0x00, 0x00, 49, 0x00, 0x00]).unwrap();
    assert_eq!(header.protocol, 49);
  }

  #[test]
  fn rejects_foreign_greeting() {
    // A ZMTP greeting starts with 0xFF.
    let err = SpHeader::decode(&[0xFF, 0, 0, 0, 0, 0, 0, 0x7F]).unwrap_err();
    assert!(matches!(err, SpError::ProtocolViolation(_)));
  }

  #[test]
  fn rejects_nonzero_reserved_bytes() {
    let err = SpHeader::decode(&[0x00, b'S', b'P', 0x00, 0x00, 16, 0x01, 0x00]).unwrap_err();
    assert!(matches!(err, SpError::ProtocolViolation(_)));
  }
}
