//! Scalability-protocol (SP) wire format: connection header, framing and
//! request/reply routing headers.

pub mod sp;
