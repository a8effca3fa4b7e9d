// src/protocol/sp/mod.rs

pub mod backtrace;
pub mod codec;
pub mod header;

pub use codec::SpCodec;
pub use header::{SpHeader, SP_HEADER_LENGTH};
