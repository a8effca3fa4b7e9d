// src/engine/mod.rs

pub(crate) mod core;

use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) use self::core::{run_connection, ConnectionRole};

/// Byte stream a connection engine can drive: TCP, Unix domain or in-process duplex.
pub(crate) trait SpStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SpStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
