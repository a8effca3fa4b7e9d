// src/transport/endpoint.rs

use crate::error::SpError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
#[cfg(feature = "ipc")]
use std::path::PathBuf;

/// Represents a parsed and validated endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
  /// Host is kept unresolved: bind maps it to a local interface, connect resolves it.
  Tcp { host: String, port: u16 },
  #[cfg(feature = "ipc")]
  Ipc(PathBuf),
  #[cfg(feature = "inproc")]
  Inproc(String),
}

/// Parses an endpoint string into a structured Endpoint enum.
pub(crate) fn parse_endpoint(endpoint_str: &str) -> Result<Endpoint, SpError> {
  let invalid_endpoint_err = || SpError::InvalidEndpoint(endpoint_str.to_string());

  let Some((scheme, address_part)) = endpoint_str.split_once("://") else {
    return Err(invalid_endpoint_err());
  };

  match scheme {
    "tcp" => {
      let (host, port) = address_part.rsplit_once(':').ok_or_else(invalid_endpoint_err)?;
      let port = port.parse::<u16>().map_err(|_| {
        tracing::debug!("Failed to parse TCP port: {}", address_part);
        invalid_endpoint_err()
      })?;
      let host = match host.strip_prefix('[') {
        Some(bracketed) => bracketed.strip_suffix(']').ok_or_else(invalid_endpoint_err)?,
        None if host.contains(':') => return Err(invalid_endpoint_err()), // IPv6 needs brackets
        None => host,
      };
      if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid_endpoint_err());
      }
      Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
      })
    }

    #[cfg(feature = "ipc")]
    "ipc" => {
      if address_part.is_empty() || address_part.contains('\0') {
        Err(invalid_endpoint_err())
      } else {
        Ok(Endpoint::Ipc(PathBuf::from(address_part)))
      }
    }

    #[cfg(feature = "inproc")]
    "inproc" => {
      if address_part.is_empty() || address_part.contains('\0') {
        Err(invalid_endpoint_err())
      } else {
        Ok(Endpoint::Inproc(address_part.to_string()))
      }
    }

    // Schemes disabled by features or unknown.
    _ => Err(SpError::UnsupportedTransport(endpoint_str.to_string())),
  }
}

/// Maps a bind host to a local address: `*` is every interface, `localhost` the loopback.
pub(crate) fn bind_address(host: &str) -> Option<IpAddr> {
  match host {
    "*" => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    "localhost" => Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    "::" => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
    _ => host.parse().ok(),
  }
}
