//! Channel factory
//!
//! Opens plaintext HTTP/2 channels to unix sockets or TCP endpoints.

use std::path::PathBuf;
use tonic::transport::{Channel, Endpoint};

use crate::{Error, Result};

/// Where a channel connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAddress {
    /// Unix domain socket path
    Unix(PathBuf),
    /// `http://host:port` URI
    Tcp(String),
}

/// Parse an address string
///
/// Accepts `unix:///path`, `unix:/path`, `/path`, `http://host:port` and
/// bare `host:port`.
pub fn parse_address(address: &str) -> Result<ChannelAddress> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::invalid_address("address is empty"));
    }

    if let Some(path) = address.strip_prefix("unix://").or_else(|| address.strip_prefix("unix:")) {
        if path.is_empty() {
            return Err(Error::invalid_address(format!("{}: missing socket path", address)));
        }
        return Ok(ChannelAddress::Unix(PathBuf::from(path)));
    }

    if address.starts_with('/') {
        return Ok(ChannelAddress::Unix(PathBuf::from(address)));
    }

    if address.starts_with("https://") {
        return Err(Error::invalid_address(format!(
            "{}: only insecure channels are supported",
            address
        )));
    }

    if address.starts_with("http://") {
        return Ok(ChannelAddress::Tcp(address.to_string()));
    }

    if address.contains("://") {
        return Err(Error::invalid_address(format!("{}: unsupported scheme", address)));
    }

    Ok(ChannelAddress::Tcp(format!("http://{}", address)))
}

/// Create an insecure channel to `address`
///
/// The channel connects lazily; connection failures surface on the first call.
/// Must be called from within a tokio runtime.
pub fn create_channel(address: &str) -> Result<Channel> {
    match parse_address(address)? {
        ChannelAddress::Tcp(uri) => Ok(Endpoint::from_shared(uri)?.connect_lazy()),
        ChannelAddress::Unix(path) => unix_channel(path),
    }
}

#[cfg(unix)]
fn unix_channel(path: PathBuf) -> Result<Channel> {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::transport::Uri;

    // The URI is never resolved, the connector dials the socket
    let endpoint = Endpoint::from_static("http://[::]:50051");
    Ok(endpoint.connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
        let path = path.clone();
        async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
    })))
}

#[cfg(not(unix))]
fn unix_channel(path: PathBuf) -> Result<Channel> {
    Err(Error::invalid_address(format!(
        "{}: unix sockets are not supported on this platform",
        path.display()
    )))
}
