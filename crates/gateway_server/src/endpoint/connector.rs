//! Opening connections to world servers.

use super::{Endpoint, EndpointError, EndpointKind};
use crate::protocol::FrameCodec;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

/// Opens a backend [`Endpoint`] to a world server game address.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Endpoint, EndpointError>;
}

/// Connects over TCP with the backend-facing codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBackendConnector;

#[async_trait]
impl BackendConnector for TcpBackendConnector {
    async fn connect(&self, address: &str) -> Result<Endpoint, EndpointError> {
        let connect_error = |source| EndpointError::Connect { address: address.to_string(), source };

        let stream = TcpStream::connect(address).await.map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;
        debug!("🌍 Connected to world server {}", address);

        let (decoder, encoder) = FrameCodec::backend_facing().into_parts();
        let (read_half, write_half) = stream.into_split();
        Ok(Endpoint::spawn(
            address,
            EndpointKind::Backend,
            FramedRead::new(read_half, decoder),
            FramedWrite::new(write_half, encoder),
        ))
    }
}
