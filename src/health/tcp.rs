/// TCP liveness probe
use super::Prober;
use crate::core::Endpoint;
use crate::error::ProbeFailure;
use std::io;
use tokio::net::TcpStream;

/// Probes an endpoint by completing a TCP handshake with it.
///
/// The handshake is the round trip; the connection is closed right away.
/// The health monitor bounds each probe with its own timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure> {
        tracing::trace!("Probing endpoint {} at {}", endpoint.id, endpoint.addr);

        match TcpStream::connect(endpoint.addr).await {
            Ok(stream) => {
                // Peer accepted then reset before we could use it
                if let Err(e) = stream.peer_addr() {
                    return Err(ProbeFailure::unreachable(format!("peer gone: {}", e)));
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                Err(ProbeFailure::rejected(format!("connection refused: {}", e)))
            }
            Err(e) => Err(ProbeFailure::unreachable(format!("connection failed: {}", e))),
        }
    }
}
