/// Per-endpoint connection pools
///
/// The router only picks an endpoint. Opening, limiting and closing network
/// connections is the job of a `ConnectionPool`, one logical pool per endpoint
/// sized by the endpoint's `pool_size`.
use crate::core::{Endpoint, EndpointPool};
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use socket2::SockRef;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outbound connection contract used after a routing decision
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Connection: Send;

    /// Acquire a connection to `endpoint`, waiting for a free slot if needed
    async fn acquire(&self, endpoint: &Endpoint) -> RouterResult<Self::Connection>;

    /// Return a connection to the pool
    fn release(&self, connection: Self::Connection);
}

/// A TCP connection holding one slot of its endpoint's pool
#[derive(Debug)]
pub struct PooledConnection {
    pub endpoint_id: String,
    pub peer_addr: SocketAddr,
    pub stream: TcpStream,
    opened_at: Instant,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// How long the connection has been held
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// Slot limit for one endpoint, remembered with the size it was built for
#[derive(Debug)]
struct SlotLimit {
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl SlotLimit {
    fn new(size: usize) -> Self {
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }
}

/// Connection pool opening plain TCP connections, bounded per endpoint
#[derive(Debug)]
pub struct TcpConnectionPool {
    limits: Mutex<HashMap<String, SlotLimit>>,
    connect_timeout_ms: AtomicU64,
}

impl TcpConnectionPool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            limits: Mutex::new(HashMap::new()),
            connect_timeout_ms: AtomicU64::new(connect_timeout.as_millis() as u64),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.load(Ordering::Relaxed))
    }

    /// Applies to acquisitions started after the call
    pub fn set_connect_timeout(&self, connect_timeout: Duration) {
        self.connect_timeout_ms
            .store(connect_timeout.as_millis() as u64, Ordering::Relaxed);
    }

    fn limit_for(&self, endpoint: &Endpoint) -> Arc<Semaphore> {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        let limit = limits
            .entry(endpoint.id.clone())
            .or_insert_with(|| SlotLimit::new(endpoint.pool_size));
        if limit.size != endpoint.pool_size {
            // Outstanding permits keep the old semaphore alive until released
            debug!(
                endpoint = %endpoint.id,
                from = limit.size,
                to = endpoint.pool_size,
                "Resizing connection pool"
            );
            *limit = SlotLimit::new(endpoint.pool_size);
        }
        Arc::clone(&limit.semaphore)
    }

    /// Bring slot limits in line with a new endpoint pool
    ///
    /// Limits for endpoints no longer present are dropped and limits whose
    /// `pool_size` changed are rebuilt. Connections already handed out keep
    /// their slot on the previous limit.
    pub fn reconfigure(&self, pool: &EndpointPool) {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        limits.retain(|id, _| pool.get(id).is_some());
        for endpoint in pool.all() {
            if let Some(limit) = limits.get_mut(&endpoint.id) {
                if limit.size != endpoint.pool_size {
                    *limit = SlotLimit::new(endpoint.pool_size);
                }
            }
        }
    }

    /// Free connection slots for an endpoint (its full size if never used)
    pub fn available(&self, endpoint: &Endpoint) -> usize {
        self.limit_for(endpoint).available_permits()
    }

    /// Number of endpoints with a slot limit
    pub fn tracked(&self) -> usize {
        self.limits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Configure stream for low-latency request/response traffic
    fn configure_stream(stream: &TcpStream) -> Result<(), io::Error> {
        stream.set_nodelay(true)?;
        SockRef::from(stream).set_keepalive(true)?;
        Ok(())
    }
}

impl Default for TcpConnectionPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ConnectionPool for TcpConnectionPool {
    type Connection = PooledConnection;

    async fn acquire(&self, endpoint: &Endpoint) -> RouterResult<PooledConnection> {
        let limit = self.limit_for(endpoint);
        let connect_timeout = self.connect_timeout();

        let permit = match timeout(connect_timeout, limit.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RouterError::internal("connection pool closed")),
            Err(_) => {
                return Err(RouterError::timeout(format!(
                    "waiting for a free connection to {}",
                    endpoint.id
                )))
            }
        };

        debug!(endpoint = %endpoint.id, addr = %endpoint.addr, "Connecting to endpoint");

        let stream = match timeout(connect_timeout, TcpStream::connect(endpoint.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(endpoint = %endpoint.id, error = %e, "Connection failed");
                return Err(RouterError::connection(&endpoint.id, e.to_string()));
            }
            Err(_) => {
                return Err(RouterError::timeout(format!("connecting to {}", endpoint.id)));
            }
        };

        if let Err(e) = Self::configure_stream(&stream) {
            warn!(endpoint = %endpoint.id, "Failed to configure stream: {}", e);
        }

        Ok(PooledConnection {
            endpoint_id: endpoint.id.clone(),
            peer_addr: endpoint.addr,
            stream,
            opened_at: Instant::now(),
            _permit: permit,
        })
    }

    fn release(&self, connection: PooledConnection) {
        debug!(
            endpoint = %connection.endpoint_id,
            held_ms = connection.age().as_millis() as u64,
            "Releasing connection"
        );
    }
}
