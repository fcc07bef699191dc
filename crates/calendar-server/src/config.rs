//! Listener configuration for the HTTP and gRPC adapters.

use std::net::{Ipv4Addr, SocketAddr};

/// Default HTTP listen port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default gRPC listen port.
pub const DEFAULT_GRPC_PORT: u16 = 50051;

/// HTTP adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_HTTP_PORT)),
        }
    }
}

impl HttpConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

/// gRPC adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub addr: SocketAddr,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_GRPC_PORT)),
        }
    }
}

impl GrpcConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

/// Returns `127.0.0.1:0`, for tests and ephemeral listeners.
pub fn ephemeral_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}
