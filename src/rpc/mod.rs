//! RPC plumbing between the edge and the backend

pub mod client;
pub mod connector;
pub mod pool;

// Re-exports
pub use client::{CallError, RpcClient};
pub use connector::{RpcConnection, TcpConnector};
pub use pool::{Pool, PoolOptions, Pooled};
