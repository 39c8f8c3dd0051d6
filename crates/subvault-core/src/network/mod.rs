//! Content-network tier: wire records, gateway failover and the resolver.

pub mod gateway;
pub mod record;
pub mod resolver;
pub mod transport;

pub use gateway::{GatewayClient, GatewayConfig, GatewayHealth, GatewayStats, GatewayTier};
pub use record::{DomainRecord, GlobalIndex};
pub use resolver::{NetworkResolver, NetworkStatus, Resolution, ResolutionSource, SyncReport};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
