//! Flare Mesh Core Library
//!
//! Orchestration core of a lightweight service mesh: a service registry with a
//! lifecycle plugin protocol, per-name round-robin load balancing shared by HTTP
//! forwarding and event delivery, and a dispatcher bridging a publish/subscribe
//! transport to per-instance webhook delivery.

pub mod balancer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod mesh;
pub mod proxy;
pub mod registry;
pub mod telemetry;
pub mod types;
pub mod utils;

// Re-exports
pub use balancer::{LoadBalancer, LoadBalancerFactory, RoundRobin, RoundRobinFactory};
pub use config::{
    DeliveryConfig, EventConfig, HookErrorPolicy, HttpDeliveryConfig, LogConfig, MeshConfig,
    ProxyConfig, RegistryConfig,
};
pub use error::{CombinedError, ErrorCategory, ErrorCode, MeshError, Result};
pub use event::{
    Deliverer, EventAdapter, EventDispatcher, EventHandler, InMemoryEventAdapter, Responder,
};
pub use mesh::{Mesh, MeshBuilder};
pub use proxy::{Forwarder, Proxy, Route};
pub use registry::{InMemoryStorage, Lifecycle, RegistryStorage, ServiceRegistry};
pub use telemetry::init_tracing;
pub use types::{Event, Service, ServiceRef, Subscription, SubscriptionKey};
pub use utils::parse_duration;

#[cfg(feature = "http-delivery")]
pub use delivery::HttpDeliverer;
