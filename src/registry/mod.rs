//! 服务注册表模块
//!
//! 注册表持有可插拔的存储，并通过生命周期插件协议把实例数量变化通知给
//! 负载均衡、事件分发等独立子系统

pub mod memory;
pub mod service_registry;
pub mod trait_def;

pub use memory::InMemoryStorage;
pub use service_registry::ServiceRegistry;
pub use trait_def::{Lifecycle, RegistryStorage};
