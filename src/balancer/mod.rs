//! 负载均衡模块
//!
//! 负载均衡器只负责从调用方给出的实例池中选出下一个实例，
//! 实例池本身由调用方通过注册表实时查询得到

pub mod round_robin;

use std::sync::Arc;

use crate::types::ServiceRef;

pub use round_robin::{ROUND_ROBIN_PLUGIN_NAME, RoundRobin, RoundRobinFactory};

/// 负载均衡器
///
/// HTTP 转发和事件投递两条路径会并发调用同一个服务名的 `next`，实现必须无数据竞争
pub trait LoadBalancer: Send + Sync {
    /// 选出实例池中的下一个实例，空池返回 `None`
    fn next(&self, pool: &[ServiceRef]) -> Option<ServiceRef>;
}

/// 负载均衡器工厂
pub trait LoadBalancerFactory: Send + Sync {
    /// 获取服务名对应的负载均衡器，首次访问时创建，之后一直复用
    fn for_name(&self, name: &str) -> Arc<dyn LoadBalancer>;
}
