//! 轮询负载均衡

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::{LoadBalancer, LoadBalancerFactory};
use crate::error::Result;
use crate::registry::Lifecycle;
use crate::types::{Service, ServiceRef};

/// 工厂在注册表中的插件名
pub const ROUND_ROBIN_PLUGIN_NAME: &str = "round-robin";

/// 轮询负载均衡器
///
/// 游标记录的是"槽位下标"而不是具体实例：两次调用之间实例池发生变化时，
/// 可能跳过或重复某个实例。
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次调用将使用的槽位（未对池长度取模前）
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}

impl LoadBalancer for RoundRobin {
    fn next(&self, pool: &[ServiceRef]) -> Option<ServiceRef> {
        if pool.is_empty() {
            return None;
        }
        let len = pool.len();

        // 闭包总是返回 Some，fetch_update 不会失败
        let previous = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor % len + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous,
        };

        pool.get(previous % len).cloned()
    }
}

/// 轮询负载均衡器工厂
///
/// 每个服务名一个负载均衡器，懒创建并在进程生命周期内缓存
#[derive(Default)]
pub struct RoundRobinFactory {
    balancers: RwLock<HashMap<String, Arc<RoundRobin>>>,
}

impl RoundRobinFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已创建的负载均衡器数量
    pub fn len(&self) -> usize {
        self.balancers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn balancer(&self, name: &str) -> Arc<RoundRobin> {
        if let Some(balancer) = self
            .balancers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return balancer.clone();
        }

        let mut balancers = self
            .balancers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        balancers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(service_name = %name, "Creating round robin balancer");
                Arc::new(RoundRobin::new())
            })
            .clone()
    }
}

impl LoadBalancerFactory for RoundRobinFactory {
    fn for_name(&self, name: &str) -> Arc<dyn LoadBalancer> {
        self.balancer(name)
    }
}

/// 作为生命周期插件时，服务名出现即预先创建负载均衡器；
/// 实例池由调用方实时查询，因此其余钩子无需处理
#[async_trait]
impl Lifecycle for RoundRobinFactory {
    fn name(&self) -> &str {
        ROUND_ROBIN_PLUGIN_NAME
    }

    async fn register_service(&self, service: &Service) -> Result<()> {
        self.balancer(&service.name);
        Ok(())
    }

    async fn deregister_service(&self, _service: &Service) -> Result<()> {
        Ok(())
    }

    async fn register_instance(&self, _service: &Service) -> Result<()> {
        Ok(())
    }

    async fn deregister_instance(&self, _service: &Service) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryStorage, ServiceRegistry};
    use std::collections::HashMap;

    fn pool(size: usize) -> Vec<ServiceRef> {
        (0..size)
            .map(|i| Arc::new(Service::new(i.to_string(), "svc", "127.0.0.1", 8000 + i as u16)))
            .collect()
    }

    #[test]
    fn test_visits_each_instance_in_order() {
        let rr = RoundRobin::new();
        let pool = pool(3);

        let picked: Vec<String> = (0..4)
            .map(|_| rr.next(&pool).unwrap().id.clone())
            .collect();
        assert_eq!(picked, vec!["0", "1", "2", "0"]);
    }

    #[test]
    fn test_single_instance_pool() {
        let rr = RoundRobin::new();
        let pool = pool(1);
        for _ in 0..5 {
            assert_eq!(rr.next(&pool).unwrap().id, "0");
        }
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let rr = RoundRobin::new();
        assert!(rr.next(&[]).is_none());
        assert!(rr.next(&[]).is_none());
        // 空池不推进游标
        assert_eq!(rr.position(), 0);
        assert_eq!(rr.next(&pool(2)).unwrap().id, "0");
    }

    #[test]
    fn test_cursor_is_positional_under_churn() {
        let rr = RoundRobin::new();
        let full = pool(3);
        assert_eq!(rr.next(&full).unwrap().id, "0");
        assert_eq!(rr.next(&full).unwrap().id, "1");

        // 池缩小后游标按下标取模，而不是追踪具体实例
        let shrunk: Vec<ServiceRef> = full[1..].to_vec();
        assert_eq!(rr.next(&shrunk).unwrap().id, "1");
    }

    #[test]
    fn test_factory_caches_per_name() {
        let factory = RoundRobinFactory::new();
        let pool = pool(2);

        let a = factory.for_name("a");
        assert_eq!(a.next(&pool).unwrap().id, "0");
        // 同名复用同一个游标
        assert_eq!(factory.for_name("a").next(&pool).unwrap().id, "1");
        // 不同名互不影响
        assert_eq!(factory.for_name("b").next(&pool).unwrap().id, "0");
        assert_eq!(factory.len(), 2);
    }

    #[tokio::test]
    async fn test_balancer_survives_service_transitions() {
        let factory = Arc::new(RoundRobinFactory::new());
        let registry = ServiceRegistry::with_storage(
            Arc::new(InMemoryStorage::new()),
            Default::default(),
        );
        registry.plugin(factory.clone());

        registry
            .register(Service::new("1", "orders", "127.0.0.1", 8080))
            .await
            .unwrap();
        assert_eq!(factory.len(), 1);

        let balancer = factory.balancer("orders");
        let pool = registry.lookup("orders").await.unwrap();
        balancer.next(&pool);

        // 1→0 之后同名再次出现，沿用同一个负载均衡器
        registry.deregister("orders", "1").await.unwrap();
        registry
            .register(Service::new("2", "orders", "127.0.0.1", 8081))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&balancer, &factory.balancer("orders")));
        assert_eq!(factory.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_next_loses_no_updates() {
        const TASKS: usize = 8;
        const CALLS: usize = 300;

        let factory = Arc::new(RoundRobinFactory::new());
        let pool = Arc::new(pool(3));

        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let factory = factory.clone();
                let pool = pool.clone();
                tokio::spawn(async move {
                    let mut counts: HashMap<String, usize> = HashMap::new();
                    for _ in 0..CALLS {
                        let picked = factory.for_name("svc").next(&pool).unwrap();
                        *counts.entry(picked.id.clone()).or_default() += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for (id, count) in handle.await.unwrap() {
                *totals.entry(id).or_default() += count;
            }
        }

        assert_eq!(totals.values().sum::<usize>(), TASKS * CALLS);
        // 调用总数是池大小的整数倍，无丢失更新时每个实例被选中次数相同
        for id in ["0", "1", "2"] {
            assert_eq!(totals[id], TASKS * CALLS / 3);
        }
        assert_eq!(factory.balancer("svc").position(), 0);
    }
}
