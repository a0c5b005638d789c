//! 内存存储后端

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::RegistryStorage;
use crate::error::Result;
use crate::types::ServiceRef;

/// 内存注册表存储
///
/// 进程重启后数据丢失；`start()` 返回当前持有的全部服务名，
/// 预先填充的数据因此可以经由注册表冷启动回放。
#[derive(Default)]
pub struct InMemoryStorage {
    services: RwLock<HashMap<String, Vec<ServiceRef>>>,
}

impl InMemoryStorage {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有实例创建存储（按给定顺序分组）
    pub fn with_services(services: impl IntoIterator<Item = ServiceRef>) -> Self {
        let mut map: HashMap<String, Vec<ServiceRef>> = HashMap::new();
        for service in services {
            map.entry(service.name.clone()).or_default().push(service);
        }
        Self {
            services: RwLock::new(map),
        }
    }
}

#[async_trait]
impl RegistryStorage for InMemoryStorage {
    async fn store(&self, name: &str, service: ServiceRef) -> Result<()> {
        let mut services = self.services.write().await;
        let pool = services.entry(name.to_string()).or_default();

        // 同 ID 重复注册时原位替换，保持其在池中的位置
        match pool.iter_mut().find(|existing| existing.id == service.id) {
            Some(slot) => *slot = service,
            None => pool.push(service),
        }
        Ok(())
    }

    async fn remove(&self, name: &str, id: &str) -> Result<Option<ServiceRef>> {
        let mut services = self.services.write().await;
        let Some(pool) = services.get_mut(name) else {
            return Ok(None);
        };

        let mut removed = None;
        pool.retain(|service| {
            if service.id == id {
                removed = Some(service.clone());
                false
            } else {
                true
            }
        });

        if pool.is_empty() {
            services.remove(name);
        }

        Ok(removed)
    }

    async fn lookup(&self, name: &str) -> Result<Vec<ServiceRef>> {
        let services = self.services.read().await;
        Ok(services.get(name).cloned().unwrap_or_default())
    }

    async fn start(&self) -> Result<Vec<String>> {
        let services = self.services.read().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
