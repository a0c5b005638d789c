//! 服务注册表
//!
//! 持有存储，跟踪每个服务名下的实例数量，并在每次数量变化时向生命周期插件扇出通知。
//! 同一服务名上的注册/注销通过按名加锁串行化，保证 0→1 / 1→0 钩子在并发下只触发一次。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::{Lifecycle, RegistryStorage};
use crate::config::{HookErrorPolicy, RegistryConfig};
use crate::error::{CombinedError, MeshError, Result};
use crate::types::{Service, ServiceRef};

/// 生命周期钩子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    RegisterService,
    DeregisterService,
    RegisterInstance,
    DeregisterInstance,
}

impl Hook {
    fn as_str(&self) -> &'static str {
        match self {
            Hook::RegisterService => "register_service",
            Hook::DeregisterService => "deregister_service",
            Hook::RegisterInstance => "register_instance",
            Hook::DeregisterInstance => "deregister_instance",
        }
    }

    async fn invoke(&self, plugin: &dyn Lifecycle, service: &Service) -> Result<()> {
        match self {
            Hook::RegisterService => plugin.register_service(service).await,
            Hook::DeregisterService => plugin.deregister_service(service).await,
            Hook::RegisterInstance => plugin.register_instance(service).await,
            Hook::DeregisterInstance => plugin.deregister_instance(service).await,
        }
    }
}

/// 服务注册表
pub struct ServiceRegistry {
    storage: RwLock<Option<Arc<dyn RegistryStorage>>>,
    plugins: RwLock<Vec<Arc<dyn Lifecycle>>>,
    name_locks: NameLocks,
    config: RegistryConfig,
}

impl ServiceRegistry {
    /// 创建未绑定存储的注册表，首次使用前必须调用 [`set_storage`](Self::set_storage)
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            storage: RwLock::new(None),
            plugins: RwLock::new(Vec::new()),
            name_locks: NameLocks::default(),
            config,
        }
    }

    /// 创建并绑定存储
    pub fn with_storage(storage: Arc<dyn RegistryStorage>, config: RegistryConfig) -> Self {
        let registry = Self::new(config);
        registry.set_storage(storage);
        registry
    }

    /// 绑定存储
    pub fn set_storage(&self, storage: Arc<dyn RegistryStorage>) {
        *self.storage.write().unwrap_or_else(PoisonError::into_inner) = Some(storage);
    }

    /// 注册生命周期插件，注册顺序即扇出顺序
    pub fn plugin(&self, plugin: Arc<dyn Lifecycle>) {
        info!(plugin = %plugin.name(), "Adding lifecycle plugin to registry");
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    /// 注册一个服务实例
    ///
    /// 服务名下没有实例时先向所有插件触发 `register_service`，
    /// 然后写入存储，再向所有插件触发 `register_instance`。
    /// 存储失败会中止调用；插件失败按 [`HookErrorPolicy`] 处理，不会中止状态变更。
    pub async fn register(&self, service: Service) -> Result<()> {
        let service: ServiceRef = Arc::new(service);
        let storage = self.storage()?;
        let _guard = self.name_locks.lock(&service.name).await;

        let existing = storage.lookup(&service.name).await?;
        let first_instance = existing.is_empty();
        let mut hook_errors = CombinedError::default();

        if first_instance {
            info!(
                service_name = %service.name,
                instance_id = %service.id,
                "First instance of service, announcing service to plugins"
            );
            self.fan_out(Hook::RegisterService, &service, &mut hook_errors).await;
        }

        if let Err(err) = storage.store(&service.name, service.clone()).await {
            if first_instance {
                // 名称级通知已发出但实例未落地，撤回通知
                let mut rollback = CombinedError::default();
                self.fan_out(Hook::DeregisterService, &service, &mut rollback).await;
            }
            warn!(
                service_name = %service.name,
                instance_id = %service.id,
                error = %err,
                "Failed to store service instance"
            );
            return Err(err);
        }

        self.fan_out(Hook::RegisterInstance, &service, &mut hook_errors).await;

        info!(
            service_name = %service.name,
            instance_id = %service.id,
            address = %service.authority(),
            "Service instance registered"
        );

        self.settle(hook_errors)
    }

    /// 按服务名和实例 ID 注销实例
    ///
    /// 找到实例时向所有插件触发 `deregister_instance`；
    /// 若该名下已无实例，再触发 `deregister_service`。
    pub async fn deregister(&self, name: &str, id: &str) -> Result<Option<ServiceRef>> {
        let storage = self.storage()?;
        let _guard = self.name_locks.lock(name).await;

        // 移除前确定是否是最后一个实例，移除后不再读取存储
        let pool = storage.lookup(name).await?;
        let last_instance = pool.iter().all(|service| service.id == id);

        let Some(removed) = storage.remove(name, id).await? else {
            debug!(
                service_name = %name,
                instance_id = %id,
                "Deregister of unknown instance ignored"
            );
            return Ok(None);
        };

        let mut hook_errors = CombinedError::default();
        self.fan_out(Hook::DeregisterInstance, &removed, &mut hook_errors).await;

        if last_instance {
            info!(
                service_name = %name,
                instance_id = %id,
                "Last instance of service removed, retiring service from plugins"
            );
            self.fan_out(Hook::DeregisterService, &removed, &mut hook_errors).await;
        }

        info!(service_name = %name, instance_id = %id, "Service instance deregistered");

        self.settle(hook_errors)?;
        Ok(Some(removed))
    }

    /// 获取服务名下的实例池，不存在时返回空列表
    pub async fn lookup(&self, name: &str) -> Result<Vec<ServiceRef>> {
        self.storage()?.lookup(name).await
    }

    /// 冷启动
    ///
    /// 从存储取回所有已持久化的服务名；开启回放时，对每个服务名用第一个实例
    /// 触发一次 `register_service`，再对每个实例触发 `register_instance`，
    /// 从而恢复订阅和负载均衡状态而不需要服务重新注册。
    pub async fn start(&self) -> Result<()> {
        let storage = self.storage()?;
        let names = storage.start().await?;

        if !self.config.replay_on_start {
            info!(services = names.len(), "Registry storage started, replay disabled");
            return Ok(());
        }

        let mut hook_errors = CombinedError::default();
        let mut instances = 0usize;

        for name in &names {
            let _guard = self.name_locks.lock(name).await;
            let pool = storage.lookup(name).await?;
            let Some(first) = pool.first() else {
                continue;
            };

            self.fan_out(Hook::RegisterService, first, &mut hook_errors).await;
            for service in &pool {
                self.fan_out(Hook::RegisterInstance, service, &mut hook_errors).await;
            }
            instances += pool.len();
        }

        info!(
            services = names.len(),
            instances,
            "Registry cold start replayed persisted services"
        );

        self.settle(hook_errors)
    }

    fn storage(&self) -> Result<Arc<dyn RegistryStorage>> {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MeshError::StorageNotConfigured)
    }

    fn plugins_snapshot(&self) -> Vec<Arc<dyn Lifecycle>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 按注册顺序调用所有插件，单个插件失败不影响其余插件
    async fn fan_out(&self, hook: Hook, service: &Service, errors: &mut CombinedError) {
        for plugin in self.plugins_snapshot() {
            if let Err(err) = hook.invoke(plugin.as_ref(), service).await {
                warn!(
                    plugin = %plugin.name(),
                    hook = hook.as_str(),
                    service_name = %service.name,
                    instance_id = %service.id,
                    error = %err,
                    "Lifecycle plugin failed"
                );
                errors.append(Some(MeshError::plugin(plugin.name(), hook.as_str(), err)));
            }
        }
    }

    fn settle(&self, hook_errors: CombinedError) -> Result<()> {
        match self.config.hook_error_policy {
            HookErrorPolicy::Propagate => hook_errors.into_result(),
            HookErrorPolicy::Log => Ok(()),
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// 按服务名分配的异步互斥锁
///
/// 没有持有者和等待者时条目会被回收
#[derive(Default)]
struct NameLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    async fn lock(&self, name: &str) -> NameGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;

        NameGuard {
            locks: self,
            name: name.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let mutex = Arc::clone(OwnedMutexGuard::mutex(&guard));
        drop(guard);

        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // 只剩映射表和这里的引用时才回收
        let idle = locks
            .get(&self.name)
            .is_some_and(|current| Arc::ptr_eq(current, &mutex))
            && Arc::strong_count(&mutex) == 2;
        if idle {
            locks.remove(&self.name);
        }
    }
}
