//! 服务网格上下文
//!
//! 把注册表、负载均衡工厂、事件分发器和转发代理装配在一起。
//! 所有组件都归属于一个 [`Mesh`] 实例，不使用进程级全局状态，
//! 同一进程内可以并存多个相互隔离的网格（测试中尤其常见）。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use flare_mesh_core::{Event, Mesh, Service, Subscription};
//!
//! # async fn run() -> flare_mesh_core::Result<()> {
//! let mesh = Mesh::builder().build()?;
//! mesh.start().await?;
//!
//! mesh.register(
//!     Service::new("billing-1", "billing", "10.0.0.5", 8080)
//!         .with_context("/api")
//!         .with_subscription(Subscription::new("orders", "/hooks/orders")),
//! )
//! .await?;
//!
//! mesh.publish(&Event::new("orders", serde_json::json!({"id": 42}))).await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http::{Request, Response};
use std::sync::Arc;
use tracing::{debug, info};

use crate::balancer::{LoadBalancerFactory, RoundRobinFactory};
use crate::config::MeshConfig;
use crate::error::Result;
use crate::event::{Deliverer, EventAdapter, EventDispatcher, InMemoryEventAdapter};
use crate::proxy::{Forwarder, Proxy};
use crate::registry::{InMemoryStorage, Lifecycle, RegistryStorage, ServiceRegistry};
use crate::types::{Event, Service, ServiceRef};

/// 服务网格
pub struct Mesh {
    registry: Arc<ServiceRegistry>,
    factory: Arc<dyn LoadBalancerFactory>,
    dispatcher: Arc<EventDispatcher>,
    proxy: Arc<Proxy>,
    config: MeshConfig,
}

impl Mesh {
    pub fn builder() -> MeshBuilder {
        MeshBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// 与事件投递、HTTP 转发共享的负载均衡工厂
    pub fn load_balancers(&self) -> &Arc<dyn LoadBalancerFactory> {
        &self.factory
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// 冷启动：初始化存储并（按配置）回放已持久化的实例
    pub async fn start(&self) -> Result<()> {
        self.registry.start().await
    }

    pub async fn register(&self, service: Service) -> Result<()> {
        self.registry.register(service).await
    }

    pub async fn deregister(&self, name: &str, id: &str) -> Result<Option<ServiceRef>> {
        self.registry.deregister(name, id).await
    }

    pub async fn lookup(&self, name: &str) -> Result<Vec<ServiceRef>> {
        self.registry.lookup(name).await
    }

    pub async fn publish(&self, event: &Event) -> Result<()> {
        self.dispatcher.publish(event).await
    }

    pub async fn request(&self, event: &Event, max_wait: &str) -> Result<Bytes> {
        self.dispatcher.request(event, max_wait).await
    }

    /// 把代理请求转发给服务名下的某个实例
    pub async fn forward(&self, name: &str, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.proxy.forward(name, request).await
    }
}

/// 服务网格构建器
///
/// 未指定存储或传输时使用进程内实现
#[derive(Default)]
pub struct MeshBuilder {
    config: MeshConfig,
    storage: Option<Arc<dyn RegistryStorage>>,
    adapter: Option<Arc<dyn EventAdapter>>,
    factory: Option<Arc<dyn LoadBalancerFactory>>,
    deliverers: Vec<(String, Arc<dyn Deliverer>)>,
    forwarders: Vec<(String, Arc<dyn Forwarder>)>,
    plugins: Vec<Arc<dyn Lifecycle>>,
}

impl MeshBuilder {
    pub fn with_config(mut self, config: MeshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn RegistryStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_event_adapter(mut self, adapter: Arc<dyn EventAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// 替换默认的轮询负载均衡工厂
    ///
    /// 自定义工厂如需接收生命周期通知，需另行通过 [`with_plugin`](Self::with_plugin) 注册
    pub fn with_load_balancers(mut self, factory: Arc<dyn LoadBalancerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 添加投递器，同类型的后添加者生效（可覆盖默认的 HTTP 投递器）
    pub fn with_deliverer(
        mut self,
        service_type: impl Into<String>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        self.deliverers.push((service_type.into(), deliverer));
        self
    }

    pub fn with_forwarder(
        mut self,
        service_type: impl Into<String>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        self.forwarders.push((service_type.into(), forwarder));
        self
    }

    /// 追加生命周期插件，在事件分发器之后被调用
    pub fn with_plugin(mut self, plugin: Arc<dyn Lifecycle>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> Result<Mesh> {
        let storage: Arc<dyn RegistryStorage> = match self.storage {
            Some(storage) => storage,
            None => {
                debug!("No registry storage configured, using in-memory storage");
                Arc::new(InMemoryStorage::new())
            }
        };
        let adapter: Arc<dyn EventAdapter> = match self.adapter {
            Some(adapter) => adapter,
            None => {
                debug!("No event adapter configured, using in-memory transport");
                Arc::new(InMemoryEventAdapter::new())
            }
        };
        let registry = Arc::new(ServiceRegistry::with_storage(
            storage,
            self.config.registry.clone(),
        ));

        // 负载均衡器先于事件分发器收到名称级通知
        let factory: Arc<dyn LoadBalancerFactory> = match self.factory {
            Some(factory) => factory,
            None => {
                let round_robin = Arc::new(RoundRobinFactory::new());
                registry.plugin(round_robin.clone());
                round_robin
            }
        };

        let dispatcher = EventDispatcher::new(
            adapter,
            &registry,
            factory.clone(),
            &self.config.event,
        );

        #[cfg(feature = "http-delivery")]
        {
            let http = crate::delivery::HttpDeliverer::new(&self.config.delivery.http)?;
            dispatcher.register_deliverer(crate::delivery::HTTP_SERVICE_TYPE, Arc::new(http));
        }
        for (service_type, deliverer) in self.deliverers {
            dispatcher.register_deliverer(service_type, deliverer);
        }

        for plugin in self.plugins {
            registry.plugin(plugin);
        }

        let proxy = Arc::new(Proxy::new(registry.clone(), factory.clone(), &self.config.proxy));
        for (service_type, forwarder) in self.forwarders {
            proxy.register_forwarder(service_type, forwarder);
        }

        info!(
            hook_error_policy = ?self.config.registry.hook_error_policy,
            replay_on_start = self.config.registry.replay_on_start,
            delivery_timeout_ms = self.config.event.delivery_timeout_ms,
            "Mesh assembled"
        );

        Ok(Mesh {
            registry,
            factory,
            dispatcher,
            proxy,
            config: self.config,
        })
    }
}
