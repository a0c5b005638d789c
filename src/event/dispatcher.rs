//! 事件订阅与投递分发器
//!
//! 作为生命周期插件注册到注册表：服务名出现时按其声明的订阅向传输层订阅，
//! 服务名消失时取消订阅。入站消息通过注册表查询实例池、负载均衡选出目标实例，
//! 再交给目标服务类型对应的投递器。投递至多一次，失败只记录日志。

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Deliverer, EventAdapter, EventHandler};
use crate::balancer::LoadBalancerFactory;
use crate::config::EventConfig;
use crate::error::{CombinedError, MeshError, Result};
use crate::registry::{Lifecycle, ServiceRegistry};
use crate::types::{Event, Service, ServiceRef, Subscription};

/// 分发器在注册表中的插件名
pub const DISPATCHER_PLUGIN_NAME: &str = "event-dispatcher";

/// 事件分发器
pub struct EventDispatcher {
    adapter: Arc<dyn EventAdapter>,
    router: Arc<DeliveryRouter>,
}

/// 入站消息的路由状态，被每个订阅的处理函数共享
struct DeliveryRouter {
    deliverers: RwLock<HashMap<String, Arc<dyn Deliverer>>>,
    // 注册表持有分发器（插件），这里只保留弱引用
    registry: Weak<ServiceRegistry>,
    factory: Arc<dyn LoadBalancerFactory>,
    delivery_timeout: Duration,
}

impl EventDispatcher {
    /// 创建分发器并注册为注册表的生命周期插件
    pub fn new(
        adapter: Arc<dyn EventAdapter>,
        registry: &Arc<ServiceRegistry>,
        factory: Arc<dyn LoadBalancerFactory>,
        config: &EventConfig,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            adapter,
            router: Arc::new(DeliveryRouter {
                deliverers: RwLock::new(HashMap::new()),
                registry: Arc::downgrade(registry),
                factory,
                delivery_timeout: config.delivery_timeout(),
            }),
        });

        registry.plugin(dispatcher.clone());
        dispatcher
    }

    /// 安装（或覆盖）服务类型对应的投递器
    pub fn register_deliverer(
        &self,
        service_type: impl Into<String>,
        deliverer: Arc<dyn Deliverer>,
    ) {
        let service_type = service_type.into();
        info!(service_type = %service_type, "Registering deliverer");
        self.router
            .deliverers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_type, deliverer);
    }

    /// 发布事件，直接透传给传输层
    pub async fn publish(&self, event: &Event) -> Result<()> {
        let body = encode_body(event)?;
        debug!(topic = %event.topic, routing = %event.routing, "Publishing event");
        self.adapter.publish(&event.topic, &event.routing, body).await
    }

    /// 同步请求/响应，不经过注册表和负载均衡
    ///
    /// `max_wait` 由传输层解析，解析失败和传输失败都直接返回给调用方
    pub async fn request(&self, event: &Event, max_wait: &str) -> Result<Bytes> {
        let body = encode_body(event)?;
        debug!(topic = %event.topic, routing = %event.routing, max_wait, "Sending request");
        self.adapter
            .request(&event.topic, &event.routing, body, max_wait)
            .await
    }

    fn handler_for(&self, service_name: &str, subscription: &Subscription) -> EventHandler {
        let router = self.router.clone();
        let service_name: Arc<str> = Arc::from(service_name);
        let subscription = Arc::new(subscription.clone());

        Arc::new(move |body: Bytes| {
            let router = router.clone();
            let service_name = service_name.clone();
            let subscription = subscription.clone();
            async move {
                router.dispatch(&service_name, &subscription, body).await;
            }
            .boxed()
        })
    }
}

impl DeliveryRouter {
    /// 处理一条入站消息，任何失败都只记录日志
    async fn dispatch(&self, service_name: &str, subscription: &Subscription, body: Bytes) {
        match self.deliver(service_name, subscription, body).await {
            Ok(Some(target)) => {
                debug!(
                    service_name,
                    instance_id = %target.id,
                    topic = %subscription.topic,
                    "Event delivered"
                );
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    service_name,
                    topic = %subscription.topic,
                    code = %err.code(),
                    error = %err,
                    "Event dropped"
                );
            }
        }
    }

    /// 查询实例池、选出目标实例并投递
    ///
    /// 没有可用实例时返回 `Ok(None)`
    async fn deliver(
        &self,
        service_name: &str,
        subscription: &Subscription,
        body: Bytes,
    ) -> Result<Option<ServiceRef>> {
        let Some(registry) = self.registry.upgrade() else {
            debug!(service_name, topic = %subscription.topic, "Registry gone, dropping event");
            return Ok(None);
        };

        let pool = registry.lookup(service_name).await?;
        let Some(target) = self.factory.for_name(service_name).next(&pool) else {
            // 最后一个实例刚被注销时可能还有在途消息
            debug!(
                service_name,
                topic = %subscription.topic,
                routing = %subscription.routing,
                "Load balancer returned no instance, dropping event"
            );
            return Ok(None);
        };

        let deliverer = self
            .deliverers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target.service_type)
            .cloned()
            .ok_or_else(|| MeshError::NoDeliverer(target.service_type.clone()))?;

        tokio::time::timeout(
            self.delivery_timeout,
            deliverer.deliver(&target, subscription, body),
        )
        .await
        .map_err(|_| {
            MeshError::DeliveryTimeout(format!(
                "instance {} after {:?}",
                target.id, self.delivery_timeout
            ))
        })??;

        Ok(Some(target))
    }
}

fn encode_body(event: &Event) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(&event.body)?))
}

#[async_trait]
impl Lifecycle for EventDispatcher {
    fn name(&self) -> &str {
        DISPATCHER_PLUGIN_NAME
    }

    async fn register_service(&self, service: &Service) -> Result<()> {
        let mut errors = CombinedError::default();

        for subscription in &service.subscriptions {
            let key = subscription.key();
            let handler = self.handler_for(&service.name, subscription);
            let result = self
                .adapter
                .subscribe(
                    &subscription.topic,
                    &subscription.routing,
                    &subscription.group,
                    handler,
                )
                .await;

            match result {
                Ok(()) => {
                    info!(
                        service_name = %service.name,
                        topic = %key.topic,
                        routing = %key.routing,
                        group = %key.group,
                        "Subscribed to topic"
                    );
                }
                Err(err) => {
                    warn!(
                        service_name = %service.name,
                        subscription = %key,
                        error = %err,
                        "Subscribe failed"
                    );
                    errors.append(Some(MeshError::subscribe_failed(&key, err)));
                }
            }
        }

        errors.into_result()
    }

    async fn deregister_service(&self, service: &Service) -> Result<()> {
        let mut errors = CombinedError::default();

        for subscription in &service.subscriptions {
            let key = subscription.key();
            let result = self
                .adapter
                .unsubscribe(&subscription.topic, &subscription.routing, &subscription.group)
                .await;

            match result {
                Ok(()) => {
                    info!(
                        service_name = %service.name,
                        topic = %key.topic,
                        routing = %key.routing,
                        group = %key.group,
                        "Unsubscribed from topic"
                    );
                }
                Err(err) => {
                    warn!(
                        service_name = %service.name,
                        subscription = %key,
                        error = %err,
                        "Unsubscribe failed"
                    );
                    errors.append(Some(MeshError::unsubscribe_failed(&key, err)));
                }
            }
        }

        errors.into_result()
    }

    async fn register_instance(&self, _service: &Service) -> Result<()> {
        Ok(())
    }

    async fn deregister_instance(&self, _service: &Service) -> Result<()> {
        Ok(())
    }
}
