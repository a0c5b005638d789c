//! 进程内事件传输
//!
//! 用于测试和单进程部署。订阅按 (topic, routing, group) 建键，
//! 发布时按订阅顺序依次等待每个匹配的处理函数。

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

use super::{EventAdapter, EventHandler};
use crate::error::{ErrorCode, MeshError, Result};
use crate::types::SubscriptionKey;
use crate::utils::parse_duration;

/// 请求应答函数
pub type Responder = Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Bytes>> + Send + Sync>;

/// 进程内事件传输
#[derive(Default)]
pub struct InMemoryEventAdapter {
    subscriptions: RwLock<Vec<(SubscriptionKey, EventHandler)>>,
    responders: RwLock<HashMap<String, Responder>>,
}

impl InMemoryEventAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为主题安装请求应答函数，覆盖已有的应答函数
    pub fn respond(&self, topic: impl Into<String>, responder: Responder) {
        self.responders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.into(), responder);
    }

    /// 当前订阅键，按订阅顺序
    pub fn subscriptions(&self) -> Vec<SubscriptionKey> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn matching(&self, topic: &str, routing: &str) -> Vec<EventHandler> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| {
                key.topic == topic && (key.routing.is_empty() || key.routing == routing)
            })
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

#[async_trait]
impl EventAdapter for InMemoryEventAdapter {
    async fn publish(&self, topic: &str, routing: &str, body: Bytes) -> Result<()> {
        let handlers = self.matching(topic, routing);
        trace!(topic, routing, handlers = handlers.len(), "Publishing in-memory event");

        for handler in handlers {
            handler(body.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        routing: &str,
        group: &str,
        handler: EventHandler,
    ) -> Result<()> {
        let key = SubscriptionKey::new(topic, routing, group);
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match subscriptions.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = handler,
            None => {
                debug!(subscription = %key, "In-memory subscription added");
                subscriptions.push((key, handler));
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str, routing: &str, group: &str) -> Result<()> {
        let key = SubscriptionKey::new(topic, routing, group);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != key);
        Ok(())
    }

    async fn request(
        &self,
        topic: &str,
        routing: &str,
        body: Bytes,
        max_wait: &str,
    ) -> Result<Bytes> {
        let max_wait = parse_duration(max_wait)?;

        let responder = self
            .responders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .ok_or_else(|| MeshError::transport(ErrorCode::RequestFailed, "no responders"))?;

        trace!(topic, routing, "Sending in-memory request");
        tokio::time::timeout(max_wait, responder(body))
            .await
            .map_err(|_| MeshError::timeout(format!("request on {}", topic), max_wait))?
    }
}
