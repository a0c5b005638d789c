//! 事件传输适配器 Trait

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::Result;

/// 入站消息处理函数
///
/// 由传输层在自己的任务中调用，返回的 future 必须在有限时间内完成
pub type EventHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// 事件传输适配器
///
/// 桥接外部发布/订阅系统（如消息代理）。订阅以 (topic, routing, group) 为键。
#[async_trait]
pub trait EventAdapter: Send + Sync {
    /// 发布消息
    async fn publish(&self, topic: &str, routing: &str, body: Bytes) -> Result<()>;

    /// 订阅，入站消息交给 `handler` 处理
    async fn subscribe(
        &self,
        topic: &str,
        routing: &str,
        group: &str,
        handler: EventHandler,
    ) -> Result<()>;

    /// 取消订阅
    async fn unsubscribe(&self, topic: &str, routing: &str, group: &str) -> Result<()>;

    /// 同步请求/响应
    ///
    /// `max_wait` 是时长字符串（如 `"500ms"`），由传输层解析
    async fn request(&self, topic: &str, routing: &str, body: Bytes, max_wait: &str)
    -> Result<Bytes>;
}
