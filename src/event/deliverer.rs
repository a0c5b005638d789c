//! 投递器 Trait

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{Service, Subscription};

/// 投递器，按服务类型注册
///
/// 把一条入站事件送达选中的实例，失败只由调用方记录日志，不会重试
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, service: &Service, subscription: &Subscription, body: Bytes)
    -> Result<()>;
}
