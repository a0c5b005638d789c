//! 服务注册表 Trait 定义

use crate::error::Result;
use crate::types::{Service, ServiceRef};
use async_trait::async_trait;

/// 生命周期插件 Trait
///
/// 只由注册表调用。注册时名称级钩子（如有）先于实例级钩子触发；
/// 注销时实例级钩子先于名称级钩子触发。
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// 插件名称（用于日志和错误信息）
    fn name(&self) -> &str;

    /// 服务名的实例数从 0 变为 1 时触发，恰好一次
    async fn register_service(&self, service: &Service) -> Result<()>;

    /// 服务名的实例数从 1 变为 0 时触发，恰好一次
    async fn deregister_service(&self, service: &Service) -> Result<()>;

    /// 每次成功新增实例时触发（包括第一个）
    async fn register_instance(&self, service: &Service) -> Result<()>;

    /// 每次成功移除实例时触发（包括最后一个）
    async fn deregister_instance(&self, service: &Service) -> Result<()>;
}

/// 注册表存储 Trait
///
/// 服务名到实例列表的持久映射，实例顺序即注册顺序
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// 按服务名保存实例
    async fn store(&self, name: &str, service: ServiceRef) -> Result<()>;

    /// 按服务名和实例 ID 移除实例，不存在时返回 `None`
    async fn remove(&self, name: &str, id: &str) -> Result<Option<ServiceRef>>;

    /// 获取服务名下的全部实例，不存在时返回空列表
    async fn lookup(&self, name: &str) -> Result<Vec<ServiceRef>>;

    /// 冷启动，返回此前持久化的全部服务名
    async fn start(&self) -> Result<Vec<String>>;
}
