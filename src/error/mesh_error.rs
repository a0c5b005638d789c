//! Flare Mesh 统一错误类型

use super::code::ErrorCode;
use crate::types::SubscriptionKey;
use std::time::Duration;
use thiserror::Error;

/// Flare Mesh 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// 存储读写失败，中止触发它的注册/注销调用
    #[error("storage error: {0}")]
    Storage(String),

    /// 注册表在绑定存储之前被使用
    #[error("registry storage is not configured")]
    StorageNotConfigured,

    /// 传输层失败（订阅、取消订阅、发布、请求）
    #[error("transport error [{code}]: {reason}", code = .code.as_str())]
    Transport { code: ErrorCode, reason: String },

    /// 单次投递失败
    #[error("delivery error: {0}")]
    Delivery(String),

    /// 单次投递超出时限
    #[error("delivery timed out: {0}")]
    DeliveryTimeout(String),

    /// 找不到服务类型对应的投递器
    #[error("no deliverer registered for service type '{0}'")]
    NoDeliverer(String),

    /// 生命周期插件返回的错误
    #[error("lifecycle plugin '{plugin}' failed in {hook}: {source}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        #[source]
        source: Box<MeshError>,
    },

    /// 时长字符串无法解析
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    /// 操作超时
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 序列化错误
    #[error("serialization error: {0}")]
    Serialization(String),

    /// 系统错误
    #[error("internal error: {0}")]
    Internal(String),

    /// 多个独立子操作的错误合集，显示时保留每一条原始消息
    #[error("{}", join_messages(.0))]
    Combined(Vec<MeshError>),
}

fn join_messages(errors: &[MeshError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl MeshError {
    /// 创建存储错误
    pub fn storage(reason: impl Into<String>) -> Self {
        MeshError::Storage(reason.into())
    }

    /// 创建传输错误
    pub fn transport(code: ErrorCode, reason: impl Into<String>) -> Self {
        MeshError::Transport {
            code,
            reason: reason.into(),
        }
    }

    /// 创建订阅失败错误
    pub fn subscribe_failed(key: &SubscriptionKey, reason: impl std::fmt::Display) -> Self {
        Self::transport(
            ErrorCode::SubscribeFailed,
            format!("subscribe {} failed: {}", key, reason),
        )
    }

    /// 创建取消订阅失败错误
    pub fn unsubscribe_failed(key: &SubscriptionKey, reason: impl std::fmt::Display) -> Self {
        Self::transport(
            ErrorCode::UnsubscribeFailed,
            format!("unsubscribe {} failed: {}", key, reason),
        )
    }

    /// 创建投递错误
    pub fn delivery(reason: impl Into<String>) -> Self {
        MeshError::Delivery(reason.into())
    }

    /// 创建配置错误
    pub fn config(reason: impl Into<String>) -> Self {
        MeshError::Config(reason.into())
    }

    /// 创建系统错误
    pub fn internal(reason: impl Into<String>) -> Self {
        MeshError::Internal(reason.into())
    }

    /// 创建超时错误
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        MeshError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// 创建时长解析错误
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        MeshError::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// 包装插件错误
    pub fn plugin(plugin: impl Into<String>, hook: &'static str, source: MeshError) -> Self {
        MeshError::Plugin {
            plugin: plugin.into(),
            hook,
            source: Box::new(source),
        }
    }

    /// 根据错误代码创建对应的错误
    pub fn from_code(code: ErrorCode, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match code {
            ErrorCode::StorageNotConfigured => MeshError::StorageNotConfigured,
            ErrorCode::StorageFailed => MeshError::Storage(reason),
            ErrorCode::TransportFailed
            | ErrorCode::SubscribeFailed
            | ErrorCode::UnsubscribeFailed
            | ErrorCode::PublishFailed
            | ErrorCode::RequestFailed
            | ErrorCode::RequestTimeout => MeshError::Transport { code, reason },
            ErrorCode::DeliveryFailed => MeshError::Delivery(reason),
            ErrorCode::DeliveryTimeout => MeshError::DeliveryTimeout(reason),
            ErrorCode::NoDeliverer => MeshError::NoDeliverer(reason),
            ErrorCode::ConfigurationError => MeshError::Config(reason),
            ErrorCode::SerializationError => MeshError::Serialization(reason),
            ErrorCode::InvalidParameter => MeshError::InvalidDuration {
                input: String::new(),
                reason,
            },
            ErrorCode::PluginFailed | ErrorCode::InternalError | ErrorCode::MultipleErrors => {
                MeshError::Internal(reason)
            }
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::Storage(_) => ErrorCode::StorageFailed,
            MeshError::StorageNotConfigured => ErrorCode::StorageNotConfigured,
            MeshError::Transport { code, .. } => *code,
            MeshError::Delivery(_) => ErrorCode::DeliveryFailed,
            MeshError::DeliveryTimeout(_) => ErrorCode::DeliveryTimeout,
            MeshError::NoDeliverer(_) => ErrorCode::NoDeliverer,
            MeshError::Plugin { .. } => ErrorCode::PluginFailed,
            MeshError::InvalidDuration { .. } => ErrorCode::InvalidParameter,
            MeshError::Timeout { .. } => ErrorCode::RequestTimeout,
            MeshError::Config(_) => ErrorCode::ConfigurationError,
            MeshError::Serialization(_) => ErrorCode::SerializationError,
            MeshError::Internal(_) => ErrorCode::InternalError,
            MeshError::Combined(_) => ErrorCode::MultipleErrors,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            MeshError::Combined(errors) => errors.iter().all(MeshError::is_retryable),
            MeshError::Plugin { source, .. } => source.is_retryable(),
            other => other.code().is_retryable(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, MeshError>;
