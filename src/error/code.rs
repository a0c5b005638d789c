//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 存储相关错误
/// - 2000-2999: 传输相关错误
/// - 3000-3999: 投递相关错误
/// - 4000-4999: 生命周期插件相关错误
/// - 6000-6999: 系统/配置相关错误
/// - 8000-8999: 序列化相关错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 存储相关错误 (1000-1999)
    // ============================================================
    StorageFailed = 1000,
    StorageNotConfigured = 1001,

    // ============================================================
    // 传输相关错误 (2000-2999)
    // ============================================================
    TransportFailed = 2000,
    SubscribeFailed = 2001,
    UnsubscribeFailed = 2002,
    PublishFailed = 2003,
    RequestFailed = 2004,
    RequestTimeout = 2005,

    // ============================================================
    // 投递相关错误 (3000-3999)
    // ============================================================
    DeliveryFailed = 3000,
    DeliveryTimeout = 3001,
    NoDeliverer = 3002,

    // ============================================================
    // 生命周期插件相关错误 (4000-4999)
    // ============================================================
    PluginFailed = 4000,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    InternalError = 6000,
    ConfigurationError = 6003,

    // ============================================================
    // 序列化相关错误 (8000-8999)
    // ============================================================
    SerializationError = 8000,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    InvalidParameter = 9001,
    MultipleErrors = 9005,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::StorageFailed),
            1001 => Some(ErrorCode::StorageNotConfigured),
            2000 => Some(ErrorCode::TransportFailed),
            2001 => Some(ErrorCode::SubscribeFailed),
            2002 => Some(ErrorCode::UnsubscribeFailed),
            2003 => Some(ErrorCode::PublishFailed),
            2004 => Some(ErrorCode::RequestFailed),
            2005 => Some(ErrorCode::RequestTimeout),
            3000 => Some(ErrorCode::DeliveryFailed),
            3001 => Some(ErrorCode::DeliveryTimeout),
            3002 => Some(ErrorCode::NoDeliverer),
            4000 => Some(ErrorCode::PluginFailed),
            6000 => Some(ErrorCode::InternalError),
            6003 => Some(ErrorCode::ConfigurationError),
            8000 => Some(ErrorCode::SerializationError),
            9001 => Some(ErrorCode::InvalidParameter),
            9005 => Some(ErrorCode::MultipleErrors),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StorageFailed => "STORAGE_FAILED",
            ErrorCode::StorageNotConfigured => "STORAGE_NOT_CONFIGURED",
            ErrorCode::TransportFailed => "TRANSPORT_FAILED",
            ErrorCode::SubscribeFailed => "SUBSCRIBE_FAILED",
            ErrorCode::UnsubscribeFailed => "UNSUBSCRIBE_FAILED",
            ErrorCode::PublishFailed => "PUBLISH_FAILED",
            ErrorCode::RequestFailed => "REQUEST_FAILED",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::DeliveryFailed => "DELIVERY_FAILED",
            ErrorCode::DeliveryTimeout => "DELIVERY_TIMEOUT",
            ErrorCode::NoDeliverer => "NO_DELIVERER",
            ErrorCode::PluginFailed => "PLUGIN_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::MultipleErrors => "MULTIPLE_ERRORS",
        }
    }

    /// 获取错误代码的类别（用于错误分类）
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Storage,
            2000..=2999 => ErrorCategory::Transport,
            3000..=3999 => ErrorCategory::Delivery,
            4000..=4999 => ErrorCategory::Plugin,
            6000..=6999 => ErrorCategory::System,
            8000..=8999 => ErrorCategory::Serialization,
            _ => ErrorCategory::General,
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 本库自身从不重试，该标记供调用方参考
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::StorageFailed
                | ErrorCode::TransportFailed
                | ErrorCode::RequestTimeout
                | ErrorCode::DeliveryTimeout
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Storage,
    Transport,
    Delivery,
    Plugin,
    System,
    Serialization,
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Storage => write!(f, "STORAGE"),
            ErrorCategory::Transport => write!(f, "TRANSPORT"),
            ErrorCategory::Delivery => write!(f, "DELIVERY"),
            ErrorCategory::Plugin => write!(f, "PLUGIN"),
            ErrorCategory::System => write!(f, "SYSTEM"),
            ErrorCategory::Serialization => write!(f, "SERIALIZATION"),
            ErrorCategory::General => write!(f, "GENERAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_and_category() {
        for code in [
            ErrorCode::StorageFailed,
            ErrorCode::SubscribeFailed,
            ErrorCode::DeliveryTimeout,
            ErrorCode::PluginFailed,
            ErrorCode::MultipleErrors,
        ] {
            assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(code));
        }
        assert_eq!(ErrorCode::from_u32(4242), None);
        assert_eq!(ErrorCode::UnsubscribeFailed.category(), ErrorCategory::Transport);
        assert_eq!(ErrorCode::NoDeliverer.category(), ErrorCategory::Delivery);
        assert_eq!(ErrorCode::ConfigurationError.to_string(), "CONFIGURATION_ERROR");
    }
}
