//! 日志初始化

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;
use crate::error::{MeshError, Result};

/// 安装全局 tracing 订阅器
///
/// 优先使用 `RUST_LOG`，未设置时使用配置中的级别。重复初始化返回配置错误。
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|err| {
            MeshError::config(format!("invalid log filter '{}': {}", config.level, err))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|err| {
        MeshError::config(format!("failed to install tracing subscriber: {}", err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = LogConfig::default();
        // 同一进程内其他测试可能已经安装过订阅器
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, MeshError::Config(_)));
    }
}
