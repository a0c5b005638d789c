//! 配置模块
//!
//! 所有配置段都有默认值，可从 TOML 文件加载并由环境变量覆盖：
//!
//! ```toml
//! [registry]
//! hook_error_policy = "propagate"   # propagate | log
//! replay_on_start = true
//!
//! [event]
//! delivery_timeout_ms = 5000
//!
//! [delivery.http]
//! timeout_ms = 5000
//! user_agent = "flare-mesh"
//!
//! [proxy]
//! call_prefix = "/call"
//!
//! [log]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MeshError, Result};

/// 环境变量：事件投递超时（毫秒）
pub const ENV_DELIVERY_TIMEOUT_MS: &str = "MESH_DELIVERY_TIMEOUT_MS";
/// 环境变量：插件错误处理策略
pub const ENV_HOOK_ERROR_POLICY: &str = "MESH_HOOK_ERROR_POLICY";
/// 环境变量：日志级别
pub const ENV_LOG_LEVEL: &str = "MESH_LOG_LEVEL";
/// 环境变量：是否输出 JSON 日志
pub const ENV_LOG_JSON: &str = "MESH_LOG_JSON";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MeshConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub event: EventConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 生命周期插件错误的处理策略
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookErrorPolicy {
    /// 记录日志并把聚合后的错误返回给注册/注销的调用方
    #[default]
    Propagate,
    /// 只记录日志
    Log,
}

impl FromStr for HookErrorPolicy {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(HookErrorPolicy::Propagate),
            "log" => Ok(HookErrorPolicy::Log),
            other => Err(MeshError::config(format!(
                "unknown hook error policy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub hook_error_policy: HookErrorPolicy,
    /// 冷启动时是否把存储中的实例回放给插件
    #[serde(default = "default_true")]
    pub replay_on_start: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hook_error_policy: HookErrorPolicy::default(),
            replay_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EventConfig {
    /// 单次投递的最长等待时间，避免阻塞传输层的分发循环
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

impl EventConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub http: HttpDeliveryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpDeliveryConfig {
    #[serde(default = "default_delivery_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpDeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HttpDeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_delivery_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProxyConfig {
    /// 代理入口路径前缀，请求路径形如 `<prefix>/<service-name>/...`
    #[serde(default = "default_call_prefix")]
    pub call_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            call_prefix: default_call_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogConfig {
    /// 未设置 RUST_LOG 时使用的过滤规则
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_delivery_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    format!("flare-mesh/{}", env!("CARGO_PKG_VERSION"))
}

fn default_call_prefix() -> String {
    "/call".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MeshConfig {
    /// 从 TOML 文件加载，并应用环境变量覆盖
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            MeshError::config(format!("failed to read {}: {}", path.display(), err))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// 从 TOML 文本解析（不应用环境变量）
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 应用进程环境变量覆盖
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数应用覆盖
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DELIVERY_TIMEOUT_MS) {
            self.event.delivery_timeout_ms = value.trim().parse().map_err(|_| {
                MeshError::config(format!(
                    "{} must be an integer, got {:?}",
                    ENV_DELIVERY_TIMEOUT_MS, value
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_HOOK_ERROR_POLICY) {
            self.registry.hook_error_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log.level = value;
        }
        if let Some(value) = lookup(ENV_LOG_JSON) {
            self.log.json = matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }
}
