//! 服务网格数据模型
//!
//! `Service` / `Subscription` / `Event` 的 JSON 形态与控制面 API 保持一致：
//! `Service{id,name,address,port,context,subscriptions[],scheme,type}`、
//! `Subscription{topic,routing,group,path,secret}`、`Event{topic,routing,body}`。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 默认协议
pub const DEFAULT_SCHEME: &str = "http";

/// 默认服务类型（决定使用哪个投递器/转发器）
pub const DEFAULT_SERVICE_TYPE: &str = "http";

/// 注册表中共享的服务实例引用
///
/// 服务注册后不再修改，所有组件只读共享同一份数据
pub type ServiceRef = Arc<Service>;

/// 服务实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    /// 实例 ID（注销时使用，同名服务内唯一）
    pub id: String,

    /// 服务名（发现与负载均衡的分组键）
    pub name: String,

    /// 地址（IP 或主机名）
    pub address: String,

    /// 端口，0 表示不在 URL 中携带端口
    #[serde(default)]
    pub port: u16,

    /// 基础路径前缀
    #[serde(default)]
    pub context: String,

    /// 事件订阅，注册时确定
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<Subscription>,

    /// 协议（http / https）
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// 服务类型，用于选择投递器和转发器
    #[serde(rename = "type", default = "default_service_type")]
    pub service_type: String,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

impl Service {
    /// 创建新的服务实例
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            context: String::new(),
            subscriptions: Vec::new(),
            scheme: default_scheme(),
            service_type: default_service_type(),
        }
    }

    /// 创建新的服务实例，实例 ID 随机生成
    pub fn with_generated_id(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), name, address, port)
    }

    /// 设置基础路径
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// 设置协议
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// 设置服务类型
    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// 添加事件订阅
    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// 主机部分，端口为 0 时省略端口
    pub fn authority(&self) -> String {
        if self.port != 0 {
            format!("{}:{}", self.address, self.port)
        } else {
            self.address.clone()
        }
    }

    /// 基础 URL：`scheme://address[:port]context`
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.context)
    }

    /// 事件投递 URL：基础 URL 加上订阅路径
    pub fn delivery_url(&self, subscription: &Subscription) -> String {
        format!("{}{}", self.base_url(), subscription.path)
    }
}

/// 事件订阅
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Subscription {
    /// 主题
    pub topic: String,

    /// 路由键，可为空
    #[serde(default)]
    pub routing: String,

    /// 消费组
    #[serde(default)]
    pub group: String,

    /// 投递路径（相对于服务 context）
    #[serde(default)]
    pub path: String,

    /// 投递时携带的共享口令，为空则不携带
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
}

impl Subscription {
    /// 创建新的订阅
    pub fn new(topic: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// 设置路由键
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = routing.into();
        self
    }

    /// 设置消费组
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// 设置共享口令
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// 传输层订阅键
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.topic, &self.routing, &self.group)
    }
}

/// 传输层订阅键 (topic, routing, group)
///
/// 一次 subscribe/unsubscribe 调用对应一个键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub topic: String,
    pub routing: String,
    pub group: String,
}

impl SubscriptionKey {
    pub fn new(topic: &str, routing: &str, group: &str) -> Self {
        Self {
            topic: topic.to_string(),
            routing: routing.to_string(),
            group: group.to_string(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.topic, self.routing, self.group)
    }
}

/// 代表某个服务发布的事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub topic: String,

    #[serde(default)]
    pub routing: String,

    pub body: serde_json::Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            routing: String::new(),
            body,
        }
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = routing.into();
        self
    }
}
