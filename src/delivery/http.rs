//! HTTP 回调投递器
//!
//! 把事件体 POST 到 `scheme://address[:port]context + subscription.path`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::config::HttpDeliveryConfig;
use crate::error::{MeshError, Result};
use crate::event::Deliverer;
use crate::types::{Service, Subscription};

/// 注册 HTTP 投递器时使用的服务类型
pub const HTTP_SERVICE_TYPE: &str = "http";

/// HTTP 回调投递器
///
/// 订阅带口令时通过 `Authorization` 头原样携带口令；只有 200 视为成功
#[derive(Debug, Clone)]
pub struct HttpDeliverer {
    http_client: HttpClient,
}

impl HttpDeliverer {
    /// 按配置创建
    pub fn new(config: &HttpDeliveryConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| MeshError::config(format!("failed to build http client: {}", err)))?;

        Ok(Self { http_client })
    }

    /// 使用已有的客户端
    pub fn with_client(http_client: HttpClient) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Deliverer for HttpDeliverer {
    async fn deliver(
        &self,
        service: &Service,
        subscription: &Subscription,
        body: Bytes,
    ) -> Result<()> {
        let url = service.delivery_url(subscription);

        let mut request = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !subscription.secret.is_empty() {
            request = request.header(AUTHORIZATION, subscription.secret.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Webhook call completed");

        if status != StatusCode::OK {
            return Err(MeshError::delivery("call did not return 200"));
        }
        Ok(())
    }
}
