//! HTTP 转发路径
//!
//! 把 `<call_prefix>/<service-name>/...` 形式的请求路由到服务的某个实例：
//! 通过注册表查询实例池，使用与事件投递共享的负载均衡器选出实例，
//! 再按实例的服务类型选择转发器。具体的转发机制由 [`Forwarder`] 实现提供。

use async_trait::async_trait;
use bytes::Bytes;
use http::uri::PathAndQuery;
use http::{Request, Response, StatusCode, Uri};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::balancer::LoadBalancerFactory;
use crate::config::ProxyConfig;
use crate::error::{MeshError, Result};
use crate::registry::ServiceRegistry;
use crate::types::{Service, ServiceRef};

/// 转发器，按服务类型注册
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// 把已改写好目标地址的请求转发给实例
    async fn forward(&self, target: &Service, request: Request<Bytes>) -> Result<Response<Bytes>>;
}

/// 路由结果
#[derive(Clone)]
pub struct Route {
    /// 选中的实例
    pub service: ServiceRef,
    /// 改写后的目标地址
    pub uri: Uri,
    forwarder: Arc<dyn Forwarder>,
}

impl Route {
    /// 改写请求地址并交给转发器
    pub async fn forward(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>> {
        *request.uri_mut() = self.uri.clone();
        self.forwarder.forward(&self.service, request).await
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("service", &self.service.id)
            .field("uri", &self.uri)
            .finish()
    }
}

/// HTTP 转发代理
pub struct Proxy {
    registry: Arc<ServiceRegistry>,
    factory: Arc<dyn LoadBalancerFactory>,
    forwarders: RwLock<HashMap<String, Arc<dyn Forwarder>>>,
    call_prefix: String,
}

impl Proxy {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        factory: Arc<dyn LoadBalancerFactory>,
        config: &ProxyConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            forwarders: RwLock::new(HashMap::new()),
            call_prefix: config.call_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// 安装（或覆盖）服务类型对应的转发器
    pub fn register_forwarder(
        &self,
        service_type: impl Into<String>,
        forwarder: Arc<dyn Forwarder>,
    ) {
        let service_type = service_type.into();
        info!(service_type = %service_type, "Registering forwarder");
        self.forwarders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_type, forwarder);
    }

    /// 为服务名选出目标实例并改写地址
    ///
    /// 没有实例或没有对应类型的转发器时返回 `None`
    pub async fn route(&self, name: &str, uri: &Uri) -> Result<Option<Route>> {
        let pool = self.registry.lookup(name).await?;

        let Some(service) = self.factory.for_name(name).next(&pool) else {
            debug!(service_name = %name, "No instance available for proxied call");
            return Ok(None);
        };

        let forwarder = self
            .forwarders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&service.service_type)
            .cloned();
        let Some(forwarder) = forwarder else {
            debug!(
                service_name = %name,
                instance_id = %service.id,
                service_type = %service.service_type,
                "No forwarder registered for service type"
            );
            return Ok(None);
        };

        let uri = rewrite_uri(uri, &self.call_prefix, &service)?;
        Ok(Some(Route {
            service,
            uri,
            forwarder,
        }))
    }

    /// 路由并转发请求，无法路由时返回 404
    pub async fn forward(&self, name: &str, request: Request<Bytes>) -> Result<Response<Bytes>> {
        match self.route(name, request.uri()).await? {
            Some(route) => {
                debug!(
                    service_name = %name,
                    instance_id = %route.service.id,
                    uri = %route.uri,
                    "Forwarding request"
                );
                route.forward(request).await
            }
            None => Ok(not_found()),
        }
    }
}

fn not_found() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// 把 `<prefix>/<name>` 替换为实例的 context，并把协议和主机换成实例地址
fn rewrite_uri(uri: &Uri, call_prefix: &str, service: &Service) -> Result<Uri> {
    let needle = format!("{}/{}", call_prefix, service.name);
    let mut path = uri.path().replacen(&needle, &service.context, 1);
    if !path.starts_with('/') {
        path.insert(0, '/');
    }

    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    let path_and_query = PathAndQuery::try_from(path_and_query.as_str())
        .map_err(|err| MeshError::internal(format!("invalid proxied path: {}", err)))?;

    Uri::builder()
        .scheme(service.scheme.as_str())
        .authority(service.authority().as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|err| {
            MeshError::internal(format!(
                "invalid upstream address for instance {}: {}",
                service.id, err
            ))
        })
}
