//! 投递器实现
//!
//! 需要启用 `http-delivery` feature（默认开启）

#[cfg(feature = "http-delivery")]
pub mod http;

#[cfg(feature = "http-delivery")]
pub use http::{HTTP_SERVICE_TYPE, HttpDeliverer};
