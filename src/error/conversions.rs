//! 错误类型转换实现

use super::MeshError;
use std::io;

impl From<io::Error> for MeshError {
    fn from(err: io::Error) -> Self {
        MeshError::internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for MeshError {
    fn from(err: toml::de::Error) -> Self {
        MeshError::config(format!("invalid TOML: {}", err))
    }
}

#[cfg(feature = "http-delivery")]
impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        MeshError::delivery(err.to_string())
    }
}
