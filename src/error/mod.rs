//! Flare Mesh 错误处理模块
//!
//! 提供统一的错误类型、错误代码分类、多错误聚合和错误转换

pub mod code;
pub mod combined;
pub mod conversions;
pub mod mesh_error;

// 重新导出公共类型和函数
pub use code::{ErrorCategory, ErrorCode};
pub use combined::CombinedError;
pub use mesh_error::{MeshError, Result};

/// 外部适配器（存储、传输）默认使用的结果类型
pub type InfraResult<T> = anyhow::Result<T>;

/// 将基础设施错误转换为 `MeshError`
pub fn map_infra_error<E, S>(error: E, code: ErrorCode, message: S) -> MeshError
where
    E: std::fmt::Display,
    S: Into<String>,
{
    MeshError::from_code(code, format!("{}: {}", message.into(), error))
}

/// `InfraResult` 的辅助扩展，用于快速转换为统一的错误类型
pub trait InfraResultExt<T> {
    fn into_mesh<S>(self, code: ErrorCode, message: S) -> Result<T>
    where
        S: Into<String>;
}

impl<T> InfraResultExt<T> for InfraResult<T> {
    fn into_mesh<S>(self, code: ErrorCode, message: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.map_err(|err| map_infra_error(err, code, message))
    }
}
