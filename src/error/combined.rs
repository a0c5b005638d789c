//! 多错误聚合
//!
//! 收集多个独立子操作的失败，汇总为一个可上报的错误，不丢失任何一条消息

use super::mesh_error::{MeshError, Result};

/// 错误聚合器
///
/// - 没有追加任何错误：`into_error()` 返回 `None`
/// - 恰好一个错误：原样返回该错误，不做包装
/// - 两个及以上：返回 [`MeshError::Combined`]，其文本包含每条原始消息
#[derive(Debug, Default, Clone)]
pub struct CombinedError {
    errors: Vec<MeshError>,
}

impl CombinedError {
    /// 创建聚合器，可选地带上第一个错误
    pub fn new(first: Option<MeshError>) -> Self {
        let mut combined = Self::default();
        combined.append(first);
        combined
    }

    /// 追加错误，`None` 被忽略
    ///
    /// 嵌套的合集会被展开，保证最终文本逐条列出
    pub fn append(&mut self, error: Option<MeshError>) {
        match error {
            Some(MeshError::Combined(errors)) => self.errors.extend(errors),
            Some(error) => self.errors.push(error),
            None => {}
        }
    }

    /// 追加一个结果中的错误，成功结果被忽略
    pub fn append_result<T>(&mut self, result: Result<T>) {
        self.append(result.err());
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// 汇总结果
    pub fn into_error(mut self) -> Option<MeshError> {
        match self.errors.len() {
            0 => None,
            1 => self.errors.pop(),
            _ => Some(MeshError::Combined(self.errors)),
        }
    }

    /// 汇总为 `Result`
    pub fn into_result(self) -> Result<()> {
        match self.into_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Extend<MeshError> for CombinedError {
    fn extend<I: IntoIterator<Item = MeshError>>(&mut self, iter: I) {
        for error in iter {
            self.append(Some(error));
        }
    }
}

impl FromIterator<MeshError> for CombinedError {
    fn from_iter<I: IntoIterator<Item = MeshError>>(iter: I) -> Self {
        let mut combined = Self::default();
        combined.extend(iter);
        combined
    }
}
