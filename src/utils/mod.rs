//! 工具函数模块

use std::time::Duration;

use crate::error::{MeshError, Result};

/// 解析时长字符串
///
/// 由 `humantime` 解析，一个或多个 "整数+单位" 片段，如 `300ms`、`2m`、`1h30m`、`1h 30m`。
/// 单独的 `"0"` 合法；负数时长不被接受。
///
/// # 示例
/// ```rust
/// use flare_mesh_core::utils::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let value = input.trim();
    if value.starts_with('-') {
        return Err(MeshError::invalid_duration(
            input,
            "negative durations are not supported",
        ));
    }
    if value == "0" {
        return Ok(Duration::ZERO);
    }

    humantime::parse_duration(value)
        .map_err(|err| MeshError::invalid_duration(input, err.to_string()))
}
