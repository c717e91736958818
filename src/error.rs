//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，覆盖启动配置、I/O、HTTP 服务与缩略图链路。
//! 所有 axum handler 统一返回 `Result<T, AppError>`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ThumbnailError` 提供 `From` 转换，无需手动 map。
//! - 实现 `IntoResponse`：缩略图链路的任何错误都折叠为 `404 page not found`，
//!   具体原因只写日志；其余错误为 500。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::thumbnail::ThumbnailError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 缩略图链路错误（读取 / 解码 / 变换）
    #[error("{0}")]
    Thumbnail(#[from] ThumbnailError),

    /// 启动配置非法
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件系统或网络 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP 服务层错误
    #[error("HTTP 服务错误: {0}")]
    Http(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Thumbnail(err) => {
                log::debug!("🔎 缩略图不可用 [{}] {}", err.code(), err);
                (StatusCode::NOT_FOUND, "404 page not found").into_response()
            }
            other => {
                log::error!("❌ 请求处理失败: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error").into_response()
            }
        }
    }
}
