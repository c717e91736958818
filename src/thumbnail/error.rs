//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载缩略图链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 这些错误只进日志：HTTP 层会把任何链路错误统一折叠为 404，
//! 不向调用方暴露图片为何无法生成。

use image::ImageFormat;

use crate::pool::PoolError;

/// 缩略图链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    /// 资源不存在、是目录、体积超限或名称无法解析。
    ///
    /// 体积超限也归为此类，避免向外泄露被拒绝资源的内部状态。
    #[error("资源不存在：{0}")]
    NotFound(String),

    /// 远程内容嗅探类型与扩展名推断类型不一致。
    #[error("内容类型不匹配：期望 {expected}，实际 {detected}")]
    NotSupported {
        expected: &'static str,
        detected: String,
    },

    /// 无法识别容器格式（魔数不匹配）。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 容器可识别但头部信息损坏。
    #[error("头部错误：{0}")]
    Header(String),

    /// 解码、缩放或编码阶段失败。
    #[error("变换错误：{0}")]
    Transform(String),

    /// 远程源请求失败。
    #[error("网络错误：{0}")]
    Transport(String),

    /// 检测到的格式没有配置编码参数。
    #[error("未配置编码参数的格式：{0:?}")]
    Unsupported(ImageFormat),

    #[error("资源池错误：{0}")]
    Pool(#[from] PoolError),
}

impl ThumbnailError {
    /// 稳定的短错误码，用于日志检索。
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotSupported { .. } => "not_supported",
            Self::Decode(_) => "decode",
            Self::Header(_) => "header",
            Self::Transform(_) => "transform",
            Self::Transport(_) => "transport",
            Self::Unsupported(_) => "unsupported_format",
            Self::Pool(_) => "pool",
        }
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ThumbnailError::not_found("a.png").code(), "not_found");
        assert_eq!(
            ThumbnailError::NotSupported {
                expected: "image/png",
                detected: "text/html".to_string(),
            }
            .code(),
            "not_supported"
        );
        assert_eq!(ThumbnailError::Unsupported(ImageFormat::Gif).code(), "unsupported_format");
        assert_eq!(ThumbnailError::from(PoolError::Closed).code(), "pool");
    }

    #[test]
    fn not_supported_message_names_both_types() {
        let err = ThumbnailError::NotSupported {
            expected: "image/png",
            detected: "text/html".to_string(),
        };
        let msg = err.to_string();

        assert!(msg.contains("image/png"));
        assert!(msg.contains("text/html"));
    }
}
