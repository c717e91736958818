//! # 图片来源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部来源”和“流水线中间结果”解耦：
//! - `ImageSource` 表示启动时选定的来源（本地目录或远程源站），只提供 `read(name)` 一种能力
//! - `RawImage` 表示已读取但未解码的原始字节
//!
//! 两种来源都要在交给解码阶段之前保证两件事：输入体积有上限，
//! 并且看起来确实是声明类型的图片。

use std::path::Path;

use bytes::Bytes;

use super::{LocalImageSource, RemoteImageSource, ThumbnailError};

/// 读取阶段输出：原始图片字节与来源标识。
#[derive(Debug, Clone)]
pub struct RawImage {
    /// 原始图片字节。
    pub bytes: Bytes,
    /// 来源提示（用于日志与诊断）。
    pub source_hint: &'static str,
}

impl RawImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 图片输入来源，启动时按配置选定，运行期间不混用。
#[derive(Debug)]
pub enum ImageSource {
    /// 本地目录来源。
    Local(LocalImageSource),
    /// 远程源站来源。
    Remote(RemoteImageSource),
}

impl ImageSource {
    /// 读取逻辑名称对应的原始图片字节。
    pub async fn read(&self, name: &str) -> Result<RawImage, ThumbnailError> {
        match self {
            Self::Local(source) => source.read(name).await,
            Self::Remote(source) => source.read(name).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }
}

/// 取逻辑名称的扩展名（小写，不含点）。
///
/// 查询串与片段不参与判断，`photo.png?v=2` 视为 `png`。
pub(crate) fn extension_of(name: &str) -> Option<String> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    if path.ends_with('/') {
        return None;
    }

    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

/// 由扩展名推断期望的 MIME 类型。
pub(crate) fn expected_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" | "jpe" | "jfif" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "ico" => Some("image/vnd.microsoft.icon"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// 通过文件签名（magic bytes）识别内容类型。
///
/// 无法识别时返回 `None`。
pub(crate) fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}
