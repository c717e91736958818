//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ThumbnailConfig`，保证运行时行为可观测、可调整、可测试。
//! 输出策略（尺寸、缩放方式、方向校正、按格式的编码参数）单独收敛为
//! `ThumbnailSpec`，启动后不可变，全进程共享。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的默认值（270×270、JPEG/WebP 质量 85、PNG 压缩级别 7）。
//! - `EncodeOptions` 每个变体自带格式，`ThumbnailSpec` 按检测到的格式查表。
//! - 字段合法性由 CLI 层在启动时统一校验。

use image::ImageFormat;
use image::imageops::FilterType;

/// 缩放策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// 等比缩放到目标框之内（可放大也可缩小）。
    Fit,
}

/// 单个格式的编码参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOptions {
    /// 有损 JPEG，`quality` 取值 1~100。
    Jpeg { quality: u8 },
    /// 无损 PNG，`compression` 取值 0~9，越大越慢越小。
    Png { compression: u8 },
    /// 有损 WebP，`quality` 取值 1~100。
    WebP { quality: u8 },
}

impl EncodeOptions {
    /// 该编码参数对应的图片格式。
    pub fn format(&self) -> ImageFormat {
        match self {
            Self::Jpeg { .. } => ImageFormat::Jpeg,
            Self::Png { .. } => ImageFormat::Png,
            Self::WebP { .. } => ImageFormat::WebP,
        }
    }
}

/// 缩略图输出策略。
#[derive(Debug, Clone)]
pub struct ThumbnailSpec {
    /// 目标宽度（像素）。
    pub width: u32,
    /// 目标高度（像素）。
    pub height: u32,
    pub resize: ResizePolicy,
    /// 是否按 EXIF 方向信息旋转/翻转。
    pub normalize_orientation: bool,
    /// 缩放滤镜。
    pub filter: FilterType,
    /// 按格式的编码参数表，同一格式只保留第一项。
    pub encode: Vec<EncodeOptions>,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            width: 270,
            height: 270,
            resize: ResizePolicy::Fit,
            normalize_orientation: true,
            filter: FilterType::Lanczos3,
            encode: vec![
                EncodeOptions::Jpeg { quality: 85 },
                EncodeOptions::Png { compression: 7 },
                EncodeOptions::WebP { quality: 85 },
            ],
        }
    }
}

impl ThumbnailSpec {
    /// 查找某格式的编码参数，未配置时返回 `None`。
    pub fn encode_options_for(&self, format: ImageFormat) -> Option<EncodeOptions> {
        self.encode.iter().copied().find(|opts| opts.format() == format)
    }
}

/// 缩略图链路配置。
///
/// 字段覆盖了资源池、读取、解码与远程请求四个方面。
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// 每个资源池的容量，也是同时进行的变换数量上限。
    pub pool_size: usize,
    /// 读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 远程内容嗅探缓冲大小（字节）。
    pub sniff_buffer_size: usize,
    /// 单个输出缓冲的容量（字节），编码结果不得超过它。
    pub output_buffer_size: usize,
    /// 变换上下文支持的最大边长（像素）。
    pub max_dimension: u32,
    /// 允许的图片扩展名（小写，不含点）。
    pub allowed_extensions: Vec<String>,
    /// 远程请求总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时（秒）。
    pub connect_timeout: u64,
    pub spec: ThumbnailSpec,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_file_size: 20 * 1024 * 1024,
            sniff_buffer_size: 512,
            output_buffer_size: 20 * 1024 * 1024,
            max_dimension: 8192,
            allowed_extensions: ["jpg", "jpeg", "png", "webp", "gif"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            download_timeout: 30,
            connect_timeout: 8,
            spec: ThumbnailSpec::default(),
        }
    }
}

impl ThumbnailConfig {
    /// 判断扩展名是否在白名单内（大小写不敏感）。
    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}
