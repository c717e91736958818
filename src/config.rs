//! # 启动配置模块
//!
//! ## 设计思路
//!
//! 命令行参数（每项也可通过 `THUMB_*` 环境变量提供）只在启动时解析一次，
//! 校验通过后转换为不可变的 `Settings`，之后全进程只读共享。
//!
//! ## 实现思路
//!
//! - `Args` 由 `clap` 派生，只负责“原样接收”。
//! - `Args::into_settings` 逐项做范围校验，非法值返回 `AppError::Config`，进程直接退出。
//! - `Settings::build_file_system` 按来源模式组装 `ThumbnailFileSystem`。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::error::AppError;
use crate::thumbnail::{
    EncodeOptions, ImageSource, LocalImageSource, RemoteImageSource, ThumbnailConfig, ThumbnailFileSystem,
    ThumbnailProcessor, ThumbnailSpec,
};

const MIB: u64 = 1024 * 1024;

/// 原图来源模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceMode {
    /// 本地目录
    Local,
    /// 远程 HTTP 源站
    Remote,
}

/// 按需生成缩略图的 HTTP 服务
#[derive(Debug, Clone, Parser)]
#[command(name = "thumbnail-server", version)]
#[command(about = "On-demand thumbnail server backed by a local directory or a remote HTTP origin")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "THUMB_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Where original images come from
    #[arg(long, env = "THUMB_SOURCE", value_enum, default_value_t = SourceMode::Local)]
    pub source: SourceMode,

    /// Image root: a directory for `local`, an origin URL prefix for `remote`
    #[arg(long, env = "THUMB_ROOT")]
    pub root: String,

    /// Capacity of every resource pool (concurrent transforms)
    #[arg(long, env = "THUMB_POOL_SIZE", default_value_t = 5)]
    pub pool_size: usize,

    /// Largest accepted original image, in bytes
    #[arg(long, env = "THUMB_MAX_FILE_SIZE", default_value_t = 20 * MIB)]
    pub max_file_size: u64,

    /// Thumbnail bounding box width
    #[arg(long, env = "THUMB_WIDTH", default_value_t = 270)]
    pub width: u32,

    /// Thumbnail bounding box height
    #[arg(long, env = "THUMB_HEIGHT", default_value_t = 270)]
    pub height: u32,

    /// JPEG quality (1-100)
    #[arg(long, env = "THUMB_JPEG_QUALITY", default_value_t = 85)]
    pub jpeg_quality: u8,

    /// PNG compression level (0-9)
    #[arg(long, env = "THUMB_PNG_COMPRESSION", default_value_t = 7)]
    pub png_compression: u8,

    /// WebP quality (1-100)
    #[arg(long, env = "THUMB_WEBP_QUALITY", default_value_t = 85)]
    pub webp_quality: u8,

    /// Capacity of each pooled output buffer, in bytes
    #[arg(long, env = "THUMB_OUTPUT_BUFFER_SIZE", default_value_t = 20 * MIB as usize)]
    pub output_buffer_size: usize,

    /// Largest width or height a transform context accepts
    #[arg(long, env = "THUMB_MAX_DIMENSION", default_value_t = 8192)]
    pub max_dimension: u32,

    /// Remote request timeout, in seconds
    #[arg(long, env = "THUMB_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    pub download_timeout: u64,

    /// Remote connect timeout, in seconds
    #[arg(long, env = "THUMB_CONNECT_TIMEOUT", default_value_t = 8)]
    pub connect_timeout: u64,

    /// Serve this directory unmodified at `/`
    #[arg(long, env = "THUMB_DEBUG_DIR")]
    pub debug_dir: Option<PathBuf>,
}

/// 原图来源配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Local { root: PathBuf },
    Remote { origin: String },
}

/// 校验后的启动配置。
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub source: SourceConfig,
    pub debug_dir: Option<PathBuf>,
    pub thumbnail: ThumbnailConfig,
}

impl Args {
    /// 校验参数并生成 `Settings`。
    pub fn into_settings(self) -> Result<Settings, AppError> {
        if !(1..=256).contains(&self.pool_size) {
            return Err(AppError::Config("pool-size 必须在 1~256 之间".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config("max-file-size 必须大于 0".to_string()));
        }
        if !(1..=65_535).contains(&self.max_dimension) {
            return Err(AppError::Config("max-dimension 必须在 1~65535 之间".to_string()));
        }
        if self.width == 0 || self.height == 0 || self.width > self.max_dimension || self.height > self.max_dimension {
            return Err(AppError::Config(format!(
                "width/height 必须在 1~{} 之间",
                self.max_dimension
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config("jpeg-quality 必须在 1~100 之间".to_string()));
        }
        if !(1..=100).contains(&self.webp_quality) {
            return Err(AppError::Config("webp-quality 必须在 1~100 之间".to_string()));
        }
        if self.png_compression > 9 {
            return Err(AppError::Config("png-compression 必须在 0~9 之间".to_string()));
        }
        if self.output_buffer_size < 1024 {
            return Err(AppError::Config("output-buffer-size 不能小于 1KB".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(AppError::Config("connect-timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(1..=600).contains(&self.download_timeout) {
            return Err(AppError::Config("download-timeout 必须在 1~600 秒之间".to_string()));
        }
        if self.connect_timeout > self.download_timeout {
            return Err(AppError::Config("connect-timeout 不能大于 download-timeout".to_string()));
        }

        let source = match self.source {
            SourceMode::Local => {
                let root = PathBuf::from(&self.root);
                if !root.is_dir() {
                    return Err(AppError::Config(format!("图片根目录不存在或不是目录: {}", self.root)));
                }
                SourceConfig::Local { root }
            }
            SourceMode::Remote => {
                if !(self.root.starts_with("http://") || self.root.starts_with("https://")) {
                    return Err(AppError::Config(format!("远程源站必须是 HTTP/HTTPS 地址: {}", self.root)));
                }
                SourceConfig::Remote { origin: self.root }
            }
        };

        if let Some(dir) = &self.debug_dir {
            if !dir.is_dir() {
                return Err(AppError::Config(format!("调试目录不存在或不是目录: {}", dir.display())));
            }
        }

        let spec = ThumbnailSpec {
            width: self.width,
            height: self.height,
            encode: vec![
                EncodeOptions::Jpeg {
                    quality: self.jpeg_quality,
                },
                EncodeOptions::Png {
                    compression: self.png_compression,
                },
                EncodeOptions::WebP {
                    quality: self.webp_quality,
                },
            ],
            ..ThumbnailSpec::default()
        };

        let thumbnail = ThumbnailConfig {
            pool_size: self.pool_size,
            max_file_size: self.max_file_size,
            output_buffer_size: self.output_buffer_size,
            max_dimension: self.max_dimension,
            download_timeout: self.download_timeout,
            connect_timeout: self.connect_timeout,
            spec,
            ..ThumbnailConfig::default()
        };

        Ok(Settings {
            listen: self.listen,
            source,
            debug_dir: self.debug_dir,
            thumbnail,
        })
    }
}

impl Settings {
    /// 按来源模式组装文件系统（含全部资源池）。
    pub fn build_file_system(&self) -> Result<ThumbnailFileSystem, AppError> {
        let config = Arc::new(self.thumbnail.clone());

        let source = match &self.source {
            SourceConfig::Local { root } => {
                log::info!("📁 原图来源：本地目录 {}", root.display());
                ImageSource::Local(LocalImageSource::new(root.clone(), Arc::clone(&config)))
            }
            SourceConfig::Remote { origin } => {
                log::info!(
                    "🌐 原图来源：远程源站 {}",
                    RemoteImageSource::redact_url_for_log(origin)
                );
                ImageSource::Remote(RemoteImageSource::new(origin.clone(), Arc::clone(&config))?)
            }
        };

        Ok(ThumbnailFileSystem::new(source, ThumbnailProcessor::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["thumbnail-server"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("parse args failed")
    }

    #[test]
    fn defaults_match_documented_values() {
        let dir = TempDir::new().expect("tempdir failed");
        let root = dir.path().to_string_lossy().to_string();

        let settings = parse(&["--root", &root]).into_settings().expect("settings failed");

        assert_eq!(settings.listen, "0.0.0.0:8080".parse().expect("parse addr failed"));
        assert_eq!(settings.source, SourceConfig::Local { root: dir.path().to_path_buf() });
        assert_eq!(settings.thumbnail.pool_size, 5);
        assert_eq!(settings.thumbnail.max_file_size, 20 * MIB);
        assert_eq!((settings.thumbnail.spec.width, settings.thumbnail.spec.height), (270, 270));
        assert_eq!(
            settings.thumbnail.spec.encode_options_for(image::ImageFormat::Jpeg),
            Some(EncodeOptions::Jpeg { quality: 85 })
        );
        assert_eq!(
            settings.thumbnail.spec.encode_options_for(image::ImageFormat::WebP),
            Some(EncodeOptions::WebP { quality: 85 })
        );
        assert!(settings.debug_dir.is_none());
    }

    #[test]
    fn root_is_required() {
        assert!(Args::try_parse_from(["thumbnail-server"]).is_err());
    }

    #[test]
    fn remote_origin_must_be_http() {
        let ok = parse(&["--source", "remote", "--root", "https://cdn.example.test/img/"])
            .into_settings()
            .expect("settings failed");
        assert!(matches!(ok.source, SourceConfig::Remote { .. }));

        let bad = parse(&["--source", "remote", "--root", "/srv/images"]).into_settings();
        assert!(matches!(bad, Err(AppError::Config(_))));
    }

    #[test]
    fn missing_local_root_is_rejected() {
        let result = parse(&["--root", "/definitely/not/here"]).into_settings();

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = TempDir::new().expect("tempdir failed");
        let root = dir.path().to_string_lossy().to_string();

        for extra in [
            ["--pool-size", "0"],
            ["--jpeg-quality", "0"],
            ["--png-compression", "12"],
            ["--webp-quality", "0"],
            ["--width", "9000"],
            ["--connect-timeout", "60"],
        ] {
            let mut argv = vec!["--root", root.as_str(), "--download-timeout", "30"];
            argv.extend_from_slice(&extra);
            let result = parse(&argv).into_settings();
            assert!(matches!(result, Err(AppError::Config(_))), "{:?} should be rejected", extra);
        }
    }

    #[test]
    fn build_file_system_uses_configured_pool_size() {
        let dir = TempDir::new().expect("tempdir failed");
        let root = dir.path().to_string_lossy().to_string();

        let settings = parse(&["--root", &root, "--pool-size", "2"])
            .into_settings()
            .expect("settings failed");
        let fs = settings.build_file_system().expect("build failed");

        assert_eq!(fs.processor().buffers().capacity(), 2);
        assert_eq!(fs.source().kind(), "local");
    }
}
