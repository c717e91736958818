//! # 本地目录来源
//!
//! ## 设计思路
//!
//! 只允许读取根目录之下的普通文件，尽早失败：
//! 名称校验 → 打开 → metadata（目录/体积）→ 读取。
//! 所有失败一律映射为 `NotFound`，不区分“不存在”“是目录”“过大”，避免泄露内部状态。
//!
//! ## 实现思路
//!
//! - 路径解析只接受普通路径分量，`..` 与盘符前缀直接拒绝，杜绝目录穿越。
//! - 体积检查基于 metadata，超限时不读取文件内容。
//! - 读取时再以 `max + 1` 字节封顶，防止 stat 之后文件被追加。

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::source::{RawImage, extension_of};
use super::{ThumbnailConfig, ThumbnailError};

/// 基于本地目录的图片来源。
#[derive(Debug, Clone)]
pub struct LocalImageSource {
    root: PathBuf,
    config: Arc<ThumbnailConfig>,
}

impl LocalImageSource {
    pub fn new(root: impl Into<PathBuf>, config: Arc<ThumbnailConfig>) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 从本地目录读取图片原始字节。
    pub async fn read(&self, name: &str) -> Result<RawImage, ThumbnailError> {
        log::debug!("📁 读取本地图片 - 名称: {}", name);

        let ext = extension_of(name).ok_or_else(|| ThumbnailError::not_found(name))?;
        if !self.config.is_allowed_extension(&ext) {
            log::debug!("🚫 扩展名不在白名单内 - {}", ext);
            return Err(ThumbnailError::not_found(name));
        }

        let path = self.resolve(name)?;

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            log::debug!("📁 打开文件失败 - {}: {}", name, e);
            ThumbnailError::not_found(name)
        })?;

        let metadata = file.metadata().await.map_err(|e| {
            log::debug!("📁 读取文件信息失败 - {}: {}", name, e);
            ThumbnailError::not_found(name)
        })?;

        if metadata.is_dir() {
            log::info!("📂 拒绝读取目录 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }

        let max = self.config.max_file_size;
        if metadata.len() > max {
            log::info!(
                "⚠️ 文件过大，不予加载 - {}：{:.2} MB（限制：{:.2} MB）",
                name,
                metadata.len() as f64 / 1024.0 / 1024.0,
                max as f64 / 1024.0 / 1024.0
            );
            return Err(ThumbnailError::not_found(name));
        }

        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.take(max.saturating_add(1))
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| {
                log::warn!("⚠️ 读取文件失败 - {}: {}", name, e);
                ThumbnailError::not_found(name)
            })?;

        if bytes.len() as u64 > max {
            log::warn!("⚠️ 文件在读取期间增长并超过大小限制 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }

        Ok(RawImage {
            bytes: Bytes::from(bytes),
            source_hint: "local",
        })
    }

    /// 把逻辑名称解析为根目录下的路径。
    ///
    /// 只接受普通路径分量，任何可能跳出根目录的写法都视为不存在。
    fn resolve(&self, name: &str) -> Result<PathBuf, ThumbnailError> {
        if name.contains('\0') || name.contains('\\') {
            return Err(ThumbnailError::not_found(name));
        }

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                // 开头的 `/` 相对根目录解释
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    log::warn!("🚫 拒绝越界路径 - {}", name);
                    return Err(ThumbnailError::not_found(name));
                }
            }
        }

        if depth == 0 {
            return Err(ThumbnailError::not_found(name));
        }

        Ok(resolved)
    }
}
