//! # 缩略图文件系统
//!
//! ## 设计思路
//!
//! 文件服务层只认识 `FileSystem::open(name) -> File` 这一种能力。
//! `ThumbnailFileSystem` 把“读取原图 → 生成缩略图”包装成打开文件：
//! 对服务层而言，每个逻辑名称背后都是一个只读的普通文件。
//!
//! ## 实现思路
//!
//! - 先 `source.read`，再 `processor.process`，第一个错误直接返回。
//! - 每个请求记录分阶段耗时（load / process / total），便于定位慢请求。
//! - `shutdown()` 关闭所有资源池，正在排队的请求立即失败返回。

use std::future::Future;
use std::io::{self, Read, Seek};
use std::time::Instant;

use super::{FileInfo, ImageSource, ThumbnailError, ThumbnailProcessor, VirtualFile};

/// 可被文件服务层读取的文件。
pub trait File: Read + Seek + Send {
    fn stat(&self) -> io::Result<FileInfo>;

    fn read_dir(&mut self, count: usize) -> io::Result<Vec<FileInfo>>;

    fn close(&mut self) -> io::Result<()>;
}

/// 按名称打开文件的能力。
pub trait FileSystem: Send + Sync + 'static {
    type File: File + 'static;

    fn open(&self, name: &str) -> impl Future<Output = Result<Self::File, ThumbnailError>> + Send;
}

/// 以缩略图作为文件内容的文件系统。
#[derive(Debug)]
pub struct ThumbnailFileSystem {
    source: ImageSource,
    processor: ThumbnailProcessor,
}

impl ThumbnailFileSystem {
    pub fn new(source: ImageSource, processor: ThumbnailProcessor) -> Self {
        Self { source, processor }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn processor(&self) -> &ThumbnailProcessor {
        &self.processor
    }

    /// 关闭所有资源池。
    pub fn shutdown(&self) {
        log::info!("🛑 关闭资源池");
        self.processor.close();
        if let ImageSource::Remote(remote) = &self.source {
            remote.sniff_pool().close();
        }
    }
}

impl FileSystem for ThumbnailFileSystem {
    type File = VirtualFile;

    async fn open(&self, name: &str) -> Result<VirtualFile, ThumbnailError> {
        let start = Instant::now();

        let raw = self.source.read(name).await.inspect_err(|e| {
            log::info!("⚠️ 读取原图失败 - {} [{}] {}", name, e.code(), e);
        })?;
        let load_ms = start.elapsed().as_millis();
        let raw_len = raw.len();

        let process_start = Instant::now();
        let file = self.processor.process(raw, name).await.inspect_err(|e| {
            log::warn!("⚠️ 生成缩略图失败 - {} [{}] {}", name, e.code(), e);
        })?;

        log::info!(
            "✅ 缩略图请求完成 - {} source={} in={}B out={}B load={}ms process={}ms total={}ms",
            name,
            self.source.kind(),
            raw_len,
            file.len(),
            load_ms,
            process_start.elapsed().as_millis(),
            start.elapsed().as_millis()
        );

        Ok(file)
    }
}
