//! # 缩略图处理器
//!
//! ## 设计思路
//!
//! 处理器持有两个独立的资源池：输出缓冲池与变换上下文池。每次处理按固定顺序
//! 先借缓冲、再借上下文，然后在阻塞线程池里完成解码、缩放与编码。
//! 池的容量同时就是并发变换数量的上限，超出的请求在借用处排队。
//!
//! ## 实现思路
//!
//! - 资源守卫移入阻塞任务，任务结束（含 panic）时自动归还。
//! - 编码结果先拷贝成独立的 `Bytes`，再归还输出缓冲，
//!   返回的 `VirtualFile` 与缓冲池不再有任何关联。
//! - 检测到的格式即输出格式，未配置编码参数的格式直接报 `Unsupported`。

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::codec::{Decoder, TransformContext, TransformOptions};
use super::source::RawImage;
use super::{ThumbnailConfig, ThumbnailError, VirtualFile};
use crate::pool::ResourcePool;

/// 缩略图处理器。
#[derive(Debug, Clone)]
pub struct ThumbnailProcessor {
    config: Arc<ThumbnailConfig>,
    buffers: ResourcePool<Vec<u8>>,
    contexts: ResourcePool<TransformContext>,
}

impl ThumbnailProcessor {
    /// 按配置创建并预填充两个资源池。
    pub fn new(config: Arc<ThumbnailConfig>) -> Self {
        let buffer_size = config.output_buffer_size;
        let max_dimension = config.max_dimension;

        let buffers = ResourcePool::filled("output-buffer", config.pool_size, || {
            Vec::with_capacity(buffer_size)
        });
        let contexts = ResourcePool::filled("transform-context", config.pool_size, || {
            TransformContext::new(max_dimension)
        });

        log::info!(
            "🧰 处理器就绪 - 池容量: {} 输出缓冲: {:.2} MB 最大边长: {}",
            config.pool_size,
            buffer_size as f64 / 1024.0 / 1024.0,
            max_dimension
        );

        Self {
            config,
            buffers,
            contexts,
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub fn buffers(&self) -> &ResourcePool<Vec<u8>> {
        &self.buffers
    }

    pub fn contexts(&self) -> &ResourcePool<TransformContext> {
        &self.contexts
    }

    /// 把原始图片转换为缩略图虚拟文件。
    pub async fn process(&self, raw: RawImage, name: &str) -> Result<VirtualFile, ThumbnailError> {
        let start = Instant::now();

        let mut buffer = self.buffers.acquire().await?;
        let mut context = self.contexts.acquire().await?;
        let waited_ms = start.elapsed().as_millis();

        let config = Arc::clone(&self.config);
        let task = tokio::task::spawn_blocking(move || {
            let decoder = Decoder::open(&raw.bytes)?;
            let header = decoder.header()?;

            let encode = config
                .spec
                .encode_options_for(header.format)
                .ok_or(ThumbnailError::Unsupported(header.format))?;
            let options = TransformOptions::new(&config.spec, encode, config.output_buffer_size);

            let output = context.transform(&decoder, &options, &mut buffer)?;
            let data = Bytes::copy_from_slice(&buffer[..output.len]);

            Ok::<_, ThumbnailError>((header, output, data))
        });

        let (header, output, data) = task
            .await
            .map_err(|e| ThumbnailError::Transform(format!("变换任务异常终止：{}", e)))??;

        log::info!(
            "🖼️ 缩略图生成完成 - {} {:?} {}x{} duration={:?} -> {}x{} {} bytes wait={}ms total={}ms",
            name,
            header.format,
            header.width,
            header.height,
            header.duration,
            output.width,
            output.height,
            data.len(),
            waited_ms,
            start.elapsed().as_millis()
        );

        Ok(VirtualFile::new(name, data))
    }

    /// 关闭资源池，唤醒所有等待者。
    pub fn close(&self) {
        self.buffers.close();
        self.contexts.close();
    }
}
