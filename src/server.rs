//! # HTTP 服务模块
//!
//! ## 设计思路
//!
//! 服务层只是一个“静态文件服务器”：`/thumb/{name}` 通过 `FileSystem::open`
//! 拿到只读文件后按普通文件的方式返回，对缩略图链路一无所知。
//! 可选的调试目录挂在根路径，原样返回目录中的文件。
//!
//! ## 实现思路
//!
//! - `Content-Type` 先按文件开头 512 字节嗅探，再按扩展名推断，最后回落为
//!   `application/octet-stream`。
//! - 支持单段 `Range: bytes=a-b`（206 / 416），多段或语法错误的 Range 按完整内容返回。
//! - 链路错误统一为 `404 page not found`，原因只进日志。

use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use image::ImageFormat;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::error::AppError;
use crate::thumbnail::{File, FileSystem, ThumbnailError, extension_of, sniff_mime};

const SNIFF_LEN: u64 = 512;

/// 构建路由：`/thumb/*name` 走缩略图文件系统，调试目录（若有）作为兜底。
pub fn router<F: FileSystem>(fs: Arc<F>, debug_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/thumb/*name", get(serve_thumbnail::<F>))
        .with_state(fs);

    match debug_dir {
        Some(dir) => {
            log::info!("🧪 调试目录挂载于 / - {}", dir.display());
            app.fallback_service(ServeDir::new(dir))
        }
        None => app.fallback(page_not_found),
    }
}

/// 在 `listener` 上运行服务，直到 `shutdown` 完成。
pub async fn serve<S>(listener: TcpListener, app: Router, shutdown: S) -> Result<(), AppError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    log::info!("🚀 缩略图服务已启动 - http://{}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    log::info!("👋 服务已停止");
    Ok(())
}

async fn page_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}

async fn serve_thumbnail<F: FileSystem>(
    State(fs): State<Arc<F>>,
    UrlPath(name): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let mut file = fs.open(&name).await?;
    let info = file.stat()?;
    if info.is_dir {
        return Err(ThumbnailError::not_found(&name).into());
    }

    let content_type = detect_content_type(&mut file, &info.name)?;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(|value| parse_range(value, info.size));

    let response = match range {
        Some(Err(RangeNotSatisfiable)) => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", info.size))
            .body(Body::empty()),
        Some(Ok(Some((start, end)))) => {
            let body = read_span(&mut file, start, end - start + 1)?;
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))
                .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, info.size))
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
        }
        Some(Ok(None)) | None => {
            let body = read_span(&mut file, 0, info.size)?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
        }
    };

    file.close()?;
    response.map_err(|e| AppError::Http(format!("构建响应失败: {}", e)))
}

/// 按内容、扩展名的顺序推断 `Content-Type`，读取后回到文件开头。
fn detect_content_type<R: Read + Seek>(file: &mut R, name: &str) -> io::Result<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.by_ref().take(SNIFF_LEN).read_to_end(&mut head)?;
    file.seek(SeekFrom::Start(0))?;

    let content_type = sniff_mime(&head)
        .or_else(|| {
            extension_of(name)
                .and_then(ImageFormat::from_extension)
                .map(|format| format.to_mime_type())
        })
        .unwrap_or("application/octet-stream");

    Ok(content_type)
}

fn read_span<R: Read + Seek>(file: &mut R, start: u64, len: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(start))?;
    let mut body = Vec::with_capacity(len as usize);
    file.by_ref().take(len).read_to_end(&mut body)?;
    Ok(body)
}

#[derive(Debug, PartialEq, Eq)]
struct RangeNotSatisfiable;

/// 解析单段 `Range` 头，返回闭区间 `[start, end]`。
///
/// `Ok(None)` 表示忽略该头（多段或语法错误），按完整内容返回。
fn parse_range(value: &str, size: u64) -> Result<Option<(u64, u64)>, RangeNotSatisfiable> {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return Ok(None);
    };

    if first.is_empty() {
        // 后缀形式：最后 n 字节
        let Ok(suffix) = last.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || size == 0 {
            return Err(RangeNotSatisfiable);
        }
        return Ok(Some((size.saturating_sub(suffix), size - 1)));
    }

    let Ok(start) = first.parse::<u64>() else {
        return Ok(None);
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return Ok(None),
        }
    };

    if start >= size {
        return Err(RangeNotSatisfiable);
    }

    let end = end.map_or(size - 1, |end| end.min(size - 1));
    Ok(Some((start, end)))
}
