//! # 远程源站来源
//!
//! ## 设计思路
//!
//! 源站地址 = 配置的 URL 前缀 + 逻辑名称。下载前先用扩展名推断期望类型，
//! 下载时先读取开头的少量字节做签名嗅探，类型不符立即停止，
//! 其余部分按体积上限封顶读取，目标是尽快失败，减少不必要的带宽与内存消耗。
//!
//! ## 实现思路
//!
//! - 名称无扩展名或扩展名无法映射为图片类型：不发请求，直接 `NotFound`。
//! - 非 2xx 状态、`Content-Length` 超限：`NotFound`。
//! - 嗅探缓冲从专用小缓冲池借出，无论成功失败都会归还。
//! - 响应体在任何退出路径上随 `Response` 析构而关闭，不会继续读取。
//! - 源站前缀以解析后的规范形式保存（主机小写、默认端口省略、路径已转义），
//!   拼接结果与前缀按同一规范比较。
//! - 不跟随重定向：3xx 与其他非 2xx 一样是 `NotFound`，读取永远停留在前缀之下。
//! - 网络错误统一映射到 `ThumbnailError::Transport`，日志中的 URL 去掉查询串。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::source::{RawImage, expected_mime, extension_of, sniff_mime};
use super::{ThumbnailConfig, ThumbnailError};
use crate::pool::ResourcePool;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 基于远程源站的图片来源。
#[derive(Debug, Clone)]
pub struct RemoteImageSource {
    origin: String,
    client: reqwest::Client,
    sniff_pool: ResourcePool<Vec<u8>>,
    config: Arc<ThumbnailConfig>,
}

impl RemoteImageSource {
    /// 创建远程来源，同时构建复用型 HTTP 客户端与嗅探缓冲池。
    pub fn new(origin: impl Into<String>, config: Arc<ThumbnailConfig>) -> Result<Self, ThumbnailError> {
        let mut parsed = reqwest::Url::parse(&origin.into())
            .map_err(|e| ThumbnailError::Transport(format!("源站地址格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ThumbnailError::Transport("源站仅支持 HTTP/HTTPS".to_string()));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        parsed.set_query(None);
        parsed.set_fragment(None);
        let origin = parsed.to_string();

        let client = Self::build_http_client(&config)?;
        let sniff_size = config.sniff_buffer_size;
        let sniff_pool = ResourcePool::filled("sniff-buffer", config.pool_size, || vec![0u8; sniff_size]);

        Ok(Self {
            origin,
            client,
            sniff_pool,
            config,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn sniff_pool(&self) -> &ResourcePool<Vec<u8>> {
        &self.sniff_pool
    }

    /// 从远程源站读取图片原始字节。
    pub async fn read(&self, name: &str) -> Result<RawImage, ThumbnailError> {
        let ext = extension_of(name).ok_or_else(|| {
            log::info!("🔍 无法从名称推断扩展名 - {}", name);
            ThumbnailError::not_found(name)
        })?;
        if !self.config.is_allowed_extension(&ext) {
            return Err(ThumbnailError::not_found(name));
        }
        let expected = expected_mime(&ext).ok_or_else(|| ThumbnailError::not_found(name))?;

        let url = self.target_url(name)?;
        log::info!(
            "🌐 请求远程图片 - URL: {}（期望类型 {}）",
            Self::redact_url_for_log(url.as_str()),
            expected
        );

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url.as_str()))?;

        if !response.status().is_success() {
            log::info!(
                "⚠️ 源站返回 HTTP {} - {}",
                response.status().as_u16(),
                Self::redact_url_for_log(url.as_str())
            );
            return Err(ThumbnailError::not_found(name));
        }

        let max = self.config.max_file_size;
        let declared_len = response.content_length();
        if let Some(len) = declared_len {
            if len > max {
                log::info!(
                    "⚠️ 远程文件过大：{:.2} MB（限制：{:.2} MB）",
                    len as f64 / 1024.0 / 1024.0,
                    max as f64 / 1024.0 / 1024.0
                );
                return Err(ThumbnailError::not_found(name));
            }
        }

        let mut sniff = self.sniff_pool.acquire().await?;
        let (filled, carry) = Self::read_prefix(&mut response, &mut sniff[..]).await?;

        if filled == 0 {
            log::info!("⚠️ 远程响应体为空 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }
        // 上限可能小于嗅探缓冲，开头部分同样要受限
        if filled as u64 > max {
            log::info!("⚠️ 远程文件超过大小限制，停止读取 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }

        let detected = sniff_mime(&sniff[..filled]).unwrap_or("application/octet-stream");
        log::debug!("🔍 嗅探到内容类型: {}", detected);
        if detected != expected {
            log::warn!(
                "⚠️ 响应内容类型 {} 与 URL 推断的 {} 不一致 - {}",
                detected,
                expected,
                Self::redact_url_for_log(url.as_str())
            );
            return Err(ThumbnailError::NotSupported {
                expected,
                detected: detected.to_string(),
            });
        }

        let initial_capacity = declared_len
            .map(|len| len.min(max) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        buffer.extend_from_slice(&sniff[..filled]);
        drop(sniff);

        if let Some(rest) = carry {
            Self::append_capped(&mut buffer, &rest, max, name)?;
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ThumbnailError::Transport(format!("读取响应体失败：{}", e)))?
        {
            Self::append_capped(&mut buffer, &chunk, max, name)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", buffer.len());

        Ok(RawImage {
            bytes: Bytes::from(buffer),
            source_hint: "remote",
        })
    }

    /// 读取响应体开头，填满嗅探缓冲或读到结尾为止。
    ///
    /// 返回已填充的字节数，以及最后一个分块中放不下的剩余部分。
    async fn read_prefix(
        response: &mut reqwest::Response,
        sniff: &mut [u8],
    ) -> Result<(usize, Option<Bytes>), ThumbnailError> {
        let mut filled = 0;

        while filled < sniff.len() {
            let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| ThumbnailError::Transport(format!("读取响应体开头失败：{}", e)))?
            else {
                return Ok((filled, None));
            };

            let take = chunk.len().min(sniff.len() - filled);
            sniff[filled..filled + take].copy_from_slice(&chunk[..take]);
            filled += take;

            if take < chunk.len() {
                return Ok((filled, Some(chunk.slice(take..))));
            }
        }

        Ok((filled, None))
    }

    fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8], max: u64, name: &str) -> Result<(), ThumbnailError> {
        if (buffer.len() + chunk.len()) as u64 > max {
            log::info!("⚠️ 远程文件超过大小限制，停止读取 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// 拼接源站前缀与逻辑名称，结果必须仍位于源站前缀之下。
    fn target_url(&self, name: &str) -> Result<reqwest::Url, ThumbnailError> {
        let relative = name.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            log::warn!("🚫 拒绝越界名称 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }

        let url = reqwest::Url::parse(&format!("{}{}", self.origin, relative)).map_err(|e| {
            log::info!("⚠️ URL 解析失败 - {}: {}", name, e);
            ThumbnailError::not_found(name)
        })?;

        if !url.as_str().starts_with(self.origin.as_str()) {
            log::warn!("🚫 拼接后的 URL 不在源站前缀之下 - {}", name);
            return Err(ThumbnailError::not_found(name));
        }

        Ok(url)
    }

    fn build_http_client(config: &ThumbnailConfig) -> Result<reqwest::Client, ThumbnailError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ThumbnailError::Transport(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> ThumbnailError {
        let err_msg = e.to_string().replace(url, &Self::redact_url_for_log(url));

        if e.is_timeout() {
            ThumbnailError::Transport(format!("下载超时（{}秒）", self.config.download_timeout))
        } else if e.is_connect() {
            ThumbnailError::Transport(format!("无法连接：{}", err_msg))
        } else {
            ThumbnailError::Transport(format!("请求失败：{}", err_msg))
        }
    }

    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = parsed.path();

        format!("{}://{}{}{}", parsed.scheme(), host, port, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread;

    const PNG_SIGNATURE: [u8; 16] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82];

    /// 单次应答的假源站，返回收到的请求报文。
    fn serve_once(response: Vec<u8>) -> (SocketAddr, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 2048];
            let n = stream.read(&mut req_buf).unwrap_or(0);

            // 客户端可能提前断开，写失败不算测试失败
            let _ = stream.write_all(&response);
            let _ = stream.flush();

            String::from_utf8_lossy(&req_buf[..n]).to_string()
        });

        (addr, server)
    }

    fn http_response(content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type,
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// 不声明长度、持续写入响应体的假源站，返回对端断开前成功写出的字节数。
    fn serve_endless(head: &'static [u8], chunk: Vec<u8>, total: usize) -> (SocketAddr, thread::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            stream
                .set_write_timeout(Some(Duration::from_secs(5)))
                .expect("set_write_timeout failed");

            let mut req_buf = [0u8; 2048];
            let _ = stream.read(&mut req_buf);
            if stream.write_all(head).is_err() {
                return 0;
            }

            let mut written = 0;
            while written < total {
                if stream.write_all(&chunk).is_err() {
                    break;
                }
                written += chunk.len();
            }
            written
        });

        (addr, server)
    }

    fn png_body(len: usize) -> Vec<u8> {
        let mut body = PNG_SIGNATURE.to_vec();
        body.extend((0..len - PNG_SIGNATURE.len()).map(|i| (i % 251) as u8));
        body
    }

    fn source_for(addr: SocketAddr, max_file_size: u64) -> RemoteImageSource {
        let config = ThumbnailConfig {
            max_file_size,
            pool_size: 1,
            ..ThumbnailConfig::default()
        };
        RemoteImageSource::new(format!("http://{}/img/", addr), Arc::new(config))
            .expect("remote source init failed")
    }

    #[tokio::test]
    async fn matching_png_returns_prefix_and_remainder() {
        let body = png_body(4000);
        let (addr, server) = serve_once(http_response("image/png", &body));
        let source = source_for(addr, 20 * 1024 * 1024);

        let raw = source.read("photo.png").await.expect("read should succeed");
        let request = server.join().expect("server thread failed");

        assert!(request.starts_with("GET /img/photo.png "));
        assert_eq!(&raw.bytes[..], &body[..]);
        assert_eq!(raw.source_hint, "remote");
        assert_eq!(source.sniff_pool().available(), 1);
    }

    #[tokio::test]
    async fn body_shorter_than_sniff_buffer_is_not_padded() {
        let body = png_body(100);
        let (addr, server) = serve_once(http_response("image/png", &body));
        let source = source_for(addr, 1024);

        let raw = source.read("small.png").await.expect("read should succeed");
        server.join().expect("server thread failed");

        assert_eq!(raw.len(), 100);
    }

    #[tokio::test]
    async fn html_body_is_not_supported_even_with_image_content_type() {
        let body = b"<!DOCTYPE html><html><body>not an image</body></html>".repeat(200);
        let (addr, server) = serve_once(http_response("image/png", &body));
        let source = source_for(addr, 20 * 1024 * 1024);

        let result = source.read("photo.png").await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotSupported { expected: "image/png", .. })));
        assert_eq!(source.sniff_pool().available(), 1);
    }

    #[tokio::test]
    async fn extension_mismatch_is_not_supported() {
        let body = png_body(600);
        let (addr, server) = serve_once(http_response("image/jpeg", &body));
        let source = source_for(addr, 1024 * 1024);

        let result = source.read("photo.jpg").await;
        server.join().expect("server thread failed");

        assert!(matches!(
            result,
            Err(ThumbnailError::NotSupported { expected: "image/jpeg", ref detected }) if detected == "image/png"
        ));
    }

    #[tokio::test]
    async fn name_without_extension_makes_no_request() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");
        listener.set_nonblocking(true).expect("set_nonblocking failed");
        let source = source_for(addr, 1024);

        assert!(matches!(source.read("photo").await, Err(ThumbnailError::NotFound(_))));
        assert!(matches!(source.read("folder/").await, Err(ThumbnailError::NotFound(_))));
        assert!(matches!(source.read("notes.txt").await, Err(ThumbnailError::NotFound(_))));

        let pending = listener.accept();
        assert!(matches!(pending, Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock));
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_not_found() {
        let body = png_body(2048);
        let (addr, server) = serve_once(http_response("image/png", &body));
        let source = source_for(addr, 1024);

        let result = source.read("photo.png").await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotFound(_))));
    }

    #[tokio::test]
    async fn undeclared_length_over_limit_stops_reading() {
        let body = png_body(8192);
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&body);
        let (addr, server) = serve_once(response);
        let source = source_for(addr, 1024);

        let result = source.read("photo.png").await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotFound(_))));
        assert_eq!(source.sniff_pool().available(), 1);
    }

    #[tokio::test]
    async fn limit_below_sniff_size_applies_to_prefix() {
        let body = png_body(300);
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&body);
        let (addr, server) = serve_once(response);
        let source = source_for(addr, 100);

        let result = source.read("photo.png").await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotFound(_))));
        assert_eq!(source.sniff_pool().available(), 1);
    }

    #[tokio::test]
    async fn mismatched_body_is_abandoned_after_sniffing() {
        const TOTAL: usize = 64 * 1024 * 1024;
        let chunk = b"<html><body>not an image</body></html>\n".repeat(1680);
        let head = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n";
        let (addr, server) = serve_endless(head, chunk, TOTAL);
        let source = source_for(addr, u64::MAX);

        let result = source.read("photo.png").await;
        drop(source);
        let written = server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotSupported { expected: "image/png", .. })));
        assert!(written < TOTAL, "origin wrote the whole body: {} bytes", written);
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let response = b"HTTP/1.1 302 Found\r\nLocation: /private/photo.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec();
        let (addr, server) = serve_once(response);
        let source = source_for(addr, 1024);

        let result = source.read("photo.png").await;
        let request = server.join().expect("server thread failed");

        assert!(request.starts_with("GET /img/photo.png "));
        assert!(matches!(result, Err(ThumbnailError::NotFound(_))));
    }

    #[tokio::test]
    async fn origin_error_status_is_not_found() {
        let response =
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec();
        let (addr, server) = serve_once(response);
        let source = source_for(addr, 1024);

        let result = source.read("missing.png").await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ThumbnailError::NotFound(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");
        drop(listener);
        let source = source_for(addr, 1024);

        let result = source.read("photo.png").await;

        assert!(matches!(result, Err(ThumbnailError::Transport(_))));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected_before_request() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");
        let source = source_for(addr, 1024);

        assert!(matches!(source.read("../secret.png").await, Err(ThumbnailError::NotFound(_))));
        assert!(matches!(source.read("a/../../secret.png").await, Err(ThumbnailError::NotFound(_))));
    }

    #[test]
    fn origin_gets_trailing_slash_and_scheme_is_checked() {
        let config = Arc::new(ThumbnailConfig::default());

        let source = RemoteImageSource::new("https://example.test/img", Arc::clone(&config))
            .expect("remote source init failed");
        assert_eq!(source.origin(), "https://example.test/img/");

        assert!(RemoteImageSource::new("ftp://example.test/img/", Arc::clone(&config)).is_err());
        assert!(RemoteImageSource::new("not a url", config).is_err());
    }

    #[test]
    fn target_url_concatenates_origin_and_name() {
        let source = RemoteImageSource::new("https://example.test/img/", Arc::new(ThumbnailConfig::default()))
            .expect("remote source init failed");

        let url = source.target_url("/a/photo.png").expect("url should parse");
        assert_eq!(url.as_str(), "https://example.test/img/a/photo.png");
    }

    #[test]
    fn origin_is_stored_in_canonical_form() {
        let config = Arc::new(ThumbnailConfig::default());

        let upper = RemoteImageSource::new("https://CDN.Example.test/img/", Arc::clone(&config))
            .expect("remote source init failed");
        assert_eq!(upper.origin(), "https://cdn.example.test/img/");
        let url = upper.target_url("photo.png").expect("uppercase host should resolve");
        assert_eq!(url.as_str(), "https://cdn.example.test/img/photo.png");

        let default_port = RemoteImageSource::new("https://cdn.example.test:443/img", Arc::clone(&config))
            .expect("remote source init failed");
        let url = default_port.target_url("a/photo.png").expect("default port should resolve");
        assert_eq!(url.as_str(), "https://cdn.example.test/img/a/photo.png");

        let spaced = RemoteImageSource::new("http://cdn.example.test/a b/", config)
            .expect("remote source init failed");
        assert_eq!(spaced.origin(), "http://cdn.example.test/a%20b/");
        let url = spaced.target_url("photo.png").expect("escaped path should resolve");
        assert_eq!(url.as_str(), "http://cdn.example.test/a%20b/photo.png");
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = RemoteImageSource::redact_url_for_log(
            "https://example.com:8443/path/img.png?token=abc123#hash",
        );

        assert_eq!(redacted, "https://example.com:8443/path/img.png");
    }
}
