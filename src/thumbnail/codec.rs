//! # 编解码模块
//!
//! ## 设计思路
//!
//! 把图片库的细节收敛在三个类型之后，处理器只按固定顺序调用：
//! - `Decoder`：借用原始字节，按魔数识别容器格式
//! - `ImageHeader`：宽高、格式、EXIF 方向与动画总时长，不做完整解码
//! - `TransformContext`：可复用的工作状态（缩放器 + 尺寸上限），放入资源池循环使用
//!
//! ## 实现思路
//!
//! 1. `Decoder::open` 猜测格式，失败为 `Decode`
//! 2. `Decoder::header` 只读头部，失败为 `Header`
//! 3. `TransformContext::transform` 完整解码 → 方向校正 → 等比缩放 → 按原格式编码，
//!    任何一步失败为 `Transform`
//! 4. 编码输出写入调用方借出的缓冲，超过缓冲容量立即停止

use std::io::{self, Cursor, Write};
use std::time::Duration;

use fast_image_resize as fr;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, PngDecoder, PngEncoder};
use image::codecs::webp::WebPDecoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    AnimationDecoder, ColorType, DynamicImage, Frames, GenericImageView, ImageBuffer, ImageDecoder,
    ImageFormat, ImageReader, Limits, Rgb, Rgba,
};

use super::ThumbnailError;
use super::config::{EncodeOptions, ResizePolicy, ThumbnailSpec};

/// 图片头部信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// EXIF 方向，无 EXIF 时为 `NoTransforms`。
    pub orientation: Orientation,
    /// 动画各帧延时之和，静态图（含单帧动画）为 `None`。
    pub duration: Option<Duration>,
}

/// 借用原始字节的解码器句柄。
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    format: ImageFormat,
}

impl<'a> Decoder<'a> {
    /// 按魔数识别容器格式。
    pub fn open(bytes: &'a [u8]) -> Result<Self, ThumbnailError> {
        let format = image::guess_format(bytes)
            .map_err(|e| ThumbnailError::Decode(format!("无法识别图片格式：{}", e)))?;

        Ok(Self { bytes, format })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// 读取头部信息，不解码像素。
    pub fn header(&self) -> Result<ImageHeader, ThumbnailError> {
        let mut decoder = ImageReader::with_format(Cursor::new(self.bytes), self.format)
            .into_decoder()
            .map_err(|e| ThumbnailError::Header(format!("无法读取图片头部：{}", e)))?;

        let (width, height) = decoder.dimensions();
        if width == 0 || height == 0 {
            return Err(ThumbnailError::Header(format!("图片尺寸非法：{}x{}", width, height)));
        }

        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        drop(decoder);

        Ok(ImageHeader {
            width,
            height,
            format: self.format,
            orientation,
            duration: self.animation_duration()?,
        })
    }

    /// GIF、APNG 与动画 WebP 逐帧累加延时，其余格式没有时长。
    fn animation_duration(&self) -> Result<Option<Duration>, ThumbnailError> {
        let Some(frames) = self.frames()? else {
            return Ok(None);
        };

        let mut count = 0usize;
        let mut total = Duration::ZERO;
        for frame in frames {
            let frame = frame.map_err(header_error)?;
            total += Duration::from(frame.delay());
            count += 1;
        }

        Ok((count > 1).then_some(total))
    }

    fn frames(&self) -> Result<Option<Frames<'a>>, ThumbnailError> {
        let cursor = Cursor::new(self.bytes);

        let frames = match self.format {
            ImageFormat::Gif => GifDecoder::new(cursor).map_err(header_error)?.into_frames(),
            ImageFormat::Png => {
                let decoder = PngDecoder::new(cursor).map_err(header_error)?;
                if !decoder.is_apng().map_err(header_error)? {
                    return Ok(None);
                }
                decoder.apng().map_err(header_error)?.into_frames()
            }
            ImageFormat::WebP => {
                let decoder = WebPDecoder::new(cursor).map_err(header_error)?;
                if !decoder.has_animation() {
                    return Ok(None);
                }
                decoder.into_frames()
            }
            _ => return Ok(None),
        };

        Ok(Some(frames))
    }

    /// 完整解码并返回 EXIF 方向。
    fn decode(&self, max_dimension: u32) -> Result<(DynamicImage, Orientation), ThumbnailError> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(max_dimension);
        limits.max_image_height = Some(max_dimension);

        let mut reader = ImageReader::with_format(Cursor::new(self.bytes), self.format);
        reader.limits(limits);

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| ThumbnailError::Transform(format!("解码器初始化失败：{}", e)))?;

        let (width, height) = decoder.dimensions();
        if width > max_dimension || height > max_dimension {
            return Err(ThumbnailError::Transform(format!(
                "图片尺寸 {}x{} 超过变换上限 {}",
                width, height, max_dimension
            )));
        }

        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

        let image = DynamicImage::from_decoder(decoder)
            .map_err(|e| ThumbnailError::Transform(format!("图片解码失败：{}", e)))?;

        Ok((image, orientation))
    }
}

fn header_error(e: image::ImageError) -> ThumbnailError {
    ThumbnailError::Header(format!("无法读取动画帧：{}", e))
}

/// 单次变换的参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformOptions {
    pub width: u32,
    pub height: u32,
    pub resize: ResizePolicy,
    pub normalize_orientation: bool,
    pub filter: FilterType,
    pub encode: EncodeOptions,
    /// 输出缓冲容量（字节）。
    pub max_output: usize,
}

impl TransformOptions {
    pub fn new(spec: &ThumbnailSpec, encode: EncodeOptions, max_output: usize) -> Self {
        Self {
            width: spec.width,
            height: spec.height,
            resize: spec.resize,
            normalize_orientation: spec.normalize_orientation,
            filter: spec.filter,
            encode,
            max_output,
        }
    }
}

/// 变换结果摘要，编码字节位于调用方的缓冲中。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOutput {
    pub len: usize,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// 可复用的变换工作状态。
pub struct TransformContext {
    resizer: fr::Resizer,
    max_dimension: u32,
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("max_dimension", &self.max_dimension)
            .finish_non_exhaustive()
    }
}

impl TransformContext {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            resizer: fr::Resizer::new(),
            max_dimension,
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// 解码、校正方向、缩放并编码到 `out`。
    ///
    /// `out` 会先被清空；返回时其内容即为完整的编码结果。
    pub fn transform(
        &mut self,
        decoder: &Decoder<'_>,
        options: &TransformOptions,
        out: &mut Vec<u8>,
    ) -> Result<TransformOutput, ThumbnailError> {
        let (mut image, orientation) = decoder.decode(self.max_dimension)?;

        if options.normalize_orientation && orientation != Orientation::NoTransforms {
            log::debug!("🔄 按 EXIF 方向校正：{:?}", orientation);
            image.apply_orientation(orientation);
        }

        let (src_width, src_height) = image.dimensions();
        let (width, height) = match options.resize {
            ResizePolicy::Fit => fit_within(src_width, src_height, options.width, options.height),
        };

        let preserve_alpha = image.color().has_alpha() && !matches!(options.encode, EncodeOptions::Jpeg { .. });
        let resized = self.resize(&image, width, height, options.filter, preserve_alpha)?;
        drop(image);

        out.clear();
        let mut writer = CappedWriter {
            buf: &mut *out,
            limit: options.max_output,
        };
        Self::encode(&resized, options.encode, &mut writer)?;

        Ok(TransformOutput {
            len: out.len(),
            width,
            height,
            format: options.encode.format(),
        })
    }

    fn resize(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
        filter: FilterType,
        preserve_alpha: bool,
    ) -> Result<DynamicImage, ThumbnailError> {
        let (src_width, src_height) = image.dimensions();
        let (pixels, pixel_type) = if preserve_alpha {
            (image.to_rgba8().into_raw(), fr::PixelType::U8x4)
        } else {
            (image.to_rgb8().into_raw(), fr::PixelType::U8x3)
        };

        let buffer = if (src_width, src_height) == (width, height) {
            pixels
        } else {
            let src_image = fr::images::Image::from_vec_u8(src_width, src_height, pixels, pixel_type)
                .map_err(|e| ThumbnailError::Transform(format!("构建源图像缓冲失败：{}", e)))?;
            let mut dst_image = fr::images::Image::new(width, height, pixel_type);

            let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));
            self.resizer
                .resize(&src_image, &mut dst_image, Some(&options))
                .map_err(|e| ThumbnailError::Transform(format!("fast_image_resize 执行失败：{}", e)))?;

            dst_image.into_vec()
        };

        let resized = if preserve_alpha {
            ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, buffer).map(DynamicImage::ImageRgba8)
        } else {
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
        };

        resized.ok_or_else(|| ThumbnailError::Transform("缩放输出缓冲长度异常".to_string()))
    }

    fn encode(image: &DynamicImage, options: EncodeOptions, writer: &mut CappedWriter<'_>) -> Result<(), ThumbnailError> {
        let result = match options {
            EncodeOptions::Jpeg { quality } => {
                image.write_with_encoder(JpegEncoder::new_with_quality(writer, quality.clamp(1, 100)))
            }
            EncodeOptions::Png { compression } => image.write_with_encoder(PngEncoder::new_with_quality(
                writer,
                png_compression(compression),
                png::FilterType::Adaptive,
            )),
            EncodeOptions::WebP { quality } => return Self::encode_webp(image, quality, writer),
        };

        result.map_err(|e| ThumbnailError::Transform(format!("{:?} 编码失败：{}", options.format(), e)))
    }

    /// `image` 只带无损 WebP 编码器，有损编码交给 libwebp。
    fn encode_webp(image: &DynamicImage, quality: u8, writer: &mut CappedWriter<'_>) -> Result<(), ThumbnailError> {
        let (width, height) = image.dimensions();
        let encoder = match image.color() {
            ColorType::Rgba8 => webp::Encoder::from_rgba(image.as_bytes(), width, height),
            ColorType::Rgb8 => webp::Encoder::from_rgb(image.as_bytes(), width, height),
            other => {
                return Err(ThumbnailError::Transform(format!("WebP 编码不支持像素格式 {:?}", other)));
            }
        };

        let memory = encoder
            .encode_simple(false, f32::from(quality.clamp(1, 100)))
            .map_err(|e| ThumbnailError::Transform(format!("WebP 编码失败：{:?}", e)))?;

        writer
            .write_all(&memory)
            .map_err(|e| ThumbnailError::Transform(format!("WebP 编码失败：{}", e)))
    }
}

/// 等比缩放到 `max_width × max_height` 之内，结果每边至少 1 像素。
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
        return (width.min(max_width).max(1), height.min(max_height).max(1));
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let fitted_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let fitted_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);

    (fitted_width, fitted_height)
}

/// 0~3 快速，4~6 默认，7~9 最佳压缩。
fn png_compression(level: u8) -> png::CompressionType {
    match level {
        0..=3 => png::CompressionType::Fast,
        4..=6 => png::CompressionType::Default,
        _ => png::CompressionType::Best,
    }
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

/// 写满上限即报错的输出缓冲写入器。
struct CappedWriter<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
}

impl Write for CappedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.limit {
            return Err(io::Error::other(format!("编码输出超过缓冲容量 {} 字节", self.limit)));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
