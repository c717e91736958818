//! # 缩略图模块（thumbnail）
//!
//! ## 设计思路
//!
//! 该模块把“按名称读取原图 → 生成缩略图 → 以只读文件交付”拆分为多个子模块：
//!
//! - `source/local/remote`：图片来源（本地目录或远程源站）与中间数据模型
//! - `codec`：解码、头部读取、缩放与编码
//! - `processor`：借用池化资源并驱动编解码
//! - `virtual_file`：内存只读文件
//! - `fs`：文件系统适配层，服务层唯一的入口
//! - `config/error`：配置与错误
//!
//! ## 新同事快速上手
//!
//! ```text
//! HTTP /thumb/{name}
//!    ↓
//! fs.rs（ThumbnailFileSystem::open + 阶段耗时日志）
//!    ├─ source.rs → local.rs / remote.rs（体积上限 + 类型校验）
//!    └─ processor.rs（输出缓冲池 + 变换上下文池）
//!          └─ codec.rs（解码 → 方向校正 → 缩放 → 编码）
//!    ↓
//! VirtualFile（只读，数据与资源池无关联）
//! ```
//!
//! ## 分层职责建议
//!
//! - 输出尺寸与编码参数优先改 `config.rs`
//! - 来源的校验规则分别改 `local.rs` / `remote.rs`
//! - 编解码行为改 `codec.rs`，资源借用顺序改 `processor.rs`

mod codec;
mod config;
mod error;
mod fs;
mod local;
mod processor;
mod remote;
mod source;
mod virtual_file;

pub use codec::{Decoder, ImageHeader, TransformContext, TransformOptions, TransformOutput, fit_within};
pub use config::{EncodeOptions, ResizePolicy, ThumbnailConfig, ThumbnailSpec};
pub use error::ThumbnailError;
pub use fs::{File, FileSystem, ThumbnailFileSystem};
pub use local::LocalImageSource;
pub use processor::ThumbnailProcessor;
pub use remote::RemoteImageSource;
pub use source::{ImageSource, RawImage};
pub use virtual_file::{FileInfo, VirtualFile};

pub(crate) use source::{extension_of, sniff_mime};
