//! # 缩略图服务 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                HTTP 客户端 / 浏览器 / CDN                 │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ GET|HEAD /thumb/{name}（错误统一 404）
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ server ───── axum 路由 + Range + Content-Type 嗅探     │
//! │  │                                                       │
//! │  ├─ thumbnail ── ThumbnailFileSystem                     │
//! │  │   ├─ source        本地目录 / 远程源站（体积 + 类型校验）│
//! │  │   ├─ processor     输出缓冲池 + 变换上下文池          │
//! │  │   ├─ codec         解码 · 方向校正 · 缩放 · 编码       │
//! │  │   └─ virtual_file  内存只读文件                        │
//! │  │                                                       │
//! │  ├─ pool ─────── 定容资源池 + RAII 归还                    │
//! │  ├─ config ───── CLI / 环境变量 → Settings                │
//! │  └─ error ────── AppError (统一错误类型)                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，所有 handler 的返回类型 |
//! | [`config`] | 启动参数解析、范围校验、组装文件系统 |
//! | [`pool`] | 固定容量资源池，借出即独占，任何退出路径都会归还 |
//! | [`thumbnail`] | 原图读取、缩略图生成、虚拟文件 |
//! | [`server`] | HTTP 路由与文件响应 |

pub mod config;
pub mod error;
pub mod pool;
pub mod server;
pub mod thumbnail;
