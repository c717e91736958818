//! # 内存虚拟文件
//!
//! 缩略图结果以只读文件的形式交给文件服务层：支持顺序读取、定位、stat，
//! 关闭为空操作，列目录恒为空。数据是独立的 `Bytes`，不再引用任何池化缓冲，
//! 文件活多久都不会影响缓冲池。

use std::io::{self, Read, Seek, SeekFrom};
use std::time::SystemTime;

use bytes::Bytes;

use super::fs::File;

/// 文件元信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Unix 权限位，虚拟文件恒为只读 `0o444`。
    pub mode: u32,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// 内存中的只读文件，克隆时共享底层字节。
#[derive(Debug, Clone)]
pub struct VirtualFile {
    name: String,
    data: Bytes,
    pos: u64,
}

impl VirtualFile {
    pub fn new(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
            pos: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 完整内容，与文件共享同一份字节。
    ///
    /// 不叫 `bytes`，否则引入 `std::io::Read` 后会被 `Read::bytes` 遮蔽。
    pub fn contents(&self) -> Bytes {
        self.data.clone()
    }

    /// 从当前位置开始的剩余内容。
    pub fn remaining(&self) -> Bytes {
        let start = (self.pos as usize).min(self.data.len());
        self.data.slice(start..)
    }
}

impl Read for VirtualFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for VirtualFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "定位到文件开头之前")
        })?;

        self.pos = target;
        Ok(target)
    }
}

impl File for VirtualFile {
    fn stat(&self) -> io::Result<FileInfo> {
        Ok(FileInfo {
            name: self.name.clone(),
            size: self.len(),
            mode: 0o444,
            modified: SystemTime::UNIX_EPOCH,
            is_dir: false,
        })
    }

    fn read_dir(&mut self, _count: usize) -> io::Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
