//! # 定容资源池模块
//!
//! ## 设计思路
//!
//! 缩略图链路中有三类“昂贵且可复用”的资源：输出缓冲、变换上下文、嗅探缓冲。
//! 它们都遵循同一规则：启动时一次性分配、请求独占借出、任何退出路径都必须归还。
//! 池容量即并发变换的上限；资源全部借出后，新请求在 `acquire` 处挂起等待，
//! 而不是临时分配新资源，从而把内存占用限制在固定范围内。
//!
//! ## 实现思路
//!
//! - `Semaphore` 负责计数与挂起唤醒，`Mutex<Vec<T>>` 负责存放空闲资源。
//! - `Pooled<T>` 是 RAII 守卫：`Drop` 时先把资源放回池中，再释放许可，
//!   保证正常返回、`?` 提前返回与 panic 展开都会归还且只归还一次。
//! - 池由调用方显式构造并注入，测试可以创建容量为 1 的池来制造竞争。
//! - `close()` 用于进程关停：唤醒所有等待者并返回 `PoolError::Closed`。

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 资源池错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// 资源池已关闭（仅在进程关停时出现）。
    #[error("资源池已关闭")]
    Closed,

    /// 持有许可却取不到资源，说明计数与存量失配。
    #[error("资源池计数异常：持有许可但没有空闲资源")]
    Exhausted,
}

struct PoolInner<T> {
    name: &'static str,
    capacity: usize,
    idle: Mutex<Vec<T>>,
    permits: Arc<Semaphore>,
}

/// 固定容量的可复用资源池。
///
/// 克隆只增加引用计数，所有克隆共享同一批资源。
pub struct ResourcePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl<T> ResourcePool<T> {
    /// 用一组预先构造好的资源创建池，容量等于资源数量。
    pub fn new(name: &'static str, items: Vec<T>) -> Self {
        let capacity = items.len();
        Self {
            inner: Arc::new(PoolInner {
                name,
                capacity,
                idle: Mutex::new(items),
                permits: Arc::new(Semaphore::new(capacity)),
            }),
        }
    }

    /// 调用 `factory` 预填充 `capacity` 个资源。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use thumbnail_server::pool::ResourcePool;
    ///
    /// let pool = ResourcePool::filled("scratch", 5, || Vec::<u8>::with_capacity(512));
    /// assert_eq!(pool.available(), 5);
    /// ```
    pub fn filled<F>(name: &'static str, capacity: usize, mut factory: F) -> Self
    where
        F: FnMut() -> T,
    {
        let items = (0..capacity).map(|_| factory()).collect();
        let pool = Self::new(name, items);
        log::debug!("🧰 资源池已就绪 - {} 容量: {}", name, capacity);
        pool
    }

    /// 借出一个资源；没有空闲资源时挂起当前任务直到有资源归还。
    pub async fn acquire(&self) -> Result<Pooled<T>, PoolError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let item = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(PoolError::Exhausted)?;

        Ok(Pooled {
            pool: Arc::clone(&self.inner),
            item: Some(item),
            _permit: permit,
        })
    }

    /// 池的固定容量。
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// 当前空闲资源数量。
    pub fn available(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 关闭资源池，正在等待与之后的 `acquire` 都会得到 `PoolError::Closed`。
    ///
    /// 已借出的资源仍可正常使用与归还。
    pub fn close(&self) {
        if !self.inner.permits.is_closed() {
            log::info!("🛑 关闭资源池 - {}", self.inner.name);
            self.inner.permits.close();
        }
    }
}

/// 借出资源的 RAII 守卫。
///
/// 离开作用域时自动归还资源与许可。
pub struct Pooled<T> {
    pool: Arc<PoolInner<T>>,
    item: Option<T>,
    // Drop::drop 先放回资源，字段析构时才释放许可
    _permit: OwnedSemaphorePermit,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // 只有 Drop 会取走资源
        match self.item.as_ref() {
            Some(item) => item,
            None => unreachable!("pooled resource taken before drop"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.item.as_mut() {
            Some(item) => item,
            None => unreachable!("pooled resource taken before drop"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(item);
        }
    }
}
