//! 生命周期注册表：`Open → Closed` 单向状态机。
//!
//! # 教案式导航
//! - **动机（Why）**：客户端关闭时需要通知若干长寿命协作者（连接器、执行器池等），
//!   并保证并发重复调用 `close()` 时通知只发生一次。
//! - **契约（What）**：
//!   - `close()` 以 CAS 把关闭位从 `false` 翻到 `true`，只有完成翻转的线程负责排空监听器；
//!   - 监听器按“后注册先通知”的顺序各通知一次；
//!   - 关闭后任何变更操作（含注册监听器）返回 [`LifecycleError::Closed`]，状态不可逆。
//! - **实现（How）**：注册在持有队列锁时检查关闭位，排空在关闭位翻转之后逐个弹出；
//!   两者通过同一把锁排序，因此与 `close()` 并发的注册要么被排空通知，要么被拒绝，不会丢失。

use std::{
    borrow::Cow,
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;

use crate::error::LifecycleError;

/// 关闭事件监听器。
pub trait LifecycleListener: Send + Sync + 'static {
    fn on_close(&self);
}

impl<F> LifecycleListener for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn on_close(&self) {
        self()
    }
}

/// 生命周期注册表。
pub struct LifecycleRegistry {
    instance: Cow<'static, str>,
    closed: AtomicBool,
    listeners: Mutex<VecDeque<Arc<dyn LifecycleListener>>>,
}

impl LifecycleRegistry {
    /// `instance` 会出现在关闭错误的描述中，例如 `"Client"`。
    pub fn new(instance: impl Into<Cow<'static, str>>) -> Self {
        Self {
            instance: instance.into(),
            closed: AtomicBool::new(false),
            listeners: Mutex::new(VecDeque::new()),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 关闭后返回 [`LifecycleError::Closed`]。
    pub fn ensure_open(&self) -> Result<(), LifecycleError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// 注册监听器。
    pub fn add_listener(&self, listener: impl LifecycleListener) -> Result<(), LifecycleError> {
        self.add_shared_listener(Arc::new(listener))
    }

    pub fn add_shared_listener(
        &self,
        listener: Arc<dyn LifecycleListener>,
    ) -> Result<(), LifecycleError> {
        let mut listeners = self.listeners.lock();
        if self.is_closed() {
            return Err(self.closed_error());
        }
        listeners.push_front(listener);
        Ok(())
    }

    /// 关闭并通知监听器。
    ///
    /// 返回 `true` 表示本次调用完成了 `Open → Closed` 翻转；其余调用均为空操作并返回 `false`。
    /// 单个监听器 panic 会被记录，不影响其余监听器收到通知。
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tracing::info!(instance = %self.instance, "closing instance");

        let mut notified = 0usize;
        loop {
            let next = self.listeners.lock().pop_front();
            let Some(listener) = next else {
                break;
            };
            notified += 1;
            if panic::catch_unwind(AssertUnwindSafe(|| listener.on_close())).is_err() {
                tracing::error!(instance = %self.instance, "lifecycle listener panicked during close");
            }
        }
        tracing::debug!(instance = %self.instance, notified, "lifecycle listeners drained");
        true
    }

    /// 尚未通知的监听器数量。
    pub fn pending_listeners(&self) -> usize {
        self.listeners.lock().len()
    }

    fn closed_error(&self) -> LifecycleError {
        LifecycleError::Closed {
            instance: self.instance.clone(),
        }
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("instance", &self.instance)
            .field("closed", &self.is_closed())
            .field("pending_listeners", &self.pending_listeners())
            .finish()
    }
}
