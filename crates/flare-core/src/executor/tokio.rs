use tokio::runtime::Handle;

use super::{Executor, RejectedTask, Task};

/// 基于 Tokio 阻塞线程池的执行器适配。
///
/// 阶段与回调都是同步代码，因此投递到 `spawn_blocking` 而不是异步工作线程，避免阻塞 reactor。
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    name: String,
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// 绑定到当前所在的 Tokio 运行时；不在运行时上下文中时返回 `None`。
    pub fn current(name: impl Into<String>) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|handle| Self::new(name, handle))
    }
}

impl Executor for TokioExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
