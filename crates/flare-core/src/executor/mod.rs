//! 执行器契约。
//!
//! ## 契约声明
//! * **两种角色：** 每个异步请求涉及“请求侧”执行器（请求链 + 连接器派发）与“响应侧”执行器（响应链 + 回调投递），
//!   两者可以是同一个池，也可以按请求单独覆写；本模块只定义两者共用的最小调度接口。
//! * **拒绝即归还：** 执行器拒绝任务时通过 [`RejectedTask`] 把任务原样交还，调用方可以据此完成补偿（例如投递失败回调），
//!   被拒任务一旦被丢弃，其捕获的资源随之析构。
//! * **无阻塞提交：** `execute` 只负责入队，不等待任务完成。

use std::fmt;
use std::sync::Arc;

use crate::error::ExecutorError;

mod pool;
#[cfg(feature = "runtime-tokio")]
mod tokio;

pub use pool::ThreadPoolExecutor;
#[cfg(feature = "runtime-tokio")]
pub use self::tokio::TokioExecutor;

/// 可跨线程移交的一次性任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 共享执行器引用。
pub type ExecutorRef = Arc<dyn Executor>;

/// 任务调度契约。
pub trait Executor: Send + Sync + 'static {
    /// 稳定名称，出现在日志与拒绝错误中。
    fn name(&self) -> &str;

    /// 提交任务；被拒绝时归还任务。
    fn execute(&self, task: Task) -> Result<(), RejectedTask>;

    /// 停止接收新任务。默认空操作，适用于不持有线程的执行器。
    fn shutdown(&self) {}
}

/// 被拒绝的任务及拒绝原因。
pub struct RejectedTask {
    error: ExecutorError,
    task: Task,
}

impl RejectedTask {
    pub fn new(executor: impl Into<String>, task: Task) -> Self {
        Self {
            error: ExecutorError::Rejected {
                executor: executor.into(),
            },
            task,
        }
    }

    pub fn error(&self) -> &ExecutorError {
        &self.error
    }

    /// 拆分为拒绝原因与原任务。
    pub fn into_parts(self) -> (ExecutorError, Task) {
        (self.error, self.task)
    }
}

impl fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedTask")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

/// 在提交线程上直接执行任务。
///
/// 适合测试与同步适配场景；请求侧与响应侧都使用它时，整条异步路径退化为调用线程上的同步执行
/// （连接器回调线程除外）。
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn name(&self) -> &str {
        "inline"
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        task();
        Ok(())
    }
}
