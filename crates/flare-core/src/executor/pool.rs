use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle, ThreadId},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use super::{Executor, RejectedTask, Task};
use crate::error::ExecutorError;

/// 固定尺寸的线程池执行器。
///
/// # 教案级说明
///
/// ## 意图 (Why)
/// - 为请求侧/响应侧两种角色提供默认池，线程带名称前缀，便于在日志与线程转储中区分角色；
///
/// ## 解析逻辑 (How)
/// - 工作线程共享一个 `crossbeam-channel` 无界队列，逐个取任务执行；
/// - 单个任务 panic 被 `catch_unwind` 捕获并记录，工作线程继续服务后续任务；
/// - `shutdown` 丢弃发送端：已入队任务仍会被执行完，随后工作线程自然退出并被 join。
///
/// ## 契约 (What)
/// - `threads` 必须大于零，否则返回 [`ExecutorError::InvalidSize`]；
/// - 关闭后提交的任务通过 [`RejectedTask`] 原样归还；
/// - 在工作线程内部调用 `shutdown` 不会 join 自身，避免自锁。
pub struct ThreadPoolExecutor {
    name: String,
    sender: RwLock<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
}

impl ThreadPoolExecutor {
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self, ExecutorError> {
        let name = name.into();
        if threads == 0 {
            return Err(ExecutorError::InvalidSize { executor: name });
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let pool = name.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&pool, receiver))
                .map_err(|source| ExecutorError::Spawn {
                    executor: name.clone(),
                    source,
                })?;
            workers.push(handle);
        }
        let worker_ids = workers.iter().map(|handle| handle.thread().id()).collect();
        tracing::debug!(executor = %name, threads, "thread pool started");

        Ok(Self {
            name,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            worker_ids,
        })
    }

    pub fn threads(&self) -> usize {
        self.worker_ids.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.read().is_none()
    }
}

fn worker_loop(pool: &str, receiver: Receiver<Task>) {
    for task in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(executor = %pool, "task panicked; worker keeps running");
        }
    }
    tracing::trace!(executor = %pool, "worker exiting");
}

impl Executor for ThreadPoolExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(sender) => sender
                .send(task)
                .map_err(|rejected| RejectedTask::new(self.name.clone(), rejected.into_inner())),
            None => Err(RejectedTask::new(self.name.clone(), task)),
        }
    }

    fn shutdown(&self) {
        if self.sender.write().take().is_none() {
            return;
        }
        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(executor = %self.name, "worker terminated abnormally");
            }
        }
        tracing::debug!(executor = %self.name, "thread pool shut down");
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("name", &self.name)
            .field("threads", &self.threads())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
