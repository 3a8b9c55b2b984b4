//! 异步执行器选择。
//!
//! 每个异步请求涉及两种角色：请求侧执行器运行请求链并派发连接器，响应侧执行器运行响应链并投递回调。
//! 默认使用客户端级的两个池；请求上的 [`RequestingExecutor`] / [`RespondingExecutor`] 属性优先。

use std::{fmt, sync::Arc};

use flare_core::{ExecutorRef, InlineExecutor, ThreadPoolExecutor};

use crate::{config::AsyncSettings, error::ClientError, message::ClientRequest};

/// 请求级覆写：运行请求链与连接器派发的执行器。
#[derive(Clone)]
pub struct RequestingExecutor(pub ExecutorRef);

/// 请求级覆写：运行响应链与回调投递的执行器。
#[derive(Clone)]
pub struct RespondingExecutor(pub ExecutorRef);

/// 默认执行器对与按请求选择逻辑。
#[derive(Clone)]
pub struct AsyncExecutors {
    requesting: ExecutorRef,
    responding: ExecutorRef,
}

impl AsyncExecutors {
    pub fn new(requesting: ExecutorRef, responding: ExecutorRef) -> Self {
        Self {
            requesting,
            responding,
        }
    }

    /// 两种角色共用同一个执行器。
    pub fn shared(executor: ExecutorRef) -> Self {
        Self::new(Arc::clone(&executor), executor)
    }

    /// 两种角色都在提交线程上执行。
    pub fn inline() -> Self {
        Self::shared(Arc::new(InlineExecutor))
    }

    /// 按配置创建两个命名线程池：`<prefix>-requesting-N` 与 `<prefix>-responding-N`。
    pub fn from_settings(settings: &AsyncSettings) -> Result<Self, ClientError> {
        let prefix = settings.thread_name_prefix.as_str();
        let requesting = ThreadPoolExecutor::new(
            format!("{prefix}-requesting"),
            settings.requesting_threads,
        )?;
        let responding = ThreadPoolExecutor::new(
            format!("{prefix}-responding"),
            settings.responding_threads,
        )?;
        Ok(Self::new(Arc::new(requesting), Arc::new(responding)))
    }

    pub fn requesting_for(&self, request: &ClientRequest) -> ExecutorRef {
        request
            .attributes()
            .get::<RequestingExecutor>()
            .map(|choice| Arc::clone(&choice.0))
            .unwrap_or_else(|| Arc::clone(&self.requesting))
    }

    pub fn responding_for(&self, request: &ClientRequest) -> ExecutorRef {
        request
            .attributes()
            .get::<RespondingExecutor>()
            .map(|choice| Arc::clone(&choice.0))
            .unwrap_or_else(|| Arc::clone(&self.responding))
    }

    /// 停止默认池接收新任务，已入队任务执行完毕后返回。
    pub fn shutdown(&self) {
        self.requesting.shutdown();
        self.responding.shutdown();
    }
}

impl Default for AsyncExecutors {
    fn default() -> Self {
        Self::inline()
    }
}

impl fmt::Debug for AsyncExecutors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncExecutors")
            .field("requesting", &self.requesting.name())
            .field("responding", &self.responding.name())
            .finish()
    }
}
