//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为阶段链、作用域、生命周期与执行器的失败路径提供集中定义；
//! - 每个错误都暴露稳定的 `code()`，沿用 `<域>.<语义>` 命名，便于日志与告警按码值聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `?` 与 `std::error::Error` 生态；
//! - 底层原因统一以 [`BoxError`] 保存，`source()` 暴露完整链路。

use std::borrow::Cow;

use thiserror::Error;

/// 线程安全的类型擦除错误，作为各错误的底层原因载体。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 稳定错误码。
pub mod codes {
    /// 阶段执行失败（非 Abort 的控制流异常）。
    pub const STAGE_FAILED: &str = "stage.failed";
    /// 阶段拒绝了输入载荷。
    pub const STAGE_REJECTED: &str = "stage.rejected";
    /// 链构建期检测到重复注册（即环）。
    pub const CHAIN_DUPLICATE: &str = "chain.duplicate_stage";
    /// 生命周期已关闭。
    pub const LIFECYCLE_CLOSED: &str = "lifecycle.closed";
    /// 执行器拒绝任务。
    pub const EXECUTOR_REJECTED: &str = "executor.rejected";
    /// 执行器配置非法。
    pub const EXECUTOR_INVALID: &str = "executor.invalid_config";
    /// 执行器线程创建失败。
    pub const EXECUTOR_SPAWN: &str = "executor.spawn_failed";
}

/// `StageError` 表示阶段在 Abort 信号之外的硬失败。
///
/// # 教案式说明
/// - **意图 (Why)**：阶段链不做重试，也不吞错；任何非 Abort 的失败都应携带原因冒泡到运行时，
///   由运行时统一包装为调用失败。
/// - **契约 (What)**：`code` 为稳定码值，`message` 面向排障人员，`cause` 可选保留底层错误。
/// - **风险 (Trade-offs)**：消息使用 `Cow`，静态文本零分配，动态文本付出一次堆分配。
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct StageError {
    code: &'static str,
    message: Cow<'static, str>,
    #[source]
    cause: Option<BoxError>,
}

impl StageError {
    /// 构造不带底层原因的阶段错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 以 [`codes::STAGE_FAILED`] 包装任意底层错误。
    pub fn failed(cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self {
            code: codes::STAGE_FAILED,
            message: Cow::Owned(cause.to_string()),
            cause: Some(cause),
        }
    }

    /// 附加底层原因。
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// 取出底层原因，供上层把自身的错误类型从阶段错误中还原出来。
    pub fn into_cause(self) -> Option<BoxError> {
        self.cause
    }
}

/// 链构建期错误。
///
/// 同一个阶段实例被注册两次会让单向链表首尾相接，因此在构建时直接拒绝，而不是留到运行期死循环。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("stage `{label}` is already part of the chain; linking it again would form a cycle")]
    DuplicateStage { label: String },
}

impl ChainError {
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::DuplicateStage { .. } => codes::CHAIN_DUPLICATE,
        }
    }
}

/// 生命周期错误：对已关闭实例执行变更操作。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{instance} instance has been closed")]
    Closed { instance: Cow<'static, str> },
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Closed { .. } => codes::LIFECYCLE_CLOSED,
        }
    }
}

/// 执行器错误。
///
/// - `Rejected`：执行器已关闭或队列断开，任务未被接收；
/// - `InvalidSize`：线程池尺寸为零；
/// - `Spawn`：操作系统拒绝创建工作线程。
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor `{executor}` rejected the task: it has been shut down")]
    Rejected { executor: String },
    #[error("executor `{executor}` requires at least one worker thread")]
    InvalidSize { executor: String },
    #[error("executor `{executor}` failed to spawn a worker thread")]
    Spawn {
        executor: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutorError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::Rejected { .. } => codes::EXECUTOR_REJECTED,
            ExecutorError::InvalidSize { .. } => codes::EXECUTOR_INVALID,
            ExecutorError::Spawn { .. } => codes::EXECUTOR_SPAWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn stage_error_exposes_cause_chain() {
        let io = std::io::Error::other("disk unplugged");
        let err = StageError::failed(io);
        assert_eq!(err.code(), codes::STAGE_FAILED);
        assert_eq!(err.message(), "disk unplugged");
        assert!(err.source().is_some(), "failed() 应保留底层原因");
    }

    #[test]
    fn lifecycle_error_names_instance() {
        let err = LifecycleError::Closed {
            instance: Cow::Borrowed("Client"),
        };
        assert_eq!(err.to_string(), "Client instance has been closed");
        assert_eq!(err.code(), codes::LIFECYCLE_CLOSED);
    }
}
