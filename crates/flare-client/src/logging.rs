//! 日志初始化。
//!
//! 库代码只通过 `tracing` 发出事件；是否以及如何输出由应用决定。`install` 为常见场景提供一键初始化：
//! `fmt` 输出 + `EnvFilter`，过滤规则取自 `RUST_LOG`，缺省为 `info`。

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

/// 日志初始化错误。
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("a global tracing subscriber has already been installed")]
    SubscriberAlreadySet,
    #[error("failed to install the global tracing subscriber")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装全局 `tracing` 订阅者。
///
/// 进程内已有全局订阅者时返回 [`LoggingError::SubscriberAlreadySet`]，不会覆盖。
pub fn install() -> Result<(), LoggingError> {
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter())
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
