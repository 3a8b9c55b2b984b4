//! 客户端错误分类。
//!
//! ## 角色定位（Why）
//! - Abort 是内部控制流信号，不在本模块的用户可见错误之列（见 [`ConnectorError::Abort`] 与
//!   [`RequestContext::abort_with`](crate::filter::RequestContext::abort_with)）；
//! - 其余失败归入四类：调用失败、客户端已关闭、参数非法、消息处理失败，并与配置/执行器错误一起
//!   暴露稳定的 `code()`。
//!
//! ## 传播策略（What）
//! - 本层不重试、不吞错；阶段或连接器抛出的原因保存在 `source()` 链中；
//! - 过滤器返回的 [`ClientError`] 穿过阶段链后按原样还原，不会被二次包装。

use std::{borrow::Cow, path::PathBuf, time::Duration};

use flare_core::{BoxError, ExecutorError, LifecycleError, StageError};
use thiserror::Error;

use crate::message::ClientResponse;

/// 稳定错误码。
pub mod codes {
    pub const INVOCATION: &str = "client.invocation";
    pub const CLOSED: &str = "client.closed";
    pub const INVALID_ARGUMENT: &str = "client.invalid_argument";
    pub const PROCESSING: &str = "client.processing";
    pub const CONFIGURATION: &str = "client.configuration";
    pub const EXECUTOR: &str = "client.executor";

    pub const CONNECTOR_ABORT: &str = "connector.abort";
    pub const CONNECTOR_TRANSPORT: &str = "connector.transport";
    pub const CONNECTOR_TIMEOUT: &str = "connector.timeout";
    pub const CONNECTOR_CALLBACK_DROPPED: &str = "connector.callback_dropped";
    pub const CONNECTOR_CLOSED: &str = "connector.closed";

    pub const CONFIG_PARSE: &str = "config.parse";
    pub const CONFIG_INVALID: &str = "config.invalid";
    pub const CONFIG_IO: &str = "config.io";
}

/// 面向调用方的客户端错误。
#[derive(Debug, Error)]
pub enum ClientError {
    /// 阶段链或连接器的非 Abort 失败，原始原因保存在 `source()` 中。
    #[error("invocation failed: {message}")]
    Invocation {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
    /// 对已关闭客户端的任何操作。
    #[error("{instance} instance has been closed")]
    Closed { instance: Cow<'static, str> },
    /// 公开入口的必填参数缺失或非法。
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: Cow<'static, str>,
    },
    /// 读取、缓冲或解码实体失败。
    #[error("message processing failed: {message}")]
    Processing {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl ClientError {
    /// 以任意原因构造调用失败，消息取自原因的 `Display`。
    pub fn invocation(cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self::Invocation {
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    pub fn invocation_message(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
            cause: None,
        }
    }

    pub fn processing(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Processing {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn invalid_argument(argument: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Invocation { .. } => codes::INVOCATION,
            ClientError::Closed { .. } => codes::CLOSED,
            ClientError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            ClientError::Processing { .. } => codes::PROCESSING,
            ClientError::Configuration(_) => codes::CONFIGURATION,
            ClientError::Executor(_) => codes::EXECUTOR,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed { .. })
    }
}

impl From<LifecycleError> for ClientError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Closed { instance } => ClientError::Closed { instance },
        }
    }
}

impl From<StageError> for ClientError {
    fn from(err: StageError) -> Self {
        if !err.cause().is_some_and(|cause| cause.is::<ClientError>()) {
            return ClientError::invocation(err);
        }
        match err.into_cause().map(|cause| cause.downcast::<ClientError>()) {
            Some(Ok(client)) => *client,
            Some(Err(cause)) => ClientError::invocation(cause),
            None => ClientError::invocation_message("stage failed without a cause"),
        }
    }
}

impl From<ConnectorError> for ClientError {
    fn from(err: ConnectorError) -> Self {
        ClientError::invocation(err)
    }
}

/// 连接器 SPI 的失败。
///
/// `Abort` 不是失败：它携带替代响应，运行时把它当作响应到达处理。
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("exchange aborted with substitute response {}", .0.status())]
    Abort(Box<ClientResponse>),
    #[error("transport failure on `{connector}`: {message}")]
    Transport {
        connector: String,
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
    #[error("connector `{connector}` timed out after {after:?}")]
    Timeout { connector: String, after: Duration },
    #[error("connector callback was dropped before a response or failure was reported")]
    CallbackDropped,
    #[error("connector `{connector}` has been closed")]
    Closed { connector: String },
}

impl ConnectorError {
    pub fn abort(response: ClientResponse) -> Self {
        ConnectorError::Abort(Box::new(response))
    }

    pub fn transport(connector: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::Transport {
            connector: connector.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::Abort(_) => codes::CONNECTOR_ABORT,
            ConnectorError::Transport { .. } => codes::CONNECTOR_TRANSPORT,
            ConnectorError::Timeout { .. } => codes::CONNECTOR_TIMEOUT,
            ConnectorError::CallbackDropped => codes::CONNECTOR_CALLBACK_DROPPED,
            ConnectorError::Closed { .. } => codes::CONNECTOR_CLOSED,
        }
    }
}

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse client configuration")]
    Parse(#[from] toml::de::Error),
    #[error("invalid client configuration `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: Cow<'static, str>,
    },
    #[error("failed to read client configuration from {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => codes::CONFIG_PARSE,
            ConfigError::Invalid { .. } => codes::CONFIG_INVALID,
            ConfigError::Io { .. } => codes::CONFIG_IO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_core::error::codes as core_codes;
    use std::error::Error as _;

    #[test]
    fn filter_error_survives_the_stage_boundary() {
        let original = ClientError::invalid_argument("header", "must not be empty");
        let through_stage = StageError::failed(original);
        let restored = ClientError::from(through_stage);
        assert_eq!(restored.code(), codes::INVALID_ARGUMENT);
    }

    #[test]
    fn foreign_stage_error_is_wrapped_as_invocation_failure() {
        let stage = StageError::new(core_codes::STAGE_REJECTED, "payload refused");
        let err = ClientError::from(stage);
        assert_eq!(err.code(), codes::INVOCATION);
        let source = err.source().expect("调用失败应保留原因");
        assert!(source.is::<StageError>());
    }

    #[test]
    fn closed_lifecycle_maps_to_closed_client() {
        let err = ClientError::from(LifecycleError::Closed {
            instance: Cow::Borrowed("Client"),
        });
        assert!(err.is_closed());
        assert_eq!(err.to_string(), "Client instance has been closed");
    }
}
