//! 连接器 SPI：运行时与网络传输之间的不透明边界。
//!
//! # 契约说明（What）
//! - `apply`：阻塞式交换，调用线程等待 I/O 完成；
//! - `apply_async`：立即返回，结果通过 [`ConnectorCallback`] 在任意线程上报告；
//! - `close`：释放传输资源，由客户端关闭时的生命周期监听器调用。
//!
//! 任何满足此契约的传输（HTTP/1.1、HTTP/2、内存测试桩）均可接入。

use std::{fmt, sync::Arc};

use crate::{
    error::ConnectorError,
    message::{ClientRequest, ClientResponse},
};

/// 共享连接器引用。
pub type ConnectorRef = Arc<dyn Connector>;

/// 传输连接器。
pub trait Connector: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// 阻塞式交换。
    fn apply(&self, request: ClientRequest) -> Result<ClientResponse, ConnectorError>;

    /// 异步交换。默认实现在调用线程上执行阻塞交换后立即回调。
    fn apply_async(&self, request: ClientRequest, callback: ConnectorCallback) {
        callback.complete(self.apply(request));
    }

    fn close(&self) {}
}

type Continuation = Box<dyn FnOnce(Result<ClientResponse, ConnectorError>) + Send + 'static>;

/// 异步交换的成功/失败两个延续，合并为一个一次性值。
///
/// # 教案级说明
/// - **互斥且至多一次**：[`Self::response`] 与 [`Self::failure`] 都按值消费回调，编译期即保证只能触发其一，且只触发一次；
/// - **不丢失**：连接器若在未触发的情况下丢弃回调，`Drop` 会以 [`ConnectorError::CallbackDropped`]
///   走失败路径，使终态回调与作用域释放仍然恰好发生一次。
pub struct ConnectorCallback {
    continuation: Option<Continuation>,
}

impl ConnectorCallback {
    pub fn new<F>(continuation: F) -> Self
    where
        F: FnOnce(Result<ClientResponse, ConnectorError>) + Send + 'static,
    {
        Self {
            continuation: Some(Box::new(continuation)),
        }
    }

    /// 报告响应到达。
    pub fn response(self, response: ClientResponse) {
        self.complete(Ok(response));
    }

    /// 报告交换失败；[`ConnectorError::Abort`] 携带的替代响应按响应到达处理。
    pub fn failure(self, error: ConnectorError) {
        self.complete(Err(error));
    }

    /// 以 `Result` 形式报告终态。
    pub fn complete(mut self, outcome: Result<ClientResponse, ConnectorError>) {
        self.fire(outcome);
    }

    fn fire(&mut self, outcome: Result<ClientResponse, ConnectorError>) {
        if let Some(continuation) = self.continuation.take() {
            continuation(outcome);
        }
    }
}

impl Drop for ConnectorCallback {
    fn drop(&mut self) {
        if self.continuation.is_some() {
            tracing::warn!("connector dropped its callback without reporting an outcome");
            self.fire(Err(ConnectorError::CallbackDropped));
        }
    }
}

impl fmt::Debug for ConnectorCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorCallback")
            .field("pending", &self.continuation.is_some())
            .finish()
    }
}
