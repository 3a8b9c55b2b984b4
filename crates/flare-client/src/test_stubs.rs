//! 内存连接器测试桩。
//!
//! # 设计定位（Why）
//! - 流水线测试只关心阶段顺序、作用域与回调语义，不需要真实网络；
//! - 集中提供几种行为固定的连接器，测试无需各自重复定义。
//!
//! # 契约说明（What）
//! - 这些连接器只用于测试与示例，不做任何 I/O；
//! - 每个连接器都记录调用次数，便于断言“连接器从未被调用”之类的性质。

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use crate::{
    connector::{Connector, ConnectorCallback},
    error::ConnectorError,
    message::{ClientRequest, ClientResponse, StatusCode},
};

/// 以 200 回显请求实体的连接器。
///
/// `threaded()` 构造的实例在独立线程上报告异步结果，模拟真实传输的回调线程。
#[derive(Debug, Default)]
pub struct EchoConnector {
    calls: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
    threaded: bool,
}

impl EchoConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threaded() -> Self {
        Self {
            threaded: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connector for EchoConnector {
    fn name(&self) -> &str {
        "echo"
    }

    fn apply(&self, mut request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::Closed {
                connector: self.name().to_owned(),
            });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = ClientResponse::new(StatusCode::OK).with_entity(request.take_entity());
        if let Some(content_type) = request.headers().get("Content-Type") {
            response.headers_mut().insert("Content-Type", content_type);
        }
        Ok(response)
    }

    fn apply_async(&self, request: ClientRequest, callback: ConnectorCallback) {
        let outcome = self.apply(request);
        if !self.threaded {
            callback.complete(outcome);
            return;
        }
        let spawned = thread::Builder::new()
            .name("echo-connector".to_owned())
            .spawn(move || callback.complete(outcome));
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "echo connector could not spawn its callback thread");
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// 总是以传输错误失败的连接器。
#[derive(Debug, Default)]
pub struct FailingConnector {
    calls: AtomicUsize,
}

impl FailingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for FailingConnector {
    fn name(&self) -> &str {
        "failing"
    }

    fn apply(&self, _request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConnectorError::transport(self.name(), "connection reset by peer"))
    }
}

/// 接收异步请求后丢弃回调、从不报告结果的连接器。
#[derive(Debug, Default)]
pub struct DroppingConnector {
    calls: AtomicUsize,
}

impl DroppingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for DroppingConnector {
    fn name(&self) -> &str {
        "dropping"
    }

    fn apply(&self, _request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConnectorError::transport(self.name(), "no response"))
    }

    fn apply_async(&self, _request: ClientRequest, callback: ConnectorCallback) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        drop(callback);
    }
}

/// 以闭包实现交换逻辑的连接器。
pub struct FnConnector<F> {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    exchange: F,
}

impl<F> FnConnector<F>
where
    F: Fn(ClientRequest) -> Result<ClientResponse, ConnectorError> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, exchange: F) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
            exchange,
        }
    }

    /// 共享的调用计数，连接器移交给客户端后仍可观察。
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl<F> Connector for FnConnector<F>
where
    F: Fn(ClientRequest) -> Result<ClientResponse, ConnectorError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.exchange)(request)
    }
}
