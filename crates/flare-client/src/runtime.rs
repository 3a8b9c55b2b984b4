//! 请求/响应处理运行时。
//!
//! # 教案式导航
//! - **职责（What）**：持有请求链根、响应链根、连接器、作用域管理器与执行器选择器，
//!   驱动一次调用从请求载荷走到响应或失败。构造后不可变，可被任意多个并发调用共享。
//! - **同步路径（How）**：调用线程依次执行请求链、连接器阻塞交换、响应链。请求链 Abort 时跳过连接器，
//!   响应链改为处理替代响应。调用方必须提供活跃的作用域实例。
//! - **异步路径（How）**：
//!   1. 在请求侧执行器上、新建的作用域实例内执行请求链；
//!   2. 请求任务把作用域实例的创建引用移交给连接器回调，连接器在 `apply_async` 中停留多久都不再持有作用域；
//!   3. 响应到达（或连接器以 Abort 携带替代响应）后，在响应侧执行器上、同一作用域实例内执行响应链并投递 `completed`；
//!   4. 其它失败包装为调用失败投递 `failed`。每条退出路径都通过句柄的所有权释放作用域引用。
//! - **终态保证**：回调存放在 [`Delivery`] 的一次性槽位中，`completed` 与 `failed` 互斥且至多一次；
//!   若所有持有者都在投递前被丢弃（任务 panic、执行器丢弃任务），槽位的 `Drop` 兜底投递 `failed`，
//!   因此每次提交恰好收到一次终态回调。

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use flare_core::{ChainOutcome, ExecutorRef, RequestScope, ScopeInstance, StageRef, Task, run_chain};
use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::{
    callback::ResponseCallback,
    connector::{ConnectorCallback, ConnectorRef},
    error::{ClientError, ConnectorError},
    executors::AsyncExecutors,
    message::{ClientRequest, ClientResponse},
    providers::Providers,
    stages::CurrentRequest,
};

/// 请求链根阶段。
pub type RequestRoot = StageRef<ClientRequest, ClientResponse>;
/// 响应链根阶段；响应链中的 Abort 视为调用失败。
pub type ResponseRoot = StageRef<ClientResponse, ClientResponse>;

/// 客户端请求处理运行时。克隆共享同一份不可变状态。
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    request_root: RequestRoot,
    response_root: ResponseRoot,
    connector: ConnectorRef,
    scope: RequestScope,
    executors: AsyncExecutors,
}

impl Runtime {
    pub fn new(
        connector: ConnectorRef,
        request_root: RequestRoot,
        response_root: ResponseRoot,
        scope: RequestScope,
        executors: AsyncExecutors,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                request_root,
                response_root,
                connector,
                scope,
                executors,
            }),
        }
    }

    /// 以注册表装配两条链。
    pub fn from_providers(
        connector: ConnectorRef,
        providers: &Providers,
        scope: RequestScope,
        executors: AsyncExecutors,
    ) -> Self {
        Self::new(
            connector,
            providers.request_chain(),
            providers.response_chain(),
            scope,
            executors,
        )
    }

    /// 在调用线程上同步执行一次调用。
    ///
    /// 本方法不会自行创建作用域实例：`scope` 必须是调用方已激活的实例，
    /// 可通过 [`Self::request_scope`] 创建。非 Abort 的失败统一包装为 [`ClientError::Invocation`]，
    /// 过滤器返回的 [`ClientError`] 原样传出。
    pub fn invoke(&self, scope: &ScopeInstance, request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let response = match run_chain(scope, request, &self.inner.request_root)? {
            ChainOutcome::Completed(request) => {
                scope.bind(CurrentRequest::new(request.head()));
                tracing::debug!(
                    scope.id = %scope.id(),
                    connector = %self.inner.connector.name(),
                    method = %request.method(),
                    uri = %request.uri(),
                    "dispatching request"
                );
                match self.inner.connector.apply(request) {
                    Ok(response) => response,
                    Err(ConnectorError::Abort(substitute)) => *substitute,
                    Err(err) => return Err(err.into()),
                }
            }
            ChainOutcome::Aborted(substitute) => {
                tracing::debug!(scope.id = %scope.id(), status = %substitute.status(), "request chain aborted");
                substitute
            }
        };
        self.inner.process_response(scope, response)
    }

    /// 异步提交一次调用。
    ///
    /// 立即返回；`callback` 恰好收到一次 `completed` 或 `failed`。
    pub fn submit(&self, request: ClientRequest, callback: impl ResponseCallback) {
        self.submit_boxed(request, Box::new(callback));
    }

    pub fn submit_boxed(&self, request: ClientRequest, callback: Box<dyn ResponseCallback>) {
        let requesting = self.inner.executors.requesting_for(&request);
        let responding = self.inner.executors.responding_for(&request);
        let delivery = Delivery::new(callback);
        let instance = self.inner.scope.create_instance();
        tracing::trace!(
            scope.id = %instance.id(),
            executor = %requesting.name(),
            "submitting request"
        );

        let inner = Arc::clone(&self.inner);
        let task_delivery = Arc::clone(&delivery);
        let task: Task = Box::new(move || inner.request_phase(instance, request, responding, task_delivery));
        if let Err(rejected) = requesting.execute(task) {
            let (error, task) = rejected.into_parts();
            drop(task);
            tracing::warn!(code = error.code(), "requesting executor rejected the submission");
            delivery.fail(ClientError::from(error));
        }
    }

    /// 异步提交并以 `Future` 形式等待结果。
    pub fn submit_future(&self, request: ClientRequest) -> ResponseFuture {
        let (callback, future) = response_channel();
        self.submit(request, callback);
        future
    }

    pub fn request_scope(&self) -> &RequestScope {
        &self.inner.scope
    }

    pub fn connector(&self) -> &ConnectorRef {
        &self.inner.connector
    }

    pub fn executors(&self) -> &AsyncExecutors {
        &self.inner.executors
    }

    /// 关闭连接器。本层不做去重，去重由客户端的生命周期标志负责。
    pub fn close(&self) {
        tracing::debug!(connector = %self.inner.connector.name(), "closing connector");
        self.inner.connector.close();
    }
}

impl RuntimeInner {
    /// 请求侧任务：持有 `instance` 的创建引用。
    ///
    /// 派发连接器时该引用随回调移交给响应侧，连接器在 `apply_async` 中报告结果后无论停留多久，
    /// 作用域都在终态回调返回后立即释放。
    fn request_phase(
        self: Arc<Self>,
        instance: ScopeInstance,
        request: ClientRequest,
        responding: ExecutorRef,
        delivery: Arc<Delivery>,
    ) {
        let outcome = match run_chain(&instance, request, &self.request_root) {
            Ok(outcome) => outcome,
            Err(err) => {
                delivery.fail(err.into());
                return;
            }
        };
        match outcome {
            ChainOutcome::Aborted(substitute) => {
                tracing::debug!(scope.id = %instance.id(), status = %substitute.status(), "request chain aborted");
                self.respond(&responding, instance, substitute, delivery);
            }
            ChainOutcome::Completed(request) => {
                instance.bind(CurrentRequest::new(request.head()));
                tracing::debug!(
                    scope.id = %instance.id(),
                    connector = %self.connector.name(),
                    method = %request.method(),
                    uri = %request.uri(),
                    "dispatching request asynchronously"
                );
                let inner = Arc::clone(&self);
                let callback = ConnectorCallback::new(move |outcome| match outcome {
                    Ok(response) => inner.respond(&responding, instance, response, delivery),
                    Err(ConnectorError::Abort(substitute)) => {
                        tracing::debug!(scope.id = %instance.id(), "connector aborted with a substitute response");
                        inner.respond(&responding, instance, *substitute, delivery);
                    }
                    Err(err) => {
                        tracing::debug!(scope.id = %instance.id(), code = err.code(), "connector reported a failure");
                        delivery.fail(err.into());
                        instance.release();
                    }
                });
                self.connector.apply_async(request, callback);
            }
        }
    }

    /// 把响应链与 `completed` 投递调度到响应侧执行器，`instance` 在任务结束时释放。
    fn respond(
        self: &Arc<Self>,
        responding: &ExecutorRef,
        instance: ScopeInstance,
        response: ClientResponse,
        delivery: Arc<Delivery>,
    ) {
        let inner = Arc::clone(self);
        let fallback = Arc::clone(&delivery);
        let task: Task = Box::new(move || {
            match inner.process_response(&instance, response) {
                Ok(response) => delivery.complete(response, &instance),
                Err(err) => delivery.fail(err),
            }
            instance.release();
        });
        if let Err(rejected) = responding.execute(task) {
            let (error, task) = rejected.into_parts();
            drop(task);
            tracing::warn!(code = error.code(), "responding executor rejected the response");
            fallback.fail(ClientError::from(error));
        }
    }

    fn process_response(
        &self,
        scope: &ScopeInstance,
        response: ClientResponse,
    ) -> Result<ClientResponse, ClientError> {
        match run_chain(scope, response, &self.response_root)? {
            ChainOutcome::Completed(response) => Ok(response),
            ChainOutcome::Aborted(substitute) => {
                tracing::debug!(scope.id = %scope.id(), status = %substitute.status(), "response chain aborted");
                Err(ClientError::invocation_message(format!(
                    "response processing aborted with status {}",
                    substitute.status()
                )))
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("connector", &self.inner.connector.name())
            .field("request_root", &self.inner.request_root.descriptor().label())
            .field("response_root", &self.inner.response_root.descriptor().label())
            .field("executors", &self.inner.executors)
            .finish()
    }
}

/// 一次性的终态回调槽位。
struct Delivery {
    callback: Mutex<Option<Box<dyn ResponseCallback>>>,
}

impl Delivery {
    fn new(callback: Box<dyn ResponseCallback>) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(callback)),
        })
    }

    fn take(&self) -> Option<Box<dyn ResponseCallback>> {
        self.callback.lock().take()
    }

    fn complete(&self, response: ClientResponse, scope: &ScopeInstance) {
        match self.take() {
            Some(callback) => callback.completed(response, scope),
            None => tracing::debug!(scope.id = %scope.id(), "terminal callback already delivered"),
        }
    }

    fn fail(&self, error: ClientError) {
        match self.take() {
            Some(callback) => {
                tracing::debug!(code = error.code(), "delivering invocation failure");
                callback.failed(error);
            }
            None => tracing::debug!(code = error.code(), "terminal callback already delivered"),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.get_mut().take() {
            tracing::warn!("request processing ended without a terminal callback");
            callback.failed(ClientError::invocation_message(
                "request processing terminated before a response was delivered",
            ));
        }
    }
}

/// 以回调写入、以 [`ResponseFuture`] 读取的一次性结果通道。
pub(crate) fn response_channel() -> (impl ResponseCallback, ResponseFuture) {
    let (sender, receiver) = oneshot::channel();
    (FutureCallback { sender }, ResponseFuture { receiver })
}

struct FutureCallback {
    sender: oneshot::Sender<Result<ClientResponse, ClientError>>,
}

impl ResponseCallback for FutureCallback {
    fn completed(self: Box<Self>, response: ClientResponse, _scope: &ScopeInstance) {
        let _ = self.sender.send(Ok(response));
    }

    fn failed(self: Box<Self>, error: ClientError) {
        let _ = self.sender.send(Err(error));
    }
}

/// [`Runtime::submit_future`] 返回的结果句柄。
///
/// 丢弃句柄不会取消调用，只是不再接收结果。
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture {
    receiver: oneshot::Receiver<Result<ClientResponse, ClientError>>,
}

impl Future for ResponseFuture {
    type Output = Result<ClientResponse, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ClientError::invocation_message(
                "response callback was dropped before completion",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}
