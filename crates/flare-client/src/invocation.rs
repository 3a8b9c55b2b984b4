//! 调用构建与执行。

use std::fmt;

use flare_core::{ExecutorRef, ScopeInstance};

use crate::{
    callback::ResponseCallback,
    client::Client,
    error::ClientError,
    executors::{RequestingExecutor, RespondingExecutor},
    message::{ClientRequest, ClientResponse, Entity, Method, PropertyValue},
    runtime::{ResponseFuture, response_channel},
};

/// 调用构建器：在发出前逐项填充请求。
pub struct InvocationBuilder {
    client: Client,
    request: ClientRequest,
}

impl InvocationBuilder {
    pub(crate) fn new(client: Client, uri: String) -> Self {
        let request = ClientRequest::with_config(Method::Get, uri, client.config_arc());
        Self { client, request }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers_mut().append(name, value);
        self
    }

    pub fn accept(self, media_type: impl Into<String>) -> Self {
        self.header("Accept", media_type)
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.request.set_property(name, value);
        self
    }

    pub fn entity(mut self, entity: impl Into<Entity>) -> Self {
        self.request.set_entity(entity);
        self
    }

    /// 请求侧与响应侧都使用 `executor`。
    pub fn executor(self, executor: ExecutorRef) -> Self {
        self.requesting_executor(executor.clone())
            .responding_executor(executor)
    }

    pub fn requesting_executor(mut self, executor: ExecutorRef) -> Self {
        self.request
            .attributes_mut()
            .insert(RequestingExecutor(executor));
        self
    }

    pub fn responding_executor(mut self, executor: ExecutorRef) -> Self {
        self.request
            .attributes_mut()
            .insert(RespondingExecutor(executor));
        self
    }

    /// 以给定方法完成构建。
    pub fn build(mut self, method: Method) -> Result<Invocation, ClientError> {
        self.client.ensure_open()?;
        self.request.set_method(method);
        Ok(Invocation {
            client: self.client,
            request: self.request,
        })
    }

    pub fn get(self) -> Result<ClientResponse, ClientError> {
        self.build(Method::Get)?.invoke()
    }

    pub fn delete(self) -> Result<ClientResponse, ClientError> {
        self.build(Method::Delete)?.invoke()
    }

    pub fn post(self, entity: impl Into<Entity>) -> Result<ClientResponse, ClientError> {
        self.entity(entity).build(Method::Post)?.invoke()
    }

    pub fn put(self, entity: impl Into<Entity>) -> Result<ClientResponse, ClientError> {
        self.entity(entity).build(Method::Put)?.invoke()
    }

    pub fn method(self, method: Method) -> Result<ClientResponse, ClientError> {
        self.build(method)?.invoke()
    }
}

impl fmt::Debug for InvocationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationBuilder")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// 已构建、尚未发出的调用。
pub struct Invocation {
    client: Client,
    request: ClientRequest,
}

impl Invocation {
    pub fn request(&self) -> &ClientRequest {
        &self.request
    }

    /// 同步发出：在调用线程上创建并激活作用域实例，调用结束后释放。
    pub fn invoke(self) -> Result<ClientResponse, ClientError> {
        self.client.ensure_open()?;
        let runtime = self.client.runtime();
        let request = self.request;
        runtime
            .request_scope()
            .run_in_new_scope(|instance| runtime.invoke(instance, request))
    }

    /// 异步发出；关闭后的客户端立即返回错误，不触发回调。
    ///
    /// 通过开放检查后客户端才被关闭时，自建执行器池会拒绝任务；此时 `failed` 收到的是
    /// [`ClientError::Closed`] 而不是执行器错误。
    pub fn submit(self, callback: impl ResponseCallback) -> Result<(), ClientError> {
        self.client.ensure_open()?;
        let callback = ClosedAwareCallback {
            client: self.client.clone(),
            callback,
        };
        self.client.runtime().submit(self.request, callback);
        Ok(())
    }

    pub fn submit_future(self) -> Result<ResponseFuture, ClientError> {
        let (callback, future) = response_channel();
        self.submit(callback)?;
        Ok(future)
    }
}

/// 把关闭竞态中的执行器拒绝还原为 [`ClientError::Closed`]。
struct ClosedAwareCallback<C> {
    client: Client,
    callback: C,
}

impl<C: ResponseCallback> ResponseCallback for ClosedAwareCallback<C> {
    fn completed(self: Box<Self>, response: ClientResponse, scope: &ScopeInstance) {
        Box::new(self.callback).completed(response, scope);
    }

    fn failed(self: Box<Self>, error: ClientError) {
        let error = match (error, self.client.ensure_open()) {
            (ClientError::Executor(_), Err(closed)) => closed,
            (error, _) => error,
        };
        Box::new(self.callback).failed(error);
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
