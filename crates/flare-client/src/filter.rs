//! 请求/响应过滤器契约。
//!
//! 过滤器是用户扩展流水线的主要手段：请求过滤器可以改写请求或以替代响应 Abort，
//! 响应过滤器可以改写响应（状态、头部、实体流）。返回的 [`ClientError`] 是硬失败，整个调用以其中止。

use std::sync::Arc;

use crate::{
    error::ClientError,
    message::{ClientRequest, ClientResponse, Headers, Method, PropertyValue, RequestHead, StatusCode},
    stages::CurrentRequest,
};

/// 请求过滤器看到的上下文。
#[derive(Debug)]
pub struct RequestContext {
    request: ClientRequest,
    abort: Option<ClientResponse>,
}

impl RequestContext {
    pub(crate) fn new(request: ClientRequest) -> Self {
        Self {
            request,
            abort: None,
        }
    }

    pub fn request(&self) -> &ClientRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut ClientRequest {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &str {
        self.request.uri()
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        self.request.headers_mut()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.request.property(name)
    }

    /// 以替代响应 Abort：跳过剩余请求阶段与连接器调用，响应链改为处理该替代响应。
    pub fn abort_with(&mut self, response: ClientResponse) {
        self.abort = Some(response);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    pub(crate) fn into_parts(self) -> (ClientRequest, Option<ClientResponse>) {
        (self.request, self.abort)
    }
}

/// 响应过滤器看到的上下文。
#[derive(Debug)]
pub struct ResponseContext {
    request: Option<Arc<CurrentRequest>>,
    response: ClientResponse,
}

impl ResponseContext {
    pub(crate) fn new(request: Option<Arc<CurrentRequest>>, response: ClientResponse) -> Self {
        Self { request, response }
    }

    /// 本次调用最终发出的请求；请求链尚未完成初始化即失败时为 `None`。
    pub fn request(&self) -> Option<&RequestHead> {
        self.request.as_deref().map(CurrentRequest::head)
    }

    pub fn response(&self) -> &ClientResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ClientResponse {
        &mut self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        self.response.headers_mut()
    }

    pub(crate) fn into_response(self) -> ClientResponse {
        self.response
    }
}

/// 请求过滤器。
pub trait ClientRequestFilter: Send + Sync + 'static {
    fn filter(&self, context: &mut RequestContext) -> Result<(), ClientError>;
}

/// 响应过滤器。
pub trait ClientResponseFilter: Send + Sync + 'static {
    fn filter(&self, context: &mut ResponseContext) -> Result<(), ClientError>;
}

/// 闭包形式的请求过滤器，由 [`request_filter_fn`] 构造。
pub struct FnRequestFilter<F>(F);

pub fn request_filter_fn<F>(f: F) -> FnRequestFilter<F>
where
    F: Fn(&mut RequestContext) -> Result<(), ClientError> + Send + Sync + 'static,
{
    FnRequestFilter(f)
}

impl<F> ClientRequestFilter for FnRequestFilter<F>
where
    F: Fn(&mut RequestContext) -> Result<(), ClientError> + Send + Sync + 'static,
{
    fn filter(&self, context: &mut RequestContext) -> Result<(), ClientError> {
        (self.0)(context)
    }
}

/// 闭包形式的响应过滤器，由 [`response_filter_fn`] 构造。
pub struct FnResponseFilter<F>(F);

pub fn response_filter_fn<F>(f: F) -> FnResponseFilter<F>
where
    F: Fn(&mut ResponseContext) -> Result<(), ClientError> + Send + Sync + 'static,
{
    FnResponseFilter(f)
}

impl<F> ClientResponseFilter for FnResponseFilter<F>
where
    F: Fn(&mut ResponseContext) -> Result<(), ClientError> + Send + Sync + 'static,
{
    fn filter(&self, context: &mut ResponseContext) -> Result<(), ClientError> {
        (self.0)(context)
    }
}
